//! Strongly-typed identifiers (avoid mixing raw email strings arbitrarily).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error raised when an identifier fails to parse.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid user email: {0}")]
    InvalidUser(String),
    #[error("invalid group email: {0}")]
    InvalidGroup(String),
    #[error("invalid group id: {0}")]
    InvalidJitGroup(String),
    #[error("invalid principal id: {0}")]
    InvalidPrincipal(String),
    #[error("invalid principal class: {0}")]
    InvalidClass(String),
}

/// Email address of a user account.
///
/// Emails are canonicalized to lowercase so that two spellings of the
/// same address compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(email: impl Into<String>) -> Result<Self, IdError> {
        let email = email.into().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(IdError::InvalidUser(email));
        }
        Ok(Self(email))
    }

    pub fn email(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Email address of a directory group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(email: impl Into<String>) -> Result<Self, IdError> {
        let email = email.into().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(IdError::InvalidGroup(email));
        }
        Ok(Self(email))
    }

    pub fn email(&self) -> &str {
        &self.0
    }

    /// Part of the address before the `@`.
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }

    /// Part of the address after the `@`.
    pub fn domain(&self) -> &str {
        self.0.split('@').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier of a stint group: `environment.system.name`.
///
/// Comparison is case-insensitive; all segments are canonicalized to
/// lowercase at construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JitGroupId {
    environment: String,
    system: String,
    name: String,
}

impl JitGroupId {
    pub fn new(
        environment: impl Into<String>,
        system: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into().to_lowercase(),
            system: system.into().to_lowercase(),
            name: name.into().to_lowercase(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for JitGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.environment, self.system, self.name)
    }
}

impl FromStr for JitGroupId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(env), Some(sys), Some(name), None)
                if !env.is_empty() && !sys.is_empty() && !name.is_empty() =>
            {
                Ok(Self::new(env, sys, name))
            }
            _ => Err(IdError::InvalidJitGroup(s.to_string())),
        }
    }
}

/// Class of principals that a subject can belong to implicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassId {
    /// All users that passed authentication.
    AuthenticatedUsers,
}

impl ClassId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassId::AuthenticatedUsers => "authenticated-users",
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClassId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authenticated-users" => Ok(ClassId::AuthenticatedUsers),
            other => Err(IdError::InvalidClass(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_lowercases() {
        let id = UserId::new("Alice@Example.COM").unwrap();
        assert_eq!(id.email(), "alice@example.com");
    }

    #[test]
    fn test_user_id_equality_ignores_case() {
        let a = UserId::new("alice@example.com").unwrap();
        let b = UserId::new("ALICE@example.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_user_id_rejects_non_email() {
        assert!(UserId::new("alice").is_err());
        assert!(UserId::new("").is_err());
    }

    #[test]
    fn test_group_id_parts() {
        let id = GroupId::new("jit.prod.web.admins@example.com").unwrap();
        assert_eq!(id.local_part(), "jit.prod.web.admins");
        assert_eq!(id.domain(), "example.com");
    }

    #[test]
    fn test_jit_group_id_display() {
        let id = JitGroupId::new("prod", "web", "admins");
        assert_eq!(id.to_string(), "prod.web.admins");
    }

    #[test]
    fn test_jit_group_id_roundtrip() {
        let id: JitGroupId = "prod.web.admins".parse().unwrap();
        let again: JitGroupId = id.to_string().parse().unwrap();
        assert_eq!(id, again);
    }

    #[test]
    fn test_jit_group_id_case_insensitive() {
        let a: JitGroupId = "Prod.Web.Admins".parse().unwrap();
        let b: JitGroupId = "prod.web.admins".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_jit_group_id_rejects_wrong_arity() {
        assert!("prod.web".parse::<JitGroupId>().is_err());
        assert!("prod.web.admins.extra".parse::<JitGroupId>().is_err());
        assert!("prod..admins".parse::<JitGroupId>().is_err());
        assert!("".parse::<JitGroupId>().is_err());
    }

    #[test]
    fn test_class_id_roundtrip() {
        let parsed: ClassId = ClassId::AuthenticatedUsers.as_str().parse().unwrap();
        assert_eq!(parsed, ClassId::AuthenticatedUsers);
        assert!("nobody".parse::<ClassId>().is_err());
    }
}
