//! Service configuration.
//!
//! Configuration is a key/value map, normally sourced from environment
//! variables:
//!
//! ```bash
//! # Directory settings (required)
//! RESOURCE_CUSTOMER_ID=C0abc123
//! RESOURCE_DOMAIN=example.com
//!
//! # One policy source locator per environment
//! RESOURCE_ENVIRONMENT_PROD=file:/etc/stint/prod.yaml
//! RESOURCE_ENVIRONMENT_DEV=secret:projects/x/secrets/dev
//!
//! # Optional tuning (seconds)
//! RESOURCE_CACHE_TIMEOUT=300
//! BACKEND_CONNECT_TIMEOUT=5
//! BACKEND_READ_TIMEOUT=20
//! BACKEND_WRITE_TIMEOUT=5
//!
//! # Optional notifier
//! SMTP_HOST=smtp.example.com
//! SMTP_PORT=587
//! SMTP_USERNAME=notifier@example.com
//! SMTP_PASSWORD=app_password
//! SMTP_USE_TLS=true
//! SMTP_SENDER=stint@example.com
//! ```
//!
//! Environment names in variable keys use underscores where the policy
//! name uses hyphens (`RESOURCE_ENVIRONMENT_PROD_EU` configures
//! `prod-eu`).

use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

const ENVIRONMENT_KEY_PREFIX: &str = "RESOURCE_ENVIRONMENT_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option: {0}")]
    MissingOption(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("no environments configured (set RESOURCE_ENVIRONMENT_<name>)")]
    NoEnvironments,
}

/// Timeouts applied to every outbound backend call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(20),
            write: Duration::from_secs(5),
        }
    }
}

/// Notifier options. Present only when an SMTP host is configured; the
/// notifier itself is an external collaborator.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub sender: Option<String>,
}

/// Service configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Directory customer the service manages groups for.
    pub customer_id: String,
    /// Domain under which provisioned group emails are created.
    pub domain: String,
    /// Policy source locator per environment name.
    pub environments: BTreeMap<String, String>,
    /// Time-to-live of the environment policy cache.
    pub cache_timeout: Duration,
    pub backend: BackendTimeouts,
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_map(&std::env::vars().collect())
    }

    /// Load configuration from an explicit key/value map.
    pub fn from_map(options: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let customer_id = required(options, "RESOURCE_CUSTOMER_ID")?;
        let domain = required(options, "RESOURCE_DOMAIN")?;

        let mut environments = BTreeMap::new();
        for (key, value) in options.range(ENVIRONMENT_KEY_PREFIX.to_string()..) {
            let Some(suffix) = key.strip_prefix(ENVIRONMENT_KEY_PREFIX) else {
                break;
            };
            if suffix.is_empty() || value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            let name = suffix.to_lowercase().replace('_', "-");
            environments.insert(name, value.clone());
        }
        if environments.is_empty() {
            return Err(ConfigError::NoEnvironments);
        }

        let cache_timeout = seconds(options, "RESOURCE_CACHE_TIMEOUT", 300)?;
        let backend = BackendTimeouts {
            connect: seconds(options, "BACKEND_CONNECT_TIMEOUT", 5)?,
            read: seconds(options, "BACKEND_READ_TIMEOUT", 20)?,
            write: seconds(options, "BACKEND_WRITE_TIMEOUT", 5)?,
        };

        let smtp = match options.get("SMTP_HOST") {
            Some(host) if !host.trim().is_empty() => Some(SmtpConfig {
                host: host.clone(),
                port: parse(options, "SMTP_PORT", 587)?,
                username: options.get("SMTP_USERNAME").cloned(),
                password: options.get("SMTP_PASSWORD").cloned(),
                use_tls: options
                    .get("SMTP_USE_TLS")
                    .map(|v| v.to_lowercase() == "true" || v == "1")
                    .unwrap_or(true),
                sender: options.get("SMTP_SENDER").cloned(),
            }),
            _ => None,
        };

        Ok(Self {
            customer_id,
            domain,
            environments,
            cache_timeout,
            backend,
            smtp,
        })
    }

    /// Names of all configured environments.
    pub fn environment_names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }
}

fn required(options: &BTreeMap<String, String>, key: &'static str) -> Result<String, ConfigError> {
    options
        .get(key)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or(ConfigError::MissingOption(key))
}

fn seconds(
    options: &BTreeMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse(options, key, default).map(Duration::from_secs)
}

fn parse<T: std::str::FromStr>(
    options: &BTreeMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match options.get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.clone(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("RESOURCE_CUSTOMER_ID".to_string(), "C0abc123".to_string()),
            ("RESOURCE_DOMAIN".to_string(), "example.com".to_string()),
            (
                "RESOURCE_ENVIRONMENT_PROD".to_string(),
                "file:/etc/stint/prod.yaml".to_string(),
            ),
        ])
    }

    #[test]
    fn test_minimal_config() {
        let config = AppConfig::from_map(&minimal()).unwrap();
        assert_eq!(config.customer_id, "C0abc123");
        assert_eq!(config.domain, "example.com");
        assert_eq!(
            config.environments.get("prod").map(String::as_str),
            Some("file:/etc/stint/prod.yaml")
        );
        assert_eq!(config.cache_timeout, Duration::from_secs(300));
        assert_eq!(config.backend, BackendTimeouts::default());
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_missing_required_options() {
        let mut options = minimal();
        options.remove("RESOURCE_CUSTOMER_ID");
        assert!(matches!(
            AppConfig::from_map(&options),
            Err(ConfigError::MissingOption("RESOURCE_CUSTOMER_ID"))
        ));

        let mut options = minimal();
        options.remove("RESOURCE_DOMAIN");
        assert!(AppConfig::from_map(&options).is_err());
    }

    #[test]
    fn test_no_environments() {
        let mut options = minimal();
        options.remove("RESOURCE_ENVIRONMENT_PROD");
        assert!(matches!(
            AppConfig::from_map(&options),
            Err(ConfigError::NoEnvironments)
        ));
    }

    #[test]
    fn test_environment_names_are_normalized() {
        let mut options = minimal();
        options.insert(
            "RESOURCE_ENVIRONMENT_PROD_EU".to_string(),
            "file:/etc/stint/prod-eu.yaml".to_string(),
        );
        let config = AppConfig::from_map(&options).unwrap();
        assert!(config.environments.contains_key("prod-eu"));
        assert_eq!(config.environment_names().count(), 2);
    }

    #[test]
    fn test_cache_timeout_override() {
        let mut options = minimal();
        options.insert("RESOURCE_CACHE_TIMEOUT".to_string(), "20".to_string());
        let config = AppConfig::from_map(&options).unwrap();
        assert_eq!(config.cache_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_invalid_timeout_is_rejected() {
        let mut options = minimal();
        options.insert("BACKEND_READ_TIMEOUT".to_string(), "soon".to_string());
        assert!(matches!(
            AppConfig::from_map(&options),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_smtp_block() {
        let mut options = minimal();
        options.insert("SMTP_HOST".to_string(), "smtp.example.com".to_string());
        options.insert("SMTP_USERNAME".to_string(), "notifier".to_string());
        let config = AppConfig::from_map(&options).unwrap();

        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 587);
        assert!(smtp.use_tls);
        assert_eq!(smtp.username.as_deref(), Some("notifier"));
    }

    #[test]
    fn test_smtp_port_and_tls_overrides() {
        let mut options = minimal();
        options.insert("SMTP_HOST".to_string(), "smtp.example.com".to_string());
        options.insert("SMTP_PORT".to_string(), "2525".to_string());
        options.insert("SMTP_USE_TLS".to_string(), "false".to_string());
        let smtp = AppConfig::from_map(&options).unwrap().smtp.unwrap();
        assert_eq!(smtp.port, 2525);
        assert!(!smtp.use_tls);
    }
}
