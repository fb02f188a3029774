//! Typed input properties for constraint checks.

use crate::error::PolicyError;
use chrono::Duration;
use std::fmt;
use std::sync::RwLock;

/// Declared type of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    String,
    Bool,
    Long,
    /// A time span, supplied as a whole number of seconds.
    Duration,
}

/// A parsed property value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    String(String),
    Bool(bool),
    Long(i64),
    Duration(Duration),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Long(_) => PropertyKind::Long,
            PropertyValue::Duration(_) => PropertyKind::Duration,
        }
    }

    /// Serialized form, round-trippable through [`Property::set`].
    pub fn serialize(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Long(n) => n.to_string(),
            PropertyValue::Duration(d) => d.num_seconds().to_string(),
        }
    }

    /// JSON value used when bridging into expression evaluation.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::String(s) => serde_json::Value::String(s.clone()),
            PropertyValue::Bool(b) => serde_json::Value::Bool(*b),
            PropertyValue::Long(n) => serde_json::Value::from(*n),
            PropertyValue::Duration(d) => serde_json::Value::from(d.num_seconds()),
        }
    }

    /// Ordering between values of the same kind; `None` across kinds.
    fn partial_cmp_same_kind(&self, other: &PropertyValue) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (PropertyValue::Long(a), PropertyValue::Long(b)) => Some(a.cmp(b)),
            (PropertyValue::Duration(a), PropertyValue::Duration(b)) => Some(a.cmp(b)),
            (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

/// Declaration of a property: everything but the value.
#[derive(Clone, Debug)]
pub struct PropertySpec {
    pub name: String,
    pub display_name: String,
    pub kind: PropertyKind,
    pub required: bool,
    pub min_inclusive: Option<PropertyValue>,
    pub max_inclusive: Option<PropertyValue>,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            kind,
            required: false,
            min_inclusive: None,
            max_inclusive: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_range(
        mut self,
        min: Option<PropertyValue>,
        max: Option<PropertyValue>,
    ) -> Self {
        self.min_inclusive = min;
        self.max_inclusive = max;
        self
    }
}

/// A property instance: a declaration plus a settable value.
///
/// Instances are shared between checks when two constraints within one
/// class declare the same input name, so the value is behind a lock.
#[derive(Debug)]
pub struct Property {
    spec: PropertySpec,
    value: RwLock<Option<PropertyValue>>,
}

impl Property {
    pub fn new(spec: PropertySpec) -> Self {
        Self {
            spec,
            value: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn display_name(&self) -> &str {
        &self.spec.display_name
    }

    pub fn kind(&self) -> PropertyKind {
        self.spec.kind
    }

    pub fn is_required(&self) -> bool {
        self.spec.required
    }

    pub fn min_inclusive(&self) -> Option<&PropertyValue> {
        self.spec.min_inclusive.as_ref()
    }

    pub fn max_inclusive(&self) -> Option<&PropertyValue> {
        self.spec.max_inclusive.as_ref()
    }

    /// Parse and store a value according to the declared type, checking
    /// the inclusive range if one is declared.
    pub fn set(&self, raw: &str) -> Result<(), PolicyError> {
        let parsed = self.parse(raw)?;
        self.check_range(&parsed)?;
        *self.value.write().expect("property lock poisoned") = Some(parsed);
        Ok(())
    }

    /// Remove any previously set value.
    pub fn clear(&self) {
        *self.value.write().expect("property lock poisoned") = None;
    }

    pub fn get(&self) -> Option<PropertyValue> {
        self.value.read().expect("property lock poisoned").clone()
    }

    fn invalid(&self, reason: impl Into<String>) -> PolicyError {
        PolicyError::InvalidInput {
            property: self.spec.name.clone(),
            reason: reason.into(),
        }
    }

    fn parse(&self, raw: &str) -> Result<PropertyValue, PolicyError> {
        match self.spec.kind {
            PropertyKind::String => Ok(PropertyValue::String(raw.to_string())),
            PropertyKind::Bool => match raw.to_lowercase().as_str() {
                "true" => Ok(PropertyValue::Bool(true)),
                "false" => Ok(PropertyValue::Bool(false)),
                _ => Err(self.invalid("expected 'true' or 'false'")),
            },
            PropertyKind::Long => raw
                .parse::<i64>()
                .map(PropertyValue::Long)
                .map_err(|_| self.invalid("expected an integer")),
            PropertyKind::Duration => raw
                .parse::<i64>()
                .ok()
                .filter(|n| *n >= 0)
                .map(|n| PropertyValue::Duration(Duration::seconds(n)))
                .ok_or_else(|| self.invalid("expected a number of seconds")),
        }
    }

    fn check_range(&self, value: &PropertyValue) -> Result<(), PolicyError> {
        if let Some(min) = &self.spec.min_inclusive {
            if value.partial_cmp_same_kind(min) == Some(std::cmp::Ordering::Less) {
                return Err(self.invalid(format!("value is below the minimum of {}", min)));
            }
        }
        if let Some(max) = &self.spec.max_inclusive {
            if value.partial_cmp_same_kind(max) == Some(std::cmp::Ordering::Greater) {
                return Err(self.invalid(format!("value is above the maximum of {}", max)));
            }
        }
        Ok(())
    }
}
