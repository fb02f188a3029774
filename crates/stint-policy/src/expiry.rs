//! Expiry constraints bounding the duration of a membership.

use crate::error::PolicyError;
use crate::property::{Property, PropertyKind, PropertySpec, PropertyValue};
use chrono::Duration;
use std::sync::Arc;

/// Bounds the lifetime of the membership a join confers.
///
/// A fixed constraint (`min == max`) always grants the same duration
/// and requires no input. A user-defined constraint exposes a duration
/// input and is satisfied only when a value within `[min, max]` was
/// supplied.
#[derive(Clone, Debug)]
pub struct ExpiryConstraint {
    min: Duration,
    max: Duration,
    display_name: String,
}

impl ExpiryConstraint {
    /// Name of the constraint and of the input property it exposes.
    pub const NAME: &'static str = "expiry";

    /// A constraint that always grants the same duration.
    pub fn fixed(duration: Duration) -> Result<Self, PolicyError> {
        Self::range(duration, duration)
    }

    /// A constraint that lets the user choose a duration in `[min, max]`.
    pub fn range(min: Duration, max: Duration) -> Result<Self, PolicyError> {
        if min <= Duration::zero() {
            return Err(PolicyError::InvalidExpiryRange(
                "the minimum duration must be positive".to_string(),
            ));
        }
        if max < min {
            return Err(PolicyError::InvalidExpiryRange(
                "the maximum duration must not be below the minimum".to_string(),
            ));
        }
        let display_name = if min == max {
            format!("Membership expires after {}s", min.num_seconds())
        } else {
            format!(
                "Membership expiry between {}s and {}s",
                min.num_seconds(),
                max.num_seconds()
            )
        };
        Ok(Self {
            min,
            max,
            display_name,
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    pub(crate) fn input_specs(&self) -> Vec<PropertySpec> {
        if self.is_fixed() {
            vec![]
        } else {
            vec![
                PropertySpec::new(Self::NAME, "Membership duration", PropertyKind::Duration)
                    .required()
                    .with_range(
                        Some(PropertyValue::Duration(self.min)),
                        Some(PropertyValue::Duration(self.max)),
                    ),
            ]
        }
    }

    pub(crate) fn check_satisfied(&self, input: &[Arc<Property>]) -> bool {
        if self.is_fixed() {
            return true;
        }
        // Range enforcement happened when the property was set.
        self.supplied_duration(input).is_some()
    }

    /// The duration the membership should be granted for: the fixed
    /// duration, or the value the user supplied.
    pub fn extract_expiry(&self, input: &[Arc<Property>]) -> Option<Duration> {
        if self.is_fixed() {
            Some(self.min)
        } else {
            self.supplied_duration(input)
        }
    }

    fn supplied_duration(&self, input: &[Arc<Property>]) -> Option<Duration> {
        input
            .iter()
            .find(|p| p.name() == Self::NAME)
            .and_then(|p| p.get())
            .and_then(|v| match v {
                PropertyValue::Duration(d) => Some(d),
                _ => None,
            })
    }
}
