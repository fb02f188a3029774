//! Constraints and their evaluation.

use crate::expiry::ExpiryConstraint;
use crate::expression::ExpressionConstraint;
use crate::property::Property;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// A constraint evaluation failed. This is distinct from a constraint
/// that evaluated to false: a failure indicates a broken expression or
/// a type mismatch, not an unmet requirement.
#[derive(Clone, Debug, Error)]
pub enum ConstraintError {
    #[error("expression evaluation failed: {0}")]
    Expression(String),
    #[error("expression must evaluate to a boolean")]
    NotBoolean,
}

/// A named check that a join or approval must satisfy.
///
/// Constraints are a closed set of kinds; new kinds extend this enum
/// and the evaluator, not an open inheritance hierarchy.
#[derive(Debug)]
pub enum Constraint {
    /// A boolean expression over `input.<name>` and `subject.<attr>`.
    Expression(ExpressionConstraint),
    /// Bounds the expiry of the membership being requested.
    Expiry(ExpiryConstraint),
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::Expression(c) => c.name(),
            Constraint::Expiry(_) => ExpiryConstraint::NAME,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Constraint::Expression(c) => c.display_name(),
            Constraint::Expiry(c) => c.display_name(),
        }
    }

    pub fn as_expiry(&self) -> Option<&ExpiryConstraint> {
        match self {
            Constraint::Expiry(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_expression(&self) -> Option<&ExpressionConstraint> {
        match self {
            Constraint::Expression(c) => Some(c),
            _ => None,
        }
    }

    /// Create a check with fresh property instances for this
    /// constraint's declared inputs.
    pub fn new_check(self: &Arc<Self>) -> Check {
        let input = match self.as_ref() {
            Constraint::Expression(c) => c.input_specs(),
            Constraint::Expiry(c) => c.input_specs(),
        }
        .into_iter()
        .map(|spec| Arc::new(Property::new(spec)))
        .collect();

        Check {
            constraint: Arc::clone(self),
            input,
            context: RwLock::new(serde_json::Map::new()),
        }
    }
}

/// The evaluation of one constraint: the constraint, its input
/// properties, and a context of additional variables.
#[derive(Debug)]
pub struct Check {
    constraint: Arc<Constraint>,
    input: Vec<Arc<Property>>,
    context: RwLock<serde_json::Map<String, serde_json::Value>>,
}

impl Check {
    pub fn constraint(&self) -> &Arc<Constraint> {
        &self.constraint
    }

    pub fn input(&self) -> &[Arc<Property>] {
        &self.input
    }

    /// Swap an input property for a shared instance. Used when two
    /// constraints within one class declare the same input name.
    pub(crate) fn replace_input(&mut self, index: usize, shared: Arc<Property>) {
        self.input[index] = shared;
    }

    /// Add a context variable available to expression evaluation under
    /// the given name.
    pub fn set_context(&self, name: &str, value: serde_json::Value) {
        self.context
            .write()
            .expect("check context lock poisoned")
            .insert(name.to_string(), value);
    }

    /// Evaluate the constraint against the current inputs and context.
    ///
    /// `Ok(false)` means the constraint is unsatisfied; `Err` means the
    /// evaluation itself broke.
    pub fn execute(&self) -> Result<bool, ConstraintError> {
        match self.constraint.as_ref() {
            Constraint::Expression(c) => {
                let context = self
                    .context
                    .read()
                    .expect("check context lock poisoned")
                    .clone();
                c.evaluate(&self.input, &context)
            }
            Constraint::Expiry(c) => Ok(c.check_satisfied(&self.input)),
        }
    }
}
