//! Expression constraints evaluated with CEL.

use crate::constraint::ConstraintError;
use crate::error::PolicyError;
use crate::property::{Property, PropertySpec};
use cel_interpreter::{Context, Program, Value};
use std::panic;
use std::sync::Arc;

/// A constraint whose condition is a CEL expression over `input.<name>`
/// and whatever context variables the caller provides (`subject.email`
/// during policy analysis).
///
/// The expression is compiled once, when the policy is loaded.
pub struct ExpressionConstraint {
    name: String,
    display_name: String,
    expression: String,
    program: Program,
    inputs: Vec<PropertySpec>,
}

impl std::fmt::Debug for ExpressionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionConstraint")
            .field("name", &self.name)
            .field("expression", &self.expression)
            .finish()
    }
}

impl ExpressionConstraint {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        expression: impl Into<String>,
        inputs: Vec<PropertySpec>,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        let expression = expression.into();

        // The underlying parser can panic on certain malformed
        // expressions instead of returning an error.
        let compiled = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            Program::compile(&expression)
        }));
        let program = match compiled {
            Ok(Ok(program)) => program,
            Ok(Err(e)) => {
                return Err(PolicyError::InvalidExpression {
                    constraint: name,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(PolicyError::InvalidExpression {
                    constraint: name,
                    reason: "expression failed to parse".to_string(),
                })
            }
        };

        Ok(Self {
            name,
            display_name: display_name.into(),
            expression,
            program,
            inputs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub(crate) fn input_specs(&self) -> Vec<PropertySpec> {
        self.inputs.clone()
    }

    /// Evaluate the expression. Properties without a value are omitted
    /// from the `input` variable, so an expression referencing them
    /// fails rather than silently passing.
    pub(crate) fn evaluate(
        &self,
        input: &[Arc<Property>],
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool, ConstraintError> {
        let mut ctx = Context::default();

        let mut input_map = serde_json::Map::new();
        for property in input {
            if let Some(value) = property.get() {
                input_map.insert(property.name().to_string(), value.to_json());
            }
        }
        let input_value = cel_interpreter::to_value(&input_map)
            .map_err(|e| ConstraintError::Expression(e.to_string()))?;
        let _ = ctx.add_variable("input", input_value);

        for (name, value) in context {
            let value = cel_interpreter::to_value(value)
                .map_err(|e| ConstraintError::Expression(e.to_string()))?;
            let _ = ctx.add_variable(name.clone(), value);
        }

        // Execution can also panic on edge cases; contain it.
        let outcome =
            panic::catch_unwind(panic::AssertUnwindSafe(|| self.program.execute(&ctx)));
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(ConstraintError::Expression(e.to_string())),
            Err(_) => {
                return Err(ConstraintError::Expression(
                    "expression execution failed".to_string(),
                ))
            }
        };

        match value {
            Value::Bool(b) => Ok(b),
            _ => Err(ConstraintError::NotBoolean),
        }
    }
}
