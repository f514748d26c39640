//! Binding that stores values on the event under a property name.

use super::{Binding, BindingBuilder, ConversionError, Convertable, Validatable, Value};
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;

/// Stores a value in the event's evaluation attributes, where later
/// conditions, operations and rules of the same request can read it.
///
/// Every pattern parameter is bound to `Evaluation::property(name)` when it
/// is registered.
#[derive(Debug)]
pub struct Evaluation {
    property: String,
    hooks: BindingBuilder,
}

impl Evaluation {
    /// Binding for the evaluation attribute `property`.
    pub fn property(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            hooks: BindingBuilder::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.property
    }
}

impl Binding for Evaluation {
    fn submit(
        &self,
        event: &mut dyn Rewrite,
        _context: &EvaluationContext,
        value: Value,
    ) -> Result<(), RewriteError> {
        event.attributes_mut().insert(self.property.clone(), value);
        Ok(())
    }

    fn retrieve(&self, event: &dyn Rewrite, _context: &EvaluationContext) -> Option<Value> {
        event.attributes().get(&self.property).cloned()
    }

    fn convert(
        &self,
        event: &dyn Rewrite,
        context: &EvaluationContext,
        value: Value,
    ) -> Result<Value, ConversionError> {
        self.hooks.convert(event, context, value)
    }

    fn validate(&self, event: &dyn Rewrite, context: &EvaluationContext, value: &Value) -> bool {
        self.hooks.validate(event, context, value)
    }

    fn as_convertable(&self) -> Option<&dyn Convertable> {
        Some(&self.hooks)
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        Some(&self.hooks)
    }
}
