//! Binding primitives: converters, validators and the targets matched values
//! are written to.

mod converter;
mod evaluation;
mod validator;

pub use converter::{BooleanConverter, ConversionError, DecimalConverter, IntegerConverter};
pub use evaluation::Evaluation;
pub use validator::{IntegerValidator, NotEmptyValidator, RegexValidator};

pub use serde_json::Value;

use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Converts a matched value into the type a binding expects.
pub trait Converter: fmt::Debug + Send + Sync {
    /// Convert `value`. Input that cannot be converted is an error, which the
    /// commit step treats as a failed validation.
    fn convert(
        &self,
        event: &dyn Rewrite,
        context: &EvaluationContext,
        value: Value,
    ) -> Result<Value, ConversionError>;
}

/// Decides whether a (converted) value may be bound.
pub trait Validator: fmt::Debug + Send + Sync {
    /// Returning `false` means the rule does not apply; it is not an error.
    fn validate(&self, event: &dyn Rewrite, context: &EvaluationContext, value: &Value) -> bool;
}

/// A write target for matched values.
///
/// Bindings are shared across requests, so `submit` must only write to
/// per-request state reachable from the event.
pub trait Binding: fmt::Debug + Send + Sync {
    /// Write a converted, validated value.
    fn submit(
        &self,
        event: &mut dyn Rewrite,
        context: &EvaluationContext,
        value: Value,
    ) -> Result<(), RewriteError>;

    /// Read the value currently held by this target, if any.
    fn retrieve(&self, event: &dyn Rewrite, context: &EvaluationContext) -> Option<Value>;

    /// Convert a value before validation. Pass-through unless overridden.
    fn convert(
        &self,
        _event: &dyn Rewrite,
        _context: &EvaluationContext,
        value: Value,
    ) -> Result<Value, ConversionError> {
        Ok(value)
    }

    /// Validate a converted value. Accepts everything unless overridden.
    fn validate(&self, _event: &dyn Rewrite, _context: &EvaluationContext, _value: &Value) -> bool {
        true
    }

    /// Converter capability, if supported.
    fn as_convertable(&self) -> Option<&dyn Convertable> {
        None
    }

    /// Validator capability, if supported.
    fn as_validatable(&self) -> Option<&dyn Validatable> {
        None
    }
}

/// Accepts a converter.
pub trait Convertable: Send + Sync {
    fn set_converter(&self, converter: Arc<dyn Converter>);

    /// Set a converter by type.
    fn set_converter_type<C: Converter + Default + 'static>(&self)
    where
        Self: Sized,
    {
        self.set_converter(Arc::new(C::default()));
    }
}

/// Accepts a validator.
pub trait Validatable: Send + Sync {
    fn set_validator(&self, validator: Arc<dyn Validator>);

    /// Set a validator by type.
    fn set_validator_type<V: Validator + Default + 'static>(&self)
    where
        Self: Sized,
    {
        self.set_validator(Arc::new(V::default()));
    }
}

/// Accepts bindings.
pub trait Bindable: Send + Sync {
    fn add_binding(&self, binding: Arc<dyn Binding>);
}

/// Exposes the bindings currently attached.
pub trait HasBindings: fmt::Debug + Send + Sync {
    fn bindings(&self) -> Vec<Arc<dyn Binding>>;
}

/// A plain list of bindings, for conditions that bind a value without
/// carrying any parameter configuration.
#[derive(Debug, Default)]
pub struct DefaultBindable {
    bindings: RwLock<Vec<Arc<dyn Binding>>>,
}

impl DefaultBindable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bindable for DefaultBindable {
    fn add_binding(&self, binding: Arc<dyn Binding>) {
        self.bindings.write().push(binding);
    }
}

impl HasBindings for DefaultBindable {
    fn bindings(&self) -> Vec<Arc<dyn Binding>> {
        self.bindings.read().clone()
    }
}

/// Converter and validator slots a binding can embed to support
/// [`Convertable`] and [`Validatable`].
#[derive(Debug, Default)]
pub struct BindingBuilder {
    converter: RwLock<Option<Arc<dyn Converter>>>,
    validator: RwLock<Option<Arc<dyn Validator>>>,
}

impl BindingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn converter(&self) -> Option<Arc<dyn Converter>> {
        self.converter.read().clone()
    }

    pub fn validator(&self) -> Option<Arc<dyn Validator>> {
        self.validator.read().clone()
    }

    /// Apply the current converter, if any.
    pub fn convert(
        &self,
        event: &dyn Rewrite,
        context: &EvaluationContext,
        value: Value,
    ) -> Result<Value, ConversionError> {
        match self.converter() {
            Some(converter) => converter.convert(event, context, value),
            None => Ok(value),
        }
    }

    /// Apply the current validator, if any.
    pub fn validate(&self, event: &dyn Rewrite, context: &EvaluationContext, value: &Value) -> bool {
        match self.validator() {
            Some(validator) => validator.validate(event, context, value),
            None => true,
        }
    }
}

impl Convertable for BindingBuilder {
    fn set_converter(&self, converter: Arc<dyn Converter>) {
        *self.converter.write() = Some(converter);
    }
}

impl Validatable for BindingBuilder {
    fn set_validator(&self, validator: Arc<dyn Validator>) {
        *self.validator.write() = Some(validator);
    }
}

/// Render a bound value as text, without JSON quoting for strings.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
