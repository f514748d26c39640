//! Parameters: named placeholders and the configuration attached to them.
//!
//! A parameter carries an ordered list of transforms, an ordered list of
//! constraints, at most one converter, at most one validator and any number of
//! bindings. Configuration is retroactive in both directions: a converter set
//! after bindings were attached reaches those bindings, and a binding attached
//! after a converter was set receives it.

mod constraint;
mod pattern;
mod store;
mod transform;

pub use constraint::RegexConstraint;
pub use pattern::{ParameterizedPattern, Template};
pub use store::{Parameter, ParameterStore};
pub use transform::{LowercaseTransform, UppercaseTransform, UrlDecodeTransform, UrlEncodeTransform};

use crate::bind::{Bindable, Binding, ConversionError, Converter, HasBindings, Validator, Value};
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Rewrites a matched value before it is bound.
pub trait Transform: fmt::Debug + Send + Sync {
    fn transform(&self, event: &dyn Rewrite, context: &EvaluationContext, value: String) -> String;
}

/// Restricts which values a parameter matches.
pub trait Constraint: fmt::Debug + Send + Sync {
    fn is_satisfied_by(&self, event: &dyn Rewrite, context: &EvaluationContext, value: &str) -> bool;

    /// Regex source, for constraints a pattern can compile into its capture
    /// group.
    fn as_pattern(&self) -> Option<&str> {
        None
    }
}

/// Accepts constraints.
pub trait Constrainable: Send + Sync {
    fn add_constraint(&self, constraint: Arc<dyn Constraint>);
}

/// Accepts transforms.
pub trait Transformable: Send + Sync {
    fn add_transform(&self, transform: Arc<dyn Transform>);
}

/// Something a [`BuilderCore`] forwards configuration to. Each capability is
/// optional; the builder only applies what the target supports.
pub trait DelegateTarget: Send + Sync {
    fn as_constrainable(&self) -> Option<&dyn Constrainable> {
        None
    }

    fn as_transformable(&self) -> Option<&dyn Transformable> {
        None
    }

    fn as_bindable(&self) -> Option<&dyn Bindable> {
        None
    }

    fn as_binding_source(&self) -> Option<&dyn HasBindings> {
        None
    }
}

#[derive(Debug, Default)]
struct BuilderState {
    transforms: Vec<Arc<dyn Transform>>,
    constraints: Vec<Arc<dyn Constraint>>,
    converter: Option<Arc<dyn Converter>>,
    validator: Option<Arc<dyn Validator>>,
    bindings: Vec<Arc<dyn Binding>>,
}

/// Configuration state shared by every [`ParameterBuilder`].
#[derive(Default)]
pub struct BuilderCore {
    state: RwLock<BuilderState>,
    delegates: Vec<Arc<dyn DelegateTarget>>,
    revision: AtomicU64,
}

impl fmt::Debug for BuilderCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderCore")
            .field("state", &*self.state.read())
            .field("delegates", &self.delegates.len())
            .finish()
    }
}

impl BuilderCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A core that also applies every configuration call to `delegates`.
    pub fn with_delegates(delegates: Vec<Arc<dyn DelegateTarget>>) -> Self {
        Self {
            delegates,
            ..Self::default()
        }
    }

    /// Incremented on every configuration change.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn touch(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Replace the converter and push it to every current binding, including
    /// those of delegates.
    pub fn set_converter(&self, converter: Arc<dyn Converter>) {
        let bindings = {
            let mut state = self.state.write();
            state.converter = Some(converter.clone());
            state.bindings.clone()
        };
        self.touch();

        for binding in bindings.iter().chain(self.delegate_bindings().iter()) {
            if let Some(target) = binding.as_convertable() {
                target.set_converter(converter.clone());
            }
        }
    }

    /// Replace the validator and push it to every current binding, including
    /// those of delegates.
    pub fn set_validator(&self, validator: Arc<dyn Validator>) {
        let bindings = {
            let mut state = self.state.write();
            state.validator = Some(validator.clone());
            state.bindings.clone()
        };
        self.touch();

        for binding in bindings.iter().chain(self.delegate_bindings().iter()) {
            if let Some(target) = binding.as_validatable() {
                target.set_validator(validator.clone());
            }
        }
    }

    pub fn add_constraint(&self, constraint: Arc<dyn Constraint>) {
        self.state.write().constraints.push(constraint.clone());
        self.touch();

        for delegate in &self.delegates {
            if let Some(target) = delegate.as_constrainable() {
                target.add_constraint(constraint.clone());
            }
        }
    }

    pub fn add_transform(&self, transform: Arc<dyn Transform>) {
        self.state.write().transforms.push(transform.clone());
        self.touch();

        for delegate in &self.delegates {
            if let Some(target) = delegate.as_transformable() {
                target.add_transform(transform.clone());
            }
        }
    }

    /// Attach a binding, pushing the current converter/validator onto it.
    pub fn add_binding(&self, binding: Arc<dyn Binding>) {
        let (converter, validator) = {
            let mut state = self.state.write();
            state.bindings.push(binding.clone());
            (state.converter.clone(), state.validator.clone())
        };
        self.touch();

        if let (Some(converter), Some(target)) = (converter, binding.as_convertable()) {
            target.set_converter(converter);
        }
        if let (Some(validator), Some(target)) = (validator, binding.as_validatable()) {
            target.set_validator(validator);
        }

        for delegate in &self.delegates {
            if let Some(target) = delegate.as_bindable() {
                target.add_binding(binding.clone());
            }
        }
    }

    fn delegate_bindings(&self) -> Vec<Arc<dyn Binding>> {
        self.delegates
            .iter()
            .filter_map(|d| d.as_binding_source())
            .flat_map(|source| source.bindings())
            .collect()
    }

    pub fn converter(&self) -> Option<Arc<dyn Converter>> {
        self.state.read().converter.clone()
    }

    pub fn validator(&self) -> Option<Arc<dyn Validator>> {
        self.state.read().validator.clone()
    }

    pub fn constraints(&self) -> Vec<Arc<dyn Constraint>> {
        self.state.read().constraints.clone()
    }

    pub fn transforms(&self) -> Vec<Arc<dyn Transform>> {
        self.state.read().transforms.clone()
    }

    pub fn bindings(&self) -> Vec<Arc<dyn Binding>> {
        self.state.read().bindings.clone()
    }

    /// Apply the converter; a missing converter returns the value unchanged.
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

    /// Apply the validator; a missing validator accepts.
    pub fn validate(&self, event: &dyn Rewrite, context: &EvaluationContext, value: &Value) -> bool {
        match self.validator() {
            Some(validator) => validator.validate(event, context, value),
            None => true,
        }
    }

    /// Run every transform in order.
    pub fn apply_transforms(
        &self,
        event: &dyn Rewrite,
        context: &EvaluationContext,
        value: String,
    ) -> String {
        self.transforms()
            .iter()
            .fold(value, |value, t| t.transform(event, context, value))
    }

    /// Whether every constraint accepts `value`.
    pub fn satisfies_constraints(
        &self,
        event: &dyn Rewrite,
        context: &EvaluationContext,
        value: &str,
    ) -> bool {
        self.state
            .read()
            .constraints
            .iter()
            .all(|c| c.is_satisfied_by(event, context, value))
    }

    /// Regex source of the most recently added pattern constraint.
    pub fn pattern_constraint(&self) -> Option<String> {
        self.state
            .read()
            .constraints
            .iter()
            .rev()
            .find_map(|c| c.as_pattern().map(str::to_string))
    }
}

/// Fluent configuration for anything built on a [`BuilderCore`].
pub trait ParameterBuilder {
    fn core(&self) -> &BuilderCore;

    /// Use `converter`, replacing any previous one.
    fn converted_by<C: Converter + 'static>(&self, converter: C) -> &Self
    where
        Self: Sized,
    {
        self.core().set_converter(Arc::new(converter));
        self
    }

    /// Use a default-constructed converter of type `C`.
    fn converted_by_type<C: Converter + Default + 'static>(&self) -> &Self
    where
        Self: Sized,
    {
        self.converted_by(C::default())
    }

    fn converted_by_shared(&self, converter: Arc<dyn Converter>) -> &Self
    where
        Self: Sized,
    {
        self.core().set_converter(converter);
        self
    }

    /// Use `validator`, replacing any previous one.
    fn validated_by<V: Validator + 'static>(&self, validator: V) -> &Self
    where
        Self: Sized,
    {
        self.core().set_validator(Arc::new(validator));
        self
    }

    fn validated_by_type<V: Validator + Default + 'static>(&self) -> &Self
    where
        Self: Sized,
    {
        self.validated_by(V::default())
    }

    fn validated_by_shared(&self, validator: Arc<dyn Validator>) -> &Self
    where
        Self: Sized,
    {
        self.core().set_validator(validator);
        self
    }

    /// Add a constraint; constraints compose.
    fn constrained_by<C: Constraint + 'static>(&self, constraint: C) -> &Self
    where
        Self: Sized,
    {
        self.core().add_constraint(Arc::new(constraint));
        self
    }

    /// Add a transform; transforms run in the order added.
    fn transformed_by<T: Transform + 'static>(&self, transform: T) -> &Self
    where
        Self: Sized,
    {
        self.core().add_transform(Arc::new(transform));
        self
    }

    fn binds_to(&self, binding: Arc<dyn Binding>) -> &Self
    where
        Self: Sized,
    {
        self.core().add_binding(binding);
        self
    }

    /// Restrict matches to the regex `pattern`.
    fn matches(&self, pattern: &str) -> Result<&Self, RewriteError>
    where
        Self: Sized,
    {
        Ok(self.constrained_by(RegexConstraint::new(pattern)?))
    }

    fn convert(
        &self,
        event: &dyn Rewrite,
        context: &EvaluationContext,
        value: Value,
    ) -> Result<Value, ConversionError> {
        self.core().convert(event, context, value)
    }

    fn validate(&self, event: &dyn Rewrite, context: &EvaluationContext, value: &Value) -> bool {
        self.core().validate(event, context, value)
    }

    fn converter(&self) -> Option<Arc<dyn Converter>> {
        self.core().converter()
    }

    fn validator(&self) -> Option<Arc<dyn Validator>> {
        self.core().validator()
    }

    fn constraints(&self) -> Vec<Arc<dyn Constraint>> {
        self.core().constraints()
    }

    fn transforms(&self) -> Vec<Arc<dyn Transform>> {
        self.core().transforms()
    }
}
