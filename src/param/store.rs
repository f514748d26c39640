use super::{
    BuilderCore, Constrainable, Constraint, DelegateTarget, ParameterBuilder, Transform,
    Transformable,
};
use crate::bind::{Bindable, Binding, Evaluation, HasBindings};
use crate::error::RewriteError;
use std::sync::Arc;

/// A named placeholder declared by a pattern.
///
/// A new parameter is already bound to the evaluation attribute of the same
/// name, so its value is visible to later conditions and operations.
#[derive(Debug)]
pub struct Parameter {
    name: String,
    core: BuilderCore,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let core = BuilderCore::new();
        core.add_binding(Arc::new(Evaluation::property(name.clone())));
        Self { name, core }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ParameterBuilder for Parameter {
    fn core(&self) -> &BuilderCore {
        &self.core
    }
}

impl Constrainable for Parameter {
    fn add_constraint(&self, constraint: Arc<dyn Constraint>) {
        self.core.add_constraint(constraint);
    }
}

impl Transformable for Parameter {
    fn add_transform(&self, transform: Arc<dyn Transform>) {
        self.core.add_transform(transform);
    }
}

impl Bindable for Parameter {
    fn add_binding(&self, binding: Arc<dyn Binding>) {
        self.core.add_binding(binding);
    }
}

impl HasBindings for Parameter {
    fn bindings(&self) -> Vec<Arc<dyn Binding>> {
        self.core.bindings()
    }
}

impl DelegateTarget for Parameter {
    fn as_constrainable(&self) -> Option<&dyn Constrainable> {
        Some(self)
    }

    fn as_transformable(&self) -> Option<&dyn Transformable> {
        Some(self)
    }

    fn as_bindable(&self) -> Option<&dyn Bindable> {
        Some(self)
    }

    fn as_binding_source(&self) -> Option<&dyn HasBindings> {
        Some(self)
    }
}

/// Name-keyed parameters declared by one pattern.
///
/// Registering a name twice keeps the first parameter, so every occurrence of
/// a name shares the same configuration. Iteration follows first-reference
/// order.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    source: String,
    parameters: Vec<Arc<Parameter>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store for the parameters of `pattern`, named in lookup errors.
    pub fn for_pattern(pattern: &str) -> Self {
        Self {
            source: pattern.to_string(),
            ..Self::default()
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Register `name`, returning the parameter now held under it.
    pub fn register(&mut self, name: &str) -> Arc<Parameter> {
        if let Some(existing) = self.parameters.iter().find(|p| p.name() == name) {
            return existing.clone();
        }
        let parameter = Arc::new(Parameter::new(name));
        self.parameters.push(parameter.clone());
        parameter
    }

    /// Look up a parameter. Unknown names are an error.
    pub fn get(&self, name: &str) -> Result<&Arc<Parameter>, RewriteError> {
        self.parameters
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| RewriteError::UnknownParameter {
                name: name.to_string(),
                pattern: self.source.clone(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}
