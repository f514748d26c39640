//! Conditions: predicates over a rewrite event.
//!
//! A condition that matches may enqueue bind submissions on the evaluation
//! context. Nothing is bound until the rule owning the condition tree commits.

mod dispatch;
mod header;
mod method;
mod path;

pub use dispatch::{
    AttributeDispatcherTypeProvider, ContainerDispatcherTypeProvider, DispatchType,
    DispatcherTypeProvider, DispatcherTypeProviders,
};
pub use header::Header;
pub use method::Method;
pub use path::Path;

use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use crate::param::Parameter;
use std::fmt;
use std::sync::Arc;

/// A predicate evaluated against an event.
pub trait Condition: fmt::Debug + Send + Sync {
    /// Evaluate against `event`. Errors abort processing of the request.
    fn evaluate(
        &self,
        event: &dyn Rewrite,
        context: &mut EvaluationContext,
    ) -> Result<bool, RewriteError>;

    /// Parameters declared by this condition and its children.
    fn parameters(&self) -> Vec<Arc<Parameter>> {
        Vec::new()
    }

    /// Check configuration that depends on how parameters were configured,
    /// such as compiling patterns. Called when a rule is built.
    fn validate(&self) -> Result<(), RewriteError> {
        Ok(())
    }
}

/// True when every child is true. Stops at the first false child.
#[derive(Debug, Clone)]
pub struct And {
    conditions: Vec<Arc<dyn Condition>>,
}

impl And {
    pub fn all(conditions: Vec<Arc<dyn Condition>>) -> Self {
        Self { conditions }
    }
}

impl Condition for And {
    fn evaluate(
        &self,
        event: &dyn Rewrite,
        context: &mut EvaluationContext,
    ) -> Result<bool, RewriteError> {
        for condition in &self.conditions {
            if !condition.evaluate(event, context)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn parameters(&self) -> Vec<Arc<Parameter>> {
        self.conditions.iter().flat_map(|c| c.parameters()).collect()
    }

    fn validate(&self) -> Result<(), RewriteError> {
        self.conditions.iter().try_for_each(|c| c.validate())
    }
}

/// True when any child is true. Binds from children that evaluated false are
/// rolled back.
#[derive(Debug, Clone)]
pub struct Or {
    conditions: Vec<Arc<dyn Condition>>,
}

impl Or {
    pub fn any(conditions: Vec<Arc<dyn Condition>>) -> Self {
        Self { conditions }
    }
}

impl Condition for Or {
    fn evaluate(
        &self,
        event: &dyn Rewrite,
        context: &mut EvaluationContext,
    ) -> Result<bool, RewriteError> {
        for condition in &self.conditions {
            let checkpoint = context.checkpoint();
            if condition.evaluate(event, context)? {
                return Ok(true);
            }
            context.rollback(checkpoint);
        }
        Ok(false)
    }

    fn parameters(&self) -> Vec<Arc<Parameter>> {
        self.conditions.iter().flat_map(|c| c.parameters()).collect()
    }

    fn validate(&self) -> Result<(), RewriteError> {
        self.conditions.iter().try_for_each(|c| c.validate())
    }
}

/// Negates its child. The child's binds are always rolled back.
#[derive(Debug, Clone)]
pub struct Not {
    condition: Arc<dyn Condition>,
}

impl Not {
    pub fn any(condition: Arc<dyn Condition>) -> Self {
        Self { condition }
    }
}

impl Condition for Not {
    fn evaluate(
        &self,
        event: &dyn Rewrite,
        context: &mut EvaluationContext,
    ) -> Result<bool, RewriteError> {
        let checkpoint = context.checkpoint();
        let matched = self.condition.evaluate(event, context)?;
        context.rollback(checkpoint);
        Ok(!matched)
    }

    fn parameters(&self) -> Vec<Arc<Parameter>> {
        self.condition.parameters()
    }

    fn validate(&self) -> Result<(), RewriteError> {
        self.condition.validate()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Condition for Always {
    fn evaluate(&self, _event: &dyn Rewrite, _context: &mut EvaluationContext) -> Result<bool, RewriteError> {
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Condition for Never {
    fn evaluate(&self, _event: &dyn Rewrite, _context: &mut EvaluationContext) -> Result<bool, RewriteError> {
        Ok(false)
    }
}

/// Combinator shorthand for any condition.
pub trait ConditionExt: Condition + Sized + 'static {
    fn and<C: Condition + 'static>(self, other: C) -> And {
        And::all(vec![Arc::new(self), Arc::new(other)])
    }

    fn or<C: Condition + 'static>(self, other: C) -> Or {
        Or::any(vec![Arc::new(self), Arc::new(other)])
    }

    fn not(self) -> Not {
        Not::any(Arc::new(self))
    }
}

impl<T: Condition + 'static> ConditionExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::testing::MockBinding;
    use crate::event::{HttpRewrite, RequestInfo, ResponseInfo};
    use crate::param::ParameterBuilder;

    fn make_event(uri: &str) -> HttpRewrite {
        HttpRewrite::new(RequestInfo::new("GET", uri), ResponseInfo::new())
    }

    #[test]
    fn test_and_short_circuits() {
        let event = make_event("/a");
        let mut context = EvaluationContext::new();

        assert!(Always.and(Always).evaluate(&event, &mut context).unwrap());
        assert!(!Never.and(Always).evaluate(&event, &mut context).unwrap());
        assert!(!Always.and(Never).evaluate(&event, &mut context).unwrap());
    }

    #[test]
    fn test_or_rolls_back_failed_branch() {
        let event = make_event("/users/alice");
        let mut context = EvaluationContext::new();

        let failing = Path::matches("/users/{name}").unwrap().and(Never);
        let succeeding = Path::matches("/{section}/{id}").unwrap();

        let condition = failing.or(succeeding);
        assert!(condition.evaluate(&event, &mut context).unwrap());

        let values: Vec<_> = context.pending().iter().map(|p| p.value().clone()).collect();
        assert_eq!(values, vec!["users", "alice"]);
    }

    #[test]
    fn test_not_never_binds() {
        let event = make_event("/users/alice");
        let mut context = EvaluationContext::new();

        let negated = Path::matches("/users/{name}").unwrap().not();
        assert!(!negated.evaluate(&event, &mut context).unwrap());
        assert!(context.pending().is_empty());

        let negated = Path::matches("/other/{name}").unwrap().not();
        assert!(negated.evaluate(&event, &mut context).unwrap());
        assert!(context.pending().is_empty());
    }

    #[test]
    fn test_false_tree_touches_no_binding() {
        let event = make_event("/users/alice");
        let mut context = EvaluationContext::new();

        let path = Path::matches("/users/{name}").unwrap();
        let binding = Arc::new(MockBinding::default());
        path.parameter("name").unwrap().binds_to(binding.clone());

        assert!(!path.and(Never).evaluate(&event, &mut context).unwrap());
        assert!(!binding.is_converted());
        assert!(!binding.is_validated());
        assert!(!binding.is_submitted());
    }

    #[test]
    fn test_parameters_collected() {
        let condition = Path::matches("/{a}/{b}")
            .unwrap()
            .and(Header::matches("X-{c}", "{d}").unwrap().not());
        let names: Vec<_> = condition
            .parameters()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }
}
