use super::Condition;
use crate::bind::Value;
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use crate::param::{Parameter, ParameterStore, ParameterizedPattern};
use std::sync::Arc;
use tracing::trace;

/// Matches the request path, relative to the context path.
///
/// Events that are not HTTP never match.
#[derive(Debug)]
pub struct Path {
    pattern: ParameterizedPattern,
}

impl Path {
    /// Condition for `pattern`; each `{name}` captures one path segment
    /// unless the parameter is given a regex.
    pub fn matches(pattern: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            pattern: ParameterizedPattern::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.pattern()
    }

    pub fn parameter_store(&self) -> &ParameterStore {
        self.pattern.parameter_store()
    }

    /// Parameter `name` of this pattern, for configuration.
    pub fn parameter(&self, name: &str) -> Result<&Arc<Parameter>, RewriteError> {
        self.pattern.parameter_store().get(name)
    }
}

impl Condition for Path {
    fn evaluate(
        &self,
        event: &dyn Rewrite,
        context: &mut EvaluationContext,
    ) -> Result<bool, RewriteError> {
        let Some(http) = event.as_http() else {
            return Ok(false);
        };
        let path = http.request().application_path();

        match self.pattern.parse(event, context, path)? {
            Some(values) => {
                trace!(pattern = %self.pattern(), path = %path, "Path matched");
                for (parameter, value) in values {
                    context.enqueue_submission(parameter, Value::String(value));
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn parameters(&self) -> Vec<Arc<Parameter>> {
        self.parameter_store().iter().cloned().collect()
    }

    fn validate(&self) -> Result<(), RewriteError> {
        self.pattern.compile()
    }
}
