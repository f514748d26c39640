//! Operations: what a rule does once its condition has matched and its
//! values have been bound.

mod lifecycle;
mod response;

pub use lifecycle::{Forward, Include, Lifecycle, Redirect};
pub use response::{ReplaceInterceptor, Response};

use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use std::fmt;
use std::sync::Arc;

/// An action performed on a matched event.
pub trait Operation: fmt::Debug + Send + Sync {
    fn perform(&self, event: &mut dyn Rewrite, context: &EvaluationContext)
        -> Result<(), RewriteError>;

    /// Names this operation references as `#{name}`. Each must be declared by
    /// a condition of the rule it belongs to.
    fn declared_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A stage of the response output pipeline.
pub trait ResponseInterceptor: fmt::Debug + Send + Sync {
    fn intercept(&self, body: String) -> String;
}

/// Operations performed in order. Stops at the first error.
#[derive(Debug, Clone, Default)]
pub struct Operations {
    operations: Vec<Arc<dyn Operation>>,
}

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `operation`.
    pub fn and<O: Operation + 'static>(mut self, operation: O) -> Self {
        self.operations.push(Arc::new(operation));
        self
    }

    pub fn push(&mut self, operation: Arc<dyn Operation>) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Operation for Operations {
    fn perform(
        &self,
        event: &mut dyn Rewrite,
        context: &EvaluationContext,
    ) -> Result<(), RewriteError> {
        for operation in &self.operations {
            operation.perform(event, context)?;
        }
        Ok(())
    }

    fn declared_names(&self) -> Vec<String> {
        self.operations
            .iter()
            .flat_map(|o| o.declared_names())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HttpRewrite, RequestInfo, ResponseInfo, RewriteState};

    #[test]
    fn test_operations_run_in_order() {
        let mut event = HttpRewrite::new(RequestInfo::new("GET", "/"), ResponseInfo::new());
        let context = EvaluationContext::new();

        let operations = Operations::new()
            .and(Response::set_code(404))
            .and(Response::add_header("X-Test", "one").unwrap())
            .and(Lifecycle::handled());
        assert_eq!(operations.len(), 3);

        operations.perform(&mut event, &context).unwrap();
        assert_eq!(event.response().status(), 404);
        assert_eq!(event.response().header("x-test"), Some("one"));
        assert_eq!(event.state(), &RewriteState::Handled);
    }

    #[test]
    fn test_operations_stop_at_error() {
        let mut event = HttpRewrite::new(RequestInfo::new("GET", "/"), ResponseInfo::new());
        let context = EvaluationContext::new();

        let operations = Operations::new()
            .and(Lifecycle::abort())
            .and(Response::set_code(500))
            .and(Lifecycle::handled());

        let err = operations.perform(&mut event, &context).unwrap_err();
        assert!(matches!(err, RewriteError::EventTerminated(_)));
        assert_eq!(event.state(), &RewriteState::Aborted);
        assert_eq!(event.response().status(), 500);
    }

    #[test]
    fn test_declared_names_collected() {
        let operations = Operations::new()
            .and(Forward::to("/#{a}/{b}").unwrap())
            .and(Response::add_header("X-Id", "#{id}").unwrap());
        assert_eq!(operations.declared_names(), vec!["a", "id"]);
    }
}
