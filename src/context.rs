//! Per-rule evaluation state and the deferred bind.
//!
//! Conditions never write matched values directly. They enqueue submissions on
//! the [`EvaluationContext`]; once the whole condition tree has matched, the
//! rule hands the queue to [`commit`], which converts and validates every value
//! before any of them is submitted.

use crate::bind::{HasBindings, Value};
use crate::error::RewriteError;
use crate::event::Rewrite;
use crate::operation::Operation;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One value waiting to be written to every binding of `source`.
#[derive(Debug, Clone)]
pub struct PendingBind {
    source: Arc<dyn HasBindings>,
    value: Value,
}

impl PendingBind {
    pub fn source(&self) -> &Arc<dyn HasBindings> {
        &self.source
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// State owned by one evaluation of one rule.
#[derive(Default)]
pub struct EvaluationContext {
    pending: Vec<PendingBind>,
    pre_operations: Vec<Arc<dyn Operation>>,
    post_operations: Vec<Arc<dyn Operation>>,
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("pending", &self.pending)
            .field("pre_operations", &self.pre_operations.len())
            .field("post_operations", &self.post_operations.len())
            .finish()
    }
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` for every binding of `source`.
    pub fn enqueue_submission(&mut self, source: Arc<dyn HasBindings>, value: Value) {
        self.pending.push(PendingBind { source, value });
    }

    pub fn pending(&self) -> &[PendingBind] {
        &self.pending
    }

    /// Position to roll back to if a branch fails.
    pub fn checkpoint(&self) -> usize {
        self.pending.len()
    }

    /// Drop everything queued since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: usize) {
        self.pending.truncate(checkpoint);
    }

    pub fn take_pending(&mut self) -> Vec<PendingBind> {
        std::mem::take(&mut self.pending)
    }

    /// Run `operation` before the rule's own operation.
    pub fn add_pre_operation(&mut self, operation: Arc<dyn Operation>) {
        self.pre_operations.push(operation);
    }

    /// Run `operation` after the rule's own operation.
    pub fn add_post_operation(&mut self, operation: Arc<dyn Operation>) {
        self.post_operations.push(operation);
    }

    pub fn pre_operations(&self) -> &[Arc<dyn Operation>] {
        &self.pre_operations
    }

    pub fn post_operations(&self) -> &[Arc<dyn Operation>] {
        &self.post_operations
    }
}

/// Convert, validate and then submit every pending bind.
///
/// Returns `Ok(false)` without submitting anything if any binding rejects its
/// value, either by failing conversion or validation. Returns `Ok(true)` once
/// every value has been submitted.
pub fn commit(
    event: &mut dyn Rewrite,
    context: &EvaluationContext,
    pending: Vec<PendingBind>,
) -> Result<bool, RewriteError> {
    let mut accepted = Vec::new();

    for bind in &pending {
        for binding in bind.source.bindings() {
            let value = match binding.convert(&*event, context, bind.value.clone()) {
                Ok(value) => value,
                Err(e) => {
                    debug!(source = ?bind.source, error = %e, "Conversion failed, skipping bind");
                    return Ok(false);
                }
            };

            if !binding.validate(&*event, context, &value) {
                debug!(source = ?bind.source, value = %value, "Validation failed, skipping bind");
                return Ok(false);
            }
            accepted.push((binding, value));
        }
    }

    for (binding, value) in accepted {
        binding.submit(event, context, value)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::testing::MockBinding;
    use crate::bind::{IntegerConverter, IntegerValidator};
    use crate::event::{HttpRewrite, RequestInfo, ResponseInfo};
    use crate::param::{Parameter, ParameterBuilder};

    fn make_event() -> HttpRewrite {
        HttpRewrite::new(RequestInfo::new("GET", "/"), ResponseInfo::new())
    }

    #[test]
    fn test_commit_converts_validates_and_submits() {
        let mut event = make_event();
        let mut context = EvaluationContext::new();
        let parameter = Arc::new(Parameter::new("id"));
        let binding = Arc::new(MockBinding::default());
        parameter.binds_to(binding.clone());

        context.enqueue_submission(parameter, Value::from("path"));
        assert!(!binding.is_converted());

        let pending = context.take_pending();
        assert!(commit(&mut event, &context, pending).unwrap());

        assert!(binding.is_converted());
        assert!(binding.is_validated());
        assert!(binding.is_submitted());
        assert_eq!(binding.bound_value(), Some(Value::from("path")));
        assert_eq!(event.attributes().get("id"), Some(&Value::from("path")));
    }

    #[test]
    fn test_failed_validation_submits_nothing() {
        let mut event = make_event();
        let mut context = EvaluationContext::new();

        let good = Arc::new(Parameter::new("name"));
        let good_binding = Arc::new(MockBinding::default());
        good.binds_to(good_binding.clone());

        let bad = Arc::new(Parameter::new("id"));
        bad.validated_by(IntegerValidator);

        context.enqueue_submission(good, Value::from("alice"));
        context.enqueue_submission(bad, Value::from("abc"));

        let pending = context.take_pending();
        assert!(!commit(&mut event, &context, pending).unwrap());
        assert!(good_binding.is_validated());
        assert!(!good_binding.is_submitted());
        assert!(event.attributes().is_empty());
    }

    #[test]
    fn test_conversion_error_is_rejection() {
        let mut event = make_event();
        let mut context = EvaluationContext::new();
        let parameter = Arc::new(Parameter::new("id"));
        parameter.converted_by(IntegerConverter);

        context.enqueue_submission(parameter.clone(), Value::from("x"));
        let pending = context.take_pending();
        assert!(!commit(&mut event, &context, pending).unwrap());

        context.enqueue_submission(parameter, Value::from("12"));
        let pending = context.take_pending();
        assert!(commit(&mut event, &context, pending).unwrap());
        assert_eq!(event.attributes().get("id"), Some(&Value::from(12)));
    }

    #[test]
    fn test_checkpoint_and_rollback() {
        let mut context = EvaluationContext::new();
        context.enqueue_submission(Arc::new(Parameter::new("a")), Value::from("1"));

        let checkpoint = context.checkpoint();
        context.enqueue_submission(Arc::new(Parameter::new("b")), Value::from("2"));
        assert_eq!(context.pending().len(), 2);

        context.rollback(checkpoint);
        assert_eq!(context.pending().len(), 1);
        assert_eq!(context.pending()[0].value(), &Value::from("1"));
    }
}
