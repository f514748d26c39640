//! Rules and the rule-processing loop.

use crate::condition::{And, Condition};
use crate::context::{commit, EvaluationContext};
use crate::error::RewriteError;
use crate::event::Rewrite;
use crate::operation::{Operation, Operations};
use crate::param::{BuilderCore, DelegateTarget, ParameterBuilder, RegexConstraint};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// A rule-level parameter.
///
/// Configuration applied here reaches every parameter of the same name in
/// the rule's conditions.
#[derive(Debug)]
pub struct RuleParameter {
    name: String,
    core: BuilderCore,
    conditions: Vec<Arc<dyn Condition>>,
}

impl RuleParameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-check the conditions declaring this parameter against its current
    /// configuration.
    pub fn check(&self) -> Result<(), RewriteError> {
        self.conditions.iter().try_for_each(|c| c.validate())
    }
}

impl ParameterBuilder for RuleParameter {
    fn core(&self) -> &BuilderCore {
        &self.core
    }

    /// Restrict matches to the regex `pattern`, failing if a declaring
    /// condition can no longer compile with it.
    fn matches(&self, pattern: &str) -> Result<&Self, RewriteError> {
        self.constrained_by(RegexConstraint::new(pattern)?);
        self.check()?;
        Ok(self)
    }
}

/// A condition paired with the operation it triggers.
#[derive(Debug)]
pub struct Rule {
    id: String,
    priority: i32,
    condition: Arc<dyn Condition>,
    operation: Operations,
    pre_operations: Vec<Arc<dyn Operation>>,
    post_operations: Vec<Arc<dyn Operation>>,
    parameters: Vec<Arc<RuleParameter>>,
}

impl Rule {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn condition(&self) -> &Arc<dyn Condition> {
        &self.condition
    }

    pub fn operation(&self) -> &Operations {
        &self.operation
    }

    pub fn parameters(&self) -> &[Arc<RuleParameter>] {
        &self.parameters
    }

    /// Evaluate this rule and, if it matches, bind its values and perform its
    /// operations.
    ///
    /// Returns `Ok(false)` if the condition is false or a bound value is
    /// rejected; in both cases nothing is bound and nothing is performed.
    pub fn apply(&self, event: &mut dyn Rewrite) -> Result<bool, RewriteError> {
        let mut context = EvaluationContext::new();
        for operation in &self.pre_operations {
            context.add_pre_operation(operation.clone());
        }
        for operation in &self.post_operations {
            context.add_post_operation(operation.clone());
        }

        if !self.condition.evaluate(&*event, &mut context)? {
            trace!(rule = %self.id, "Rule did not match");
            return Ok(false);
        }

        let pending = context.take_pending();
        if !commit(event, &context, pending)? {
            debug!(rule = %self.id, "Rule matched but a bound value was rejected");
            return Ok(false);
        }

        for operation in context.pre_operations() {
            operation.perform(event, &context)?;
        }
        self.operation.perform(event, &context)?;
        for operation in context.post_operations() {
            operation.perform(event, &context)?;
        }

        debug!(rule = %self.id, state = %event.state(), "Rule applied");
        Ok(true)
    }
}

/// Builds a [`Rule`].
///
/// Add every condition with [`when`](Self::when) before configuring rule
/// parameters with [`where_param`](Self::where_param).
#[derive(Debug)]
pub struct RuleBuilder {
    id: String,
    priority: i32,
    conditions: Vec<Arc<dyn Condition>>,
    operation: Operations,
    pre_operations: Vec<Arc<dyn Operation>>,
    post_operations: Vec<Arc<dyn Operation>>,
    parameters: Vec<Arc<RuleParameter>>,
}

impl RuleBuilder {
    pub fn define(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            conditions: Vec::new(),
            operation: Operations::new(),
            pre_operations: Vec::new(),
            post_operations: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Add a condition; all conditions must match.
    pub fn when<C: Condition + 'static>(mut self, condition: C) -> Self {
        self.conditions.push(Arc::new(condition));
        self
    }

    pub fn when_shared(mut self, condition: Arc<dyn Condition>) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add an operation; operations run in the order added.
    pub fn perform<O: Operation + 'static>(mut self, operation: O) -> Self {
        self.operation.push(Arc::new(operation));
        self
    }

    pub fn perform_shared(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operation.push(operation);
        self
    }

    /// Run `operation` before the rule's operations.
    pub fn before<O: Operation + 'static>(mut self, operation: O) -> Self {
        self.pre_operations.push(Arc::new(operation));
        self
    }

    /// Run `operation` after the rule's operations.
    pub fn after<O: Operation + 'static>(mut self, operation: O) -> Self {
        self.post_operations.push(Arc::new(operation));
        self
    }

    /// Rules with a higher priority are evaluated first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The rule parameter `name`, delegating to every parameter of that name
    /// declared by the conditions added so far.
    pub fn where_param(&mut self, name: &str) -> Result<Arc<RuleParameter>, RewriteError> {
        if let Some(existing) = self.parameters.iter().find(|p| p.name == name) {
            return Ok(existing.clone());
        }

        let mut delegates: Vec<Arc<dyn DelegateTarget>> = Vec::new();
        let mut conditions = Vec::new();
        for condition in &self.conditions {
            let declared: Vec<_> = condition
                .parameters()
                .into_iter()
                .filter(|p| p.name() == name)
                .collect();
            if !declared.is_empty() {
                conditions.push(condition.clone());
            }
            delegates.extend(declared.into_iter().map(|p| p as Arc<dyn DelegateTarget>));
        }

        if delegates.is_empty() {
            return Err(RewriteError::UnknownRuleParameter {
                rule: self.id.clone(),
                name: name.to_string(),
            });
        }

        let parameter = Arc::new(RuleParameter {
            name: name.to_string(),
            core: BuilderCore::with_delegates(delegates),
            conditions,
        });
        self.parameters.push(parameter.clone());
        Ok(parameter)
    }

    /// Finish the rule. Fails if an operation references a `#{name}` no
    /// condition declares, or if a condition's pattern cannot be compiled
    /// with its configured constraints.
    pub fn build(self) -> Result<Rule, RewriteError> {
        for condition in &self.conditions {
            condition.validate()?;
        }

        let declared: HashSet<String> = self
            .conditions
            .iter()
            .flat_map(|c| c.parameters())
            .map(|p| p.name().to_string())
            .collect();

        let referenced = self
            .pre_operations
            .iter()
            .chain(self.post_operations.iter())
            .flat_map(|o| o.declared_names())
            .chain(self.operation.declared_names());

        for name in referenced {
            if !declared.contains(&name) {
                return Err(RewriteError::UndeclaredParameter {
                    rule: self.id,
                    name,
                });
            }
        }

        let condition: Arc<dyn Condition> = match self.conditions.len() {
            1 => self.conditions[0].clone(),
            _ => Arc::new(And::all(self.conditions)),
        };

        Ok(Rule {
            id: self.id,
            priority: self.priority,
            condition,
            operation: self.operation,
            pre_operations: self.pre_operations,
            post_operations: self.post_operations,
            parameters: self.parameters,
        })
    }
}

/// An ordered set of rules.
#[derive(Debug, Default)]
pub struct Configuration {
    rules: Vec<Arc<Rule>>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, keeping rules ordered by descending priority. Rules of
    /// equal priority keep the order they were added in.
    pub fn add_rule(&mut self, rule: Rule) {
        let index = self
            .rules
            .iter()
            .position(|r| r.priority() < rule.priority())
            .unwrap_or(self.rules.len());
        self.rules.insert(index, Arc::new(rule));
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply rules in order until one leaves the event in a terminal state.
    ///
    /// Returns the ids of the rules that were applied.
    pub fn process(&self, event: &mut dyn Rewrite) -> Result<Vec<String>, RewriteError> {
        let mut applied = Vec::new();

        for rule in &self.rules {
            if event.state().is_terminal() {
                break;
            }
            if rule.apply(event)? {
                applied.push(rule.id().to_string());
            }
        }

        debug!(
            rules = self.rules.len(),
            applied = applied.len(),
            state = %event.state(),
            "Rule processing complete"
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::testing::MockBinding;
    use crate::bind::{IntegerConverter, IntegerValidator, Value};
    use crate::condition::{ConditionExt, Never, Path};
    use crate::event::{HttpRewrite, RequestInfo, ResponseInfo, RewriteState};
    use crate::operation::{Forward, Lifecycle, Response};
    use crate::param::LowercaseTransform;

    fn make_event(uri: &str) -> HttpRewrite {
        HttpRewrite::new(RequestInfo::new("GET", uri), ResponseInfo::new())
    }

    #[test]
    fn test_rule_applies() {
        let rule = RuleBuilder::define("blog")
            .when(Path::matches("/blog/{year}/{slug}").unwrap())
            .perform(Forward::to("/posts?year={year}&slug={slug}").unwrap())
            .build()
            .unwrap();

        let mut event = make_event("/blog/2024/hello-world");
        assert!(rule.apply(&mut event).unwrap());
        assert_eq!(
            event.state(),
            &RewriteState::Forwarded("/posts?year=2024&slug=hello-world".to_string())
        );
    }

    #[test]
    fn test_rule_parameter_delegates() {
        let mut builder = RuleBuilder::define("items")
            .when(Path::matches("/items/{id}").unwrap())
            .perform(Response::add_header("X-Id", "#{id}").unwrap());

        let binding = Arc::new(MockBinding::default());
        builder
            .where_param("id")
            .unwrap()
            .matches("\\d+")
            .unwrap()
            .converted_by(IntegerConverter)
            .binds_to(binding.clone());
        let rule = builder.build().unwrap();

        let mut event = make_event("/items/abc");
        assert!(!rule.apply(&mut event).unwrap());
        assert!(!binding.is_converted());

        let mut event = make_event("/items/42");
        assert!(rule.apply(&mut event).unwrap());
        assert_eq!(binding.bound_value(), Some(Value::from(42)));
        assert_eq!(event.response().header("X-Id"), Some("42"));
    }

    #[test]
    fn test_where_param_unknown() {
        let mut builder = RuleBuilder::define("r").when(Path::matches("/{a}").unwrap());
        let err = builder.where_param("b").unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(
            err,
            RewriteError::UnknownRuleParameter { ref rule, ref name } if rule == "r" && name == "b"
        ));
        assert_eq!(
            err.to_string(),
            "Parameter [b] is not declared by any condition of rule [r]"
        );
    }

    #[test]
    fn test_where_param_rejects_uncombinable_regex() {
        let mut builder = RuleBuilder::define("twice").when(Path::matches("/{x}/{x}").unwrap());
        let err = builder
            .where_param("x")
            .unwrap()
            .matches("(?P<n>\\d+)")
            .unwrap_err();
        assert!(matches!(err, RewriteError::InvalidRegex(_)));
        assert!(builder.build().unwrap_err().is_configuration());
    }

    #[test]
    fn test_forward_keeps_multi_segment_value() {
        let mut builder = RuleBuilder::define("files")
            .when(Path::matches("/files/{path}").unwrap())
            .perform(Forward::to("/static/{path}").unwrap());
        builder.where_param("path").unwrap().matches(".*").unwrap();
        let rule = builder.build().unwrap();

        let mut event = make_event("/files/a/b/c.txt");
        assert!(rule.apply(&mut event).unwrap());
        assert_eq!(
            event.state(),
            &RewriteState::Forwarded("/static/a/b/c.txt".to_string())
        );
    }

    #[test]
    fn test_build_compiles_condition_patterns() {
        let path = Path::matches("/{x}/{x}").unwrap();
        path.parameter("x")
            .unwrap()
            .constrained_by(RegexConstraint::new("(?P<n>\\d+)").unwrap());

        let err = RuleBuilder::define("twice")
            .when(Never.or(path))
            .perform(Lifecycle::proceed())
            .build()
            .unwrap_err();
        assert!(matches!(err, RewriteError::InvalidRegex(_)));
    }

    #[test]
    fn test_where_param_reused() {
        let mut builder = RuleBuilder::define("r").when(Path::matches("/{a}").unwrap());
        let first = builder.where_param("a").unwrap();
        let second = builder.where_param("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_undeclared_template_reference() {
        let err = RuleBuilder::define("r")
            .when(Path::matches("/{a}").unwrap())
            .perform(Forward::to("/x/#{b}").unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RewriteError::UndeclaredParameter { ref rule, ref name } if rule == "r" && name == "b"
        ));
    }

    #[test]
    fn test_failed_validation_skips_operations() {
        let mut builder = RuleBuilder::define("validated")
            .when(Path::matches("/users/{id}").unwrap())
            .before(Response::set_code(201))
            .perform(Lifecycle::handled());
        builder
            .where_param("id")
            .unwrap()
            .validated_by(IntegerValidator);
        let rule = builder.build().unwrap();

        let mut event = make_event("/users/bob");
        assert!(!rule.apply(&mut event).unwrap());
        assert_eq!(event.state(), &RewriteState::Active);
        assert_eq!(event.response().status(), 200);
        assert!(event.attributes().is_empty());
    }

    #[test]
    fn test_pre_and_post_operations_order() {
        let rule = RuleBuilder::define("ordered")
            .when(Path::matches("/{page}").unwrap())
            .before(Response::add_header("X-Step", "before").unwrap())
            .perform(Response::add_header("X-Step", "main").unwrap())
            .after(Response::add_header("X-Step", "{page}").unwrap())
            .build()
            .unwrap();

        let mut event = make_event("/home");
        assert!(rule.apply(&mut event).unwrap());
        let steps: Vec<_> = event.response().header_values("X-Step").collect();
        assert_eq!(steps, vec!["before", "main", "home"]);
    }

    #[test]
    fn test_configuration_priority_and_termination() {
        let low = RuleBuilder::define("low")
            .priority(1)
            .when(Path::matches("/{any}").unwrap())
            .perform(Lifecycle::handled())
            .build()
            .unwrap();
        let high = RuleBuilder::define("high")
            .priority(10)
            .when(Path::matches("/{any}").unwrap())
            .perform(Response::add_header("X-High", "yes").unwrap())
            .perform(Lifecycle::proceed())
            .build()
            .unwrap();
        let last = RuleBuilder::define("last")
            .when(Path::matches("/{any}").unwrap())
            .perform(Response::add_header("X-Last", "yes").unwrap())
            .build()
            .unwrap();

        let config = Configuration::new()
            .with_rule(low)
            .with_rule(last)
            .with_rule(high);
        let ids: Vec<_> = config.rules().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["high", "low", "last"]);

        let mut event = make_event("/page");
        let applied = config.process(&mut event).unwrap();
        assert_eq!(applied, vec!["high", "low"]);
        assert_eq!(event.state(), &RewriteState::Handled);
        assert_eq!(event.response().header("X-High"), Some("yes"));
        assert_eq!(event.response().header("X-Last"), None);
    }

    #[test]
    fn test_transform_through_rule_parameter() {
        let mut builder = RuleBuilder::define("lower")
            .when(Path::matches("/tags/{tag}").unwrap())
            .perform(Forward::to("/t/{tag}").unwrap());
        builder
            .where_param("tag")
            .unwrap()
            .transformed_by(LowercaseTransform);
        let rule = builder.build().unwrap();

        let mut event = make_event("/tags/RUST");
        assert!(rule.apply(&mut event).unwrap());
        assert_eq!(event.state(), &RewriteState::Forwarded("/t/rust".to_string()));
    }

    #[test]
    fn test_false_condition_binds_nothing() {
        let path = Path::matches("/x/{v}").unwrap();
        let binding = Arc::new(MockBinding::default());
        path.parameter("v").unwrap().binds_to(binding.clone());

        let rule = RuleBuilder::define("never")
            .when(path)
            .when(Never)
            .perform(Lifecycle::handled())
            .build()
            .unwrap();

        let mut event = make_event("/x/1");
        assert!(!rule.apply(&mut event).unwrap());
        assert!(!binding.is_converted());
        assert!(!binding.is_submitted());
    }
}
