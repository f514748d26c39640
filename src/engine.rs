//! Rewrite engine: compiles a [`RewriteConfig`] into rules and applies them to
//! requests.

use crate::bind::{
    BooleanConverter, Converter, DecimalConverter, Evaluation, IntegerConverter, IntegerValidator,
    NotEmptyValidator, RegexValidator, Validator,
};
use crate::condition::{DispatchType, Header, Method, Path};
use crate::config::{ParameterConfig, RewriteConfig, RuleConfig, ValidatorConfig};
use crate::error::RewriteError;
use crate::event::{HttpRewrite, RequestInfo, ResponseInfo, Rewrite};
use crate::operation::{Forward, Include, Lifecycle, Redirect, Response};
use crate::param::{
    LowercaseTransform, ParameterBuilder, Transform, UppercaseTransform, UrlDecodeTransform,
    UrlEncodeTransform,
};
use crate::rule::{Configuration, Rule, RuleBuilder, RuleParameter};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Response header naming the applied rules when debug headers are enabled.
pub const DEBUG_RULE_HEADER: &str = "X-Rewrite-Rule";

/// Rewrite engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rule [{rule}]: {source}")]
    Rule {
        rule: String,
        #[source]
        source: RewriteError,
    },

    #[error("Rule [{rule}]: unknown {kind} [{name}]")]
    UnknownBuiltin {
        rule: String,
        kind: &'static str,
        name: String,
    },

    #[error("Rule [{rule}]: {reason}")]
    InvalidRule { rule: String, reason: String },
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngineStats {
    pub requests_total: u64,
    pub requests_rewritten: u64,
    pub rewrite_errors: u64,
}

/// Applies compiled rules to inbound requests.
#[derive(Debug)]
pub struct RewriteEngine {
    /// Configuration
    config: RewriteConfig,
    /// Compiled rules
    rules: Configuration,
    /// Metrics: total requests processed.
    requests_total: AtomicU64,
    /// Metrics: requests at least one rule was applied to.
    requests_rewritten: AtomicU64,
    /// Metrics: requests that failed with an error.
    rewrite_errors: AtomicU64,
}

impl RewriteEngine {
    /// Create a new engine from configuration.
    pub fn new(config: RewriteConfig) -> Result<Self, EngineError> {
        let mut rules = Configuration::new();
        for rule in &config.rules {
            if !rule.enabled {
                debug!(rule = %rule.id, "Skipping disabled rule");
                continue;
            }
            rules.add_rule(compile_rule(rule)?);
        }

        info!(
            rules = rules.len(),
            context_path = %config.settings.context_path,
            debug_headers = config.settings.debug_headers,
            "Rewrite engine initialized"
        );

        Ok(Self {
            config,
            rules,
            requests_total: AtomicU64::new(0),
            requests_rewritten: AtomicU64::new(0),
            rewrite_errors: AtomicU64::new(0),
        })
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, EngineError> {
        let config: RewriteConfig = serde_yaml::from_str(yaml)?;
        Self::new(config)
    }

    /// Create from a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: RewriteConfig = serde_json::from_str(json)?;
        Self::new(config)
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    pub fn rules(&self) -> &Configuration {
        &self.rules
    }

    /// Run `request` through the rules and return the resulting event.
    pub fn handle(&self, mut request: RequestInfo) -> Result<HttpRewrite, RewriteError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if request.context_path.is_empty() {
            request.context_path = self.config.settings.context_path.clone();
        }
        let mut event = HttpRewrite::new(request, ResponseInfo::new());

        let applied = match self.rules.process(&mut event) {
            Ok(applied) => applied,
            Err(e) => {
                self.rewrite_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    uri = %event.request().request_uri,
                    error = %e,
                    "Rule processing failed"
                );
                return Err(e);
            }
        };

        if !applied.is_empty() {
            self.requests_rewritten.fetch_add(1, Ordering::Relaxed);
            if self.config.settings.debug_headers {
                event
                    .response_mut()
                    .set_header(DEBUG_RULE_HEADER, applied.join(","));
            }
        }

        debug!(
            uri = %event.request().request_uri,
            rules = ?applied,
            state = %event.state(),
            "Request processed"
        );
        Ok(event)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_rewritten: self.requests_rewritten.load(Ordering::Relaxed),
            rewrite_errors: self.rewrite_errors.load(Ordering::Relaxed),
        }
    }
}

fn rule_error(rule: &RuleConfig) -> impl Fn(RewriteError) -> EngineError + '_ {
    move |source| EngineError::Rule {
        rule: rule.id.clone(),
        source,
    }
}

fn unknown(rule: &RuleConfig, kind: &'static str, name: &str) -> EngineError {
    EngineError::UnknownBuiltin {
        rule: rule.id.clone(),
        kind,
        name: name.to_string(),
    }
}

fn converter_by_name(rule: &RuleConfig, name: &str) -> Result<Arc<dyn Converter>, EngineError> {
    match name {
        "integer" => Ok(Arc::new(IntegerConverter)),
        "decimal" => Ok(Arc::new(DecimalConverter)),
        "boolean" => Ok(Arc::new(BooleanConverter)),
        other => Err(unknown(rule, "converter", other)),
    }
}

fn validator_from(
    rule: &RuleConfig,
    config: &ValidatorConfig,
) -> Result<Arc<dyn Validator>, EngineError> {
    match config {
        ValidatorConfig::Named(name) => match name.as_str() {
            "not_empty" => Ok(Arc::new(NotEmptyValidator)),
            "integer" => Ok(Arc::new(IntegerValidator)),
            other => Err(unknown(rule, "validator", other)),
        },
        ValidatorConfig::Regex { regex } => Ok(Arc::new(
            RegexValidator::new(regex).map_err(rule_error(rule))?,
        )),
    }
}

fn transform_by_name(rule: &RuleConfig, name: &str) -> Result<Arc<dyn Transform>, EngineError> {
    match name {
        "lowercase" => Ok(Arc::new(LowercaseTransform)),
        "uppercase" => Ok(Arc::new(UppercaseTransform)),
        "url_decode" => Ok(Arc::new(UrlDecodeTransform)),
        "url_encode" => Ok(Arc::new(UrlEncodeTransform)),
        other => Err(unknown(rule, "transform", other)),
    }
}

fn configure_parameter(
    rule: &RuleConfig,
    parameter: &RuleParameter,
    config: &ParameterConfig,
) -> Result<(), EngineError> {
    for name in &config.transforms {
        parameter.core().add_transform(transform_by_name(rule, name)?);
    }
    if let Some(pattern) = &config.matches {
        parameter.matches(pattern).map_err(rule_error(rule))?;
    }
    if let Some(name) = &config.converter {
        parameter.converted_by_shared(converter_by_name(rule, name)?);
    }
    if let Some(validator) = &config.validator {
        parameter.validated_by_shared(validator_from(rule, validator)?);
    }
    for property in &config.bind_to {
        parameter.binds_to(Arc::new(Evaluation::property(property.clone())));
    }
    Ok(())
}

/// Compile one configured rule.
fn compile_rule(config: &RuleConfig) -> Result<Rule, EngineError> {
    let on_err = rule_error(config);
    let mut builder = RuleBuilder::define(config.id.clone()).priority(config.priority);

    if let Some(path) = &config.matcher.path {
        builder = builder.when(Path::matches(path).map_err(&on_err)?);
    }
    if let Some(methods) = &config.matcher.methods {
        builder = builder.when(Method::any_of(methods));
    }
    for header in config.matcher.headers.iter().flatten() {
        let condition = match &header.value {
            Some(value) => Header::matches(&header.name, value),
            None => Header::exists(&header.name),
        }
        .map_err(&on_err)?;
        builder = builder.when(condition);
    }
    if let Some(dispatch) = config.matcher.dispatch {
        builder = builder.when(DispatchType::is(dispatch));
    }

    for (name, parameter) in &config.parameters {
        let target = builder.where_param(name).map_err(&on_err)?;
        configure_parameter(config, &target, parameter)?;
    }

    let perform = &config.perform;
    let terminal = [
        perform.forward.is_some(),
        perform.include.is_some(),
        perform.redirect.is_some(),
        perform.abort,
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if terminal > 1 {
        return Err(EngineError::InvalidRule {
            rule: config.id.clone(),
            reason: "at most one of forward, include, redirect and abort may be set".to_string(),
        });
    }

    for header in &perform.headers {
        let operation =
            Response::add_header(header.name.clone(), &header.value).map_err(&on_err)?;
        builder = builder.perform(operation);
    }
    if let Some(status) = perform.status {
        builder = builder.perform(Response::set_code(status));
    }
    if perform.proceed {
        builder = builder.perform(Lifecycle::proceed());
    }
    if let Some(target) = &perform.forward {
        builder = builder.perform(Forward::to(target).map_err(&on_err)?);
    }
    if let Some(target) = &perform.include {
        builder = builder.perform(Include::resource(target).map_err(&on_err)?);
    }
    if let Some(redirect) = &perform.redirect {
        let operation = if redirect.permanent {
            Redirect::permanent(&redirect.location)
        } else {
            Redirect::temporary(&redirect.location)
        }
        .map_err(&on_err)?;
        builder = builder.perform(operation);
    }
    if perform.abort {
        builder = builder.perform(Lifecycle::abort());
    }

    builder.build().map_err(on_err)
}
