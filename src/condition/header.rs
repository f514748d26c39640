use super::Condition;
use crate::bind::Value;
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use crate::param::{Parameter, ParameterStore, ParameterizedPattern};
use std::sync::Arc;

/// Capture group used for header placeholders without a regex constraint.
const DEFAULT_HEADER_GROUP: &str = ".*";

/// Matches a request header by name and, optionally, by value.
///
/// Header names match case-insensitively. The condition is true as soon as
/// one header/value pair matches.
#[derive(Debug)]
pub struct Header {
    name: ParameterizedPattern,
    value: Option<ParameterizedPattern>,
}

impl Header {
    /// A header whose name matches `name` with a value matching `value`.
    pub fn matches(name: &str, value: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            name: ParameterizedPattern::with_default_group(name, DEFAULT_HEADER_GROUP)?
                .ignore_case(),
            value: Some(ParameterizedPattern::with_default_group(
                value,
                DEFAULT_HEADER_GROUP,
            )?),
        })
    }

    /// A header whose name matches `name`, with any value.
    pub fn exists(name: &str) -> Result<Self, RewriteError> {
        Ok(Self {
            name: ParameterizedPattern::with_default_group(name, DEFAULT_HEADER_GROUP)?
                .ignore_case(),
            value: None,
        })
    }

    pub fn name_store(&self) -> &ParameterStore {
        self.name.parameter_store()
    }

    pub fn value_store(&self) -> Option<&ParameterStore> {
        self.value.as_ref().map(|v| v.parameter_store())
    }

    /// Parameter `name` from the name pattern or, failing that, the value
    /// pattern.
    pub fn parameter(&self, name: &str) -> Result<&Arc<Parameter>, RewriteError> {
        match (self.name_store().contains(name), self.value_store()) {
            (false, Some(store)) => store.get(name),
            _ => self.name_store().get(name),
        }
    }
}

impl Condition for Header {
    fn evaluate(
        &self,
        event: &dyn Rewrite,
        context: &mut EvaluationContext,
    ) -> Result<bool, RewriteError> {
        let Some(http) = event.as_http() else {
            return Ok(false);
        };

        let mut names: Vec<&String> = http.request().headers.keys().collect();
        names.sort();

        for header in names {
            let Some(name_values) = self.name.parse(event, context, header)? else {
                continue;
            };

            let values = &http.request().headers[header];
            let matched = match &self.value {
                None => Some(Vec::new()),
                Some(pattern) => {
                    let mut found = None;
                    for value in values {
                        if let Some(captured) = pattern.parse(event, context, value)? {
                            found = Some(captured);
                            break;
                        }
                    }
                    found
                }
            };

            if let Some(value_values) = matched {
                for (parameter, value) in name_values.into_iter().chain(value_values) {
                    context.enqueue_submission(parameter, Value::String(value));
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn parameters(&self) -> Vec<Arc<Parameter>> {
        let mut parameters: Vec<_> = self.name_store().iter().cloned().collect();
        if let Some(store) = self.value_store() {
            parameters.extend(store.iter().cloned());
        }
        parameters
    }

    fn validate(&self) -> Result<(), RewriteError> {
        self.name.compile()?;
        match &self.value {
            Some(value) => value.compile(),
            None => Ok(()),
        }
    }
}
