//! Built-in validators.

use super::{value_to_string, Validator, Value};
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use regex::Regex;

/// Rejects null, empty and whitespace-only values.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotEmptyValidator;

impl Validator for NotEmptyValidator {
    fn validate(&self, _event: &dyn Rewrite, _context: &EvaluationContext, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(a) => !a.is_empty(),
            _ => true,
        }
    }
}

/// Accepts integers and strings that parse as one.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerValidator;

impl Validator for IntegerValidator {
    fn validate(&self, _event: &dyn Rewrite, _context: &EvaluationContext, value: &Value) -> bool {
        match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        }
    }
}

/// Accepts values whose text form fully matches a regex.
#[derive(Debug, Clone)]
pub struct RegexValidator {
    regex: Regex,
}

impl RegexValidator {
    pub fn new(pattern: &str) -> Result<Self, RewriteError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self { regex })
    }
}

impl Validator for RegexValidator {
    fn validate(&self, _event: &dyn Rewrite, _context: &EvaluationContext, value: &Value) -> bool {
        self.regex.is_match(&value_to_string(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HttpRewrite, RequestInfo, ResponseInfo};

    fn validate(validator: &dyn Validator, value: Value) -> bool {
        let event = HttpRewrite::new(RequestInfo::new("GET", "/"), ResponseInfo::new());
        validator.validate(&event, &EvaluationContext::new(), &value)
    }

    #[test]
    fn test_not_empty() {
        assert!(validate(&NotEmptyValidator, Value::from("x")));
        assert!(!validate(&NotEmptyValidator, Value::from("  ")));
        assert!(!validate(&NotEmptyValidator, Value::Null));
        assert!(validate(&NotEmptyValidator, Value::from(0)));
    }

    #[test]
    fn test_integer() {
        assert!(validate(&IntegerValidator, Value::from("12")));
        assert!(validate(&IntegerValidator, Value::from(12)));
        assert!(!validate(&IntegerValidator, Value::from("12a")));
        assert!(!validate(&IntegerValidator, Value::from(1.5)));
    }

    #[test]
    fn test_regex_is_anchored() {
        let validator = RegexValidator::new("[a-z]+").unwrap();
        assert!(validate(&validator, Value::from("abc")));
        assert!(!validate(&validator, Value::from("abc1")));
        assert!(RegexValidator::new("(").is_err());
    }
}
