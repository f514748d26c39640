use super::Constraint;
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;
use regex::Regex;

/// Accepts values that fully match a regex.
///
/// When attached to a pattern parameter, the regex also becomes that
/// parameter's capture group, so it decides where the placeholder ends.
#[derive(Debug, Clone)]
pub struct RegexConstraint {
    pattern: String,
    regex: Regex,
}

impl RegexConstraint {
    pub fn new(pattern: &str) -> Result<Self, RewriteError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Constraint for RegexConstraint {
    fn is_satisfied_by(&self, _event: &dyn Rewrite, _context: &EvaluationContext, value: &str) -> bool {
        self.regex.is_match(value)
    }

    fn as_pattern(&self) -> Option<&str> {
        Some(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HttpRewrite, RequestInfo, ResponseInfo};

    #[test]
    fn test_full_match_only() {
        let event = HttpRewrite::new(RequestInfo::new("GET", "/"), ResponseInfo::new());
        let context = EvaluationContext::new();
        let constraint = RegexConstraint::new("\\d+|none").unwrap();

        assert!(constraint.is_satisfied_by(&event, &context, "123"));
        assert!(constraint.is_satisfied_by(&event, &context, "none"));
        assert!(!constraint.is_satisfied_by(&event, &context, "12a"));
        assert!(!constraint.is_satisfied_by(&event, &context, "nonesuch"));
        assert_eq!(constraint.as_pattern(), Some("\\d+|none"));
    }
}
