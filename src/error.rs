//! Error types shared by the rewrite core.

/// Errors raised while building or evaluating rewrite rules.
///
/// The first group are configuration errors: they surface while a rule is
/// being built and must stop startup. `UnresolvedDispatchType`, `MissingValue`
/// and `EventTerminated` surface while a request is processed.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Parameter [{name}] is not defined by pattern [{pattern}]")]
    UnknownParameter { name: String, pattern: String },

    #[error("Parameter [{name}] is not declared by any condition of rule [{rule}]")]
    UnknownRuleParameter { rule: String, name: String },

    #[error("Invalid pattern [{pattern}]: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid regex constraint: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Rule [{rule}] references undeclared parameter [{name}]")]
    UndeclaredParameter { rule: String, name: String },

    #[error("Unable to determine dispatcher type of current request")]
    UnresolvedDispatchType,

    #[error("No value bound for parameter [{0}]")]
    MissingValue(String),

    #[error("Rewrite event already terminated ({0})")]
    EventTerminated(String),

    #[error("Response already committed, cannot {0}")]
    ResponseCommitted(&'static str),
}

impl RewriteError {
    /// Whether this error belongs to rule configuration rather than request
    /// processing.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownParameter { .. }
                | Self::UnknownRuleParameter { .. }
                | Self::InvalidPattern { .. }
                | Self::InvalidRegex(_)
                | Self::UndeclaredParameter { .. }
        )
    }

    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        let err = RewriteError::UnknownParameter {
            name: "x".to_string(),
            pattern: "/{y}".to_string(),
        };
        assert!(err.is_configuration());
        assert!(!RewriteError::UnresolvedDispatchType.is_configuration());
        assert!(!RewriteError::MissingValue("x".to_string()).is_configuration());
    }

    #[test]
    fn test_display() {
        let err = RewriteError::invalid_pattern("/{a", "unclosed placeholder");
        assert_eq!(
            err.to_string(),
            "Invalid pattern [/{a]: unclosed placeholder"
        );
    }
}
