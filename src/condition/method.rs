use super::Condition;
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::Rewrite;

/// Matches the HTTP request method.
#[derive(Debug, Clone)]
pub struct Method {
    methods: Vec<String>,
}

impl Method {
    pub fn is(method: &str) -> Self {
        Self::any_of([method])
    }

    /// Matches any of `methods`, ignoring case.
    pub fn any_of<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            methods: methods
                .into_iter()
                .map(|m| m.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn is_get() -> Self {
        Self::is("GET")
    }

    pub fn is_post() -> Self {
        Self::is("POST")
    }

    pub fn is_put() -> Self {
        Self::is("PUT")
    }

    pub fn is_delete() -> Self {
        Self::is("DELETE")
    }

    pub fn is_head() -> Self {
        Self::is("HEAD")
    }

    pub fn is_options() -> Self {
        Self::is("OPTIONS")
    }
}

impl Condition for Method {
    fn evaluate(
        &self,
        event: &dyn Rewrite,
        _context: &mut EvaluationContext,
    ) -> Result<bool, RewriteError> {
        Ok(event.as_http().is_some_and(|http| {
            self.methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(&http.request().method))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HttpRewrite, RequestInfo, ResponseInfo};

    fn evaluate(condition: &Method, method: &str) -> bool {
        let event = HttpRewrite::new(RequestInfo::new(method, "/"), ResponseInfo::new());
        condition
            .evaluate(&event, &mut EvaluationContext::new())
            .unwrap()
    }

    #[test]
    fn test_single_method() {
        assert!(evaluate(&Method::is_get(), "GET"));
        assert!(evaluate(&Method::is_get(), "get"));
        assert!(!evaluate(&Method::is_get(), "POST"));
        assert!(evaluate(&Method::is_delete(), "DELETE"));
    }

    #[test]
    fn test_any_of() {
        let condition = Method::any_of(["put", "PATCH"]);
        assert!(evaluate(&condition, "PUT"));
        assert!(evaluate(&condition, "patch"));
        assert!(!evaluate(&condition, "GET"));
    }
}
