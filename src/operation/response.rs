use super::{Operation, ResponseInterceptor};
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::{Cookie, Rewrite};
use crate::param::Template;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Operations on the outbound response. They do nothing for events that are
/// not HTTP.
#[derive(Debug, Clone)]
pub enum Response {
    /// Append a header; the value may reference bound parameters
    AddHeader { name: String, value: Template },
    /// Append an HTTP date header
    AddDateHeader { name: String, epoch_millis: i64 },
    /// Append an integer header
    AddIntHeader { name: String, value: i64 },
    /// Add a cookie and its `Set-Cookie` header
    AddCookie(Cookie),
    /// Set the status code
    SetCode(u16),
    /// Buffer output and run it through each interceptor in order
    InterceptOutput(Vec<Arc<dyn ResponseInterceptor>>),
}

impl Response {
    pub fn add_header(name: impl Into<String>, value: &str) -> Result<Self, RewriteError> {
        Ok(Self::AddHeader {
            name: name.into(),
            value: Template::parse(value)?,
        })
    }

    pub fn add_date_header(name: impl Into<String>, epoch_millis: i64) -> Self {
        Self::AddDateHeader {
            name: name.into(),
            epoch_millis,
        }
    }

    pub fn add_int_header(name: impl Into<String>, value: i64) -> Self {
        Self::AddIntHeader {
            name: name.into(),
            value,
        }
    }

    pub fn add_cookie(cookie: Cookie) -> Self {
        Self::AddCookie(cookie)
    }

    pub fn set_code(code: u16) -> Self {
        Self::SetCode(code)
    }

    pub fn with_output_intercepted_by(interceptors: Vec<Arc<dyn ResponseInterceptor>>) -> Self {
        Self::InterceptOutput(interceptors)
    }
}

impl Operation for Response {
    fn perform(
        &self,
        event: &mut dyn Rewrite,
        _context: &EvaluationContext,
    ) -> Result<(), RewriteError> {
        let header_value = match self {
            Self::AddHeader { value, .. } => Some(value.build_plain(event.attributes())?),
            _ => None,
        };

        let Some(http) = event.as_http_mut() else {
            debug!(operation = ?self, "Skipping response operation for non-HTTP event");
            return Ok(());
        };
        let response = http.response_mut();

        match self {
            Self::AddHeader { name, .. } => {
                response.add_header(name.clone(), header_value.unwrap_or_default())
            }
            Self::AddDateHeader { name, epoch_millis } => {
                response.add_date_header(name.clone(), *epoch_millis)
            }
            Self::AddIntHeader { name, value } => response.add_int_header(name.clone(), *value),
            Self::AddCookie(cookie) => response.add_cookie(cookie.clone()),
            Self::SetCode(code) => response.set_status(*code),
            Self::InterceptOutput(interceptors) => {
                for interceptor in interceptors {
                    response.add_interceptor(interceptor.clone())?;
                }
            }
        }
        Ok(())
    }

    fn declared_names(&self) -> Vec<String> {
        match self {
            Self::AddHeader { value, .. } => value
                .declared_names()
                .into_iter()
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Replaces every regex match in the response body.
#[derive(Debug, Clone)]
pub struct ReplaceInterceptor {
    pattern: Regex,
    replacement: String,
}

impl ReplaceInterceptor {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, RewriteError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }
}

impl ResponseInterceptor for ReplaceInterceptor {
    fn intercept(&self, body: String) -> String {
        self.pattern
            .replace_all(&body, self.replacement.as_str())
            .into_owned()
    }
}
