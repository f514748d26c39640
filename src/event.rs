//! Rewrite events: the request/response pair a rule set is evaluated against.

use crate::error::RewriteError;
use crate::operation::ResponseInterceptor;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Values written by `Evaluation` bindings, keyed by property name.
pub type Attributes = HashMap<String, Value>;

/// An event evaluated by conditions and mutated by operations.
///
/// Conditions that only make sense for HTTP traffic use [`Rewrite::as_http`]
/// and never match events that return `None`.
pub trait Rewrite: fmt::Debug + Send + Sync {
    /// Current lifecycle state.
    fn state(&self) -> &RewriteState;

    /// Evaluation attributes bound so far during this event.
    fn attributes(&self) -> &Attributes;

    /// Mutable evaluation attributes.
    fn attributes_mut(&mut self) -> &mut Attributes;

    /// HTTP view of this event, if it is one.
    fn as_http(&self) -> Option<&HttpRewrite> {
        None
    }

    /// Mutable HTTP view of this event, if it is one.
    fn as_http_mut(&mut self) -> Option<&mut HttpRewrite> {
        None
    }
}

/// Lifecycle of a rewrite event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RewriteState {
    /// No operation has claimed the event yet.
    #[default]
    Active,
    /// Marked as handled, remaining rules still run.
    Proceeded,
    /// Handled; no further rules run.
    Handled,
    /// Handled and the request is ended.
    Aborted,
    /// Handled; the container must forward to the resource.
    Forwarded(String),
    /// Handled; the container must include the resource.
    Included(String),
}

impl RewriteState {
    /// Whether rule processing must stop for this event.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active | Self::Proceeded)
    }
}

impl fmt::Display for RewriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Proceeded => write!(f, "proceeded"),
            Self::Handled => write!(f, "handled"),
            Self::Aborted => write!(f, "aborted"),
            Self::Forwarded(resource) => write!(f, "forwarded to {}", resource),
            Self::Included(resource) => write!(f, "included {}", resource),
        }
    }
}

/// How a request reached the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherType {
    Request,
    Forward,
    Include,
    Error,
    Async,
}

impl fmt::Display for DispatcherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "REQUEST",
            Self::Forward => "FORWARD",
            Self::Include => "INCLUDE",
            Self::Error => "ERROR",
            Self::Async => "ASYNC",
        };
        f.write_str(name)
    }
}

/// Inbound request information.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// HTTP method
    pub method: String,
    /// Request URI (without query string), including the context path
    pub request_uri: String,
    /// Context path the application is mounted under
    pub context_path: String,
    /// Query string (without leading ?)
    pub query_string: Option<String>,
    /// Parsed query parameters
    pub query_params: HashMap<String, Vec<String>>,
    /// Request headers, keyed by lowercase name
    pub headers: HashMap<String, Vec<String>>,
    /// Container request attributes
    pub attributes: HashMap<String, String>,
    /// Dispatcher type reported by the container, if known (`Request` for
    /// requests built with [`RequestInfo::new`])
    pub dispatcher_type: Option<DispatcherType>,
}

impl RequestInfo {
    /// Create a request from a method and a URI that may carry a query string.
    pub fn new(method: impl Into<String>, uri: &str) -> Self {
        let (path, query_string) = match uri.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (uri.to_string(), None),
        };
        let query_params = parse_query_string(query_string.as_deref());

        Self {
            method: method.into(),
            request_uri: path,
            query_string,
            query_params,
            dispatcher_type: Some(DispatcherType::Request),
            ..Default::default()
        }
    }

    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_dispatcher_type(mut self, dispatcher_type: DispatcherType) -> Self {
        self.dispatcher_type = Some(dispatcher_type);
        self
    }

    /// Get a single header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Request URI with the context path stripped.
    pub fn application_path(&self) -> &str {
        if self.context_path.is_empty() {
            return &self.request_uri;
        }
        self.request_uri
            .strip_prefix(self.context_path.as_str())
            .unwrap_or(&self.request_uri)
    }
}

/// Parse query string into parameter map.
fn parse_query_string(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    if let Some(qs) = query {
        for part in qs.split('&') {
            if let Some((k, v)) = part.split_once('=') {
                let key = decode_form(k);
                let value = decode_form(v);
                params.entry(key).or_default().push(value);
            } else if !part.is_empty() {
                params.entry(decode_form(part)).or_default().push(String::new());
            }
        }
    }

    params
}

fn decode_form(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}

/// A cookie to be sent with the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            http_only: false,
            secure: false,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(ref path) = self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Outbound response information.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    status: u16,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    committed: bool,
}

impl Default for ResponseInfo {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            cookies: Vec::new(),
            interceptors: Vec::new(),
            committed: false,
        }
    }
}

impl ResponseInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Append a header; existing values with the same name are kept.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replace every value of a header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Append a header holding an HTTP date (RFC 7231 IMF-fixdate).
    pub fn add_date_header(&mut self, name: impl Into<String>, epoch_millis: i64) {
        let value = chrono::DateTime::from_timestamp_millis(epoch_millis)
            .map(|date| date.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
            .unwrap_or_default();
        self.add_header(name, value);
    }

    pub fn add_int_header(&mut self, name: impl Into<String>, value: i64) {
        self.add_header(name, value.to_string());
    }

    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.add_header("Set-Cookie", cookie.to_header_value());
        self.cookies.push(cookie);
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header (case-insensitive), in insertion order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Register an interceptor stage; output is buffered until every stage has run.
    pub fn add_interceptor(
        &mut self,
        interceptor: Arc<dyn ResponseInterceptor>,
    ) -> Result<(), RewriteError> {
        if self.committed {
            return Err(RewriteError::ResponseCommitted("buffer response output"));
        }
        self.interceptors.push(interceptor);
        Ok(())
    }

    pub fn interceptors(&self) -> &[Arc<dyn ResponseInterceptor>] {
        &self.interceptors
    }

    /// Whether output has been written to the client.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Run the buffered body through every interceptor stage in order.
    pub fn render(&self, body: String) -> String {
        self.interceptors
            .iter()
            .fold(body, |body, stage| stage.intercept(body))
    }
}

/// An inbound HTTP rewrite event.
#[derive(Debug, Clone)]
pub struct HttpRewrite {
    request: RequestInfo,
    response: ResponseInfo,
    state: RewriteState,
    attributes: Attributes,
}

impl HttpRewrite {
    pub fn new(request: RequestInfo, response: ResponseInfo) -> Self {
        Self {
            request,
            response,
            state: RewriteState::Active,
            attributes: Attributes::new(),
        }
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn response(&self) -> &ResponseInfo {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseInfo {
        &mut self.response
    }

    /// Replace the request for the rest of this event, usually with a wrapped one.
    pub fn set_request(&mut self, request: RequestInfo) -> Result<(), RewriteError> {
        self.ensure_active()?;
        self.request = request;
        Ok(())
    }

    /// Replace the response for the rest of this event.
    pub fn set_response(&mut self, response: ResponseInfo) -> Result<(), RewriteError> {
        self.ensure_active()?;
        self.response = response;
        Ok(())
    }

    /// Mark handled, stop processing and end the request.
    pub fn abort(&mut self) -> Result<(), RewriteError> {
        self.transition(RewriteState::Aborted)
    }

    /// Mark handled and continue with the remaining rules.
    pub fn proceed(&mut self) -> Result<(), RewriteError> {
        self.transition(RewriteState::Proceeded)
    }

    /// Mark handled and stop processing.
    pub fn handled(&mut self) -> Result<(), RewriteError> {
        self.transition(RewriteState::Handled)
    }

    /// Stop processing and forward to `resource`.
    pub fn forward(&mut self, resource: impl Into<String>) -> Result<(), RewriteError> {
        self.transition(RewriteState::Forwarded(resource.into()))
    }

    /// Stop processing and include `resource`.
    pub fn include(&mut self, resource: impl Into<String>) -> Result<(), RewriteError> {
        self.transition(RewriteState::Included(resource.into()))
    }

    fn ensure_active(&self) -> Result<(), RewriteError> {
        if self.state.is_terminal() {
            return Err(RewriteError::EventTerminated(self.state.to_string()));
        }
        Ok(())
    }

    fn transition(&mut self, next: RewriteState) -> Result<(), RewriteError> {
        self.ensure_active()?;
        tracing::trace!(from = %self.state, to = %next, "Rewrite state transition");
        self.state = next;
        Ok(())
    }
}

impl Rewrite for HttpRewrite {
    fn state(&self) -> &RewriteState {
        &self.state
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    fn as_http(&self) -> Option<&HttpRewrite> {
        Some(self)
    }

    fn as_http_mut(&mut self) -> Option<&mut HttpRewrite> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event() -> HttpRewrite {
        let request = RequestInfo::new("GET", "/context/application/path?page=1&q=foo+bar")
            .with_context_path("/context")
            .with_header("X-Custom", "value");
        HttpRewrite::new(request, ResponseInfo::new())
    }

    #[test]
    fn test_request_parsing() {
        let event = make_event();
        let request = event.request();

        assert_eq!(request.request_uri, "/context/application/path");
        assert_eq!(request.application_path(), "/application/path");
        assert_eq!(request.query_string.as_deref(), Some("page=1&q=foo+bar"));
        assert_eq!(request.query_params.get("q"), Some(&vec!["foo bar".to_string()]));
        assert_eq!(request.header("x-custom"), Some("value"));
    }

    #[test]
    fn test_application_path_without_context() {
        let request = RequestInfo::new("GET", "/application/path");
        assert_eq!(request.application_path(), "/application/path");
    }

    #[test]
    fn test_proceed_is_not_terminal() {
        let mut event = make_event();
        event.proceed().unwrap();
        assert_eq!(event.state(), &RewriteState::Proceeded);
        assert!(!event.state().is_terminal());

        event.forward("/index").unwrap();
        assert_eq!(event.state(), &RewriteState::Forwarded("/index".to_string()));
        assert!(event.state().is_terminal());
    }

    #[test]
    fn test_transition_after_termination_fails() {
        let mut event = make_event();
        event.handled().unwrap();

        let err = event.abort().unwrap_err();
        assert!(matches!(err, RewriteError::EventTerminated(_)));
        assert_eq!(event.state(), &RewriteState::Handled);

        assert!(event.set_response(ResponseInfo::new()).is_err());
    }

    #[test]
    fn test_set_request_keeps_state() {
        let mut event = make_event();
        event.proceed().unwrap();
        event
            .set_request(RequestInfo::new("POST", "/other"))
            .unwrap();
        assert_eq!(event.request().method, "POST");
        assert_eq!(event.state(), &RewriteState::Proceeded);
    }

    #[test]
    fn test_response_headers() {
        let mut response = ResponseInfo::new();
        response.add_header("X-Multi", "a");
        response.add_header("x-multi", "b");
        response.add_int_header("X-Count", 3);
        response.add_date_header("Expires", 0);

        assert_eq!(response.header_values("X-Multi").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(response.header("X-Count"), Some("3"));
        assert_eq!(response.header("Expires"), Some("Thu, 01 Jan 1970 00:00:00 GMT"));

        response.set_header("X-Multi", "c");
        assert_eq!(response.header_values("X-Multi").collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_cookie_header() {
        let mut response = ResponseInfo::new();
        response.add_cookie(Cookie::new("session", "abc").with_path("/").http_only());

        assert_eq!(response.cookies().len(), 1);
        assert_eq!(
            response.header("Set-Cookie"),
            Some("session=abc; Path=/; HttpOnly")
        );
    }
}
