use super::Condition;
use crate::bind::{Bindable, Binding, DefaultBindable, HasBindings, Value};
use crate::context::EvaluationContext;
use crate::error::RewriteError;
use crate::event::{DispatcherType, RequestInfo, Rewrite};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Request attribute present on forwarded requests.
pub const FORWARD_REQUEST_URI: &str = "forward.request_uri";
/// Request attribute present on included requests.
pub const INCLUDE_REQUEST_URI: &str = "include.request_uri";
/// Request attribute present on error dispatches.
pub const ERROR_STATUS_CODE: &str = "error.status_code";

/// Determines how a request was dispatched.
pub trait DispatcherTypeProvider: fmt::Debug + Send + Sync {
    /// `None` if this provider cannot tell.
    fn dispatcher_type(&self, request: &RequestInfo) -> Option<DispatcherType>;

    /// Providers with a lower value are asked first.
    fn priority(&self) -> i32;
}

/// Reports the dispatcher type the container set on the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerDispatcherTypeProvider;

impl DispatcherTypeProvider for ContainerDispatcherTypeProvider {
    fn dispatcher_type(&self, request: &RequestInfo) -> Option<DispatcherType> {
        request.dispatcher_type
    }

    fn priority(&self) -> i32 {
        0
    }
}

/// Infers the dispatcher type from well-known request attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeDispatcherTypeProvider;

impl DispatcherTypeProvider for AttributeDispatcherTypeProvider {
    fn dispatcher_type(&self, request: &RequestInfo) -> Option<DispatcherType> {
        if request.attributes.contains_key(ERROR_STATUS_CODE) {
            Some(DispatcherType::Error)
        } else if request.attributes.contains_key(INCLUDE_REQUEST_URI) {
            Some(DispatcherType::Include)
        } else if request.attributes.contains_key(FORWARD_REQUEST_URI) {
            Some(DispatcherType::Forward)
        } else {
            None
        }
    }

    fn priority(&self) -> i32 {
        10
    }
}

/// Providers in the order they are asked.
#[derive(Debug, Clone)]
pub struct DispatcherTypeProviders {
    providers: Vec<Arc<dyn DispatcherTypeProvider>>,
}

impl DispatcherTypeProviders {
    /// Sorts `providers` by priority; equal priorities keep their order.
    pub fn new(mut providers: Vec<Arc<dyn DispatcherTypeProvider>>) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self { providers }
    }

    /// First answer from any provider.
    pub fn resolve(&self, request: &RequestInfo) -> Option<DispatcherType> {
        self.providers
            .iter()
            .find_map(|p| p.dispatcher_type(request))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for DispatcherTypeProviders {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(ContainerDispatcherTypeProvider),
            Arc::new(AttributeDispatcherTypeProvider),
        ])
    }
}

/// Matches how the request was dispatched. When it matches, the resolved
/// type name is bound to every attached binding.
#[derive(Debug, Clone)]
pub struct DispatchType {
    expected: DispatcherType,
    providers: DispatcherTypeProviders,
    bindings: Arc<DefaultBindable>,
}

impl DispatchType {
    pub fn is(expected: DispatcherType) -> Self {
        Self {
            expected,
            providers: DispatcherTypeProviders::default(),
            bindings: Arc::new(DefaultBindable::new()),
        }
    }

    pub fn is_request() -> Self {
        Self::is(DispatcherType::Request)
    }

    pub fn is_forward() -> Self {
        Self::is(DispatcherType::Forward)
    }

    pub fn is_include() -> Self {
        Self::is(DispatcherType::Include)
    }

    pub fn is_error() -> Self {
        Self::is(DispatcherType::Error)
    }

    pub fn is_async() -> Self {
        Self::is(DispatcherType::Async)
    }

    /// Replace the default providers.
    pub fn with_providers(mut self, providers: DispatcherTypeProviders) -> Self {
        self.providers = providers;
        self
    }

    pub fn binds_to(self, binding: Arc<dyn Binding>) -> Self {
        self.bindings.add_binding(binding);
        self
    }

    pub fn expected(&self) -> DispatcherType {
        self.expected
    }
}

impl Bindable for DispatchType {
    fn add_binding(&self, binding: Arc<dyn Binding>) {
        self.bindings.add_binding(binding);
    }
}

impl HasBindings for DispatchType {
    fn bindings(&self) -> Vec<Arc<dyn Binding>> {
        self.bindings.bindings()
    }
}

impl Condition for DispatchType {
    fn evaluate(
        &self,
        event: &dyn Rewrite,
        context: &mut EvaluationContext,
    ) -> Result<bool, RewriteError> {
        let Some(http) = event.as_http() else {
            return Ok(false);
        };

        let Some(actual) = self.providers.resolve(http.request()) else {
            warn!(uri = %http.request().request_uri, "No provider could determine dispatcher type");
            return Err(RewriteError::UnresolvedDispatchType);
        };

        if actual != self.expected {
            return Ok(false);
        }
        context.enqueue_submission(self.bindings.clone(), Value::String(actual.to_string()));
        Ok(true)
    }
}
