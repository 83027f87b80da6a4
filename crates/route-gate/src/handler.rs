use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use warden_core_types::GateResult;

use crate::context::RequestContext;

/// What a handler wants the runner to do next.
pub enum Flow {
    /// Pass control to the next handler in the set.
    Next,
    /// End the request with this response.
    Respond(Response),
}

impl Flow {
    pub fn respond(response: impl IntoResponse) -> Self {
        Flow::Respond(response.into_response())
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Next => f.write_str("Next"),
            Flow::Respond(resp) => write!(f, "Respond({})", resp.status()),
        }
    }
}

/// Application route handler invoked after all gate stages pass.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut RequestContext) -> GateResult<Flow>;
}

pub type SharedHandler = Arc<dyn Handler>;

/// Adapter for synchronous closures.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut RequestContext) -> GateResult<Flow> + Send + Sync,
{
    async fn call(&self, ctx: &mut RequestContext) -> GateResult<Flow> {
        (self.0)(ctx)
    }
}

pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(&mut RequestContext) -> GateResult<Flow> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Ordered, non-empty list of handlers run one after another.
#[derive(Clone)]
pub struct HandlerSet(Vec<SharedHandler>);

impl HandlerSet {
    /// `None` when `handlers` is empty.
    pub fn new(handlers: Vec<SharedHandler>) -> Option<Self> {
        if handlers.is_empty() {
            None
        } else {
            Some(Self(handlers))
        }
    }

    pub fn single(handler: SharedHandler) -> Self {
        Self(vec![handler])
    }

    pub fn handlers(&self) -> &[SharedHandler] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerSet({} handlers)", self.0.len())
    }
}

/// Named handlers that declarative route tables refer to.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, SharedHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: SharedHandler) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn with(mut self, name: impl Into<String>, handler: SharedHandler) -> Self {
        self.register(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<SharedHandler> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
