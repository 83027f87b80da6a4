use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use serde_json::{json, Value};
use warden_core_types::{Credential, GateError, GateResult, Permission, RequestId};

use crate::handler::HandlerSet;
use crate::scope::DataAccess;
use crate::stages::StageKind;

/// Per-request state threaded through every gate stage and handler.
///
/// Write order is fixed by the stage sequence: credential, then its
/// permissions, then the resolved permission, then scoped handles.
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Value,
    credential: Option<Credential>,
    permission: Option<Permission>,
    scoped: HashMap<String, Arc<dyn DataAccess>>,
    selected: Option<HandlerSet>,
    completed: Vec<StageKind>,
    rejected_input: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            params: HashMap::new(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
            body: Value::Null,
            credential: None,
            permission: None,
            scoped: HashMap::new(),
            selected: None,
            completed: Vec::new(),
            rejected_input: None,
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Mark request input that could not be extracted. The runner reports it
    /// as a validation failure once the access checks have passed.
    pub fn with_rejected_input(mut self, message: impl Into<String>) -> Self {
        self.rejected_input = Some(message.into());
        self
    }

    pub fn check_input(&self) -> GateResult<()> {
        match &self.rejected_input {
            Some(message) => Err(GateError::validation(message.clone())),
            None => Ok(()),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Set by the authenticate stage; a second write is a pipeline fault.
    pub fn set_credential(&mut self, credential: Credential) -> GateResult<()> {
        if self.credential.is_some() {
            return Err(GateError::internal("credential already set for request"));
        }
        self.credential = Some(credential);
        Ok(())
    }

    pub fn grant_permissions(&mut self, permissions: Vec<Permission>) -> GateResult<()> {
        self.credential
            .as_mut()
            .ok_or_else(|| GateError::internal("permissions loaded before authentication"))?
            .set_permissions(permissions)
    }

    /// Permission selected by resolution, if the route is permission-gated.
    pub fn permission(&self) -> Option<&Permission> {
        self.permission.as_ref()
    }

    pub fn set_permission(&mut self, permission: Permission) -> GateResult<()> {
        if self.permission.is_some() {
            return Err(GateError::internal("permission already resolved for request"));
        }
        self.permission = Some(permission);
        Ok(())
    }

    pub fn scoped(&self, resource_kind: &str) -> Option<Arc<dyn DataAccess>> {
        self.scoped.get(resource_kind).cloned()
    }

    /// Typed view of a scoped handle produced by a known factory.
    pub fn scoped_as<T: 'static>(&self, resource_kind: &str) -> Option<&T> {
        self.scoped
            .get(resource_kind)
            .and_then(|handle| handle.as_any().downcast_ref::<T>())
    }

    pub fn has_scoped(&self, resource_kind: &str) -> bool {
        self.scoped.contains_key(resource_kind)
    }

    /// Returns `false` when a handle for the kind is already attached.
    pub(crate) fn attach_scoped(&mut self, resource_kind: &str, handle: Arc<dyn DataAccess>) -> bool {
        if self.scoped.contains_key(resource_kind) {
            return false;
        }
        self.scoped.insert(resource_kind.to_string(), handle);
        true
    }

    pub(crate) fn select_handlers(&mut self, handlers: HandlerSet) {
        self.selected = Some(handlers);
    }

    pub(crate) fn take_selected(&mut self) -> Option<HandlerSet> {
        self.selected.take()
    }

    pub(crate) fn mark_completed(&mut self, stage: StageKind) {
        self.completed.push(stage);
    }

    /// Gate stages that finished successfully, in execution order.
    pub fn completed_stages(&self) -> &[StageKind] {
        &self.completed
    }

    /// Request metadata attached to failure records.
    pub fn diagnostics(&self) -> Value {
        json!({
            "params": self.params,
            "query": self.query,
            "body": self.body,
            "credential": self.credential.as_ref().map(Credential::summary),
        })
    }
}
