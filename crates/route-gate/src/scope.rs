use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use warden_core_types::{Access, Permission};

use crate::context::RequestContext;

/// Data-access handle narrowed to one permission's data scope.
pub trait DataAccess: Send + Sync + fmt::Debug {
    fn resource_kind(&self) -> &str;
    fn scope_name(&self) -> &str;
    fn scope_value(&self) -> Option<&Value>;
    fn access(&self) -> Access;
    fn as_any(&self) -> &dyn Any;
}

/// Arguments for [`DataAccessFactory::scope`].
#[derive(Clone, Debug, PartialEq)]
pub struct ScopeRequest {
    pub resource_kind: String,
    pub scope_name: String,
    pub scope_value: Option<Value>,
    pub access: Access,
}

/// Persistence-side hook producing scoped handles.
pub trait DataAccessFactory: Send + Sync {
    fn scope(&self, request: ScopeRequest) -> Arc<dyn DataAccess>;
}

/// Plain descriptor handle; what a persistence layer would receive as its
/// query narrowing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScopedHandle {
    pub resource_kind: String,
    pub scope_name: String,
    pub scope_value: Option<Value>,
    pub access: Access,
}

impl DataAccess for ScopedHandle {
    fn resource_kind(&self) -> &str {
        &self.resource_kind
    }

    fn scope_name(&self) -> &str {
        &self.scope_name
    }

    fn scope_value(&self) -> Option<&Value> {
        self.scope_value.as_ref()
    }

    fn access(&self) -> Access {
        self.access
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DescriptorFactory;

impl DataAccessFactory for DescriptorFactory {
    fn scope(&self, request: ScopeRequest) -> Arc<dyn DataAccess> {
        Arc::new(ScopedHandle {
            resource_kind: request.resource_kind,
            scope_name: request.scope_name,
            scope_value: request.scope_value,
            access: request.access,
        })
    }
}

#[derive(Clone)]
pub struct ScopedServiceAttacher {
    factory: Arc<dyn DataAccessFactory>,
}

impl ScopedServiceAttacher {
    pub fn new(factory: Arc<dyn DataAccessFactory>) -> Self {
        Self { factory }
    }

    /// Never fails. Anything that cannot be scoped precisely is left unattached.
    pub fn attach(&self, ctx: &mut RequestContext, permission: &Permission) {
        let Some(scope) = permission.data_scope.as_ref() else {
            return;
        };

        let scope_value = match scope.scope_value_source_path.as_deref() {
            None => None,
            Some(path) => {
                let value = ctx.credential().and_then(|cred| cred.lookup(path));
                if value.is_none() {
                    warn!(
                        request_id = %ctx.request_id(),
                        permission = %permission.name,
                        path,
                        "scope value unresolved; no handle attached"
                    );
                    return;
                }
                value
            }
        };

        let handle = self.factory.scope(ScopeRequest {
            resource_kind: scope.resource_kind.clone(),
            scope_name: scope.scope_name.clone(),
            scope_value,
            access: permission.access,
        });
        if ctx.attach_scoped(&scope.resource_kind, handle) {
            debug!(
                request_id = %ctx.request_id(),
                resource_kind = %scope.resource_kind,
                scope = %scope.scope_name,
                "scoped handle attached"
            );
        }
    }
}

impl Default for ScopedServiceAttacher {
    fn default() -> Self {
        Self::new(Arc::new(DescriptorFactory))
    }
}
