//! Gate stages. Each is stateless, shared across requests, and decides its
//! own applicability from the route policy.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use permission_store::PermissionLoader;
use serde::Serialize;
use tracing::debug;
use warden_core_types::{GateError, GateResult};

use crate::auth::CredentialResolver;
use crate::context::RequestContext;
use crate::policy::RoutePolicy;
use crate::resolver;
use crate::schema::SchemaValidator;
use crate::scope::ScopedServiceAttacher;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Authenticate,
    Authorize,
    Validate,
    AttachScopedServices,
}

impl StageKind {
    /// Fixed execution order.
    pub const ORDER: [StageKind; 4] = [
        StageKind::Authenticate,
        StageKind::Authorize,
        StageKind::Validate,
        StageKind::AttachScopedServices,
    ];

    pub fn applies(self, policy: &RoutePolicy) -> bool {
        match self {
            StageKind::Authenticate => policy.requires_auth(),
            StageKind::Authorize | StageKind::AttachScopedServices => {
                policy.is_permission_gated()
            }
            StageKind::Validate => policy.validate().is_some(),
        }
    }

    /// Stages that decide who may call the route, as opposed to what they sent.
    pub fn checks_access(self) -> bool {
        matches!(self, StageKind::Authenticate | StageKind::Authorize)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Authenticate => "authenticate",
            StageKind::Authorize => "authorize",
            StageKind::Validate => "validate",
            StageKind::AttachScopedServices => "attach_scoped_services",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, ctx: &mut RequestContext, policy: &RoutePolicy) -> GateResult<()>;
}

pub type SharedStage = Arc<dyn Stage>;

pub struct AuthenticateStage {
    resolver: Arc<CredentialResolver>,
}

impl AuthenticateStage {
    pub fn new(resolver: Arc<CredentialResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for AuthenticateStage {
    fn kind(&self) -> StageKind {
        StageKind::Authenticate
    }

    async fn run(&self, ctx: &mut RequestContext, policy: &RoutePolicy) -> GateResult<()> {
        let auth = policy
            .auth()
            .ok_or_else(|| GateError::internal("authenticate stage on unauthenticated route"))?;
        let credential = self.resolver.authenticate(ctx, &auth.plugin_kind).await?;
        debug!(
            request_id = %ctx.request_id(),
            identity = %credential.identity,
            "caller authenticated"
        );
        ctx.set_credential(credential)
    }
}

/// Loads the caller's grants, then picks the permission and handler set.
pub struct AuthorizeStage {
    loader: PermissionLoader,
}

impl AuthorizeStage {
    pub fn new(loader: PermissionLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl Stage for AuthorizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Authorize
    }

    async fn run(&self, ctx: &mut RequestContext, policy: &RoutePolicy) -> GateResult<()> {
        let credential = ctx
            .credential()
            .ok_or_else(|| GateError::internal("authorize stage ran before authenticate"))?;
        if !credential.permissions_loaded() {
            let granted = self.loader.load(credential).await?;
            ctx.grant_permissions(granted)?;
        }

        let granted = ctx
            .credential()
            .map(|cred| cred.permissions())
            .unwrap_or_default();
        let resolution = resolver::resolve(granted, policy)?;
        debug!(
            request_id = %ctx.request_id(),
            permission = %resolution.permission.name,
            "permission resolved"
        );
        ctx.set_permission(resolution.permission)?;
        ctx.select_handlers(resolution.handlers);
        Ok(())
    }
}

pub struct ValidateStage {
    validator: Arc<dyn SchemaValidator>,
}

impl ValidateStage {
    pub fn new(validator: Arc<dyn SchemaValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Stage for ValidateStage {
    fn kind(&self) -> StageKind {
        StageKind::Validate
    }

    async fn run(&self, ctx: &mut RequestContext, policy: &RoutePolicy) -> GateResult<()> {
        let Some(schema) = policy.validate() else {
            return Ok(());
        };
        self.validator
            .validate(schema, ctx)
            .map_err(|err| GateError::validation(err.message))
    }
}

pub struct AttachScopedStage {
    attacher: ScopedServiceAttacher,
}

impl AttachScopedStage {
    pub fn new(attacher: ScopedServiceAttacher) -> Self {
        Self { attacher }
    }
}

#[async_trait]
impl Stage for AttachScopedStage {
    fn kind(&self) -> StageKind {
        StageKind::AttachScopedServices
    }

    async fn run(&self, ctx: &mut RequestContext, _policy: &RoutePolicy) -> GateResult<()> {
        if let Some(permission) = ctx.permission().cloned() {
            self.attacher.attach(ctx, &permission);
        }
        Ok(())
    }
}
