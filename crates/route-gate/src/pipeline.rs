use std::fmt;
use std::sync::Arc;

use axum::response::Response;
use permission_store::PermissionLoader;
use tracing::{debug, trace};
use warden_core_types::{GateError, GateResult};

use crate::auth::CredentialResolver;
use crate::context::RequestContext;
use crate::errors::{PolicyError, PolicyResult};
use crate::handler::Flow;
use crate::policy::RoutePolicy;
use crate::schema::SchemaValidator;
use crate::scope::ScopedServiceAttacher;
use crate::stages::{
    AttachScopedStage, AuthenticateStage, AuthorizeStage, SharedStage, StageKind, ValidateStage,
};

/// Collaborators the gate stages are built from.
#[derive(Clone)]
pub struct GateServices {
    pub resolver: Arc<CredentialResolver>,
    pub loader: PermissionLoader,
    pub validator: Arc<dyn SchemaValidator>,
    pub attacher: ScopedServiceAttacher,
}

/// Resolves a route's stage list once, at registration.
#[derive(Clone)]
pub struct PipelineBuilder {
    resolver: Arc<CredentialResolver>,
    authenticate: SharedStage,
    authorize: SharedStage,
    validate: SharedStage,
    attach: SharedStage,
}

impl PipelineBuilder {
    pub fn new(services: GateServices) -> Self {
        Self {
            resolver: Arc::clone(&services.resolver),
            authenticate: Arc::new(AuthenticateStage::new(services.resolver)),
            authorize: Arc::new(AuthorizeStage::new(services.loader)),
            validate: Arc::new(ValidateStage::new(services.validator)),
            attach: Arc::new(AttachScopedStage::new(services.attacher)),
        }
    }

    fn stage(&self, kind: StageKind) -> SharedStage {
        match kind {
            StageKind::Authenticate => Arc::clone(&self.authenticate),
            StageKind::Authorize => Arc::clone(&self.authorize),
            StageKind::Validate => Arc::clone(&self.validate),
            StageKind::AttachScopedServices => Arc::clone(&self.attach),
        }
    }

    pub fn build(&self, policy: RoutePolicy) -> PolicyResult<Pipeline> {
        if let Some(auth) = policy.auth() {
            if !self.resolver.has_plugin(&auth.plugin_kind) {
                return Err(PolicyError::UnknownAuthPlugin(auth.plugin_kind.clone()));
            }
        }

        let stages: Vec<SharedStage> = StageKind::ORDER
            .into_iter()
            .filter(|kind| kind.applies(&policy))
            .map(|kind| self.stage(kind))
            .collect();
        debug!(
            route = %policy.label(),
            stages = ?stages.iter().map(|stage| stage.kind().as_str()).collect::<Vec<_>>(),
            "pipeline built"
        );
        Ok(Pipeline {
            policy: Arc::new(policy),
            stages,
        })
    }
}

/// Ordered gate stages plus the route they guard.
#[derive(Clone)]
pub struct Pipeline {
    policy: Arc<RoutePolicy>,
    stages: Vec<SharedStage>,
}

impl Pipeline {
    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|stage| stage.kind()).collect()
    }

    /// Run every gate, then the selected handlers. The first failure aborts.
    pub async fn run(&self, ctx: &mut RequestContext) -> GateResult<Response> {
        for stage in &self.stages {
            if !stage.kind().checks_access() {
                ctx.check_input()?;
            }
            trace!(request_id = %ctx.request_id(), stage = %stage.kind(), "stage start");
            stage.run(ctx, &self.policy).await?;
            ctx.mark_completed(stage.kind());
        }
        ctx.check_input()?;

        let handlers = ctx
            .take_selected()
            .or_else(|| self.policy.handler().default_set())
            .ok_or_else(|| {
                GateError::internal(format!("no handler selected for {}", self.policy.label()))
            })?;

        for handler in handlers.handlers() {
            if let Flow::Respond(response) = handler.call(ctx).await? {
                return Ok(response);
            }
        }
        Err(GateError::internal(format!(
            "handlers for {} finished without a response",
            self.policy.label()
        )))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("route", &self.policy.label())
            .field("stages", &self.stage_kinds())
            .finish()
    }
}
