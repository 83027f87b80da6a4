//! Permission-gated request pipeline for axum routes.
//!
//! A [`RoutePolicy`] declares whether a route needs a credential, which
//! permissions satisfy it, what input schema applies and how it hands off to
//! application handlers. [`GateRouter`] compiles each policy into a
//! [`Pipeline`] once, at registration, and serves it through axum.

pub mod auth;
pub mod bootstrap;
pub mod context;
pub mod errors;
pub mod events;
pub mod handler;
pub mod http;
pub mod pipeline;
pub mod plugins;
pub mod policy;
pub mod resolver;
pub mod schema;
pub mod scope;
pub mod stages;
pub mod table;
pub mod trace;

pub use auth::{
    extract_token, AuthPlugin, AuthRejection, CredentialResolver, DecodedToken, TokenSources,
    DEFAULT_AUTH_PLUGIN,
};
pub use bootstrap::GateBootstrap;
pub use context::RequestContext;
pub use errors::{ErrorTranslator, HttpError, PolicyError, PolicyResult};
pub use events::{EventsPort, GateDispatchEvent, GateFailureEvent, NoopEvents, TracingEvents};
pub use handler::{handler_fn, Flow, Handler, HandlerRegistry, HandlerSet, SharedHandler};
pub use http::GateRouter;
pub use pipeline::{GateServices, Pipeline, PipelineBuilder};
pub use plugins::{HmacBearerPlugin, TokenClaims};
pub use policy::{AuthRequirement, RouteHandler, RoutePolicy, RoutePolicyBuilder};
pub use resolver::{resolve, Resolution};
pub use schema::{
    FieldRuleValidator, FieldSpec, Location, RuleKind, RuleSpec, SchemaDescriptor,
    SchemaValidator, ValidationError,
};
pub use scope::{
    DataAccess, DataAccessFactory, DescriptorFactory, ScopeRequest, ScopedHandle,
    ScopedServiceAttacher,
};
pub use stages::{Stage, StageKind};
pub use trace::GateTracer;

pub use warden_core_types::{GateError, GateResult};
