use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::path::ErrorKind;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodFilter, MethodRouter};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, Instrument};

use crate::context::RequestContext;
use crate::errors::{ErrorTranslator, PolicyError, PolicyResult};
use crate::events::EventsPort;
use crate::handler::HandlerRegistry;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::policy::RoutePolicy;
use crate::table;
use crate::trace::GateTracer;

const HEALTH_PATH: &str = "/healthz";

#[derive(Clone)]
struct RouteState {
    pipeline: Arc<Pipeline>,
    translator: ErrorTranslator,
    events: Arc<dyn EventsPort>,
    tracer: GateTracer,
}

/// Collects route policies and turns them into an axum [`Router`].
pub struct GateRouter {
    builder: PipelineBuilder,
    translator: ErrorTranslator,
    events: Arc<dyn EventsPort>,
    tracer: GateTracer,
    routes: Vec<(MethodFilter, Arc<Pipeline>)>,
    registered: HashSet<(Method, String)>,
}

impl std::fmt::Debug for GateRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateRouter")
            .field("routes", &self.routes.len())
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

impl GateRouter {
    pub fn new(builder: PipelineBuilder, events: Arc<dyn EventsPort>, tracer: GateTracer) -> Self {
        Self {
            builder,
            translator: ErrorTranslator::new(Arc::clone(&events)),
            events,
            tracer,
            routes: Vec::new(),
            registered: HashSet::new(),
        }
    }

    pub fn register(&mut self, policy: RoutePolicy) -> PolicyResult<&mut Self> {
        let label = policy.label();
        if policy.path() == HEALTH_PATH {
            return Err(PolicyError::DuplicateRoute(label));
        }
        let filter = MethodFilter::try_from(policy.method().clone())
            .map_err(|_| PolicyError::UnsupportedMethod(policy.method().to_string()))?;
        let key = (policy.method().clone(), policy.path().to_string());
        if self.registered.contains(&key) {
            return Err(PolicyError::DuplicateRoute(label));
        }

        let pipeline = self.builder.build(policy)?;
        info!(route = %label, stages = pipeline.stage_kinds().len(), "route registered");
        self.registered.insert(key);
        self.routes.push((filter, Arc::new(pipeline)));
        Ok(self)
    }

    pub fn configure(&mut self, policies: Vec<RoutePolicy>) -> PolicyResult<&mut Self> {
        for policy in policies {
            self.register(policy)?;
        }
        Ok(self)
    }

    /// Register a declarative route table; see [`crate::table`].
    pub fn configure_value(
        &mut self,
        value: &Value,
        registry: &HandlerRegistry,
    ) -> PolicyResult<&mut Self> {
        let policies = table::parse_routes(value, registry)?;
        self.configure(policies)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.routes.iter().map(|(_, pipeline)| pipeline.as_ref())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn into_router(self) -> Router {
        let mut by_path: Vec<(String, Vec<(MethodFilter, Arc<Pipeline>)>)> = Vec::new();
        for (filter, pipeline) in self.routes {
            let path = pipeline.policy().path().to_string();
            match by_path.iter_mut().find(|(existing, _)| *existing == path) {
                Some((_, entries)) => entries.push((filter, pipeline)),
                None => by_path.push((path, vec![(filter, pipeline)])),
            }
        }

        let mut router = Router::new().route(HEALTH_PATH, get(healthz_handler));
        for (path, entries) in by_path {
            let mut method_router: Option<MethodRouter> = None;
            for (filter, pipeline) in entries {
                let state = RouteState {
                    pipeline,
                    translator: self.translator.clone(),
                    events: Arc::clone(&self.events),
                    tracer: self.tracer.clone(),
                };
                let endpoint = move |params: Result<Path<HashMap<String, String>>, PathRejection>,
                                     Query(query): Query<HashMap<String, String>>,
                                     method: Method,
                                     uri: Uri,
                                     headers: HeaderMap,
                                     body: Bytes| {
                    let state = state.clone();
                    async move {
                        let ctx = RequestContext::new(method, uri.path())
                            .with_query(query)
                            .with_headers(headers)
                            .with_body(parse_body(&body));
                        let ctx = match params {
                            Ok(Path(params)) => ctx.with_params(params),
                            Err(rejection) if declares_params(state.pipeline.policy().path()) => {
                                debug!(%rejection, "path parameters rejected");
                                ctx.with_rejected_input(path_rejection_message(&rejection))
                            }
                            Err(_) => ctx,
                        };
                        dispatch(state, ctx).await
                    }
                };
                method_router = Some(match method_router {
                    Some(existing) => existing.on(filter, endpoint),
                    None => axum::routing::on(filter, endpoint),
                });
            }
            if let Some(method_router) = method_router {
                router = router.route(&path, method_router);
            }
        }
        router
    }
}

fn declares_params(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with(':') || segment.starts_with('*'))
}

fn path_rejection_message(rejection: &PathRejection) -> String {
    if let PathRejection::FailedToDeserializePathParams(err) = rejection {
        if let ErrorKind::InvalidUtf8InPathParam { key } = err.kind() {
            return format!("\"{key}\" is not valid UTF-8");
        }
    }
    rejection.body_text()
}

/// Empty or non-JSON bodies read as `null`; body rules then see absent fields.
fn parse_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

#[instrument(skip_all, fields(route = %state.pipeline.policy().label()))]
async fn dispatch(state: RouteState, mut ctx: RequestContext) -> Response {
    let span = state.tracer.span(
        ctx.method().as_str(),
        ctx.path(),
        &ctx.request_id().to_string(),
    );
    let started = Instant::now();
    let outcome = state.pipeline.run(&mut ctx).instrument(span).await;
    match outcome {
        Ok(response) => {
            let elapsed = started.elapsed().as_millis();
            state
                .events
                .on_dispatch(&ctx, response.status().as_u16(), Some(elapsed));
            response
        }
        Err(err) => state.translator.translate(&ctx, &err).into_response(),
    }
}

async fn healthz_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialResolver, TokenSources};
    use crate::events::NoopEvents;
    use crate::handler::{handler_fn, Flow};
    use crate::pipeline::GateServices;
    use crate::plugins::HmacBearerPlugin;
    use crate::schema::FieldRuleValidator;
    use crate::scope::ScopedServiceAttacher;
    use axum::http::{Request, StatusCode};
    use permission_store::{InMemoryPermissionStore, PermissionLoader};
    use tower::ServiceExt;

    fn gate_router() -> GateRouter {
        let resolver = CredentialResolver::new(TokenSources::default())
            .with_plugin(Arc::new(HmacBearerPlugin::new("secret")));
        let builder = PipelineBuilder::new(GateServices {
            resolver: Arc::new(resolver),
            loader: PermissionLoader::new(Arc::new(InMemoryPermissionStore::new())),
            validator: Arc::new(FieldRuleValidator),
            attacher: ScopedServiceAttacher::default(),
        });
        GateRouter::new(builder, Arc::new(NoopEvents), GateTracer::default())
    }

    fn responder(status: StatusCode) -> crate::handler::SharedHandler {
        handler_fn(move |_| Ok(Flow::respond(status)))
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let router = gate_router().into_router();
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn methods_on_one_path_share_a_route() {
        let mut gate = gate_router();
        gate.register(
            RoutePolicy::builder(Method::GET, "/items")
                .handler(responder(StatusCode::OK))
                .build()
                .unwrap(),
        )
        .unwrap();
        gate.register(
            RoutePolicy::builder(Method::POST, "/items")
                .handler(responder(StatusCode::CREATED))
                .build()
                .unwrap(),
        )
        .unwrap();
        let router = gate.into_router();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/items")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/items")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn duplicate_routes_rejected() {
        let mut gate = gate_router();
        let policy = || {
            RoutePolicy::builder(Method::GET, "/items")
                .handler(responder(StatusCode::OK))
                .build()
                .unwrap()
        };
        gate.register(policy()).unwrap();
        assert!(matches!(
            gate.register(policy()),
            Err(PolicyError::DuplicateRoute(_))
        ));
        assert_eq!(gate.len(), 1);
    }

    #[test]
    fn configure_value_requires_list() {
        let mut gate = gate_router();
        let err = gate
            .configure_value(&json!({"routes": []}), &HandlerRegistry::new())
            .unwrap_err();
        assert!(matches!(err, PolicyError::NotAList));
    }

    #[test]
    fn param_declarations_are_detected() {
        assert!(declares_params("/restricted/:id"));
        assert!(declares_params("/files/*rest"));
        assert!(!declares_params("/profile"));
        assert!(!declares_params("/"));
    }
}
