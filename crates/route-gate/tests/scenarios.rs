use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::{Json, Router};
use permission_store::{default_grants_file, InMemoryPermissionStore};
use route_gate::{
    handler_fn, FieldSpec, Flow, GateBootstrap, HandlerSet, HmacBearerPlugin, NoopEvents,
    RoutePolicy, SchemaDescriptor, ScopedHandle, TokenClaims, TokenSources,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "scenario-secret";

fn token(sub: &str, role: &str) -> String {
    HmacBearerPlugin::new(SECRET)
        .mint(&TokenClaims::new(sub).with_role(role))
        .unwrap()
}

async fn router() -> Router {
    let store = InMemoryPermissionStore::with_grants(default_grants_file())
        .await
        .unwrap();
    let mut gate = GateBootstrap::new(Arc::new(store))
        .with_plugin(Arc::new(HmacBearerPlugin::new(SECRET)))
        .with_events(Arc::new(NoopEvents))
        .build_router();

    let full = handler_fn(|_| Ok(Flow::respond((StatusCode::OK, Json(json!({"view": "full"}))))));
    let limited = handler_fn(|ctx| {
        let scope = ctx.scoped_as::<ScopedHandle>("profile").cloned();
        Ok(Flow::respond((
            StatusCode::ACCEPTED,
            Json(json!({"view": "limited", "scope": scope})),
        )))
    });

    gate.configure(vec![
        RoutePolicy::builder(Method::GET, "/profile/full")
            .permission("profileFullAccess", HandlerSet::single(full.clone()))
            .build()
            .unwrap(),
        RoutePolicy::builder(Method::GET, "/profile")
            .permission("profileFullAccess", HandlerSet::single(full.clone()))
            .permission("profileLimitedReadOnlyAccess", HandlerSet::single(limited))
            .build()
            .unwrap(),
        RoutePolicy::builder(Method::GET, "/open")
            .handler(handler_fn(|_| Ok(Flow::respond("hello"))))
            .build()
            .unwrap(),
        RoutePolicy::builder(Method::GET, "/restricted/:id")
            .require("profileFullAccess")
            .require("profileLimitedReadOnlyAccess")
            .validate(SchemaDescriptor::new().field(FieldSpec::params("id").number()))
            .handler(handler_fn(|ctx| {
                let id = ctx.params.get("id").cloned().unwrap_or_default();
                Ok(Flow::respond(Json(json!({"id": id}))))
            }))
            .build()
            .unwrap(),
    ])
    .unwrap();
    gate.into_router()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let response = router().await.oneshot(get("/profile", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await,
        json!({"code": "unauthorized", "message": "Missing authorization token."})
    );
}

#[tokio::test]
async fn missing_permission_is_forbidden() {
    let user = token("u-1", "user");
    let response = router()
        .await
        .oneshot(get("/profile/full", Some(&user)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], "forbidden");
    assert_eq!(
        body["message"],
        "Missing permissions. One of the following required: profileFullAccess"
    );
}

#[tokio::test]
async fn matching_permission_reaches_its_handler_with_scope() {
    let user = token("u-1", "user");
    let response = router()
        .await
        .oneshot(get("/profile", Some(&user)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["view"], "limited");
    assert_eq!(body["scope"]["resource_kind"], "profile");
    assert_eq!(body["scope"]["scope_name"], "limited");
    assert_eq!(body["scope"]["scope_value"], "u-1");
    assert_eq!(body["scope"]["access"], "read_only");

    let admin = token("a-1", "admin");
    let response = router()
        .await
        .oneshot(get("/profile", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["view"], "full");
}

#[tokio::test]
async fn open_route_always_reaches_handler() {
    let router = router().await;
    let response = router.clone().oneshot(get("/open", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(get("/open", Some("garbage")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn schema_failure_is_bad_request() {
    let admin = token("a-1", "admin");
    let response = router()
        .await
        .oneshot(get("/restricted/stringcheese", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({"code": "invalid_argument", "message": "\"id\" must be a number"})
    );
}

#[tokio::test]
async fn authentication_precedes_validation() {
    let response = router()
        .await
        .oneshot(get("/restricted/stringcheese", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_input_passes_every_gate() {
    let user = token("u-1", "user");
    let response = router()
        .await
        .oneshot(get("/restricted/42", Some(&user)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], "42");
}

#[tokio::test]
async fn expired_and_malformed_tokens_are_unauthorized() {
    let expired = HmacBearerPlugin::new(SECRET)
        .mint(&TokenClaims::new("u-1").with_role("user").expires_at(1))
        .unwrap();
    let response = router()
        .await
        .oneshot(get("/profile", Some(&expired)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await["message"],
        "Authorization token expired."
    );

    let request = Request::builder()
        .uri("/profile")
        .header("authorization", "Token abc")
        .body(Body::empty())
        .unwrap();
    let response = router().await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await["message"],
        "Malformed authorization token."
    );
}

#[tokio::test]
async fn undecodable_path_param_is_bad_request() {
    let admin = token("a-1", "admin");
    let response = router()
        .await
        .oneshot(get("/restricted/%FF", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({"code": "invalid_argument", "message": "\"id\" is not valid UTF-8"})
    );
}

#[tokio::test]
async fn undecodable_path_param_still_checks_access_first() {
    let router = router().await;
    let response = router
        .clone()
        .oneshot(get("/restricted/%FF", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let guest = token("g-1", "guest");
    let response = router
        .oneshot(get("/restricted/%FF", Some(&guest)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

async fn body_router() -> Router {
    let store = InMemoryPermissionStore::with_grants(default_grants_file())
        .await
        .unwrap();
    let mut gate = GateBootstrap::new(Arc::new(store))
        .with_plugin(Arc::new(HmacBearerPlugin::new(SECRET)))
        .with_token_sources(
            TokenSources::default()
                .with_query_field("access_token")
                .with_body_field("access_token"),
        )
        .with_events(Arc::new(NoopEvents))
        .build_router();

    let echo = handler_fn(|ctx| Ok(Flow::respond(Json(ctx.body.clone()))));
    gate.configure(vec![
        RoutePolicy::builder(Method::POST, "/profile")
            .require("profileFullAccess")
            .validate(SchemaDescriptor::new().field(FieldSpec::body("email").required()))
            .handler(echo.clone())
            .build()
            .unwrap(),
        RoutePolicy::builder(Method::POST, "/notes")
            .validate(SchemaDescriptor::new().field(FieldSpec::body("text").required()))
            .handler(echo)
            .build()
            .unwrap(),
    ])
    .unwrap();
    gate.into_router()
}

fn post(uri: &str, bearer: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(body.into()).unwrap()
}

#[tokio::test]
async fn non_json_body_fails_body_rules() {
    let response = body_router()
        .await
        .oneshot(post("/notes", None, "text=hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["message"],
        "\"text\" is required"
    );

    let admin = token("a-1", "admin");
    let response = body_router()
        .await
        .oneshot(post("/profile", Some(&admin), "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["message"],
        "\"email\" is required"
    );
}

#[tokio::test]
async fn body_token_fallback_needs_a_json_body() {
    let admin = token("a-1", "admin");
    let payload = json!({"access_token": admin, "email": "a@b.io"}).to_string();
    let response = body_router()
        .await
        .oneshot(post("/profile", None, payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["email"], "a@b.io");

    let form = format!("access_token={admin}&email=a@b.io");
    let response = body_router()
        .await
        .oneshot(post("/profile", None, form))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await["message"],
        "Missing authorization token."
    );
}

#[tokio::test]
async fn query_token_fallback_authenticates() {
    let admin = token("a-1", "admin");
    let response = body_router()
        .await
        .oneshot(post(
            &format!("/profile?access_token={admin}"),
            None,
            json!({"email": "a@b.io"}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let user = token("u-1", "user");
    let response = body_router()
        .await
        .oneshot(post(
            &format!("/profile?access_token={user}"),
            None,
            json!({"email": "a@b.io"}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
