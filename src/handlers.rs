//! Built-in handlers that declarative route tables can name.

use axum::http::StatusCode;
use axum::Json;
use route_gate::{handler_fn, Flow, HandlerRegistry, RequestContext};
use serde_json::{json, Value};
use tracing::info;

pub fn builtin_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(
            "ok",
            handler_fn(|ctx| Ok(Flow::respond((StatusCode::OK, Json(grant_view(ctx)))))),
        )
        .with(
            "accepted",
            handler_fn(|ctx| Ok(Flow::respond((StatusCode::ACCEPTED, Json(grant_view(ctx)))))),
        )
        .with(
            "whoami",
            handler_fn(|ctx| {
                let body = ctx
                    .credential()
                    .map(|cred| cred.summary())
                    .unwrap_or(Value::Null);
                Ok(Flow::respond(Json(body)))
            }),
        )
        .with(
            "echo",
            handler_fn(|ctx| {
                Ok(Flow::respond(Json(json!({
                    "params": ctx.params,
                    "query": ctx.query,
                    "body": ctx.body,
                }))))
            }),
        )
        .with(
            "scoped",
            handler_fn(|ctx| Ok(Flow::respond(Json(scope_view(ctx))))),
        )
        .with(
            "audit",
            handler_fn(|ctx| {
                info!(
                    request_id = %ctx.request_id(),
                    path = ctx.path(),
                    identity = ctx
                        .credential()
                        .map(|cred| cred.identity.as_str())
                        .unwrap_or("-"),
                    "audited request"
                );
                Ok(Flow::Next)
            }),
        )
}

fn grant_view(ctx: &RequestContext) -> Value {
    json!({
        "status": "ok",
        "identity": ctx.credential().map(|cred| cred.identity.as_str()),
        "permission": ctx.permission().map(|perm| perm.name.as_str()),
    })
}

fn scope_view(ctx: &RequestContext) -> Value {
    let handle = ctx
        .permission()
        .and_then(|perm| perm.data_scope.as_ref())
        .and_then(|scope| ctx.scoped(&scope.resource_kind));
    match handle {
        Some(handle) => json!({
            "resource_kind": handle.resource_kind(),
            "scope_name": handle.scope_name(),
            "scope_value": handle.scope_value(),
            "access": handle.access(),
        }),
        None => json!({"scope": null}),
    }
}
