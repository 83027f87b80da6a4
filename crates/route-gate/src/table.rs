//! Declarative route tables.
//!
//! ```yaml
//! - method: GET
//!   path: /profile
//!   handler:
//!     profileFullAccess: profile-full
//!     profileLimitedReadOnlyAccess: [audit, profile-limited]
//! - method: GET
//!   path: /restricted/:id
//!   handler: ok
//!   auth: { plugin: bearer, permissions: [profileFullAccess] }
//!   validate:
//!     fields:
//!       - { name: id, in: params, rules: [{ rule: number }] }
//! ```
//!
//! `handler` is a registered handler name, a list of names, or a
//! permission-to-handlers mapping whose key order is the resolution order.

use axum::http::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::DEFAULT_AUTH_PLUGIN;
use crate::errors::{PolicyError, PolicyResult};
use crate::handler::{HandlerRegistry, HandlerSet, SharedHandler};
use crate::policy::RoutePolicy;
use crate::schema::SchemaDescriptor;

#[derive(Debug, Deserialize)]
struct RouteEntry {
    method: String,
    path: String,
    handler: Value,
    #[serde(default)]
    auth: Option<AuthEntry>,
    #[serde(default)]
    validate: Option<SchemaDescriptor>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    #[serde(default = "default_plugin")]
    plugin: String,
    #[serde(default)]
    permissions: Vec<String>,
}

fn default_plugin() -> String {
    DEFAULT_AUTH_PLUGIN.to_string()
}

pub fn parse_routes(value: &Value, registry: &HandlerRegistry) -> PolicyResult<Vec<RoutePolicy>> {
    let entries = value.as_array().ok_or(PolicyError::NotAList)?;
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| parse_entry(idx, entry, registry))
        .collect()
}

fn parse_entry(idx: usize, raw: &Value, registry: &HandlerRegistry) -> PolicyResult<RoutePolicy> {
    let entry: RouteEntry = serde_json::from_value(raw.clone())
        .map_err(|err| PolicyError::InvalidRoute(format!("entry {idx}: {err}")))?;
    let method = parse_method(&entry.method)?;

    let mut builder = RoutePolicy::builder(method, entry.path.clone());
    builder = match &entry.handler {
        Value::String(name) => builder.handler(lookup(registry, name)?),
        Value::Array(_) => builder.handlers(handler_list(&entry.handler, registry, &entry.path)?),
        Value::Object(map) => {
            for (permission, handlers) in map {
                let list = handler_list(handlers, registry, &entry.path)?;
                let set = HandlerSet::new(list)
                    .ok_or_else(|| PolicyError::EmptyHandlerList(entry.path.clone()))?;
                builder = builder.permission(permission.clone(), set);
            }
            builder
        }
        _ => {
            return Err(PolicyError::InvalidRoute(format!(
                "entry {idx}: handler must be a name, a list or a permission map"
            )))
        }
    };

    if let Some(auth) = entry.auth {
        builder = builder.auth(auth.plugin);
        for permission in auth.permissions {
            builder = builder.require(permission);
        }
    }
    if let Some(schema) = entry.validate {
        builder = builder.validate(schema);
    }
    builder.build()
}

pub(crate) fn parse_method(raw: &str) -> PolicyResult<Method> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| PolicyError::UnsupportedMethod(raw.to_string()))
}

fn lookup(registry: &HandlerRegistry, name: &str) -> PolicyResult<SharedHandler> {
    registry
        .get(name)
        .ok_or_else(|| PolicyError::UnknownHandler(name.to_string()))
}

fn handler_list(
    value: &Value,
    registry: &HandlerRegistry,
    path: &str,
) -> PolicyResult<Vec<SharedHandler>> {
    match value {
        Value::String(name) => Ok(vec![lookup(registry, name)?]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| {
                        PolicyError::InvalidRoute(format!("{path}: handler names must be strings"))
                    })
                    .and_then(|name| lookup(registry, name))
            })
            .collect(),
        _ => Err(PolicyError::InvalidRoute(format!(
            "{path}: handler names must be strings"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Flow};
    use crate::policy::RouteHandler;
    use serde_json::json;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new()
            .with("ok", handler_fn(|_| Ok(Flow::Next)))
            .with("audit", handler_fn(|_| Ok(Flow::Next)))
    }

    #[test]
    fn non_list_is_rejected() {
        let err = parse_routes(&json!({"method": "GET"}), &registry()).unwrap_err();
        assert!(matches!(err, PolicyError::NotAList));
    }

    #[test]
    fn permission_map_keeps_declared_order() {
        let routes = parse_routes(
            &json!([{
                "method": "get",
                "path": "/profile",
                "handler": {
                    "profileLimitedReadOnlyAccess": ["audit", "ok"],
                    "profileFullAccess": "ok"
                }
            }]),
            &registry(),
        )
        .unwrap();
        let policy = &routes[0];
        assert_eq!(policy.method(), &Method::GET);
        assert_eq!(
            policy.accepted_permissions(),
            vec!["profileLimitedReadOnlyAccess", "profileFullAccess"]
        );
        match policy.handler() {
            RouteHandler::ByPermission(map) => assert_eq!(map[0].1.len(), 2),
            other => panic!("unexpected handler {other:?}"),
        }
    }

    #[test]
    fn auth_and_schema_sections() {
        let routes = parse_routes(
            &json!([{
                "method": "GET",
                "path": "/restricted/:id",
                "handler": "ok",
                "auth": {"permissions": ["profileFullAccess"]},
                "validate": {"fields": [{"name": "id", "in": "params", "rules": [{"rule": "number"}]}]}
            }]),
            &registry(),
        )
        .unwrap();
        let auth = routes[0].auth().unwrap();
        assert_eq!(auth.plugin_kind, "bearer");
        assert_eq!(auth.required_permissions, vec!["profileFullAccess".to_string()]);
        assert!(routes[0].validate().is_some());
    }

    #[test]
    fn unknown_handler_name_fails() {
        let err = parse_routes(
            &json!([{"method": "GET", "path": "/x", "handler": "missing"}]),
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownHandler(name) if name == "missing"));
    }
}
