use warden_core_types::{GateError, GateResult, Permission};

use crate::handler::HandlerSet;
use crate::policy::{RouteHandler, RoutePolicy};

/// Outcome of matching a caller's grants against a route.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub permission: Permission,
    pub handlers: HandlerSet,
}

/// Pick the first accepted permission, in declared order, that the caller
/// holds, along with the handler set it selects.
pub fn resolve(granted: &[Permission], policy: &RoutePolicy) -> GateResult<Resolution> {
    let accepted = policy.accepted_permissions();
    let matched = accepted
        .iter()
        .find_map(|name| granted.iter().find(|perm| perm.name == *name))
        .ok_or_else(|| forbidden(&accepted))?;

    let handlers = match policy.handler() {
        RouteHandler::ByPermission(_) => policy.handler().for_permission(&matched.name).cloned(),
        other => other.default_set(),
    }
    .ok_or_else(|| {
        GateError::internal(format!(
            "route {} has no handlers for permission '{}'",
            policy.label(),
            matched.name
        ))
    })?;

    Ok(Resolution {
        permission: matched.clone(),
        handlers,
    })
}

fn forbidden(accepted: &[&str]) -> GateError {
    GateError::forbidden(format!(
        "Missing permissions. One of the following required: {}",
        accepted.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Flow};
    use axum::http::Method;
    use warden_core_types::FailureKind;

    fn mapped_policy() -> RoutePolicy {
        let full = HandlerSet::single(handler_fn(|_| Ok(Flow::Next)));
        let limited = HandlerSet::new(vec![
            handler_fn(|_| Ok(Flow::Next)),
            handler_fn(|_| Ok(Flow::Next)),
        ])
        .unwrap();
        RoutePolicy::builder(Method::GET, "/profile")
            .permission("profileFullAccess", full)
            .permission("profileLimitedReadOnlyAccess", limited)
            .build()
            .unwrap()
    }

    #[test]
    fn empty_intersection_is_forbidden() {
        let err = resolve(&[Permission::new("other")], &mapped_policy()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Forbidden);
        assert_eq!(
            err.message(),
            "Missing permissions. One of the following required: profileFullAccess, profileLimitedReadOnlyAccess"
        );
    }

    #[test]
    fn declared_order_breaks_ties() {
        let granted = vec![
            Permission::new("profileLimitedReadOnlyAccess"),
            Permission::new("profileFullAccess"),
        ];
        let resolution = resolve(&granted, &mapped_policy()).unwrap();
        assert_eq!(resolution.permission.name, "profileFullAccess");
        assert_eq!(resolution.handlers.len(), 1);
    }

    #[test]
    fn selects_mapped_handler_set() {
        let granted = vec![Permission::new("profileLimitedReadOnlyAccess")];
        let resolution = resolve(&granted, &mapped_policy()).unwrap();
        assert_eq!(resolution.permission.name, "profileLimitedReadOnlyAccess");
        assert_eq!(resolution.handlers.len(), 2);
    }

    #[test]
    fn single_handler_uses_required_set() {
        let policy = RoutePolicy::builder(Method::GET, "/reports")
            .handler(handler_fn(|_| Ok(Flow::Next)))
            .require("reportsRead")
            .build()
            .unwrap();
        assert!(resolve(&[], &policy).is_err());
        let resolution = resolve(&[Permission::new("reportsRead")], &policy).unwrap();
        assert_eq!(resolution.handlers.len(), 1);
    }
}
