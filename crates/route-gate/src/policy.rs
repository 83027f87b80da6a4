use std::collections::HashSet;
use std::fmt;

use axum::http::Method;

use crate::auth::DEFAULT_AUTH_PLUGIN;
use crate::errors::{PolicyError, PolicyResult};
use crate::handler::{HandlerSet, SharedHandler};
use crate::schema::SchemaDescriptor;

/// How a route hands off to application code once every gate passes.
#[derive(Clone)]
pub enum RouteHandler {
    Single(SharedHandler),
    List(Vec<SharedHandler>),
    /// Permission name to handler set, in declared (priority) order.
    ByPermission(Vec<(String, HandlerSet)>),
}

impl RouteHandler {
    /// Handler set for routes that do not dispatch on permission.
    pub fn default_set(&self) -> Option<HandlerSet> {
        match self {
            RouteHandler::Single(handler) => Some(HandlerSet::single(handler.clone())),
            RouteHandler::List(handlers) => HandlerSet::new(handlers.clone()),
            RouteHandler::ByPermission(_) => None,
        }
    }

    pub fn is_by_permission(&self) -> bool {
        matches!(self, RouteHandler::ByPermission(_))
    }

    /// Handler set mapped to `permission`, if this is a permission mapping.
    pub fn for_permission(&self, permission: &str) -> Option<&HandlerSet> {
        match self {
            RouteHandler::ByPermission(map) => map
                .iter()
                .find(|(name, _)| name == permission)
                .map(|(_, set)| set),
            _ => None,
        }
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteHandler::Single(_) => f.write_str("Single"),
            RouteHandler::List(list) => write!(f, "List({})", list.len()),
            RouteHandler::ByPermission(map) => f
                .debug_list()
                .entries(map.iter().map(|(name, _)| name))
                .finish(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthRequirement {
    pub plugin_kind: String,
    /// Any-of gate, in priority order. Empty means "authenticated is enough".
    pub required_permissions: Vec<String>,
}

impl AuthRequirement {
    pub fn new(plugin_kind: impl Into<String>) -> Self {
        Self {
            plugin_kind: plugin_kind.into(),
            required_permissions: Vec::new(),
        }
    }
}

/// Immutable per-route configuration.
#[derive(Clone, Debug)]
pub struct RoutePolicy {
    method: Method,
    path: String,
    handler: RouteHandler,
    auth: Option<AuthRequirement>,
    validate: Option<SchemaDescriptor>,
}

impl RoutePolicy {
    pub fn builder(method: Method, path: impl Into<String>) -> RoutePolicyBuilder {
        RoutePolicyBuilder {
            method,
            path: path.into(),
            single: None,
            list: None,
            by_permission: Vec::new(),
            auth_plugin: None,
            required: Vec::new(),
            validate: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    pub fn auth(&self) -> Option<&AuthRequirement> {
        self.auth.as_ref()
    }

    pub fn validate(&self) -> Option<&SchemaDescriptor> {
        self.validate.as_ref()
    }

    pub fn requires_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// Permission names that satisfy the route, in resolution order.
    pub fn accepted_permissions(&self) -> Vec<&str> {
        match &self.handler {
            RouteHandler::ByPermission(map) => map.iter().map(|(name, _)| name.as_str()).collect(),
            _ => self
                .auth
                .iter()
                .flat_map(|auth| auth.required_permissions.iter())
                .map(String::as_str)
                .collect(),
        }
    }

    pub fn is_permission_gated(&self) -> bool {
        self.auth
            .as_ref()
            .map(|auth| !auth.required_permissions.is_empty())
            .unwrap_or(false)
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

pub struct RoutePolicyBuilder {
    method: Method,
    path: String,
    single: Option<SharedHandler>,
    list: Option<Vec<SharedHandler>>,
    by_permission: Vec<(String, HandlerSet)>,
    auth_plugin: Option<String>,
    required: Vec<String>,
    validate: Option<SchemaDescriptor>,
}

impl RoutePolicyBuilder {
    pub fn handler(mut self, handler: SharedHandler) -> Self {
        self.single = Some(handler);
        self
    }

    pub fn handlers(mut self, handlers: Vec<SharedHandler>) -> Self {
        self.list = Some(handlers);
        self
    }

    /// Map a permission to the handler set that serves callers holding it.
    /// Implies authentication with the default plugin unless `auth` is set.
    pub fn permission(mut self, name: impl Into<String>, handlers: HandlerSet) -> Self {
        self.by_permission.push((name.into(), handlers));
        self
    }

    pub fn auth(mut self, plugin_kind: impl Into<String>) -> Self {
        self.auth_plugin = Some(plugin_kind.into());
        self
    }

    /// Add a permission to the any-of gate. Implies authentication.
    pub fn require(mut self, permission: impl Into<String>) -> Self {
        self.required.push(permission.into());
        self
    }

    pub fn validate(mut self, schema: SchemaDescriptor) -> Self {
        self.validate = Some(schema);
        self
    }

    pub fn build(self) -> PolicyResult<RoutePolicy> {
        let label = format!("{} {}", self.method, self.path);
        if !self.path.starts_with('/') {
            return Err(PolicyError::InvalidPath(self.path));
        }

        let shapes = [
            self.single.is_some(),
            self.list.is_some(),
            !self.by_permission.is_empty(),
        ];
        if shapes.iter().filter(|set| **set).count() > 1 {
            return Err(PolicyError::InvalidRoute(format!(
                "{label} declares more than one handler shape"
            )));
        }

        let handler = if let Some(single) = self.single {
            RouteHandler::Single(single)
        } else if let Some(list) = self.list {
            if list.is_empty() {
                return Err(PolicyError::EmptyHandlerList(label));
            }
            RouteHandler::List(list)
        } else if !self.by_permission.is_empty() {
            let mut seen = HashSet::new();
            for (name, _) in &self.by_permission {
                if !seen.insert(name.as_str()) {
                    return Err(PolicyError::DuplicatePermissionKey {
                        route: label,
                        permission: name.clone(),
                    });
                }
            }
            RouteHandler::ByPermission(self.by_permission)
        } else {
            return Err(PolicyError::MissingHandler(label));
        };

        let mut required = Vec::with_capacity(self.required.len());
        for name in self.required {
            if !required.contains(&name) {
                required.push(name);
            }
        }

        if let RouteHandler::ByPermission(map) = &handler {
            let keys: Vec<&String> = map.iter().map(|(name, _)| name).collect();
            if !required.is_empty() {
                let same = required.len() == keys.len()
                    && required.iter().all(|name| keys.contains(&name));
                if !same {
                    return Err(PolicyError::PermissionMismatch(label));
                }
            }
            required = keys.into_iter().cloned().collect();
        }

        let auth = match (self.auth_plugin, required.is_empty()) {
            (Some(plugin), _) => Some(AuthRequirement {
                plugin_kind: plugin,
                required_permissions: required,
            }),
            (None, false) => Some(AuthRequirement {
                plugin_kind: DEFAULT_AUTH_PLUGIN.to_string(),
                required_permissions: required,
            }),
            (None, true) => None,
        };

        Ok(RoutePolicy {
            method: self.method,
            path: self.path,
            handler,
            auth,
            validate: self.validate,
        })
    }
}
