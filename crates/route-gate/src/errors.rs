use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use warden_core_types::{FailureKind, GateError};

use crate::context::RequestContext;
use crate::events::EventsPort;

/// Route registration and configuration errors. These surface at startup,
/// never per request.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("route {0} has no handler")]
    MissingHandler(String),
    #[error("route {0} has an empty handler list")]
    EmptyHandlerList(String),
    #[error("route {route} maps permission '{permission}' more than once")]
    DuplicatePermissionKey { route: String, permission: String },
    #[error("route {0} declares required permissions that differ from its handler mapping")]
    PermissionMismatch(String),
    #[error("invalid route path: {0}")]
    InvalidPath(String),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("auth plugin '{0}' is not registered")]
    UnknownAuthPlugin(String),
    #[error("route already registered: {0}")]
    DuplicateRoute(String),
    #[error("route configuration must be a list")]
    NotAList,
    #[error("unknown handler '{0}'")]
    UnknownHandler(String),
    #[error("invalid route entry: {0}")]
    InvalidRoute(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

const INTERNAL_MESSAGE: &str = "Internal Server Error";
const UNKNOWN_MESSAGE: &str = "Unknown Error";

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl HttpError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&GateError> for HttpError {
    fn from(value: &GateError) -> Self {
        let message = match value.message() {
            "" => UNKNOWN_MESSAGE,
            msg => msg,
        };
        match value.kind() {
            FailureKind::Unauthenticated => {
                HttpError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
            }
            FailureKind::Forbidden => HttpError::new(StatusCode::FORBIDDEN, "forbidden", message),
            FailureKind::ValidationFailed => {
                HttpError::new(StatusCode::BAD_REQUEST, "invalid_argument", message)
            }
            FailureKind::Internal => HttpError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                INTERNAL_MESSAGE,
            ),
        }
    }
}

impl axum::response::IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(json!({
            "code": self.code,
            "message": self.message,
        }));
        axum::response::IntoResponse::into_response((self.status, body))
    }
}

/// Single point where gate failures become responses.
#[derive(Clone)]
pub struct ErrorTranslator {
    events: Arc<dyn EventsPort>,
}

impl ErrorTranslator {
    pub fn new(events: Arc<dyn EventsPort>) -> Self {
        Self { events }
    }

    pub fn translate(&self, ctx: &RequestContext, err: &GateError) -> HttpError {
        let http = HttpError::from(err);
        let diagnostics = ctx.diagnostics();
        if http.status.is_server_error() {
            error!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = ctx.path(),
                kind = %err.kind(),
                error = %err,
                metadata = %diagnostics,
                "route gate failure"
            );
        } else {
            warn!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = ctx.path(),
                kind = %err.kind(),
                message = http.message(),
                metadata = %diagnostics,
                "request rejected"
            );
        }
        self.events.on_failure(ctx, err, http.status.as_u16());
        http
    }
}
