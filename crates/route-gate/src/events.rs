use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{error, info};
use warden_core_types::{FailureKind, GateError};

use crate::context::RequestContext;

/// Record of a request the gate turned away or failed.
#[derive(Debug, Clone, Serialize)]
pub struct GateFailureEvent {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub kind: FailureKind,
    pub status: u16,
    pub message: String,
    pub metadata: Value,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Record of a request that passed every gate and reached its handlers.
#[derive(Debug, Clone, Serialize)]
pub struct GateDispatchEvent {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub identity: Option<String>,
    pub permission: Option<String>,
    pub status: u16,
    pub latency_ms: Option<u128>,
    pub timestamp: i64,
}

/// Event sink; downstream systems can plug in error reporting or audit.
pub trait EventsPort: Send + Sync {
    fn on_failure(&self, ctx: &RequestContext, err: &GateError, status: u16) {
        let event = GateFailureEvent {
            request_id: ctx.request_id().to_string(),
            method: ctx.method().to_string(),
            path: ctx.path().to_string(),
            kind: err.kind(),
            status,
            message: err.message().to_string(),
            metadata: ctx.diagnostics(),
            timestamp: now(),
        };
        self.gate_failure(event);
    }

    fn on_dispatch(&self, ctx: &RequestContext, status: u16, latency_ms: Option<u128>) {
        let event = GateDispatchEvent {
            request_id: ctx.request_id().to_string(),
            method: ctx.method().to_string(),
            path: ctx.path().to_string(),
            identity: ctx.credential().map(|cred| cred.identity.to_string()),
            permission: ctx.permission().map(|perm| perm.name.clone()),
            status,
            latency_ms,
            timestamp: now(),
        };
        self.gate_dispatch(event);
    }

    fn gate_failure(&self, _event: GateFailureEvent) {}
    fn gate_dispatch(&self, _event: GateDispatchEvent) {}
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub struct NoopEvents;

impl EventsPort for NoopEvents {}

/// Emits every event through `tracing` under the `warden.events` target.
#[derive(Default)]
pub struct TracingEvents;

impl EventsPort for TracingEvents {
    fn gate_failure(&self, event: GateFailureEvent) {
        // Only server faults are reportable; client rejections are already
        // logged by the translator.
        if event.kind == FailureKind::Internal {
            error!(
                target: "warden.events",
                request_id = %event.request_id,
                method = %event.method,
                path = %event.path,
                status = event.status,
                message = %event.message,
                metadata = %event.metadata,
                "gate failure reported"
            );
        }
    }

    fn gate_dispatch(&self, event: GateDispatchEvent) {
        info!(
            target: "warden.events",
            request_id = %event.request_id,
            method = %event.method,
            path = %event.path,
            identity = event.identity.as_deref().unwrap_or("-"),
            permission = event.permission.as_deref().unwrap_or("-"),
            status = event.status,
            latency_ms = event.latency_ms.map(|ms| ms as u64),
            "request dispatched"
        );
    }
}
