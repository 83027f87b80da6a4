//! Warden library
//!
//! Exposes the application wiring for the binary and integration tests.

pub mod app;
pub mod cli;
pub mod config;
pub mod handlers;

pub use app::{build_app, build_gate, load_grants};
pub use config::{AuthConfig, SettingsError, TokenFallbacks, WardenConfig, AUTH_SECRET_ENV};
