//! HTTP front end for the streaming relay.
//!
//! Exposes `POST /generate` and `POST /chat`, checks API keys and hands each
//! accepted request to a shared [`relay::Relay`], streaming its events back as
//! plain text or NDJSON.

pub mod auth;
pub mod error;
pub mod logging;
pub mod web;

pub use auth::{KeyStore, KeyTable, api_key};
pub use error::GatewayError;
pub use logging::init_logging;
pub use web::{AppState, BodyFormat, app};

/// Resolves when the process receives ctrl-c.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
