//! HTTP handlers for functions-service.
//!
//! Each function is a self-contained handler struct holding its injected
//! collaborators, plus a thin axum adapter that speaks the wire contract.

pub mod accounts;
pub mod checkout;
pub mod completion;
pub mod webhook;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

use crate::services::metrics::render_metrics;
use crate::services::ProviderError;
use crate::startup::AppState;

pub use accounts::AccountProvisioningHandler;
pub use checkout::{CheckoutSessionHandler, CheckoutSettings};
pub use completion::CompletionHandler;
pub use webhook::{WebhookHandler, WebhookOutcome};

/// Map a provider failure onto the error taxonomy.
pub(crate) fn upstream(err: ProviderError) -> AppError {
    match err {
        ProviderError::NotConfigured(msg) => AppError::Misconfigured(msg),
        other => AppError::UpstreamFailure(other.into()),
    }
}

/// Liveness probe. Reports the account store's reachability.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.accounts.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "functions-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "functions-service",
                "error": e.to_string()
            })),
        ),
    }
}

pub async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

/// Prometheus metrics endpoint.
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        render_metrics(),
    )
}
