use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required.")]
    Unauthenticated,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(anyhow::Error),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Server misconfigured: {0}")]
    Misconfigured(String),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Short machine-friendly label, used as a metrics outcome.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::UpstreamFailure(_) => "upstream_failure",
            AppError::InvalidPayload(_) => "invalid_payload",
            AppError::InvalidSignature(_) => "invalid_signature",
            AppError::Misconfigured(_) => "misconfigured",
            AppError::DatabaseError(_) => "database_error",
            AppError::ConfigError(_) => "config_error",
            AppError::InternalError(_) => "internal_error",
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let message = err
            .field_errors()
            .values()
            .flat_map(|errors| errors.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| err.to_string());
        AppError::InvalidArgument(message)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details) = match self {
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Authentication required.".to_string(),
                None,
            ),
            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::UpstreamFailure(err) => (
                StatusCode::BAD_GATEWAY,
                "Upstream failure".to_string(),
                Some(err.to_string()),
            ),
            AppError::InvalidPayload(msg) => (
                StatusCode::BAD_REQUEST,
                "Invalid payload".to_string(),
                Some(msg),
            ),
            AppError::InvalidSignature(msg) => (
                StatusCode::BAD_REQUEST,
                "Invalid signature".to_string(),
                Some(msg),
            ),
            AppError::Misconfigured(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server misconfigured".to_string(),
                Some(msg),
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
            ),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(format!("{:#}", err)),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}
