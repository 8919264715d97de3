//! Request and response bodies for the callable endpoints and triggers.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

/// Envelope returned by every callable. Failures travel in-band so the
/// caller always receives a well-formed body.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CallableResponse<T> {
    Success(T),
    Failure { error: String },
}

impl<T> From<Result<T, AppError>> for CallableResponse<T> {
    fn from(result: Result<T, AppError>) -> Self {
        match result {
            Ok(value) => CallableResponse::Success(value),
            Err(err) => CallableResponse::Failure {
                error: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "userPrompt is required"))]
    pub user_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Ad-click campaign identifier carried through to the webhook.
    #[serde(default)]
    pub gclid: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserCreatedRequest {
    #[validate(length(min = 1, message = "uid is required"))]
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Decode a callable body. An empty body is treated as `{}`.
pub fn parse_callable_body<T>(body: &[u8]) -> Result<T, AppError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidArgument(format!("Malformed request body: {}", e)))
}
