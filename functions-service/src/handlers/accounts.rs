//! Account provisioning on the auth platform's user-created trigger.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use rand::seq::SliceRandom;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::utils::signature::constant_time_eq;
use std::sync::Arc;
use validator::Validate;

use crate::dtos::UserCreatedRequest;
use crate::models::AccountProfile;
use crate::services::AccountStore;
use crate::startup::AppState;

pub const TRIGGER_TOKEN_HEADER: &str = "X-Trigger-Token";

/// Seeds a new user's profile with an email and a random profile image.
pub struct AccountProvisioningHandler {
    accounts: Arc<dyn AccountStore>,
    trigger_token: Option<Secret<String>>,
    image_urls: Vec<String>,
}

impl AccountProvisioningHandler {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        trigger_token: Option<Secret<String>>,
        image_urls: Vec<String>,
    ) -> Self {
        Self {
            accounts,
            trigger_token,
            image_urls,
        }
    }

    /// Check the shared token presented by the trigger source.
    pub fn authorize(&self, presented: Option<&str>) -> Result<(), AppError> {
        let expected = self.trigger_token.as_ref().ok_or_else(|| {
            AppError::Misconfigured("Trigger token is not configured".to_string())
        })?;

        match presented {
            Some(token) if constant_time_eq(expected.expose_secret(), token) => Ok(()),
            _ => Err(AppError::Unauthenticated),
        }
    }

    pub async fn handle(&self, request: UserCreatedRequest) -> Result<AccountProfile, AppError> {
        request.validate()?;

        let profile = AccountProfile {
            profile_image: self.pick_profile_image(),
            email: request.email.filter(|email| !email.is_empty()),
        };

        self.accounts
            .upsert_profile(&request.uid, &profile)
            .await
            .map_err(|e| {
                tracing::error!(uid = %request.uid, error = %e, "Failed to provision account");
                AppError::DatabaseError(e)
            })?;

        tracing::info!(uid = %request.uid, "Account provisioned");
        Ok(profile)
    }

    fn pick_profile_image(&self) -> Option<String> {
        self.image_urls.choose(&mut rand::thread_rng()).cloned()
    }
}

/// `POST /triggers/user-created`
pub async fn user_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let presented = headers
        .get(TRIGGER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    state.provisioning.authorize(presented)?;

    let request: UserCreatedRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidArgument(format!("Malformed request body: {}", e)))?;

    state.provisioning.handle(request).await?;
    Ok(StatusCode::NO_CONTENT)
}
