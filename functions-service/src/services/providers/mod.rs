//! External provider abstractions and implementations.
//!
//! Each collaborator (LLM, payments, analytics) sits behind a trait so the
//! handlers can be built with real HTTP clients or with the mocks in
//! [`mock`].

pub mod analytics;
pub mod mock;
pub mod openai;
pub mod stripe;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Chat-completion backend (e.g., OpenAI).
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    /// Run one chat request and return the first choice's content, untrimmed.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

/// Parameters for a hosted checkout session with a single line item.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    pub price_id: String,
    pub quantity: u32,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: Option<String>,
    /// Opaque key/values echoed back on the completed-session webhook.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Payment backend (e.g., Stripe Checkout).
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;
}

/// A named analytics event about one user.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsEvent {
    pub client_id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub params: BTreeMap<String, String>,
}

/// Analytics collector (e.g., GA4 Measurement Protocol).
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn send_event(&self, event: &AnalyticsEvent) -> Result<(), ProviderError>;
}

/// Build the shared outbound HTTP client.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}
