//! Stripe payment provider client.
//!
//! Creates Checkout Sessions through the REST API and verifies the signed
//! webhook events Stripe delivers when a session completes.

use super::{
    http_client, CheckoutSession, CheckoutSessionRequest, PaymentProvider, ProviderError,
};
use crate::config::StripeConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::error::AppError;
use service_core::utils::signature::verify_signature;
use std::collections::HashMap;

/// Header Stripe signs webhook deliveries with.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Event type that grants credits.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Stripe client for the Checkout Sessions API.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: Secret<String>,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

impl StripeClient {
    pub fn new(
        secret_key: Secret<String>,
        api_base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            secret_key,
            api_base_url: api_base_url.into(),
        })
    }

    /// Build a client from configuration. `None` when no secret key is set.
    pub fn from_config(
        config: &StripeConfig,
        timeout_secs: u64,
    ) -> Result<Option<Self>, ProviderError> {
        match &config.secret_key {
            Some(key) if !key.expose_secret().is_empty() => Ok(Some(Self::new(
                key.clone(),
                config.api_base_url.clone(),
                timeout_secs,
            )?)),
            _ => Ok(None),
        }
    }

    /// Form-encode a session request the way the Stripe API expects.
    pub fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("line_items[0][price]".to_string(), request.price_id.clone()),
            (
                "line_items[0][quantity]".to_string(),
                request.quantity.to_string(),
            ),
        ];

        if let Some(reference) = &request.client_reference_id {
            form.push(("client_reference_id".to_string(), reference.clone()));
        }

        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        form
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let url = format!(
            "{}/checkout/sessions",
            self.api_base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(self.secret_key.expose_secret(), None::<&str>)
            .form(&Self::session_form(request))
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if status.is_success() {
            let session: CheckoutSessionResponse = serde_json::from_str(&body)
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            tracing::info!(session_id = %session.id, "Stripe checkout session created");
            return Ok(CheckoutSession {
                id: session.id,
                url: session.url,
            });
        }

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }

        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .map(|e| {
                format!(
                    "{} ({})",
                    e.error.message.unwrap_or_default(),
                    e.error.error_type.unwrap_or_else(|| "unknown".into())
                )
            })
            .unwrap_or(body);

        tracing::error!(status = %status, error = %message, "Stripe checkout session creation failed");
        Err(ProviderError::ApiError(format!(
            "Stripe error {}: {}",
            status, message
        )))
    }
}

/// A webhook event envelope. Only `type` and `data.object` are inspected.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Session payment states that mean the funds are settled.
const SETTLED_PAYMENT_STATUSES: [&str; 2] = ["paid", "no_payment_required"];

/// The `data.object` of a `checkout.session.completed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletedCheckoutSession {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

/// Stripe sends `"metadata": null` on sessions created without metadata.
fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<HashMap<String, String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl CompletedCheckoutSession {
    /// Delayed payment methods complete the session before the money arrives.
    pub fn is_paid(&self) -> bool {
        self.payment_status
            .as_deref()
            .is_some_and(|status| SETTLED_PAYMENT_STATUSES.contains(&status))
    }

    /// uid stored in the session metadata at checkout time.
    pub fn uid(&self) -> Option<&str> {
        self.metadata
            .get("uid")
            .map(String::as_str)
            .filter(|uid| !uid.is_empty())
    }
}

impl StripeEvent {
    pub fn as_completed_checkout(&self) -> Result<CompletedCheckoutSession, AppError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            AppError::InvalidPayload(format!("checkout session object is malformed: {}", e))
        })
    }
}

/// Verifies `Stripe-Signature` headers: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Secret<String>,
    tolerance_secs: i64,
}

#[derive(Debug, PartialEq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> Result<SignatureHeader, AppError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) if !value.is_empty() => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::InvalidSignature("missing timestamp in signature header".into()))?;

    if signatures.is_empty() {
        return Err(AppError::InvalidSignature(
            "no v1 signature in signature header".into(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

impl WebhookVerifier {
    pub fn new(secret: Secret<String>, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    /// Verify the raw body against the header and decode the event.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<StripeEvent, AppError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<StripeEvent, AppError> {
        let header = header
            .ok_or_else(|| AppError::InvalidSignature("missing Stripe-Signature header".into()))?;
        let parsed = parse_signature_header(header)?;

        let within_tolerance = now
            .checked_sub(parsed.timestamp)
            .is_some_and(|age| age.unsigned_abs() <= self.tolerance_secs.unsigned_abs());
        if !within_tolerance {
            return Err(AppError::InvalidSignature(
                "timestamp outside the tolerance zone".into(),
            ));
        }

        let body = std::str::from_utf8(payload)
            .map_err(|_| AppError::InvalidPayload("body is not valid UTF-8".into()))?;

        let mut matched = false;
        for candidate in &parsed.signatures {
            if verify_signature(self.secret.expose_secret(), parsed.timestamp, body, candidate)? {
                matched = true;
                break;
            }
        }

        if !matched {
            return Err(AppError::InvalidSignature(
                "no signature matches the payload".into(),
            ));
        }

        serde_json::from_str(body).map_err(|e| AppError::InvalidPayload(e.to_string()))
    }
}
