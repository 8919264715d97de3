//! Stripe webhook receiver.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use service_core::error::AppError;
use std::sync::Arc;

use crate::models::CreditGrant;
use crate::services::metrics::{record_credits_granted, record_webhook_event};
use crate::services::providers::stripe::{
    WebhookVerifier, CHECKOUT_SESSION_COMPLETED, SIGNATURE_HEADER,
};
use crate::services::AccountStore;
use crate::startup::AppState;

/// What a verified delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Credited { uid: String, session_id: String },
    /// Redelivery of a session that already produced credits.
    AlreadyCredited { uid: String, session_id: String },
    /// Completed session without a uid in its metadata. Acknowledged, no write.
    MissingUid { session_id: String },
    /// Completed session whose payment has not settled yet. Acknowledged, no write.
    PaymentPending { session_id: String },
    Ignored { event_type: String },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Credited { .. } => "credited",
            WebhookOutcome::AlreadyCredited { .. } => "already_credited",
            WebhookOutcome::MissingUid { .. } => "missing_uid",
            WebhookOutcome::PaymentPending { .. } => "payment_pending",
            WebhookOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Grants credits for completed checkout sessions.
pub struct WebhookHandler {
    verifier: Option<WebhookVerifier>,
    accounts: Arc<dyn AccountStore>,
    credits_per_purchase: i64,
}

impl WebhookHandler {
    pub fn new(
        verifier: Option<WebhookVerifier>,
        accounts: Arc<dyn AccountStore>,
        credits_per_purchase: i64,
    ) -> Self {
        if verifier.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not configured - webhook deliveries will fail");
        }
        Self {
            verifier,
            accounts,
            credits_per_purchase,
        }
    }

    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        let verifier = self.verifier.as_ref().ok_or_else(|| {
            AppError::Misconfigured("Stripe webhook secret is not configured".to_string())
        })?;

        let event = verifier.verify(payload, signature)?;
        let event_id = event.id.as_deref().unwrap_or("-");

        if event.event_type != CHECKOUT_SESSION_COMPLETED {
            tracing::debug!(event_id, event_type = %event.event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let session = event.as_completed_checkout()?;

        if !session.is_paid() {
            tracing::info!(
                event_id,
                session_id = %session.id,
                payment_status = session.payment_status.as_deref().unwrap_or("-"),
                "Checkout session completed without settled payment"
            );
            return Ok(WebhookOutcome::PaymentPending {
                session_id: session.id,
            });
        }

        let Some(uid) = session.uid() else {
            tracing::warn!(event_id, session_id = %session.id, "Completed checkout session has no uid");
            return Ok(WebhookOutcome::MissingUid {
                session_id: session.id,
            });
        };

        let grant = self
            .accounts
            .grant_credits(uid, &session.id, self.credits_per_purchase)
            .await
            .map_err(|e| {
                tracing::error!(uid = %uid, session_id = %session.id, error = %e, "Failed to grant credits");
                AppError::DatabaseError(e)
            })?;

        let outcome = match grant {
            CreditGrant::Granted => {
                tracing::info!(
                    uid = %uid,
                    session_id = %session.id,
                    credits = self.credits_per_purchase,
                    "Credits granted"
                );
                record_credits_granted(self.credits_per_purchase);
                WebhookOutcome::Credited {
                    uid: uid.to_string(),
                    session_id: session.id.clone(),
                }
            }
            CreditGrant::AlreadyGranted => {
                tracing::info!(uid = %uid, session_id = %session.id, "Session already credited");
                WebhookOutcome::AlreadyCredited {
                    uid: uid.to_string(),
                    session_id: session.id.clone(),
                }
            }
        };

        Ok(outcome)
    }
}

/// `POST /webhooks/stripe`
///
/// Acknowledges with an empty 200. Any non-2xx makes Stripe redeliver.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.webhook.handle(&body, signature).await {
        Ok(outcome) => {
            record_webhook_event(outcome.label());
            Ok(StatusCode::OK)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Webhook delivery rejected");
            record_webhook_event(e.kind());
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryAccountStore;
    use secrecy::Secret;
    use service_core::utils::signature::generate_signature;

    const SECRET: &str = "whsec_handler";

    fn handler(store: Arc<InMemoryAccountStore>) -> WebhookHandler {
        WebhookHandler::new(
            Some(WebhookVerifier::new(Secret::new(SECRET.to_string()), 300)),
            store,
            100,
        )
    }

    fn signed(body: &str) -> String {
        let t = chrono::Utc::now().timestamp();
        format!("t={},v1={}", t, generate_signature(SECRET, t, body).unwrap())
    }

    fn completed(session_id: &str, uid: Option<&str>) -> String {
        let metadata = match uid {
            Some(uid) => serde_json::json!({ "uid": uid, "plan": "Basic", "gclid": "" }),
            None => serde_json::json!({}),
        };
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": { "id": session_id, "metadata": metadata, "payment_status": "paid" }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn redelivery_credits_once() {
        let store = Arc::new(InMemoryAccountStore::new());
        let handler = handler(store.clone());
        let body = completed("cs_1", Some("u1"));

        let first = handler.handle(body.as_bytes(), Some(&signed(&body))).await.unwrap();
        let second = handler.handle(body.as_bytes(), Some(&signed(&body))).await.unwrap();

        assert_eq!(first.label(), "credited");
        assert_eq!(second.label(), "already_credited");
        assert_eq!(store.snapshot("u1").unwrap().credits, 100);
    }

    #[tokio::test]
    async fn missing_uid_is_acknowledged_without_write() {
        let store = Arc::new(InMemoryAccountStore::new());
        let body = completed("cs_2", None);

        let outcome = handler(store.clone())
            .handle(body.as_bytes(), Some(&signed(&body)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::MissingUid {
                session_id: "cs_2".into()
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unpaid_session_is_not_credited() {
        let store = Arc::new(InMemoryAccountStore::new());
        let body = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {
                "object": { "id": "cs_4", "metadata": { "uid": "u1" }, "payment_status": "unpaid" }
            }
        })
        .to_string();

        let outcome = handler(store.clone())
            .handle(body.as_bytes(), Some(&signed(&body)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::PaymentPending {
                session_id: "cs_4".into()
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn other_event_types_are_ignored() {
        let store = Arc::new(InMemoryAccountStore::new());
        let body = r#"{"type":"payment_intent.created","data":{"object":{"id":"pi_1"}}}"#;

        let outcome = handler(store.clone())
            .handle(body.as_bytes(), Some(&signed(body)))
            .await
            .unwrap();

        assert_eq!(outcome.label(), "ignored");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_secret_is_misconfigured() {
        let store = Arc::new(InMemoryAccountStore::new());
        let handler = WebhookHandler::new(None, store, 100);
        let body = completed("cs_3", Some("u1"));

        let result = handler.handle(body.as_bytes(), Some(&signed(&body))).await;
        assert!(matches!(result, Err(AppError::Misconfigured(_))));
    }
}
