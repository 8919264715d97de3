//! Checkout session callable.

use axum::{body::Bytes, extract::State, Json};
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::upstream;
use crate::config::FunctionsConfig;
use crate::dtos::{parse_callable_body, CallableResponse, CheckoutRequest, CheckoutResponse};
use crate::middleware::CallerIdentity;
use crate::services::metrics::record_checkout_session;
use crate::services::{AnalyticsEvent, AnalyticsSink, CheckoutSessionRequest, PaymentProvider};
use crate::startup::AppState;

pub const BEGIN_CHECKOUT_EVENT: &str = "begin_checkout";

/// Fixed line item and redirect targets for every session.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub default_plan: String,
}

impl CheckoutSettings {
    pub fn from_config(config: &FunctionsConfig) -> Self {
        Self {
            price_id: config.stripe.price_id.clone(),
            success_url: config.stripe.success_url.clone(),
            cancel_url: config.stripe.cancel_url.clone(),
            default_plan: config.billing.default_plan.clone(),
        }
    }
}

/// Creates payment sessions. Never touches credits: a session is not a payment.
pub struct CheckoutSessionHandler {
    payments: Option<Arc<dyn PaymentProvider>>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    settings: CheckoutSettings,
}

impl CheckoutSessionHandler {
    pub fn new(
        payments: Option<Arc<dyn PaymentProvider>>,
        analytics: Option<Arc<dyn AnalyticsSink>>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            payments,
            analytics,
            settings,
        }
    }

    pub async fn handle(
        &self,
        caller: &CallerIdentity,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, AppError> {
        let payments = self.payments.as_ref().ok_or_else(|| {
            AppError::Misconfigured("Stripe secret key is not configured".to_string())
        })?;

        let gclid = request.gclid.unwrap_or_default();
        let plan = request
            .plan
            .filter(|plan| !plan.is_empty())
            .unwrap_or_else(|| self.settings.default_plan.clone());

        let session_request = CheckoutSessionRequest {
            price_id: self.settings.price_id.clone(),
            quantity: 1,
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
            client_reference_id: Some(caller.uid.clone()),
            metadata: BTreeMap::from([
                ("uid".to_string(), caller.uid.clone()),
                ("gclid".to_string(), gclid.clone()),
                ("plan".to_string(), plan.clone()),
            ]),
        };

        tracing::info!(uid = %caller.uid, plan = %plan, "Creating checkout session");

        let session = payments
            .create_checkout_session(&session_request)
            .await
            .map_err(|e| {
                tracing::error!(uid = %caller.uid, error = %e, "Failed to create checkout session");
                upstream(e)
            })?;

        self.track_begin_checkout(caller, &gclid, &plan, &session.id)
            .await;

        Ok(CheckoutResponse {
            session_id: session.id,
        })
    }

    /// Best-effort: failures are logged, never returned.
    async fn track_begin_checkout(
        &self,
        caller: &CallerIdentity,
        gclid: &str,
        plan: &str,
        session_id: &str,
    ) {
        let Some(analytics) = &self.analytics else {
            return;
        };

        let event = AnalyticsEvent {
            client_id: caller.uid.clone(),
            user_id: Some(caller.uid.clone()),
            name: BEGIN_CHECKOUT_EVENT.to_string(),
            params: BTreeMap::from([
                ("uid".to_string(), caller.uid.clone()),
                ("gclid".to_string(), gclid.to_string()),
                ("plan".to_string(), plan.to_string()),
                ("session_id".to_string(), session_id.to_string()),
            ]),
        };

        if let Err(e) = analytics.send_event(&event).await {
            tracing::warn!(
                uid = %caller.uid,
                session_id = %session_id,
                error = %e,
                "Failed to send begin_checkout analytics event"
            );
        }
    }
}

/// `POST /functions/create-checkout-session`
pub async fn create_checkout_session(
    State(state): State<AppState>,
    caller: Option<CallerIdentity>,
    body: Bytes,
) -> Json<CallableResponse<CheckoutResponse>> {
    let result = invoke(&state, caller, &body).await;

    match &result {
        Ok(response) => {
            tracing::info!(session_id = %response.session_id, "Checkout session ready");
            record_checkout_session("success");
        }
        Err(e) => {
            tracing::warn!(error = %e, "create_checkout_session returned an error payload");
            record_checkout_session(e.kind());
        }
    }

    Json(result.into())
}

async fn invoke(
    state: &AppState,
    caller: Option<CallerIdentity>,
    body: &[u8],
) -> Result<CheckoutResponse, AppError> {
    let caller = caller.ok_or(AppError::Unauthenticated)?;
    let request: CheckoutRequest = parse_callable_body(body)?;
    state.checkout.handle(&caller, request).await
}
