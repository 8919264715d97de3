//! GA4 Measurement Protocol sink.

use super::{http_client, AnalyticsEvent, AnalyticsSink, ProviderError};
use crate::config::AnalyticsConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct MeasurementProtocolClient {
    client: Client,
    config: AnalyticsConfig,
}

#[derive(Debug, Serialize)]
struct CollectRequest<'a> {
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    events: [CollectEvent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct CollectEvent<'a> {
    name: &'a str,
    params: &'a BTreeMap<String, String>,
}

impl MeasurementProtocolClient {
    pub fn new(config: AnalyticsConfig, timeout_secs: u64) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            config,
        })
    }
}

#[async_trait]
impl AnalyticsSink for MeasurementProtocolClient {
    async fn send_event(&self, event: &AnalyticsEvent) -> Result<(), ProviderError> {
        let body = CollectRequest {
            client_id: &event.client_id,
            user_id: event.user_id.as_deref(),
            events: [CollectEvent {
                name: &event.name,
                params: &event.params,
            }],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .query(&[
                ("measurement_id", self.config.measurement_id.as_str()),
                ("api_secret", self.config.api_secret.expose_secret().as_str()),
            ])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::ApiError(format!(
                "Analytics collector returned {}",
                status
            )));
        }

        tracing::debug!(event = %event.name, "Analytics event sent");
        Ok(())
    }
}
