//! Mock provider implementations for testing.

use super::{
    AnalyticsEvent, AnalyticsSink, ChatCompletionProvider, ChatMessage, CheckoutSession,
    CheckoutSessionRequest, PaymentProvider, ProviderError,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock chat provider. Replies with a fixed text, or echoes the user prompt.
pub struct MockChatProvider {
    reply: Option<String>,
    fail: bool,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChatProvider {
    /// Answer `"Mock response for: <prompt>"`.
    pub fn echo() -> Self {
        Self {
            reply: None,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Self::echo()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::echo()
        }
    }

    /// Messages of every request received so far.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatCompletionProvider for MockChatProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        if self.fail {
            return Err(ProviderError::ApiError("mock chat provider failure".into()));
        }

        Ok(match &self.reply {
            Some(reply) => reply.clone(),
            None => {
                let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
                format!("Mock response for: {}", prompt)
            }
        })
    }
}

/// Mock payment provider. Issues sequential `cs_test_<n>` session ids.
pub struct MockPaymentProvider {
    fail: bool,
    counter: AtomicUsize,
    requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self {
            fail: false,
            counter: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        if self.fail {
            return Err(ProviderError::ApiError(
                "mock payment provider failure".into(),
            ));
        }

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{}", n);
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.stripe.test/pay/{}", id)),
            id,
        })
    }
}

/// Mock analytics sink that records events, or fails every send.
pub struct MockAnalyticsSink {
    fail: bool,
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl MockAnalyticsSink {
    pub fn new() -> Self {
        Self {
            fail: false,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for MockAnalyticsSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalyticsSink for MockAnalyticsSink {
    async fn send_event(&self, event: &AnalyticsEvent) -> Result<(), ProviderError> {
        if self.fail {
            return Err(ProviderError::NetworkError("mock analytics outage".into()));
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}
