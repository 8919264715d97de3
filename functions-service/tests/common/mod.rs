#![allow(dead_code)]

use functions_service::config::{
    AuthConfig, BillingConfig, FunctionsConfig, MongoConfig, OpenAiConfig, ProfileConfig,
    StripeConfig,
};
use functions_service::middleware::CallerClaims;
use functions_service::services::providers::mock::{
    MockAnalyticsSink, MockChatProvider, MockPaymentProvider,
};
use functions_service::services::{
    AnalyticsSink, InMemoryAccountStore, PaymentProvider,
};
use functions_service::{Application, Dependencies};
use jsonwebtoken::{encode, EncodingKey, Header};
use secrecy::Secret;
use service_core::utils::signature::generate_signature;
use std::sync::Arc;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const TRIGGER_TOKEN: &str = "test-trigger-token";
pub const SYSTEM_PROMPT: &str = "You are a test assistant.";
pub const PRICE_ID: &str = "price_test_credits";
pub const PROFILE_IMAGES: [&str; 2] = [
    "https://img.example/avatar-1.png",
    "https://img.example/avatar-2.png",
];

/// Knobs for a single test application.
pub struct TestSetup {
    pub llm: MockChatProvider,
    pub payments: MockPaymentProvider,
    pub stripe_configured: bool,
    pub analytics: MockAnalyticsSink,
    pub webhook_secret: Option<String>,
    pub trigger_token: Option<String>,
}

impl Default for TestSetup {
    fn default() -> Self {
        Self {
            llm: MockChatProvider::echo(),
            payments: MockPaymentProvider::new(),
            stripe_configured: true,
            analytics: MockAnalyticsSink::new(),
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            trigger_token: Some(TRIGGER_TOKEN.to_string()),
        }
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub accounts: Arc<InMemoryAccountStore>,
    pub llm: Arc<MockChatProvider>,
    pub payments: Arc<MockPaymentProvider>,
    pub analytics: Arc<MockAnalyticsSink>,
}

fn test_config(setup: &TestSetup) -> FunctionsConfig {
    FunctionsConfig {
        common: service_core::config::Config {
            port: 0, // Random port
            ..Default::default()
        },
        service_name: "functions-service".to_string(),
        mongodb: MongoConfig {
            uri: Secret::new("mongodb://unused".to_string()),
            database: "unused".to_string(),
        },
        openai: OpenAiConfig {
            api_key: Secret::new("sk-test".to_string()),
            model: "gpt-4".to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            api_base_url: "http://127.0.0.1:1".to_string(),
        },
        stripe: StripeConfig {
            secret_key: None,
            webhook_secret: setup.webhook_secret.clone().map(Secret::new),
            api_base_url: "http://127.0.0.1:1".to_string(),
            price_id: PRICE_ID.to_string(),
            success_url: "https://app.example/success".to_string(),
            cancel_url: "https://app.example/cancel".to_string(),
            webhook_tolerance_secs: 300,
        },
        billing: BillingConfig {
            credits_per_purchase: 100,
            default_plan: "Basic".to_string(),
        },
        analytics: None,
        auth: AuthConfig {
            jwt_secret: Some(Secret::new(JWT_SECRET.to_string())),
            issuer: None,
            audience: None,
            trigger_token: setup.trigger_token.clone().map(Secret::new),
        },
        profile: ProfileConfig {
            image_urls: PROFILE_IMAGES.iter().map(|s| s.to_string()).collect(),
        },
        http_timeout_secs: 5,
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestSetup::default()).await
    }

    pub async fn spawn_with(setup: TestSetup) -> Self {
        let config = test_config(&setup);

        let accounts = Arc::new(InMemoryAccountStore::new());
        let llm = Arc::new(setup.llm);
        let payments = Arc::new(setup.payments);
        let analytics = Arc::new(setup.analytics);

        let deps = Dependencies {
            accounts: accounts.clone(),
            llm: llm.clone(),
            payments: setup
                .stripe_configured
                .then(|| payments.clone() as Arc<dyn PaymentProvider>),
            analytics: Some(analytics.clone() as Arc<dyn AnalyticsSink>),
        };

        let app = Application::build_with(config, deps)
            .await
            .expect("Failed to build test application");
        let port = app.http_port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let address = format!("http://127.0.0.1:{}", port);
        for _ in 0..50 {
            if client.get(format!("{}/health", address)).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            client,
            accounts,
            llm,
            payments,
            analytics,
        }
    }

    /// Invoke a callable function, optionally as an authenticated caller.
    pub async fn call(
        &self,
        function: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> serde_json::Value {
        let mut request = self
            .client
            .post(format!("{}/functions/{}", self.address, function))
            .json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200, "callables always answer 200");
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn post_webhook(&self, body: &str, signature: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/webhooks/stripe", self.address))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(signature) = signature {
            request = request.header("Stripe-Signature", signature);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn post_user_created(
        &self,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/triggers/user-created", self.address))
            .json(&body);
        if let Some(token) = token {
            request = request.header("X-Trigger-Token", token);
        }
        request.send().await.expect("Failed to execute request")
    }
}

/// Mint an ID token for `uid` signed with the test key.
pub fn id_token(uid: &str) -> String {
    id_token_signed_with(uid, JWT_SECRET)
}

pub fn id_token_signed_with(uid: &str, secret: &str) -> String {
    let claims = CallerClaims {
        sub: uid.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
        iat: Some(chrono::Utc::now().timestamp()),
        email: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to encode token")
}

/// `Stripe-Signature` header value for `body`, signed now.
pub fn stripe_signature(body: &str) -> String {
    stripe_signature_at(body, chrono::Utc::now().timestamp(), WEBHOOK_SECRET)
}

pub fn stripe_signature_at(body: &str, timestamp: i64, secret: &str) -> String {
    let signature =
        generate_signature(secret, timestamp, body).expect("Failed to sign payload");
    format!("t={},v1={}", timestamp, signature)
}

pub fn completed_checkout_event(session_id: &str, uid: Option<&str>) -> String {
    let mut metadata = serde_json::json!({ "gclid": "gclid-1", "plan": "Basic" });
    if let Some(uid) = uid {
        metadata["uid"] = serde_json::json!(uid);
    }

    serde_json::json!({
        "id": format!("evt_{}", session_id),
        "object": "event",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_status": "paid",
                "metadata": metadata
            }
        }
    })
    .to_string()
}
