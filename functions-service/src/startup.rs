//! Application startup and lifecycle management.

use crate::config::FunctionsConfig;
use crate::handlers::{
    self, accounts::user_created, checkout::create_checkout_session,
    completion::generate_completion, webhook::stripe_webhook, AccountProvisioningHandler,
    CheckoutSessionHandler, CheckoutSettings, CompletionHandler, WebhookHandler,
};
use crate::middleware::CallerVerifier;
use crate::services::providers::analytics::MeasurementProtocolClient;
use crate::services::providers::openai::OpenAiClient;
use crate::services::providers::stripe::{StripeClient, WebhookVerifier};
use crate::services::{
    AccountRepository, AccountStore, AnalyticsSink, ChatCompletionProvider, PaymentProvider,
};
use axum::{
    extract::FromRef,
    http::{header, Method, Request},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FunctionsConfig>,
    pub accounts: Arc<dyn AccountStore>,
    pub caller_verifier: CallerVerifier,
    pub completion: Arc<CompletionHandler>,
    pub checkout: Arc<CheckoutSessionHandler>,
    pub webhook: Arc<WebhookHandler>,
    pub provisioning: Arc<AccountProvisioningHandler>,
}

impl FromRef<AppState> for CallerVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.caller_verifier.clone()
    }
}

/// External collaborators the handlers are built from.
#[derive(Clone)]
pub struct Dependencies {
    pub accounts: Arc<dyn AccountStore>,
    pub llm: Arc<dyn ChatCompletionProvider>,
    /// `None` when no Stripe secret key is configured.
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub analytics: Option<Arc<dyn AnalyticsSink>>,
}

impl Dependencies {
    /// Connect to MongoDB and build the production provider clients.
    pub async fn connect(config: &FunctionsConfig) -> Result<Self, AppError> {
        let mut client_options = ClientOptions::parse(config.mongodb.uri.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::DatabaseError(e.into())
            })?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        let db = client.database(&config.mongodb.database);

        let timeout = config.http_timeout_secs;

        let llm = OpenAiClient::new(config.openai.clone(), timeout)
            .map_err(|e| AppError::ConfigError(e.into()))?;
        tracing::info!(model = %llm.model(), "OpenAI client initialized");

        let payments: Option<Arc<dyn PaymentProvider>> =
            match StripeClient::from_config(&config.stripe, timeout)
                .map_err(|e| AppError::ConfigError(e.into()))?
            {
                Some(client) => {
                    tracing::info!("Stripe client initialized");
                    Some(Arc::new(client))
                }
                None => {
                    tracing::warn!(
                        "STRIPE_SECRET_KEY not configured - checkout sessions will fail"
                    );
                    None
                }
            };

        let analytics: Option<Arc<dyn AnalyticsSink>> = match &config.analytics {
            Some(analytics) => Some(Arc::new(
                MeasurementProtocolClient::new(analytics.clone(), timeout)
                    .map_err(|e| AppError::ConfigError(e.into()))?,
            )),
            None => {
                tracing::info!("Analytics not configured - checkout events will not be sent");
                None
            }
        };

        Ok(Self {
            accounts: Arc::new(AccountRepository::new(&db)),
            llm: Arc::new(llm),
            payments,
            analytics,
        })
    }
}

impl AppState {
    pub fn new(config: FunctionsConfig, deps: Dependencies) -> Self {
        let completion = CompletionHandler::new(
            deps.llm,
            deps.accounts.clone(),
            config.openai.system_prompt.clone(),
        );

        let checkout = CheckoutSessionHandler::new(
            deps.payments,
            deps.analytics,
            CheckoutSettings::from_config(&config),
        );

        let verifier = config
            .stripe
            .webhook_secret
            .as_ref()
            .map(|secret| WebhookVerifier::new(secret.clone(), config.stripe.webhook_tolerance_secs));
        let webhook = WebhookHandler::new(
            verifier,
            deps.accounts.clone(),
            config.billing.credits_per_purchase,
        );

        let provisioning = AccountProvisioningHandler::new(
            deps.accounts.clone(),
            config.auth.trigger_token.clone(),
            config.profile.image_urls.clone(),
        );

        Self {
            caller_verifier: CallerVerifier::new(&config.auth),
            accounts: deps.accounts,
            completion: Arc::new(completion),
            checkout: Arc::new(checkout),
            webhook: Arc::new(webhook),
            provisioning: Arc::new(provisioning),
            config: Arc::new(config),
        }
    }
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/functions/generate-completion", post(generate_completion))
        .route(
            "/functions/create-checkout-session",
            post(create_checkout_session),
        )
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/triggers/user-created", post(user_created))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    uid = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: FunctionsConfig) -> Result<Self, AppError> {
        let deps = Dependencies::connect(&config).await?;
        Self::build_with(config, deps).await
    }

    /// Build the application around already-constructed collaborators.
    pub async fn build_with(config: FunctionsConfig, deps: Dependencies) -> Result<Self, AppError> {
        // Port 0 = random port for testing
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        Ok(Self {
            http_port,
            http_listener,
            state: AppState::new(config, deps),
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until SIGINT/SIGTERM.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        tracing::info!(
            service = %self.state.config.service_name,
            port = self.http_port,
            "HTTP server listening"
        );

        axum::serve(self.http_listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
