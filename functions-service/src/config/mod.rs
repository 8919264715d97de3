use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

const DEFAULT_CREDITS_PER_PURCHASE: i64 = 100;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct FunctionsConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub mongodb: MongoConfig,
    pub openai: OpenAiConfig,
    pub stripe: StripeConfig,
    pub billing: BillingConfig,
    /// Analytics is best-effort; `None` disables it.
    pub analytics: Option<AnalyticsConfig>,
    pub auth: AuthConfig,
    pub profile: ProfileConfig,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub system_prompt: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<Secret<String>>,
    pub webhook_secret: Option<Secret<String>>,
    pub api_base_url: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub credits_per_purchase: i64,
    pub default_plan: String,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub measurement_id: String,
    pub api_secret: Secret<String>,
    pub endpoint: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 key for caller ID tokens. Without it no call authenticates.
    pub jwt_secret: Option<Secret<String>>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Shared token the auth platform presents on user-created triggers.
    pub trigger_token: Option<Secret<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileConfig {
    pub image_urls: Vec<String>,
}

impl FunctionsConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let analytics = match (
            get_optional_env("GA_MEASUREMENT_ID"),
            get_optional_env("GA_API_SECRET"),
        ) {
            (Some(measurement_id), Some(api_secret)) => Some(AnalyticsConfig {
                measurement_id,
                api_secret: Secret::new(api_secret),
                endpoint: get_env(
                    "GA_ENDPOINT",
                    Some("https://www.google-analytics.com/mp/collect"),
                    false,
                )?,
            }),
            _ => None,
        };

        Ok(FunctionsConfig {
            common: common_config,
            service_name: "functions-service".to_string(),
            mongodb: MongoConfig {
                uri: Secret::new(get_env(
                    "MONGODB_URI",
                    Some("mongodb://localhost:27017"),
                    is_prod,
                )?),
                database: get_env("MONGODB_DATABASE", Some("functions_db"), is_prod)?,
            },
            openai: OpenAiConfig {
                api_key: Secret::new(get_env("OPENAI_API_KEY", None, is_prod)?),
                model: get_env("OPENAI_MODEL", Some("gpt-4"), false)?,
                system_prompt: get_env(
                    "OPENAI_SYSTEM_PROMPT",
                    Some("You are a helpful assistant."),
                    false,
                )?,
                api_base_url: get_env(
                    "OPENAI_API_BASE_URL",
                    Some("https://api.openai.com/v1"),
                    false,
                )?,
            },
            stripe: StripeConfig {
                secret_key: get_optional_env("STRIPE_SECRET_KEY").map(Secret::new),
                webhook_secret: get_optional_env("STRIPE_WEBHOOK_SECRET").map(Secret::new),
                api_base_url: get_env(
                    "STRIPE_API_BASE_URL",
                    Some("https://api.stripe.com/v1"),
                    false,
                )?,
                price_id: get_env("STRIPE_PRICE_ID", Some("price_credits_100"), is_prod)?,
                success_url: get_env(
                    "STRIPE_SUCCESS_URL",
                    Some("http://localhost:3000/dashboard?checkout=success"),
                    is_prod,
                )?,
                cancel_url: get_env(
                    "STRIPE_CANCEL_URL",
                    Some("http://localhost:3000/dashboard?checkout=cancelled"),
                    is_prod,
                )?,
                webhook_tolerance_secs: parse_env(
                    "STRIPE_WEBHOOK_TOLERANCE_SECS",
                    DEFAULT_WEBHOOK_TOLERANCE_SECS,
                )?,
            },
            billing: BillingConfig {
                credits_per_purchase: ensure_positive(
                    "CREDITS_PER_PURCHASE",
                    parse_env("CREDITS_PER_PURCHASE", DEFAULT_CREDITS_PER_PURCHASE)?,
                )?,
                default_plan: get_env("DEFAULT_PLAN", Some("Basic"), false)?,
            },
            analytics,
            auth: AuthConfig {
                jwt_secret: get_optional_env("AUTH_JWT_SECRET").map(Secret::new),
                issuer: get_optional_env("AUTH_JWT_ISSUER"),
                audience: get_optional_env("AUTH_JWT_AUDIENCE"),
                trigger_token: get_optional_env("TRIGGER_TOKEN").map(Secret::new),
            },
            profile: ProfileConfig {
                image_urls: get_optional_env("PROFILE_IMAGE_URLS")
                    .map(|raw| split_list(&raw))
                    .unwrap_or_default(),
            },
            http_timeout_secs: parse_env("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
        }),
        None => Ok(default),
    }
}

fn ensure_positive(key: &str, value: i64) -> Result<i64, AppError> {
    if value <= 0 {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be greater than zero, got {}",
            key,
            value
        )));
    }
    Ok(value)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
