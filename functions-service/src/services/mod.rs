pub mod memory;
pub mod metrics;
pub mod providers;
pub mod repository;

pub use memory::InMemoryAccountStore;
pub use providers::{
    AnalyticsEvent, AnalyticsSink, ChatCompletionProvider, ChatMessage, CheckoutSession,
    CheckoutSessionRequest, PaymentProvider, ProviderError,
};
pub use repository::{AccountRepository, AccountStore};
