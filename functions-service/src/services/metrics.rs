use metrics::counter;

pub use service_core::middleware::metrics::{init_metrics, render_metrics};

pub fn record_completion(outcome: &'static str) {
    counter!("completions_total", "outcome" => outcome).increment(1);
}

pub fn record_checkout_session(outcome: &'static str) {
    counter!("checkout_sessions_total", "outcome" => outcome).increment(1);
}

pub fn record_webhook_event(outcome: &'static str) {
    counter!("webhook_events_total", "outcome" => outcome).increment(1);
}

/// Credits added to accounts, for reconciliation against Stripe payouts.
pub fn record_credits_granted(amount: i64) {
    counter!("credits_granted_total").increment(amount.max(0) as u64);
}
