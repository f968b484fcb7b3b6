use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tracing::info;

/// Fire-and-forget user notification after a payout settles. Delivery
/// failures must never roll back a payout, so implementations return nothing
/// and are expected to log their own errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn payout_settled(&self, user_id: &str, kind: &str, amount: &BigDecimal);
}

/// Default dispatcher: writes the notification to the log. The real email/SMS
/// provider plugs in behind the same trait.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn payout_settled(&self, user_id: &str, kind: &str, amount: &BigDecimal) {
        info!("notify user {}: {} payout of {} settled", user_id, kind, amount);
    }
}
