use {
    super::error::BillingError,
    super::money::Money,
    super::subscription::SubscriptionStatus,
    chrono::{DateTime, Utc},
    std::{future::Future, pin::Pin},
    uuid::Uuid,
};

pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BillingError>> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentSnapshot {
    pub money: Money,
    pub external_payment_ref: Option<String>,
}

/// Best-effort outbound notifications. Callers spawn these off the request
/// path and swallow failures — a lost welcome email never fails a handler.
pub trait Notifier: Send + Sync {
    fn send_welcome(
        &self,
        user_id: Uuid,
        subscription: SubscriptionSnapshot,
        payment: PaymentSnapshot,
    ) -> NotifyFuture<'_>;
}
