use {
    crate::domain::notify::{Notifier, NotifyFuture, PaymentSnapshot, SubscriptionSnapshot},
    uuid::Uuid,
};

/// Log-only notifier. The delivery channel (email, push) lives outside this
/// service; callers already treat every notifier as best-effort.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send_welcome(
        &self,
        user_id: Uuid,
        subscription: SubscriptionSnapshot,
        payment: PaymentSnapshot,
    ) -> NotifyFuture<'_> {
        Box::pin(async move {
            tracing::info!(
                user_id = %user_id,
                plan_id = %subscription.plan_id,
                period_end = %subscription.current_period_end,
                amount = payment.money.amount().cents(),
                currency = %payment.money.currency(),
                "welcome notification dispatched"
            );
            Ok(())
        })
    }
}
