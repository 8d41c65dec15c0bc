use {
    super::error::BillingError,
    super::id::{CustomerRef, SubscriptionRef},
    std::{future::Future, pin::Pin},
    uuid::Uuid,
};

pub type GatewayFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, BillingError>> + Send + 'a>>;

/// What the synchronous path asks the processor to set up. The metadata the
/// gateway stamps onto the checkout objects is what routes the resulting
/// webhook events back to local records.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: CustomerRef,
    pub external_price_ref: String,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub return_url: Option<String>,
}

/// Continuation the client needs to finish the processor handshake.
#[derive(Debug, Clone)]
pub struct CheckoutHandshake {
    pub session_ref: String,
    pub url: Option<String>,
    pub provisional_subscription_ref: Option<SubscriptionRef>,
}

#[derive(Debug, Clone)]
pub struct PortalSession {
    pub url: String,
}

/// Outbound capability onto the payment processor. Injected at construction —
/// no ambient singleton.
pub trait ProcessorGateway: Send + Sync {
    fn ensure_customer(&self, user_id: Uuid) -> GatewayFuture<'_, CustomerRef>;

    fn start_subscription_checkout(
        &self,
        request: CheckoutRequest,
    ) -> GatewayFuture<'_, CheckoutHandshake>;

    fn open_portal(
        &self,
        customer: CustomerRef,
        return_url: Option<String>,
    ) -> GatewayFuture<'_, PortalSession>;
}
