use {
    crate::domain::{
        error::BillingError,
        event::{META_PLAN_ID, META_PURPOSE, META_USER_ID, PURPOSE_ACTIVATION},
        gateway::{CheckoutHandshake, CheckoutRequest, GatewayFuture, PortalSession, ProcessorGateway},
        id::{CustomerRef, SubscriptionRef},
    },
    std::collections::HashMap,
    uuid::Uuid,
};

/// Stripe-backed processor gateway for the synchronous path: customer
/// creation, the checkout handshake, and the billing portal.
pub struct StripeGateway {
    client: stripe::Client,
}

impl StripeGateway {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
        }
    }

    fn routing_metadata(user_id: Uuid, plan_id: Uuid) -> HashMap<String, String> {
        // The webhook path routes events back to local records through
        // these keys.
        let mut metadata = HashMap::new();
        metadata.insert(META_USER_ID.to_string(), user_id.to_string());
        metadata.insert(META_PLAN_ID.to_string(), plan_id.to_string());
        metadata.insert(META_PURPOSE.to_string(), PURPOSE_ACTIVATION.to_string());
        metadata
    }
}

impl ProcessorGateway for StripeGateway {
    fn ensure_customer(&self, user_id: Uuid) -> GatewayFuture<'_, CustomerRef> {
        Box::pin(async move {
            let mut params = stripe::CreateCustomer::new();
            let mut metadata = HashMap::new();
            metadata.insert(META_USER_ID.to_string(), user_id.to_string());
            params.metadata = Some(metadata);

            let customer = stripe::Customer::create(&self.client, params)
                .await
                .map_err(|e| BillingError::Gateway(format!("create customer: {e}")))?;

            CustomerRef::new(customer.id.to_string())
        })
    }

    fn start_subscription_checkout(
        &self,
        request: CheckoutRequest,
    ) -> GatewayFuture<'_, CheckoutHandshake> {
        Box::pin(async move {
            let customer_id = request
                .customer
                .as_str()
                .parse::<stripe::CustomerId>()
                .map_err(|e| BillingError::Gateway(format!("invalid customer id: {e}")))?;

            let metadata = Self::routing_metadata(request.user_id, request.plan_id);

            let mut params = stripe::CreateCheckoutSession::new();
            params.customer = Some(customer_id);
            params.mode = Some(stripe::CheckoutSessionMode::Subscription);
            params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
                price: Some(request.external_price_ref.clone()),
                quantity: Some(1),
                ..Default::default()
            }]);
            params.success_url = request.return_url.as_deref();
            params.cancel_url = request.return_url.as_deref();
            params.metadata = Some(metadata.clone());
            params.subscription_data = Some(stripe::CreateCheckoutSessionSubscriptionData {
                metadata: Some(metadata),
                ..Default::default()
            });

            let session = stripe::CheckoutSession::create(&self.client, params)
                .await
                .map_err(|e| BillingError::Gateway(format!("create checkout session: {e}")))?;

            let provisional_subscription_ref = session
                .subscription
                .as_ref()
                .map(|s| match s {
                    stripe::Expandable::Id(id) => SubscriptionRef::new(id.to_string()),
                    stripe::Expandable::Object(sub) => SubscriptionRef::new(sub.id.to_string()),
                })
                .transpose()?;

            Ok(CheckoutHandshake {
                session_ref: session.id.to_string(),
                url: session.url.clone(),
                provisional_subscription_ref,
            })
        })
    }

    fn open_portal(
        &self,
        customer: CustomerRef,
        return_url: Option<String>,
    ) -> GatewayFuture<'_, PortalSession> {
        Box::pin(async move {
            let customer_id = customer
                .as_str()
                .parse::<stripe::CustomerId>()
                .map_err(|e| BillingError::Gateway(format!("invalid customer id: {e}")))?;

            let mut params = stripe::CreateBillingPortalSession::new(customer_id);
            params.return_url = return_url.as_deref();

            let session = stripe::BillingPortalSession::create(&self.client, params)
                .await
                .map_err(|e| BillingError::Gateway(format!("create portal session: {e}")))?;

            Ok(PortalSession { url: session.url })
        })
    }
}
