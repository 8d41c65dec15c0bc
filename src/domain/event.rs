use {
    super::error::BillingError,
    serde::Deserialize,
    std::collections::HashMap,
};

/// Metadata keys the checkout handshake stamps onto processor objects so the
/// webhook path can route them back to local records.
pub const META_USER_ID: &str = "user_id";
pub const META_PLAN_ID: &str = "plan_id";
pub const META_PURPOSE: &str = "purpose";
pub const PURPOSE_ACTIVATION: &str = "subscription_activation";

/// The closed set of event kinds this service handles. Everything else
/// deserializes into `Unhandled` and is acknowledged without processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EventKind {
    #[serde(rename = "payment_intent.succeeded")]
    PaymentSucceeded,

    #[serde(rename = "payment_intent.payment_failed")]
    PaymentFailed,

    #[serde(rename = "invoice.payment_succeeded")]
    InvoiceSucceeded,

    #[serde(rename = "invoice.payment_failed")]
    InvoiceFailed,

    #[serde(rename = "customer.subscription.created")]
    SubscriptionCreated,

    #[serde(rename = "customer.subscription.updated")]
    SubscriptionUpdated,

    #[serde(rename = "customer.subscription.deleted")]
    SubscriptionDeleted,

    #[serde(other)]
    Unhandled,
}

/// Verified webhook envelope. `data.object` stays as raw JSON until the
/// dispatcher knows which payload shape the kind calls for.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String, // evt_xxx
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub created: i64, // unix timestamp
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    pub fn payment_intent(&self) -> Result<PaymentIntentPayload, BillingError> {
        self.decode_object()
    }

    pub fn invoice(&self) -> Result<InvoicePayload, BillingError> {
        self.decode_object()
    }

    pub fn subscription(&self) -> Result<SubscriptionPayload, BillingError> {
        self.decode_object()
    }

    fn decode_object<T: serde::de::DeserializeOwned>(&self) -> Result<T, BillingError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| BillingError::Validation(format!("event object: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentPayload {
    pub id: String, // pi_xxx
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
}

impl PaymentIntentPayload {
    pub fn is_activation(&self) -> bool {
        self.metadata.get(META_PURPOSE).map(String::as_str) == Some(PURPOSE_ACTIVATION)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub decline_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicePayload {
    pub id: String, // in_xxx
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    #[serde(default)]
    pub amount_due: Option<i64>,
    pub currency: String,
    #[serde(default)]
    pub period_start: Option<i64>,
    #[serde(default)]
    pub period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionPayload {
    pub id: String, // sub_xxx
    #[serde(default)]
    pub customer: Option<String>,
    pub status: String,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub trial_start: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_handled_kind() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "id": "evt_1",
                "type": "invoice.payment_succeeded",
                "created": 1700000000,
                "livemode": false,
                "data": {"object": {"id": "in_1", "currency": "usd", "subscription": "sub_1"}}
            }"#,
        )
        .unwrap();

        assert_eq!(event.kind, EventKind::InvoiceSucceeded);
        let invoice = event.invoice().unwrap();
        assert_eq!(invoice.id, "in_1");
        assert_eq!(invoice.subscription.as_deref(), Some("sub_1"));
    }

    #[test]
    fn unknown_kind_decodes_as_unhandled() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "id": "evt_2",
                "type": "charge.refunded",
                "created": 1700000000,
                "data": {"object": {}}
            }"#,
        )
        .unwrap();

        assert_eq!(event.kind, EventKind::Unhandled);
    }

    #[test]
    fn activation_purpose_is_detected() {
        let payload: PaymentIntentPayload = serde_json::from_str(
            r#"{
                "id": "pi_1",
                "amount": 2900,
                "currency": "usd",
                "metadata": {"purpose": "subscription_activation", "user_id": "u"}
            }"#,
        )
        .unwrap();

        assert!(payload.is_activation());
    }

    #[test]
    fn wrong_object_shape_is_a_validation_error() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "id": "evt_3",
                "type": "payment_intent.succeeded",
                "created": 1700000000,
                "data": {"object": {"id": "pi_3"}}
            }"#,
        )
        .unwrap();

        // amount/currency missing — decoding the typed payload fails.
        assert!(matches!(
            event.payment_intent(),
            Err(BillingError::Validation(_))
        ));
    }
}
