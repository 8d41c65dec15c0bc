use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    // Webhook boundary — the only variants that map to non-2xx webhook
    // responses, because they are the only ones redelivery can resolve.
    #[error("signature header missing")]
    SignatureMissing,

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("webhook secret not configured")]
    ConfigMissing,

    #[error("payload malformed: {0}")]
    PayloadMalformed(String),

    // Absorbed inside event handlers.
    #[error("unmapped processor status: {0}")]
    UnmappedStatus(String),

    #[error("{entity} not found for update: {reference}")]
    EntityNotFoundForUpdate {
        entity: &'static str,
        reference: String,
    },

    // Synchronous command surface.
    #[error("subscription can only be deleted while incomplete")]
    InvalidStateForDeletion,

    #[error("no billing account exists for this user")]
    NoBillingAccount,

    #[error("an active subscription already exists")]
    ConflictingActiveSubscription,

    #[error("unknown plan")]
    UnknownPlan,

    #[error("validation: {0}")]
    Validation(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("gateway: {0}")]
    Gateway(String),
}
