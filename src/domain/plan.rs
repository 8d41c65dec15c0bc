use {serde::Serialize, uuid::Uuid};

/// Read-only reference data consumed by both the webhook and API paths.
/// Never mutated by this service.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub external_price_ref: String,
    pub commission_rate: f64,
    pub active: bool,
}
