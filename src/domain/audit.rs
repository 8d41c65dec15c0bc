use uuid::Uuid;

/// Append-only trail of reconciliation actions. Written alongside state
/// changes, never read back by the reconciliation logic itself.
pub struct NewAuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub external_ref: Option<String>,
    pub event_id: Option<String>,
    pub action: String,
    pub actor: String,
    pub detail: serde_json::Value,
}
