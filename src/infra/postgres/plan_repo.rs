use {
    crate::domain::{error::BillingError, plan::Plan},
    uuid::Uuid,
};

const COLUMNS: &str = "id, name, price_cents, currency, external_price_ref, commission_rate, active";

/// Read-only plan catalog.
pub async fn find_by_id(
    exec: impl sqlx::PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<Plan>, BillingError> {
    let plan = sqlx::query_as::<_, Plan>(&format!(
        "SELECT {COLUMNS} FROM plans WHERE id = $1 AND active"
    ))
    .bind(id)
    .fetch_optional(exec)
    .await?;

    Ok(plan)
}

pub async fn list_active(exec: impl sqlx::PgExecutor<'_>) -> Result<Vec<Plan>, BillingError> {
    let plans = sqlx::query_as::<_, Plan>(&format!(
        "SELECT {COLUMNS} FROM plans WHERE active ORDER BY price_cents"
    ))
    .fetch_all(exec)
    .await?;

    Ok(plans)
}
