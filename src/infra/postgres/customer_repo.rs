use {crate::domain::error::BillingError, uuid::Uuid};

/// The processor customer reference for a user, if a billing account exists.
pub async fn find_by_user(
    exec: impl sqlx::PgExecutor<'_>,
    user_id: Uuid,
) -> Result<Option<String>, BillingError> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT external_customer_ref FROM billing_customers WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|(r,)| r))
}

pub async fn find_user_by_customer(
    exec: impl sqlx::PgExecutor<'_>,
    external_customer_ref: &str,
) -> Result<Option<Uuid>, BillingError> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "SELECT user_id FROM billing_customers WHERE external_customer_ref = $1",
    )
    .bind(external_customer_ref)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|(id,)| id))
}

/// First writer wins; the customer reference is stable once minted.
pub async fn ensure(
    exec: impl sqlx::PgExecutor<'_>,
    user_id: Uuid,
    external_customer_ref: &str,
) -> Result<(), BillingError> {
    sqlx::query(
        "INSERT INTO billing_customers (user_id, external_customer_ref) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(external_customer_ref)
    .execute(exec)
    .await?;

    Ok(())
}
