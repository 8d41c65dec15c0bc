use {
    crate::domain::{
        error::BillingError,
        idempotency::InsertOutcome,
        money::{Currency, Money, MoneyAmount},
        payment::{FailureReason, NewPayment, Payment, PaymentStatus, PaymentType},
    },
    chrono::{DateTime, Utc},
    sqlx::{Postgres, Transaction},
    uuid::Uuid,
};

const COLUMNS: &str = "id, user_id, amount, currency, status, payment_type, \
     external_payment_ref, external_invoice_ref, subscription_id, paid_at, failure_reason";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    payment_type: String,
    external_payment_ref: Option<String>,
    external_invoice_ref: Option<String>,
    subscription_id: Option<Uuid>,
    paid_at: Option<DateTime<Utc>>,
    failure_reason: Option<serde_json::Value>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = BillingError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let failure_reason = row
            .failure_reason
            .map(serde_json::from_value::<FailureReason>)
            .transpose()?;

        Ok(Payment {
            id: row.id,
            user_id: row.user_id,
            money: Money::new(
                MoneyAmount::new(row.amount)?,
                Currency::try_from(row.currency.as_str())?,
            ),
            status: PaymentStatus::try_from(row.status.as_str())?,
            payment_type: PaymentType::try_from(row.payment_type.as_str())?,
            external_payment_ref: row.external_payment_ref,
            external_invoice_ref: row.external_invoice_ref,
            subscription_id: row.subscription_id,
            paid_at: row.paid_at,
            failure_reason,
        })
    }
}

/// Insert anchored on the unique external references. `ON CONFLICT DO
/// NOTHING` without a target covers both the payment and invoice reference
/// constraints; the existing row is fetched on conflict.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    payment: &NewPayment,
) -> Result<InsertOutcome<Payment>, BillingError> {
    let failure_reason = payment
        .failure_reason
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    let inserted = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        INSERT INTO payments
            (id, user_id, amount, currency, status, payment_type,
             external_payment_ref, external_invoice_ref, subscription_id,
             paid_at, failure_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT DO NOTHING
        RETURNING {COLUMNS}
        "#
    ))
    .bind(payment.id)
    .bind(payment.user_id)
    .bind(payment.money.amount().cents())
    .bind(payment.money.currency().as_str())
    .bind(payment.status.as_str())
    .bind(payment.payment_type.as_str())
    .bind(payment.external_payment_ref.as_ref().map(|r| r.as_str()))
    .bind(payment.external_invoice_ref.as_ref().map(|r| r.as_str()))
    .bind(payment.subscription_id)
    .bind(payment.paid_at)
    .bind(failure_reason)
    .fetch_optional(&mut **tx)
    .await?;

    match inserted {
        Some(row) => Ok(InsertOutcome::Inserted(row.try_into()?)),
        None => {
            let existing = find_by_any_external_ref(
                &mut **tx,
                payment.external_payment_ref.as_ref().map(|r| r.as_str()),
                payment.external_invoice_ref.as_ref().map(|r| r.as_str()),
            )
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
            Ok(InsertOutcome::AlreadyExists(existing))
        }
    }
}

pub async fn find_by_external_payment_ref(
    exec: impl sqlx::PgExecutor<'_>,
    external_ref: &str,
) -> Result<Option<Payment>, BillingError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {COLUMNS} FROM payments WHERE external_payment_ref = $1"
    ))
    .bind(external_ref)
    .fetch_optional(exec)
    .await?;

    row.map(Payment::try_from).transpose()
}

async fn find_by_any_external_ref(
    exec: impl sqlx::PgExecutor<'_>,
    payment_ref: Option<&str>,
    invoice_ref: Option<&str>,
) -> Result<Option<Payment>, BillingError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {COLUMNS} FROM payments \
         WHERE ($1::text IS NOT NULL AND external_payment_ref = $1) \
            OR ($2::text IS NOT NULL AND external_invoice_ref = $2) \
         LIMIT 1"
    ))
    .bind(payment_ref)
    .bind(invoice_ref)
    .fetch_optional(exec)
    .await?;

    row.map(Payment::try_from).transpose()
}

pub async fn mark_succeeded(
    exec: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    paid_at: DateTime<Utc>,
) -> Result<u64, BillingError> {
    let result = sqlx::query(
        "UPDATE payments SET status = 'succeeded', paid_at = $2, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(paid_at)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

pub async fn mark_failed(
    exec: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    reason: &FailureReason,
) -> Result<u64, BillingError> {
    let result = sqlx::query(
        "UPDATE payments SET status = 'failed', failure_reason = $2, updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(serde_json::to_value(reason)?)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

pub async fn recent_for_user(
    exec: impl sqlx::PgExecutor<'_>,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<Payment>, BillingError> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(Payment::try_from).collect()
}
