use {
    crate::domain::{
        error::BillingError,
        idempotency::InsertOutcome,
        subscription::{NewSubscription, ProcessorSync, Subscription, SubscriptionStatus},
    },
    chrono::{DateTime, Utc},
    sqlx::{Postgres, Transaction},
    uuid::Uuid,
};

const COLUMNS: &str = "id, user_id, plan_id, external_subscription_ref, status, \
     current_period_start, current_period_end, trial_start, trial_end, \
     cancel_at_period_end, cancelled_at";

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    plan_id: Uuid,
    external_subscription_ref: Option<String>,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = BillingError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            plan_id: row.plan_id,
            external_subscription_ref: row.external_subscription_ref,
            status: SubscriptionStatus::try_from(row.status.as_str())?,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            trial_start: row.trial_start,
            trial_end: row.trial_end,
            cancel_at_period_end: row.cancel_at_period_end,
            cancelled_at: row.cancelled_at,
        })
    }
}

/// The user's single non-cancelled subscription, if any.
pub async fn find_live_by_user(
    exec: impl sqlx::PgExecutor<'_>,
    user_id: Uuid,
) -> Result<Option<Subscription>, BillingError> {
    let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
        "SELECT {COLUMNS} FROM subscriptions WHERE user_id = $1 AND status <> 'cancelled'"
    ))
    .bind(user_id)
    .fetch_optional(exec)
    .await?;

    row.map(Subscription::try_from).transpose()
}

/// All rows matching the external reference — normally one, but duplicate
/// local rows are an operational anomaly this module stays defensive about.
pub async fn find_by_external_ref(
    exec: impl sqlx::PgExecutor<'_>,
    external_ref: &str,
) -> Result<Vec<Subscription>, BillingError> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
        "SELECT {COLUMNS} FROM subscriptions WHERE external_subscription_ref = $1 ORDER BY created_at"
    ))
    .bind(external_ref)
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(Subscription::try_from).collect()
}

/// Insert guarded by the one-live-subscription-per-user index. On conflict
/// the committed winner is fetched and returned as `AlreadyExists` — the
/// caller decides whether that means "replay", "other path won", or "retry".
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    sub: &NewSubscription,
) -> Result<InsertOutcome<Subscription>, BillingError> {
    let inserted = sqlx::query_as::<_, SubscriptionRow>(&format!(
        r#"
        INSERT INTO subscriptions
            (id, user_id, plan_id, external_subscription_ref, status,
             current_period_start, current_period_end, trial_start, trial_end,
             cancel_at_period_end)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (user_id) WHERE status <> 'cancelled' DO NOTHING
        RETURNING {COLUMNS}
        "#
    ))
    .bind(sub.id)
    .bind(sub.user_id)
    .bind(sub.plan_id)
    .bind(sub.external_subscription_ref.as_deref())
    .bind(sub.status.as_str())
    .bind(sub.current_period_start)
    .bind(sub.current_period_end)
    .bind(sub.trial_start)
    .bind(sub.trial_end)
    .bind(sub.cancel_at_period_end)
    .fetch_optional(&mut **tx)
    .await?;

    match inserted {
        Some(row) => Ok(InsertOutcome::Inserted(row.try_into()?)),
        None => {
            let existing = find_live_by_user(&mut **tx, sub.user_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            Ok(InsertOutcome::AlreadyExists(existing))
        }
    }
}

/// Destroys the provisional row. Only INCOMPLETE rows are ever deleted.
pub async fn delete_incomplete_by_user(
    exec: impl sqlx::PgExecutor<'_>,
    user_id: Uuid,
) -> Result<u64, BillingError> {
    let result =
        sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND status = 'incomplete'")
            .bind(user_id)
            .execute(exec)
            .await?;

    Ok(result.rows_affected())
}

/// Status-only transition. The `status <> 'cancelled'` guard keeps
/// terminality monotonic at the storage level as well.
pub async fn update_status(
    exec: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    status: SubscriptionStatus,
) -> Result<u64, BillingError> {
    let result = sqlx::query(
        "UPDATE subscriptions SET status = $2, updated_at = now() \
         WHERE id = $1 AND status <> 'cancelled'",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

/// Period refresh on a successful recurring payment.
pub async fn refresh_period(
    exec: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    status: SubscriptionStatus,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<u64, BillingError> {
    let result = sqlx::query(
        "UPDATE subscriptions \
         SET status = $2, current_period_start = $3, current_period_end = $4, updated_at = now() \
         WHERE id = $1 AND status <> 'cancelled'",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(period_start)
    .bind(period_end)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

/// Full field refresh from a `customer.subscription.*` event. Period and
/// trial bounds only move when the event carries them.
pub async fn apply_processor_sync(
    exec: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    sync: &ProcessorSync,
) -> Result<u64, BillingError> {
    let result = sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = $2,
            current_period_start = COALESCE($3, current_period_start),
            current_period_end = COALESCE($4, current_period_end),
            cancel_at_period_end = $5,
            cancelled_at = $6,
            trial_start = COALESCE($7, trial_start),
            trial_end = COALESCE($8, trial_end),
            external_subscription_ref = COALESCE($9, external_subscription_ref),
            updated_at = now()
        WHERE id = $1 AND status <> 'cancelled'
        "#,
    )
    .bind(id)
    .bind(sync.status.as_str())
    .bind(sync.current_period_start)
    .bind(sync.current_period_end)
    .bind(sync.cancel_at_period_end)
    .bind(sync.cancelled_at)
    .bind(sync.trial_start)
    .bind(sync.trial_end)
    .bind(sync.external_subscription_ref.as_deref())
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

/// Cancels every row carrying the external reference, not just the first —
/// defensive against duplicate local rows. Returns the rows it cancelled.
pub async fn cancel_all_by_external_ref(
    exec: impl sqlx::PgExecutor<'_>,
    external_ref: &str,
    cancelled_at: DateTime<Utc>,
) -> Result<Vec<Subscription>, BillingError> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
        r#"
        UPDATE subscriptions
        SET status = 'cancelled', cancelled_at = $2, updated_at = now()
        WHERE external_subscription_ref = $1 AND status <> 'cancelled'
        RETURNING {COLUMNS}
        "#
    ))
    .bind(external_ref)
    .bind(cancelled_at)
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(Subscription::try_from).collect()
}
