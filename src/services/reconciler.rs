use {
    crate::domain::{
        audit::NewAuditEntry,
        error::BillingError,
        event::{InvoicePayload, META_PLAN_ID, META_USER_ID, PaymentIntentPayload, SubscriptionPayload},
        id::{EventId, InvoiceRef, PaymentRef, SubscriptionRef},
        idempotency::InsertOutcome,
        money::{Currency, Money, MoneyAmount},
        notify::{Notifier, PaymentSnapshot, SubscriptionSnapshot},
        payment::{FailureReason, NewPayment, PaymentStatus, PaymentType},
        subscription::{DEFAULT_PERIOD_DAYS, NewSubscription, ProcessorSync, SubscriptionStatus},
    },
    crate::infra::postgres::{audit_repo::insert_audit_entry, payment_repo, subscription_repo},
    chrono::{DateTime, Duration, Utc},
    sqlx::PgPool,
    std::sync::Arc,
    uuid::Uuid,
};

const ACTOR_WEBHOOK: &str = "webhook:stripe";

/// How often the promotion path re-runs delete-then-insert when it keeps
/// colliding with a freshly recreated INCOMPLETE row.
const PROMOTE_RETRIES: u32 = 3;

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// New row(s) written.
    Created(Uuid),
    /// Existing row advanced.
    Updated(Uuid),
    /// Redelivery or race — the intended effect already held.
    Suppressed(Uuid),
    /// Event refers to state that has already moved past it.
    NoOp,
    /// Transition rejected (unmapped status or invalid step) — old state kept.
    Skipped,
}

fn ts(unix: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix, 0).unwrap_or_else(Utc::now)
}

fn audit_entry(
    entity_type: &str,
    entity_id: Uuid,
    external_ref: Option<&str>,
    event_id: &EventId,
    action: &str,
    detail: serde_json::Value,
) -> NewAuditEntry {
    NewAuditEntry {
        id: Uuid::now_v7(),
        entity_type: entity_type.to_string(),
        entity_id: Some(entity_id),
        external_ref: external_ref.map(str::to_string),
        event_id: Some(event_id.as_str().to_string()),
        action: action.to_string(),
        actor: ACTOR_WEBHOOK.to_string(),
        detail,
    }
}

fn metadata_uuid(
    metadata: &std::collections::HashMap<String, String>,
    key: &'static str,
) -> Result<Uuid, BillingError> {
    metadata
        .get(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| BillingError::Validation(format!("event metadata missing {key}")))
}

/// `payment_intent.succeeded` — either the first subscription payment
/// (promotion path) or the confirmation of a pre-created one-time payment.
pub async fn payment_succeeded(
    pool: &PgPool,
    notifier: &Arc<dyn Notifier>,
    event_id: &EventId,
    occurred_at: i64,
    pi: &PaymentIntentPayload,
) -> Result<ReconcileOutcome, BillingError> {
    if pi.is_activation() {
        return promote_first_payment(pool, notifier, event_id, occurred_at, pi).await;
    }

    // The payment row must have been pre-created by the synchronous path
    // before the processor event could exist.
    let payment = payment_repo::find_by_external_payment_ref(pool, &pi.id)
        .await?
        .ok_or_else(|| BillingError::EntityNotFoundForUpdate {
            entity: "payment",
            reference: pi.id.clone(),
        })?;

    match payment.status {
        PaymentStatus::Succeeded => Ok(ReconcileOutcome::Suppressed(payment.id)),
        _ => {
            let paid_at = ts(occurred_at);
            payment_repo::mark_succeeded(pool, payment.id, paid_at).await?;
            insert_audit_entry(
                pool,
                &audit_entry(
                    "payment",
                    payment.id,
                    Some(&pi.id),
                    event_id,
                    "status_changed",
                    serde_json::json!({
                        "old_status": payment.status.as_str(),
                        "new_status": "succeeded",
                    }),
                ),
            )
            .await?;
            Ok(ReconcileOutcome::Updated(payment.id))
        }
    }
}

/// First confirmed payment: the INCOMPLETE provisional row (if any) is
/// replaced by an ACTIVE one, and the payment is recorded. The partial
/// unique index is the only arbiter; a conflicting live row means the other
/// path already won, except a fresh INCOMPLETE row, which is retried.
async fn promote_first_payment(
    pool: &PgPool,
    notifier: &Arc<dyn Notifier>,
    event_id: &EventId,
    occurred_at: i64,
    pi: &PaymentIntentPayload,
) -> Result<ReconcileOutcome, BillingError> {
    let user_id = metadata_uuid(&pi.metadata, META_USER_ID)?;
    let plan_id = metadata_uuid(&pi.metadata, META_PLAN_ID)?;
    let payment_ref = PaymentRef::new(pi.id.clone())?;
    let money = Money::new(
        MoneyAmount::new(pi.amount)?,
        Currency::try_from(pi.currency.as_str())?,
    );
    let period_start = ts(occurred_at);
    let period_end = period_start + Duration::days(DEFAULT_PERIOD_DAYS);

    for _ in 0..PROMOTE_RETRIES {
        let mut tx = pool.begin().await?;

        subscription_repo::delete_incomplete_by_user(&mut *tx, user_id).await?;

        let candidate = NewSubscription::active(user_id, plan_id, None, period_start, period_end);
        let outcome = subscription_repo::insert(&mut tx, &candidate).await?;

        let (sub, created) = match outcome {
            InsertOutcome::Inserted(sub) => (sub, true),
            InsertOutcome::AlreadyExists(existing)
                if existing.status == SubscriptionStatus::Incomplete =>
            {
                // The synchronous path recreated its provisional row after
                // our delete — run the delete-then-insert again.
                tx.rollback().await?;
                continue;
            }
            InsertOutcome::AlreadyExists(existing) => {
                tracing::info!(
                    entity = "subscription",
                    reference = %existing.id,
                    "duplicate suppressed"
                );
                (existing, false)
            }
        };

        let new_payment = NewPayment {
            id: Uuid::now_v7(),
            user_id,
            money,
            status: PaymentStatus::Succeeded,
            payment_type: PaymentType::Subscription,
            external_payment_ref: Some(payment_ref.clone()),
            external_invoice_ref: None,
            subscription_id: Some(sub.id),
            paid_at: Some(period_start),
            failure_reason: None,
        };
        let anchor = new_payment.anchor().to_string();
        let payment = payment_repo::insert(&mut tx, &new_payment)
            .await?
            .resolve("payment", &anchor);

        if created {
            insert_audit_entry(
                &mut *tx,
                &audit_entry(
                    "subscription",
                    sub.id,
                    Some(payment_ref.as_str()),
                    event_id,
                    "created",
                    serde_json::json!({
                        "status": "active",
                        "plan_id": plan_id,
                        "period_end": period_end,
                    }),
                ),
            )
            .await?;
            insert_audit_entry(
                &mut *tx,
                &audit_entry(
                    "payment",
                    payment.id,
                    Some(payment_ref.as_str()),
                    event_id,
                    "created",
                    serde_json::json!({
                        "amount": money.amount().cents(),
                        "currency": money.currency().as_str(),
                    }),
                ),
            )
            .await?;
        }

        tx.commit().await?;

        if created {
            let notifier = Arc::clone(notifier);
            let subscription = SubscriptionSnapshot {
                plan_id,
                status: SubscriptionStatus::Active,
                current_period_end: period_end,
            };
            let payment_snapshot = PaymentSnapshot {
                money,
                external_payment_ref: Some(payment_ref.as_str().to_string()),
            };
            // Off the acknowledgment path; a lost notification never fails
            // the handler.
            tokio::spawn(async move {
                if let Err(e) = notifier
                    .send_welcome(user_id, subscription, payment_snapshot)
                    .await
                {
                    tracing::warn!(error = %e, user_id = %user_id, "welcome notification failed");
                }
            });
            return Ok(ReconcileOutcome::Created(sub.id));
        }
        return Ok(ReconcileOutcome::Suppressed(sub.id));
    }

    Err(BillingError::Validation(
        "promotion kept colliding with recreated incomplete rows".to_string(),
    ))
}

/// `payment_intent.payment_failed` — marks the payment, never touches
/// subscription state.
pub async fn payment_failed(
    pool: &PgPool,
    event_id: &EventId,
    pi: &PaymentIntentPayload,
) -> Result<ReconcileOutcome, BillingError> {
    let payment = payment_repo::find_by_external_payment_ref(pool, &pi.id)
        .await?
        .ok_or_else(|| BillingError::EntityNotFoundForUpdate {
            entity: "payment",
            reference: pi.id.clone(),
        })?;

    match payment.status {
        PaymentStatus::Succeeded => {
            // Out-of-order failure after success — a payment never regresses.
            insert_audit_entry(
                pool,
                &audit_entry(
                    "payment",
                    payment.id,
                    Some(&pi.id),
                    event_id,
                    "anomaly",
                    serde_json::json!({
                        "current_status": "succeeded",
                        "incoming_status": "failed",
                    }),
                ),
            )
            .await?;
            tracing::warn!(
                external_ref = %pi.id,
                "failure event for an already-succeeded payment, ignored"
            );
            Ok(ReconcileOutcome::NoOp)
        }
        PaymentStatus::Failed => Ok(ReconcileOutcome::Suppressed(payment.id)),
        PaymentStatus::Pending => {
            let reason = FailureReason::from_processor(pi.last_payment_error.as_ref());
            payment_repo::mark_failed(pool, payment.id, &reason).await?;
            insert_audit_entry(
                pool,
                &audit_entry(
                    "payment",
                    payment.id,
                    Some(&pi.id),
                    event_id,
                    "status_changed",
                    serde_json::json!({
                        "old_status": "pending",
                        "new_status": "failed",
                        "reason": reason,
                    }),
                ),
            )
            .await?;
            Ok(ReconcileOutcome::Updated(payment.id))
        }
    }
}

/// `invoice.payment_succeeded` — records the recurring payment and advances
/// the subscription period. Anchored on the invoice reference, so replays
/// collapse into a single row.
pub async fn invoice_succeeded(
    pool: &PgPool,
    event_id: &EventId,
    occurred_at: i64,
    invoice: &InvoicePayload,
) -> Result<ReconcileOutcome, BillingError> {
    let sub_ref = invoice
        .subscription
        .as_deref()
        .ok_or_else(|| BillingError::Validation("invoice without subscription reference".into()))?;

    let subs = subscription_repo::find_by_external_ref(pool, sub_ref).await?;
    let sub = subs
        .iter()
        .find(|s| !s.status.is_terminal())
        .or(subs.first())
        .cloned()
        .ok_or_else(|| BillingError::EntityNotFoundForUpdate {
            entity: "subscription",
            reference: sub_ref.to_string(),
        })?;

    let amount = invoice.amount_paid.or(invoice.amount_due).unwrap_or(0);
    let money = Money::new(
        MoneyAmount::new(amount)?,
        Currency::try_from(invoice.currency.as_str())?,
    );
    let period_start = invoice.period_start.map(ts).unwrap_or_else(|| ts(occurred_at));
    let period_end = invoice
        .period_end
        .map(ts)
        .unwrap_or(period_start + Duration::days(DEFAULT_PERIOD_DAYS));

    let invoice_ref = InvoiceRef::new(invoice.id.clone())?;
    let payment_ref = invoice
        .payment_intent
        .clone()
        .map(PaymentRef::new)
        .transpose()?;

    let mut tx = pool.begin().await?;

    let new_payment = NewPayment {
        id: Uuid::now_v7(),
        user_id: sub.user_id,
        money,
        status: PaymentStatus::Succeeded,
        payment_type: PaymentType::Subscription,
        external_payment_ref: payment_ref,
        external_invoice_ref: Some(invoice_ref.clone()),
        subscription_id: Some(sub.id),
        paid_at: Some(ts(occurred_at)),
        failure_reason: None,
    };

    let payment = match payment_repo::insert(&mut tx, &new_payment).await? {
        InsertOutcome::AlreadyExists(payment) => {
            // Replay — the first delivery already refreshed the period too.
            tx.commit().await?;
            tracing::info!(
                entity = "payment",
                reference = %invoice_ref,
                "duplicate suppressed"
            );
            return Ok(ReconcileOutcome::Suppressed(payment.id));
        }
        InsertOutcome::Inserted(payment) => payment,
    };

    insert_audit_entry(
        &mut *tx,
        &audit_entry(
            "payment",
            payment.id,
            Some(invoice_ref.as_str()),
            event_id,
            "created",
            serde_json::json!({
                "amount": money.amount().cents(),
                "currency": money.currency().as_str(),
            }),
        ),
    )
    .await?;

    let outcome = if sub.status.is_terminal() {
        // Money moved, so the payment is recorded, but a cancelled
        // subscription stays cancelled.
        tracing::warn!(
            external_ref = %sub_ref,
            "invoice payment for a cancelled subscription, status untouched"
        );
        ReconcileOutcome::Created(payment.id)
    } else if sub.status == SubscriptionStatus::Active
        || sub.status.can_transition_to(&SubscriptionStatus::Active)
    {
        subscription_repo::refresh_period(
            &mut *tx,
            sub.id,
            SubscriptionStatus::Active,
            period_start,
            period_end,
        )
        .await?;
        if sub.status != SubscriptionStatus::Active {
            insert_audit_entry(
                &mut *tx,
                &audit_entry(
                    "subscription",
                    sub.id,
                    Some(sub_ref),
                    event_id,
                    "status_changed",
                    serde_json::json!({
                        "old_status": sub.status.as_str(),
                        "new_status": "active",
                    }),
                ),
            )
            .await?;
        }
        ReconcileOutcome::Updated(sub.id)
    } else {
        insert_audit_entry(
            &mut *tx,
            &audit_entry(
                "subscription",
                sub.id,
                Some(sub_ref),
                event_id,
                "anomaly",
                serde_json::json!({
                    "current_status": sub.status.as_str(),
                    "incoming_status": "active",
                }),
            ),
        )
        .await?;
        tracing::warn!(
            external_ref = %sub_ref,
            from = %sub.status,
            "invalid status transition, logged as anomaly"
        );
        ReconcileOutcome::Skipped
    };

    tx.commit().await?;
    Ok(outcome)
}

/// `invoice.payment_failed` — dunning entry point. Subscription degrades to
/// PAST_DUE; no payment row is created.
pub async fn invoice_failed(
    pool: &PgPool,
    event_id: &EventId,
    invoice: &InvoicePayload,
) -> Result<ReconcileOutcome, BillingError> {
    let sub_ref = invoice
        .subscription
        .as_deref()
        .ok_or_else(|| BillingError::Validation("invoice without subscription reference".into()))?;

    let subs = subscription_repo::find_by_external_ref(pool, sub_ref).await?;
    if subs.is_empty() {
        return Err(BillingError::EntityNotFoundForUpdate {
            entity: "subscription",
            reference: sub_ref.to_string(),
        });
    }

    let Some(sub) = subs.iter().find(|s| !s.status.is_terminal()) else {
        // Arrived after cancellation — a no-op, not an error.
        return Ok(ReconcileOutcome::NoOp);
    };

    match sub.status {
        SubscriptionStatus::PastDue => Ok(ReconcileOutcome::Suppressed(sub.id)),
        status if status.can_transition_to(&SubscriptionStatus::PastDue) => {
            subscription_repo::update_status(pool, sub.id, SubscriptionStatus::PastDue).await?;
            insert_audit_entry(
                pool,
                &audit_entry(
                    "subscription",
                    sub.id,
                    Some(sub_ref),
                    event_id,
                    "status_changed",
                    serde_json::json!({
                        "old_status": status.as_str(),
                        "new_status": "past_due",
                    }),
                ),
            )
            .await?;
            Ok(ReconcileOutcome::Updated(sub.id))
        }
        status => {
            tracing::warn!(
                external_ref = %sub_ref,
                from = %status,
                to = "past_due",
                "invalid status transition, logged as anomaly"
            );
            insert_audit_entry(
                pool,
                &audit_entry(
                    "subscription",
                    sub.id,
                    Some(sub_ref),
                    event_id,
                    "anomaly",
                    serde_json::json!({
                        "current_status": status.as_str(),
                        "incoming_status": "past_due",
                    }),
                ),
            )
            .await?;
            Ok(ReconcileOutcome::Skipped)
        }
    }
}

/// `customer.subscription.created` / `customer.subscription.updated` — the
/// processor's record is authoritative for every non-terminal row. A row
/// that has no external reference yet (the provisional INCOMPLETE one) is
/// located through the `user_id` metadata and acquires the reference here.
pub async fn subscription_synced(
    pool: &PgPool,
    event_id: &EventId,
    payload: &SubscriptionPayload,
) -> Result<ReconcileOutcome, BillingError> {
    let mapped = match SubscriptionStatus::from_processor(&payload.status) {
        Ok(status) => status,
        Err(BillingError::UnmappedStatus(value)) => {
            tracing::warn!(status = %value, external_ref = %payload.id, "unmapped processor status, update skipped");
            return Ok(ReconcileOutcome::Skipped);
        }
        Err(e) => return Err(e),
    };

    let sub_ref = SubscriptionRef::new(payload.id.clone())?;
    let mut subs = subscription_repo::find_by_external_ref(pool, sub_ref.as_str()).await?;
    let mut attach_ref = None;

    if subs.is_empty() {
        let user_id = payload
            .metadata
            .get(META_USER_ID)
            .and_then(|v| v.parse::<Uuid>().ok())
            .ok_or_else(|| BillingError::EntityNotFoundForUpdate {
                entity: "subscription",
                reference: payload.id.clone(),
            })?;
        let by_user = subscription_repo::find_live_by_user(pool, user_id)
            .await?
            .ok_or_else(|| BillingError::EntityNotFoundForUpdate {
                entity: "subscription",
                reference: payload.id.clone(),
            })?;
        attach_ref = Some(sub_ref.as_str().to_string());
        subs = vec![by_user];
    }

    let sync = ProcessorSync {
        status: mapped,
        current_period_start: payload.current_period_start.map(ts),
        current_period_end: payload.current_period_end.map(ts),
        cancel_at_period_end: payload.cancel_at_period_end,
        cancelled_at: payload.canceled_at.map(ts),
        trial_start: payload.trial_start.map(ts),
        trial_end: payload.trial_end.map(ts),
        external_subscription_ref: attach_ref,
    };

    let mut updated = 0;
    for sub in &subs {
        if sub.status.is_terminal() {
            continue;
        }
        let n = subscription_repo::apply_processor_sync(pool, sub.id, &sync).await?;
        if n > 0 && sub.status != mapped {
            insert_audit_entry(
                pool,
                &audit_entry(
                    "subscription",
                    sub.id,
                    Some(sub_ref.as_str()),
                    event_id,
                    "status_changed",
                    serde_json::json!({
                        "old_status": sub.status.as_str(),
                        "new_status": mapped.as_str(),
                        "cancel_at_period_end": payload.cancel_at_period_end,
                    }),
                ),
            )
            .await?;
        }
        updated += n;
    }

    if updated == 0 {
        Ok(ReconcileOutcome::NoOp)
    } else {
        Ok(ReconcileOutcome::Updated(subs[0].id))
    }
}

/// `customer.subscription.deleted` — cancels every local row matching the
/// external reference. Terminal and irreversible.
pub async fn subscription_deleted(
    pool: &PgPool,
    event_id: &EventId,
    payload: &SubscriptionPayload,
) -> Result<ReconcileOutcome, BillingError> {
    let cancelled =
        subscription_repo::cancel_all_by_external_ref(pool, &payload.id, Utc::now()).await?;

    if cancelled.is_empty() {
        let all = subscription_repo::find_by_external_ref(pool, &payload.id).await?;
        return match all.first() {
            Some(sub) => Ok(ReconcileOutcome::Suppressed(sub.id)),
            None => Err(BillingError::EntityNotFoundForUpdate {
                entity: "subscription",
                reference: payload.id.clone(),
            }),
        };
    }

    for sub in &cancelled {
        insert_audit_entry(
            pool,
            &audit_entry(
                "subscription",
                sub.id,
                Some(&payload.id),
                event_id,
                "cancelled",
                serde_json::json!({
                    "cancelled_at": sub.cancelled_at,
                }),
            ),
        )
        .await?;
    }

    Ok(ReconcileOutcome::Updated(cancelled[0].id))
}
