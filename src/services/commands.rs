use {
    crate::domain::{
        audit::NewAuditEntry,
        error::BillingError,
        gateway::{CheckoutRequest, PortalSession, ProcessorGateway},
        id::CustomerRef,
        idempotency::InsertOutcome,
        payment::Payment,
        plan::Plan,
        subscription::{NewSubscription, Subscription, SubscriptionStatus},
    },
    crate::infra::postgres::{
        audit_repo::insert_audit_entry, customer_repo, payment_repo, plan_repo, subscription_repo,
    },
    chrono::Utc,
    sqlx::PgPool,
    std::sync::Arc,
    uuid::Uuid,
};

const ACTOR_API: &str = "api:user";
const RECENT_PAYMENTS: i64 = 10;

#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub return_url: Option<String>,
}

#[derive(Debug)]
pub struct CreatedSubscription {
    pub subscription: Subscription,
    /// Where the client continues the processor handshake. Absent when the
    /// asynchronous path already activated the subscription.
    pub checkout_url: Option<String>,
    pub continuation_token: Option<String>,
}

#[derive(Debug)]
pub struct SubscriptionOverview {
    pub subscription: Option<Subscription>,
    pub recent_payments: Vec<Payment>,
    /// Offered only while the user has no live subscription.
    pub available_plans: Vec<Plan>,
}

/// Creates the provisional INCOMPLETE row and starts the processor
/// handshake. Promotion to ACTIVE happens exclusively on the webhook path.
pub async fn create_subscription(
    pool: &PgPool,
    gateway: &Arc<dyn ProcessorGateway>,
    request: CreateSubscriptionRequest,
) -> Result<CreatedSubscription, BillingError> {
    let plan = plan_repo::find_by_id(pool, request.plan_id)
        .await?
        .ok_or(BillingError::UnknownPlan)?;

    if let Some(existing) = subscription_repo::find_live_by_user(pool, request.user_id).await? {
        match existing.status {
            // A stale checkout is restarted, matching the webhook path's
            // delete-then-recreate.
            SubscriptionStatus::Incomplete => {
                subscription_repo::delete_incomplete_by_user(pool, request.user_id).await?;
            }
            _ => return Err(BillingError::ConflictingActiveSubscription),
        }
    }

    let customer = match customer_repo::find_by_user(pool, request.user_id).await? {
        Some(existing) => CustomerRef::new(existing)?,
        None => {
            let minted = gateway.ensure_customer(request.user_id).await?;
            customer_repo::ensure(pool, request.user_id, minted.as_str()).await?;
            minted
        }
    };

    let handshake = gateway
        .start_subscription_checkout(CheckoutRequest {
            customer,
            external_price_ref: plan.external_price_ref.clone(),
            user_id: request.user_id,
            plan_id: plan.id,
            return_url: request.return_url.clone(),
        })
        .await?;

    let provisional = NewSubscription::incomplete(
        request.user_id,
        plan.id,
        handshake
            .provisional_subscription_ref
            .as_ref()
            .map(|r| r.as_str().to_string()),
        Utc::now(),
    );

    let mut tx = pool.begin().await?;
    let outcome = subscription_repo::insert(&mut tx, &provisional).await?;

    match outcome {
        InsertOutcome::Inserted(subscription) => {
            insert_audit_entry(
                &mut *tx,
                &NewAuditEntry {
                    id: Uuid::now_v7(),
                    entity_type: "subscription".to_string(),
                    entity_id: Some(subscription.id),
                    external_ref: subscription.external_subscription_ref.clone(),
                    event_id: None,
                    action: "created".to_string(),
                    actor: ACTOR_API.to_string(),
                    detail: serde_json::json!({
                        "status": "incomplete",
                        "plan_id": plan.id,
                    }),
                },
            )
            .await?;
            tx.commit().await?;
            Ok(CreatedSubscription {
                subscription,
                checkout_url: handshake.url,
                continuation_token: Some(handshake.session_ref),
            })
        }
        // Lost the race against the webhook path — the winner is the
        // correct current state, not an error.
        InsertOutcome::AlreadyExists(existing) => {
            tx.commit().await?;
            tracing::info!(
                user_id = %request.user_id,
                status = %existing.status,
                "subscription insert raced, returning the winning row"
            );
            let raced_with_activation = existing.status != SubscriptionStatus::Incomplete;
            Ok(CreatedSubscription {
                subscription: existing,
                checkout_url: (!raced_with_activation).then_some(handshake.url).flatten(),
                continuation_token: (!raced_with_activation).then_some(handshake.session_ref),
            })
        }
    }
}

/// Current subscription plus recent payments; available plans when none.
pub async fn get_overview(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<SubscriptionOverview, BillingError> {
    let subscription = subscription_repo::find_live_by_user(pool, user_id).await?;
    let recent_payments = payment_repo::recent_for_user(pool, user_id, RECENT_PAYMENTS).await?;
    let available_plans = if subscription.is_none() {
        plan_repo::list_active(pool).await?
    } else {
        Vec::new()
    };

    Ok(SubscriptionOverview {
        subscription,
        recent_payments,
        available_plans,
    })
}

/// Destroys the provisional row. Permitted only while INCOMPLETE.
pub async fn delete_incomplete(pool: &PgPool, user_id: Uuid) -> Result<(), BillingError> {
    let deleted = subscription_repo::delete_incomplete_by_user(pool, user_id).await?;
    if deleted == 0 {
        return Err(BillingError::InvalidStateForDeletion);
    }

    insert_audit_entry(
        pool,
        &NewAuditEntry {
            id: Uuid::now_v7(),
            entity_type: "subscription".to_string(),
            entity_id: None,
            external_ref: None,
            event_id: None,
            action: "deleted".to_string(),
            actor: ACTOR_API.to_string(),
            detail: serde_json::json!({ "user_id": user_id, "status": "incomplete" }),
        },
    )
    .await?;

    Ok(())
}

/// Billing-portal redirect. Requires an existing processor customer.
pub async fn open_portal(
    pool: &PgPool,
    gateway: &Arc<dyn ProcessorGateway>,
    user_id: Uuid,
    return_url: Option<String>,
) -> Result<PortalSession, BillingError> {
    let customer = customer_repo::find_by_user(pool, user_id)
        .await?
        .ok_or(BillingError::NoBillingAccount)?;

    gateway
        .open_portal(CustomerRef::new(customer)?, return_url)
        .await
}
