mod common;

use bill_sync::domain::error::BillingError;
use bill_sync::infra::postgres::customer_repo;
use bill_sync::services::commands::{self, CreateSubscriptionRequest};
use common::*;
use uuid::Uuid;

fn create_request(user_id: Uuid, plan_id: Uuid) -> CreateSubscriptionRequest {
    CreateSubscriptionRequest {
        user_id,
        plan_id,
        return_url: Some("https://app.example/billing".to_string()),
    }
}

// ── 30. create_returns_provisional_row_and_token ───────────────────────────

#[tokio::test]
async fn create_returns_provisional_row_and_token() {
    let pool = setup_pool("bill_sync_test_commands").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();

    let created = commands::create_subscription(&pool, &stub_gateway(), create_request(user_id, plan_id))
        .await
        .unwrap();

    assert_eq!(created.subscription.status.as_str(), "incomplete");
    assert_eq!(created.subscription.user_id, user_id);
    assert_eq!(created.continuation_token.as_deref(), Some("cs_test_stub"));
    assert!(created.checkout_url.as_deref().unwrap().starts_with("https://"));
    assert_eq!(count_payments_for_user(&pool, user_id).await, 0);

    // The handshake minted a billing customer for this user.
    let customer = customer_repo::find_by_user(&pool, user_id).await.unwrap();
    assert!(customer.unwrap().starts_with("cus_"));
}

// ── 31. create_with_unknown_plan_is_rejected ───────────────────────────────

#[tokio::test]
async fn create_with_unknown_plan_is_rejected() {
    let pool = setup_pool("bill_sync_test_commands").await;
    let user_id = Uuid::now_v7();

    let result = commands::create_subscription(
        &pool,
        &stub_gateway(),
        create_request(user_id, Uuid::now_v7()),
    )
    .await;

    assert!(matches!(result, Err(BillingError::UnknownPlan)));
    assert!(get_subscriptions(&pool, user_id).await.is_empty());
}

// ── 32. create_conflicts_with_active_subscription ──────────────────────────

#[tokio::test]
async fn create_conflicts_with_active_subscription() {
    let pool = setup_pool("bill_sync_test_commands").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();
    seed_subscription(&pool, user_id, plan_id, "active", Some("sub_conflict")).await;

    let result =
        commands::create_subscription(&pool, &stub_gateway(), create_request(user_id, plan_id))
            .await;

    assert!(matches!(
        result,
        Err(BillingError::ConflictingActiveSubscription)
    ));
    assert_eq!(get_subscriptions(&pool, user_id).await.len(), 1);
}

// ── 33. create_replaces_stale_incomplete_row ───────────────────────────────
// Restarting checkout replaces the provisional row instead of stacking a
// second one.

#[tokio::test]
async fn create_replaces_stale_incomplete_row() {
    let pool = setup_pool("bill_sync_test_commands").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();

    let first = commands::create_subscription(&pool, &stub_gateway(), create_request(user_id, plan_id))
        .await
        .unwrap();
    let second = commands::create_subscription(&pool, &stub_gateway(), create_request(user_id, plan_id))
        .await
        .unwrap();

    let subs = get_subscriptions(&pool, user_id).await;
    assert_eq!(subs.len(), 1, "old provisional row replaced, not stacked");
    assert_eq!(subs[0].id, second.subscription.id);
    assert_ne!(first.subscription.id, second.subscription.id);
    assert_eq!(subs[0].status, "incomplete");
}

// ── 34. delete_requires_incomplete_status ──────────────────────────────────

#[tokio::test]
async fn delete_requires_incomplete_status() {
    let pool = setup_pool("bill_sync_test_commands").await;
    let plan_id = seed_plan(&pool).await;

    let active_user = Uuid::now_v7();
    seed_subscription(&pool, active_user, plan_id, "active", Some("sub_del_act")).await;
    let result = commands::delete_incomplete(&pool, active_user).await;
    assert!(matches!(result, Err(BillingError::InvalidStateForDeletion)));
    assert_eq!(get_subscriptions(&pool, active_user).await.len(), 1);

    let incomplete_user = Uuid::now_v7();
    seed_subscription(&pool, incomplete_user, plan_id, "incomplete", None).await;
    commands::delete_incomplete(&pool, incomplete_user).await.unwrap();
    assert!(get_subscriptions(&pool, incomplete_user).await.is_empty());

    // A second delete has nothing left to remove.
    let result = commands::delete_incomplete(&pool, incomplete_user).await;
    assert!(matches!(result, Err(BillingError::InvalidStateForDeletion)));
}

// ── 35. portal_requires_billing_account ────────────────────────────────────

#[tokio::test]
async fn portal_requires_billing_account() {
    let pool = setup_pool("bill_sync_test_commands").await;
    let user_id = Uuid::now_v7();

    let result = commands::open_portal(&pool, &stub_gateway(), user_id, None).await;
    assert!(matches!(result, Err(BillingError::NoBillingAccount)));

    customer_repo::ensure(&pool, user_id, "cus_portal_user").await.unwrap();
    let session = commands::open_portal(&pool, &stub_gateway(), user_id, None)
        .await
        .unwrap();
    assert_eq!(session.url, "https://portal.example/cus_portal_user");
}

// ── 36. overview_offers_plans_only_without_subscription ────────────────────

#[tokio::test]
async fn overview_offers_plans_only_without_subscription() {
    let pool = setup_pool("bill_sync_test_commands").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();

    let overview = commands::get_overview(&pool, user_id).await.unwrap();
    assert!(overview.subscription.is_none());
    assert!(overview.available_plans.iter().any(|p| p.id == plan_id));

    seed_subscription(&pool, user_id, plan_id, "active", Some("sub_overview")).await;
    seed_pending_payment(&pool, user_id, "pi_overview", 2900).await;

    let overview = commands::get_overview(&pool, user_id).await.unwrap();
    let subscription = overview.subscription.unwrap();
    assert_eq!(subscription.status.as_str(), "active");
    assert_eq!(overview.recent_payments.len(), 1);
    assert!(overview.available_plans.is_empty());
}
