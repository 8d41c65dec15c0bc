mod common;

use bill_sync::services::commands::{self, CreateSubscriptionRequest};
use bill_sync::services::reconciler::{self, ReconcileOutcome};
use common::*;
use uuid::Uuid;

// ── 20. concurrent_activation_replay ───────────────────────────────────────
// 10 tasks deliver the same first-payment event. Exactly one promotes; the
// rest are suppressed by the unique external reference, leaving one
// subscription and one payment.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activation_replay() {
    let pool = setup_pool("bill_sync_test_concurrency").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();
    seed_subscription(&pool, user_id, plan_id, "incomplete", None).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let pi = activation_intent("pi_conc_act", user_id, plan_id, 2900);
            reconciler::payment_succeeded(&pool, &stub_notifier(), &evt("evt_conc_act"), TS, &pi)
                .await
                .unwrap()
        }));
    }

    let mut created = 0;
    let mut suppressed = 0;
    for h in handles {
        match h.await.unwrap() {
            ReconcileOutcome::Created(_) => created += 1,
            ReconcileOutcome::Suppressed(_) => suppressed += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(created, 1, "exactly 1 Created");
    assert_eq!(suppressed, 9, "9 Suppressed");
    assert_eq!(get_subscriptions(&pool, user_id).await.len(), 1);
    assert_eq!(count_payments_by_ref(&pool, "pi_conc_act").await, 1);
}

// ── 21. race_convergence_delete_vs_promote ─────────────────────────────────
// A user with an INCOMPLETE row concurrently requests deletion while the
// confirming payment event is delivered. Whatever the interleaving, the
// payment event ends with exactly one ACTIVE row — never two rows.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn race_convergence_delete_vs_promote() {
    let pool = setup_pool("bill_sync_test_concurrency").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();
    seed_subscription(&pool, user_id, plan_id, "incomplete", None).await;

    let delete_pool = pool.clone();
    let delete_task =
        tokio::spawn(async move { commands::delete_incomplete(&delete_pool, user_id).await });

    let promote_pool = pool.clone();
    let promote_task = tokio::spawn(async move {
        let pi = activation_intent("pi_race_dp", user_id, plan_id, 2900);
        reconciler::payment_succeeded(
            &promote_pool,
            &stub_notifier(),
            &evt("evt_race_dp"),
            TS,
            &pi,
        )
        .await
        .unwrap()
    });

    // Deletion either wins against the INCOMPLETE row or finds it already
    // gone — both are legitimate.
    let _ = delete_task.await.unwrap();
    let promote_outcome = promote_task.await.unwrap();
    assert!(matches!(promote_outcome, ReconcileOutcome::Created(_)));

    assert_eq!(count_live_subscriptions(&pool, user_id).await, 1);
    let subs = get_subscriptions(&pool, user_id).await;
    let live: Vec<_> = subs.iter().filter(|s| s.status != "cancelled").collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].status, "active");
    assert_eq!(count_payments_by_ref(&pool, "pi_race_dp").await, 1);
}

// ── 22. race_convergence_api_create_vs_promote ─────────────────────────────
// The synchronous create races the first-payment webhook. The partial
// unique index arbitrates; the end state is one ACTIVE row, and the API call
// either succeeds (possibly as a no-op against the winner) or reports the
// conflict.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn race_convergence_api_create_vs_promote() {
    let pool = setup_pool("bill_sync_test_concurrency").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();

    let create_pool = pool.clone();
    let create_task = tokio::spawn(async move {
        commands::create_subscription(
            &create_pool,
            &stub_gateway(),
            CreateSubscriptionRequest {
                user_id,
                plan_id,
                return_url: None,
            },
        )
        .await
    });

    let promote_pool = pool.clone();
    let promote_task = tokio::spawn(async move {
        let pi = activation_intent("pi_race_cp", user_id, plan_id, 2900);
        reconciler::payment_succeeded(
            &promote_pool,
            &stub_notifier(),
            &evt("evt_race_cp"),
            TS,
            &pi,
        )
        .await
        .unwrap()
    });

    let create_result = create_task.await.unwrap();
    let promote_outcome = promote_task.await.unwrap();

    assert!(matches!(
        promote_outcome,
        ReconcileOutcome::Created(_) | ReconcileOutcome::Suppressed(_)
    ));
    if let Ok(created) = create_result {
        // Raced against the winner or produced the provisional row that the
        // promotion then replaced.
        assert!(matches!(
            created.subscription.status.as_str(),
            "incomplete" | "active"
        ));
    }

    assert_eq!(count_live_subscriptions(&pool, user_id).await, 1);
    let subs = get_subscriptions(&pool, user_id).await;
    let live: Vec<_> = subs.iter().filter(|s| s.status != "cancelled").collect();
    assert_eq!(live.len(), 1, "never two live rows for the same user");
    assert_eq!(live[0].status, "active");
    assert_eq!(count_payments_by_ref(&pool, "pi_race_cp").await, 1);
}

// ── 23. concurrent_invoice_replay ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invoice_replay() {
    let pool = setup_pool("bill_sync_test_concurrency").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();
    seed_subscription(&pool, user_id, plan_id, "active", Some("sub_conc_inv")).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let inv = invoice("in_conc", "sub_conc_inv", None, 2900, (TS, TS + 86_400));
            reconciler::invoice_succeeded(&pool, &evt("evt_conc_inv"), TS, &inv)
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    let mut suppressed = 0;
    for h in handles {
        match h.await.unwrap() {
            ReconcileOutcome::Updated(_) => applied += 1,
            ReconcileOutcome::Suppressed(_) => suppressed += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(applied, 1, "exactly 1 applied");
    assert_eq!(suppressed, 4, "4 suppressed");
    assert_eq!(count_payments_by_invoice(&pool, "in_conc").await, 1);
}

// ── 24. cancellation_wins_over_concurrent_invoice ──────────────────────────
// Terminality is enforced in the UPDATE guards, so whichever order the
// writes land, a deleted subscription ends CANCELLED. The invoice payment
// itself is still recorded.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_wins_over_concurrent_invoice() {
    let pool = setup_pool("bill_sync_test_concurrency").await;
    let plan_id = seed_plan(&pool).await;
    let user_id = Uuid::now_v7();
    seed_subscription(&pool, user_id, plan_id, "active", Some("sub_cxl_race")).await;

    let cancel_pool = pool.clone();
    let cancel_task = tokio::spawn(async move {
        reconciler::subscription_deleted(
            &cancel_pool,
            &evt("evt_cxl"),
            &sub_payload("sub_cxl_race", "canceled"),
        )
        .await
        .unwrap()
    });

    let invoice_pool = pool.clone();
    let invoice_task = tokio::spawn(async move {
        let inv = invoice("in_cxl_race", "sub_cxl_race", None, 2900, (TS, TS + 86_400));
        reconciler::invoice_succeeded(&invoice_pool, &evt("evt_cxl_inv"), TS, &inv)
            .await
            .unwrap()
    });

    cancel_task.await.unwrap();
    invoice_task.await.unwrap();

    let subs = get_subscriptions(&pool, user_id).await;
    assert_eq!(subs[0].status, "cancelled");
    assert!(subs[0].cancelled_at.is_some());
    assert_eq!(count_payments_by_invoice(&pool, "in_cxl_race").await, 1);
}
