//! Integration tests for the credit ledger
//!
//! These tests exercise the store's atomic primitives, the webhook
//! reconciler's idempotency, and the gate's reserve/refund protocol against
//! a real Postgres database.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://..."
//! cargo test -p adforge-ledger -- --ignored --test-threads=1
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use adforge_ledger::{
    CreditGate, DebitOutcome, GateDecision, LedgerError, LedgerStore, PaymentConfig,
    ReconcileOutcome, RefundOutcome, WebhookEvent, WebhookReconciler,
};
use sqlx::PgPool;
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

async fn setup_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database")
}

fn test_payment_config() -> PaymentConfig {
    PaymentConfig {
        webhook_secret: "whsec_test_secret_at_least_32_chars_long".to_string(),
        signature_tolerance_secs: 300,
    }
}

/// Create a test account with the given starting balance
async fn create_test_account(pool: &PgPool, balance: i64) -> Uuid {
    let account_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO accounts (id, email, external_customer_id, credit_balance)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(account_id)
    .bind(format!("test-{}@example.com", account_id))
    .bind(format!("cus_test_{}", account_id))
    .bind(balance)
    .execute(pool)
    .await
    .expect("Failed to create test account");

    account_id
}

/// Create a test plan and return its external price id
async fn create_test_plan(pool: &PgPool, credits: i64) -> String {
    let price_id = format!("price_test_{}", Uuid::new_v4());
    sqlx::query(
        r#"
        INSERT INTO plans (id, name, external_price_id, credits_granted, active)
        VALUES ($1, $2, $3, $4, TRUE)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind("Test Plan")
    .bind(&price_id)
    .bind(credits)
    .execute(pool)
    .await
    .expect("Failed to create test plan");

    price_id
}

/// Cleanup test data after test completion
async fn cleanup_test_account(pool: &PgPool, account_id: Uuid) {
    // Delete in order to respect foreign key constraints

    sqlx::query("DELETE FROM ledger_events WHERE account_id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .ok(); // Ignore errors during cleanup

    sqlx::query("DELETE FROM credit_operations WHERE account_id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .ok();

    sqlx::query("DELETE FROM accounts WHERE id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .ok();
}

fn checkout_event(event_id: &str, account_id: Uuid, price_id: &str) -> WebhookEvent {
    let payload = serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "client_reference_id": account_id.to_string(),
                "line_items": {
                    "data": [
                        {"quantity": 1, "price": {"id": price_id}}
                    ]
                }
            }
        }
    });
    serde_json::from_value(payload).expect("valid test event")
}

// ============================================================================
// Ledger Store
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn test_debit_below_balance_is_noop() {
    let pool = setup_pool().await;
    let store = LedgerStore::new(pool.clone());
    let account_id = create_test_account(&pool, 3).await;

    let outcome = store
        .debit_if_available(account_id, 5, None)
        .await
        .expect("debit call should not error");

    match outcome {
        DebitOutcome::Denied { balance, reason } => {
            assert_eq!(balance, 3);
            assert!(reason.contains("5 required"));
        }
        other => panic!("Expected denial, got {:?}", other),
    }

    assert_eq!(store.balance(account_id).await.unwrap(), 3);

    // The denial itself is recorded for audit
    let ops = store.operations(account_id, 10).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert!(ops[0].error_message.is_some());

    cleanup_test_account(&pool, account_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_debits_never_overdraw() {
    let pool = setup_pool().await;
    let account_id = create_test_account(&pool, 10).await;

    // 10 credits, 20 concurrent debits of 3 each: at most 3 can succeed
    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = LedgerStore::new(pool.clone());
        handles.push(tokio::spawn(async move {
            store.debit_if_available(account_id, 3, None).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if let Ok(Ok(DebitOutcome::Debited { .. })) = handle.await {
            successes += 1;
        }
    }

    assert_eq!(successes, 3, "floor(10/3) debits must succeed, no more");

    let store = LedgerStore::new(pool.clone());
    assert_eq!(store.balance(account_id).await.unwrap(), 1);

    cleanup_test_account(&pool, account_id).await;
}

// ============================================================================
// Webhook Reconciler
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn test_duplicate_webhook_grants_once() {
    let pool = setup_pool().await;
    let store = LedgerStore::new(pool.clone());
    let reconciler = WebhookReconciler::new(test_payment_config(), pool.clone());

    let account_id = create_test_account(&pool, 0).await;
    let price_id = create_test_plan(&pool, 100).await;
    let event_id = format!("evt_test_{}", Uuid::new_v4());

    let first = reconciler
        .handle_event(checkout_event(&event_id, account_id, &price_id))
        .await
        .expect("first delivery should grant");
    assert!(matches!(first, ReconcileOutcome::Granted { credits: 100, .. }));

    let second = reconciler
        .handle_event(checkout_event(&event_id, account_id, &price_id))
        .await
        .expect("redelivery should be a no-op success");
    assert!(matches!(second, ReconcileOutcome::AlreadyProcessed));

    // Balance increased by exactly one grant's worth
    assert_eq!(store.balance(account_id).await.unwrap(), 100);

    // Exactly one successful grant row is tied to the event
    let ops = store.operations(account_id, 10).await.unwrap();
    let successful_grants = ops
        .iter()
        .filter(|op| op.external_event_id.as_deref() == Some(event_id.as_str()))
        .count();
    assert_eq!(successful_grants, 1);

    cleanup_test_account(&pool, account_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_duplicate_deliveries_grant_once() {
    let pool = setup_pool().await;
    let store = LedgerStore::new(pool.clone());

    let account_id = create_test_account(&pool, 0).await;
    let price_id = create_test_plan(&pool, 50).await;
    let event_id = format!("evt_test_{}", Uuid::new_v4());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let reconciler = WebhookReconciler::new(test_payment_config(), pool.clone());
        let event = checkout_event(&event_id, account_id, &price_id);
        handles.push(tokio::spawn(
            async move { reconciler.handle_event(event).await },
        ));
    }

    let mut grants = 0;
    for handle in handles {
        if let Ok(Ok(ReconcileOutcome::Granted { .. })) = handle.await {
            grants += 1;
        }
    }

    assert_eq!(grants, 1, "Concurrent duplicates must not both grant");
    assert_eq!(store.balance(account_id).await.unwrap(), 50);

    cleanup_test_account(&pool, account_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_unknown_plan_fails_without_grant() {
    let pool = setup_pool().await;
    let store = LedgerStore::new(pool.clone());
    let reconciler = WebhookReconciler::new(test_payment_config(), pool.clone());

    let account_id = create_test_account(&pool, 0).await;
    let event = checkout_event(
        &format!("evt_test_{}", Uuid::new_v4()),
        account_id,
        "price_nobody_configured",
    );

    let result = reconciler.handle_event(event).await;
    assert!(matches!(result, Err(LedgerError::UnknownPlan(_))));
    assert_eq!(store.balance(account_id).await.unwrap(), 0);

    cleanup_test_account(&pool, account_id).await;
}

// ============================================================================
// Credit Gate
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn test_gate_debits_and_records_operation() {
    let pool = setup_pool().await;
    let store = LedgerStore::new(pool.clone());
    let gate = CreditGate::new(pool.clone());

    // Account balance 5, required 1: gate allows, balance drops to 4
    let account_id = create_test_account(&pool, 5).await;

    let decision = gate
        .check_and_reserve(account_id, 1, Uuid::new_v4())
        .await
        .unwrap();

    let authorization = match decision {
        GateDecision::Authorized(auth) => auth,
        GateDecision::Denied { reason, .. } => panic!("Unexpected denial: {}", reason),
    };
    assert_eq!(authorization.balance_after, 4);
    assert_eq!(store.balance(account_id).await.unwrap(), 4);

    let ops = store.operations(account_id, 10).await.unwrap();
    assert_eq!(ops.len(), 1, "one debit operation recorded");

    cleanup_test_account(&pool, account_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_refund_restores_balance_exactly_once() {
    let pool = setup_pool().await;
    let store = LedgerStore::new(pool.clone());
    let gate = CreditGate::new(pool.clone());

    let account_id = create_test_account(&pool, 8).await;

    let decision = gate
        .check_and_reserve(account_id, 3, Uuid::new_v4())
        .await
        .unwrap();
    let authorization = match decision {
        GateDecision::Authorized(auth) => auth,
        other => panic!("Expected authorization, got {:?}", other),
    };
    assert_eq!(store.balance(account_id).await.unwrap(), 5);

    // First refund restores the pre-debit balance
    let first = gate.refund(&authorization).await.unwrap();
    assert!(matches!(first, RefundOutcome::Refunded { new_balance: 8 }));

    // Crash-retry of the same refund is a no-op
    let second = gate.refund(&authorization).await.unwrap();
    assert!(matches!(second, RefundOutcome::AlreadyRefunded));
    assert_eq!(store.balance(account_id).await.unwrap(), 8);

    cleanup_test_account(&pool, account_id).await;
}
