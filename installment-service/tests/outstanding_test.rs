//! Outstanding snapshot tests: single and batch refresh, partial failure,
//! cancellation, and the recovery workflow.

mod common;

use std::time::Duration;

use common::{cash_posting, d, date, engine, lease_account};
use installment_service::models::{
    AccountFilter, InstallmentPatch, OutstandingRecord, OutstandingStatus,
};
use installment_service::services::{LedgerError, LedgerStore, RecoveryCoordinator};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[tokio::test]
async fn refresh_with_empty_chain_uses_seed_balance() {
    let eng = engine();
    let account = lease_account("1200", 12, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    let record = eng.aggregator.refresh_one(account_id).await.unwrap();

    assert_eq!(record.outstanding_amount, d("1200"));
    assert_eq!(record.pending_installments, 12);
    assert_eq!(record.last_payment_date, None);
    assert_eq!(record.status, OutstandingStatus::Active.as_str());
    assert!(!record.reconciliation_required);
}

#[tokio::test]
async fn refresh_tracks_the_chain_tail() {
    let eng = engine();
    let account = lease_account("1200", 12, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    eng.ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 1, 5)))
        .await
        .unwrap();
    let mut second = cash_posting(account_id, "100", date(2024, 2, 5));
    second.fine = d("10");
    eng.ledger.post_installment(second).await.unwrap();

    let record = eng.aggregator.refresh_one(account_id).await.unwrap();

    assert_eq!(record.outstanding_amount, d("1010"));
    assert_eq!(record.pending_installments, 10);
    assert_eq!(record.last_payment_date, Some(date(2024, 2, 5)));
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let eng = engine();
    let account = lease_account("1200", 12, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;
    eng.ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 1, 5)))
        .await
        .unwrap();

    let first = eng.aggregator.refresh_one(account_id).await.unwrap();
    let second = eng.aggregator.refresh_one(account_id).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn batch_refresh_tolerates_per_account_failure() {
    let eng = engine();
    let account = lease_account("500", 5, "0");
    let good = account.account_id;
    eng.store.insert_account(account).await;
    let missing = Uuid::new_v4();

    let filter = AccountFilter {
        process_type: None,
        account_ids: Some(vec![good, missing]),
    };
    let summary = eng
        .aggregator
        .refresh_all(&filter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!summary.cancelled);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].account_id, missing);

    // The good account's snapshot still landed.
    let record = eng.store.outstanding(good).await.unwrap().unwrap();
    assert_eq!(record.outstanding_amount, d("500"));
}

#[tokio::test]
async fn batch_refresh_honors_cancellation() {
    let eng = engine();
    for _ in 0..3 {
        eng.store.insert_account(lease_account("100", 1, "0")).await;
    }

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = eng
        .aggregator
        .refresh_all(&AccountFilter::default(), &cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn clear_is_guarded_until_fully_paid() {
    let eng = engine();
    let account = lease_account("100", 1, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    eng.ledger
        .post_installment(cash_posting(account_id, "40", date(2024, 1, 1)))
        .await
        .unwrap();
    eng.aggregator.refresh_one(account_id).await.unwrap();

    let err = eng.coordinator.clear_outstanding(account_id).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::StillOutstanding {
            outstanding_amount, ..
        } if outstanding_amount == d("60")
    ));

    // Pay it off, refresh, and clearing goes through.
    eng.ledger
        .post_installment(cash_posting(account_id, "60", date(2024, 2, 1)))
        .await
        .unwrap();
    eng.aggregator.refresh_one(account_id).await.unwrap();

    let record = eng.coordinator.clear_outstanding(account_id).await.unwrap();
    assert_eq!(record.status, OutstandingStatus::Cleared.as_str());
    assert_eq!(record.outstanding_amount, Decimal::ZERO);
}

#[tokio::test]
async fn cleared_status_survives_refresh_until_balance_returns() {
    let eng = engine();
    let account = lease_account("100", 1, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    let posted = eng
        .ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 1, 1)))
        .await
        .unwrap();
    eng.aggregator.refresh_one(account_id).await.unwrap();
    eng.coordinator.clear_outstanding(account_id).await.unwrap();

    // A zero-amount refresh keeps the cleared marker.
    let record = eng.aggregator.refresh_one(account_id).await.unwrap();
    assert_eq!(record.status, OutstandingStatus::Cleared.as_str());

    // Shrinking the payment re-opens the account on the next refresh.
    eng.ledger
        .update_installment(
            posted.id,
            InstallmentPatch {
                install_charge: Some(d("80")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let record = eng.aggregator.refresh_one(account_id).await.unwrap();
    assert_eq!(record.status, OutstandingStatus::Active.as_str());
    assert_eq!(record.outstanding_amount, d("20"));
}

#[tokio::test(start_paused = true)]
async fn clear_waits_for_the_account_lock() {
    let eng = engine();
    let account = lease_account("100", 1, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;
    eng.ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 1, 1)))
        .await
        .unwrap();
    eng.aggregator.refresh_one(account_id).await.unwrap();

    // Hold the account lock the way a running refresh would.
    let lock = eng.locks.for_account(account_id);
    let guard = lock.lock().await;

    let coordinator = RecoveryCoordinator::new(eng.store.clone(), eng.locks.clone());
    let mut clear = tokio::spawn(async move { coordinator.clear_outstanding(account_id).await });

    let racing = tokio::time::timeout(Duration::from_millis(50), &mut clear).await;
    assert!(racing.is_err(), "clear must block while the account is locked");

    drop(guard);
    let record = clear.await.unwrap().unwrap();
    assert_eq!(record.status, OutstandingStatus::Cleared.as_str());
}

#[tokio::test]
async fn settle_guard_is_atomic_in_the_store() {
    let eng = engine();
    let account_id = Uuid::new_v4();
    let mut record = OutstandingRecord {
        account_id,
        outstanding_amount: d("75"),
        pending_installments: 2,
        last_payment_date: None,
        recovery_officer_id: None,
        status: OutstandingStatus::Active.as_str().to_string(),
        reconciliation_required: false,
    };
    eng.store.replace_outstanding(&record).await.unwrap();

    // A positive amount defeats the write even without the coordinator's
    // pre-check in front of it.
    assert!(eng.store.clear_if_settled(account_id).await.unwrap().is_none());
    let stored = eng.store.outstanding(account_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutstandingStatus::Active.as_str());

    record.outstanding_amount = Decimal::ZERO;
    eng.store.replace_outstanding(&record).await.unwrap();
    let cleared = eng.store.clear_if_settled(account_id).await.unwrap().unwrap();
    assert_eq!(cleared.status, OutstandingStatus::Cleared.as_str());
}

#[tokio::test]
async fn clear_without_snapshot_fails() {
    let eng = engine();
    let err = eng
        .coordinator
        .clear_outstanding(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OutstandingNotFound(_)));
}

#[tokio::test]
async fn officer_assignment_survives_refresh() {
    let eng = engine();
    let account = lease_account("300", 3, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;
    eng.aggregator.refresh_one(account_id).await.unwrap();

    let officer = Uuid::new_v4();
    let no_record = Uuid::new_v4();
    let updated = eng
        .coordinator
        .assign_officer(&[account_id, no_record], officer)
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let record = eng.aggregator.refresh_one(account_id).await.unwrap();
    assert_eq!(record.recovery_officer_id, Some(officer));
}

#[tokio::test]
async fn over_payment_past_advance_flags_reconciliation() {
    let eng = engine();
    let account = lease_account("100", 1, "30");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    // Pay 150 against 100 owed: tail balance -50 exceeds the 30 advance.
    eng.ledger
        .post_installment(cash_posting(account_id, "150", date(2024, 1, 1)))
        .await
        .unwrap();
    let record = eng.aggregator.refresh_one(account_id).await.unwrap();

    assert!(record.reconciliation_required);
    // Snapshot amount is floored at zero even when the tail is negative.
    assert_eq!(record.outstanding_amount, Decimal::ZERO);
}
