//! Installment chain integration tests: posting, cascade on update, and
//! re-chaining on delete.

mod common;

use common::{cash_posting, d, date, engine, lease_account};
use installment_service::models::{FineType, InstallmentPatch, PaymentMethod};
use installment_service::services::LedgerError;
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn first_posting_seeds_from_remaining_balance() {
    let eng = engine();
    let account = lease_account("1200", 12, "200");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    let posted = eng
        .ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 1, 5)))
        .await
        .unwrap();

    assert_eq!(posted.recv_no, 1);
    assert_eq!(posted.pre_balance, d("1200"));
    assert_eq!(posted.balance, d("1100"));
    assert_eq!(posted.outstanding, d("1100"));
}

#[tokio::test]
async fn chain_links_and_cascade_on_edit() {
    let eng = engine();
    let account = lease_account("1200", 12, "200");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    // Post A, then B on a later date with a fixed fine of 10.
    let a = eng
        .ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 1, 5)))
        .await
        .unwrap();
    let mut b_input = cash_posting(account_id, "100", date(2024, 2, 5));
    b_input.fine = d("10");
    let b = eng.ledger.post_installment(b_input).await.unwrap();

    assert_eq!(a.pre_balance, d("1200"));
    assert_eq!(a.balance, d("1100"));
    assert_eq!(b.pre_balance, d("1100"));
    assert_eq!(b.balance, d("1000"));
    assert_eq!(b.fine, d("10"));
    assert_eq!(b.outstanding, d("1010"));

    // Edit A's discount to 50: A's balance drops to 1050 and B re-chains.
    let outcome = eng
        .ledger
        .update_installment(
            a.id,
            InstallmentPatch {
                discount: Some(d("50")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.rewritten, 1);
    let chain = eng.ledger.get_chain(account_id).await.unwrap();
    assert_eq!(chain[0].balance, d("1050"));
    assert_eq!(chain[1].pre_balance, d("1050"));
    assert_eq!(chain[1].balance, d("950"));
}

#[tokio::test]
async fn edit_cascades_only_forward() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    for day in [1, 2, 3] {
        eng.ledger
            .post_installment(cash_posting(account_id, "100", date(2024, 3, day)))
            .await
            .unwrap();
    }

    let chain = eng.ledger.get_chain(account_id).await.unwrap();
    let first = chain[0].clone();

    eng.ledger
        .update_installment(
            chain[1].id,
            InstallmentPatch {
                install_charge: Some(d("150")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let after = eng.ledger.get_chain(account_id).await.unwrap();
    assert_eq!(after[0], first, "nodes before the edit must be untouched");
    assert_eq!(after[1].balance, d("750"));
    assert_eq!(after[2].pre_balance, d("750"));
    assert_eq!(after[2].balance, d("650"));
}

#[tokio::test]
async fn date_edit_reorders_the_chain_and_cascades() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    for day in [1, 2, 3] {
        eng.ledger
            .post_installment(cash_posting(account_id, "100", date(2024, 3, day)))
            .await
            .unwrap();
    }
    let chain = eng.ledger.get_chain(account_id).await.unwrap();
    let (a, b, c) = (chain[0].clone(), chain[1].clone(), chain[2].clone());

    // Move B past C; the chain re-sorts to A, C, B and the cascade starts
    // at B's old position.
    eng.ledger
        .update_installment(
            b.id,
            InstallmentPatch {
                install_date: Some(date(2024, 3, 4)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let after = eng.ledger.get_chain(account_id).await.unwrap();
    let order: Vec<Uuid> = after.iter().map(|i| i.id).collect();
    assert_eq!(order, vec![a.id, c.id, b.id]);

    assert_eq!(after[0], a, "nodes before the old position are untouched");
    assert_eq!(after[1].pre_balance, d("900"));
    assert_eq!(after[1].balance, d("800"));
    assert_eq!(after[2].pre_balance, d("800"));
    assert_eq!(after[2].balance, d("700"));
}

#[tokio::test]
async fn delete_re_chains_successors() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    for day in [1, 2, 3] {
        eng.ledger
            .post_installment(cash_posting(account_id, "100", date(2024, 3, day)))
            .await
            .unwrap();
    }
    let chain = eng.ledger.get_chain(account_id).await.unwrap();

    let outcome = eng.ledger.delete_installment(chain[1].id).await.unwrap();
    assert_eq!(outcome.rewritten, 1);

    let after = eng.ledger.get_chain(account_id).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].balance, d("900"));
    assert_eq!(after[1].pre_balance, d("900"));
    assert_eq!(after[1].balance, d("800"));
}

#[tokio::test]
async fn zero_charge_is_rejected_with_no_partial_write() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    let mut input = cash_posting(account_id, "100", date(2024, 1, 1));
    input.install_charge = Decimal::ZERO;
    let err = eng.ledger.post_installment(input).await.unwrap_err();
    assert!(matches!(err, LedgerError::InstallChargeRequired));

    assert!(eng.ledger.get_chain(account_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn back_dated_posting_is_rejected() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    eng.ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 4, 1)))
        .await
        .unwrap();

    let err = eng
        .ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 3, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OutOfOrderPosting { .. }));

    assert_eq!(eng.ledger.get_chain(account_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn bank_posting_requires_active_bank_account() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    let mut input = cash_posting(account_id, "100", date(2024, 1, 1));
    input.payment_method = PaymentMethod::Bank;
    let err = eng.ledger.post_installment(input.clone()).await.unwrap_err();
    assert!(matches!(err, LedgerError::BankAccountRequired));

    // An inactive bank account is as good as none.
    let inactive = Uuid::new_v4();
    eng.store.insert_bank_account(inactive, false).await;
    input.bank_account_id = Some(inactive);
    let err = eng.ledger.post_installment(input.clone()).await.unwrap_err();
    assert!(matches!(err, LedgerError::BankAccountRequired));

    let active = Uuid::new_v4();
    eng.store.insert_bank_account(active, true).await;
    input.bank_account_id = Some(active);
    let posted = eng.ledger.post_installment(input).await.unwrap();
    assert_eq!(posted.bank_account_id, Some(active));
}

#[tokio::test]
async fn posting_to_unknown_account_fails() {
    let eng = engine();
    let err = eng
        .ledger
        .post_installment(cash_posting(Uuid::new_v4(), "100", date(2024, 1, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(_)));
}

#[tokio::test]
async fn updating_unknown_installment_fails() {
    let eng = engine();
    let err = eng
        .ledger
        .update_installment(Uuid::new_v4(), InstallmentPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InstallmentNotFound(_)));
}

#[tokio::test]
async fn percentage_fine_is_derived_from_charge() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    let mut input = cash_posting(account_id, "100", date(2024, 1, 1));
    input.fine = d("10");
    input.fine_type = FineType::Percentage;
    let posted = eng.ledger.post_installment(input).await.unwrap();

    // 10% of the 100 charge; the fine rides on outstanding, not balance.
    assert_eq!(posted.balance, d("900"));
    assert_eq!(posted.outstanding, d("910"));
}

#[tokio::test]
async fn over_payment_cascade_flags_reconciliation() {
    let eng = engine();
    let account = lease_account("100", 2, "20");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    let a = eng
        .ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 1, 1)))
        .await
        .unwrap();
    eng.ledger
        .post_installment(cash_posting(account_id, "10", date(2024, 2, 1)))
        .await
        .unwrap();

    // Raising A's charge drives the tail to -60, past the 20 advance.
    // The cascade still proceeds; over-payment is surfaced, not rejected.
    let outcome = eng
        .ledger
        .update_installment(
            a.id,
            InstallmentPatch {
                install_charge: Some(d("150")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.reconciliation_required);
    let chain = eng.ledger.get_chain(account_id).await.unwrap();
    assert_eq!(chain[1].balance, d("-60"));
}

#[tokio::test]
async fn sms_flag_is_patchable_without_touching_figures() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    let posted = eng
        .ledger
        .post_installment(cash_posting(account_id, "100", date(2024, 1, 5)))
        .await
        .unwrap();
    assert!(!posted.sms_sent);

    let outcome = eng
        .ledger
        .update_installment(
            posted.id,
            InstallmentPatch {
                sms_sent: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let updated = outcome.installment.unwrap();
    assert!(updated.sms_sent);
    assert_eq!(updated.pre_balance, posted.pre_balance);
    assert_eq!(updated.balance, posted.balance);
    assert_eq!(updated.outstanding, posted.outstanding);
}

#[tokio::test]
async fn receipt_numbers_are_monotonic_per_account() {
    let eng = engine();
    let account = lease_account("1000", 10, "0");
    let account_id = account.account_id;
    eng.store.insert_account(account).await;

    for day in 1..=4 {
        eng.ledger
            .post_installment(cash_posting(account_id, "50", date(2024, 5, day)))
            .await
            .unwrap();
    }
    let chain = eng.ledger.get_chain(account_id).await.unwrap();
    let recv: Vec<i32> = chain.iter().map(|i| i.recv_no).collect();
    assert_eq!(recv, vec![1, 2, 3, 4]);
}
