// Concurrent transitions and deadlines
//
// Two requests racing on the same issued invoice (one paying, one voiding)
// are serialized by the row lock: exactly one wins and the loser sees the
// winner's committed state. An operation that cannot get the lock before its
// deadline times out and leaves nothing behind.

#[path = "../helpers/mod.rs"]
mod helpers;

use std::collections::HashSet;
use std::time::Duration;

use helpers::*;
use invoicekit::core::OwnerId;
use invoicekit::invoices::{InvoiceStatus, InvoiceStore, InvoiceTx};
use invoicekit::AppError;
use rust_decimal_macros::dec;

const OWNER: OwnerId = OwnerId(3);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pay_and_void_race_has_one_winner() {
    for _ in 0..20 {
        let service = memory_service();
        let issued = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
        let id = issued.id.unwrap();

        let payer = service.clone();
        let voider = service.clone();
        let pay = tokio::spawn(async move { payer.mark_paid(id, OWNER, at(2024, 3, 2)).await });
        let void = tokio::spawn(async move { voider.void(id, OWNER, at(2024, 3, 2)).await });

        let pay = pay.await.unwrap();
        let void = void.await.unwrap();

        let final_status = service.load(id, OWNER).await.unwrap().status;
        match (pay, void) {
            (Ok(_), Err(AppError::ForbiddenTransition { .. })) => {
                assert_eq!(final_status, InvoiceStatus::Paid);
            }
            (Err(AppError::InvalidTransition { from, to }), Ok(_)) => {
                assert_eq!((from, to), (InvoiceStatus::Voided, InvoiceStatus::Paid));
                assert_eq!(final_status, InvoiceStatus::Voided);
            }
            (pay, void) => panic!("expected exactly one winner, got {:?} / {:?}", pay, void),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issues_get_distinct_numbers() {
    let service = memory_service();
    let mut ids = Vec::new();
    for _ in 0..10 {
        let draft = saved_draft(&service, OWNER, vec![position("A", dec!(1), dec!(1), dec!(19))]).await;
        ids.push(draft.id.unwrap());
    }

    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let service = service.clone();
            tokio::spawn(async move { service.issue(id, OWNER, at(2024, 3, 1)).await })
        })
        .collect();

    let mut counters = HashSet::new();
    for handle in handles {
        let issued = handle.await.unwrap().unwrap();
        counters.insert(issued.counter.unwrap());
    }

    let expected: HashSet<i64> = (1..=10).collect();
    assert_eq!(counters, expected);
}

#[tokio::test]
async fn test_concurrent_issue_of_same_invoice_succeeds_once() {
    let service = memory_service();
    let draft = saved_draft(&service, OWNER, vec![position("A", dec!(1), dec!(1), dec!(19))]).await;
    let id = draft.id.unwrap();

    let first = service.clone();
    let second = service.clone();
    let (a, b) = tokio::join!(
        first.issue(id, OWNER, at(2024, 3, 1)),
        second.issue(id, OWNER, at(2024, 3, 1))
    );

    assert!(a.is_ok() ^ b.is_ok());
    let issued = service.load(id, OWNER).await.unwrap();
    assert_eq!(issued.counter, Some(1));
}

#[tokio::test]
async fn test_timeout_rolls_back_and_releases() {
    let service = memory_service();
    let issued = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let id = issued.id.unwrap();

    // Another transaction holds the row
    let mut holder = service.store().begin().await.unwrap();
    holder.lock_invoice(id, OWNER).await.unwrap();

    let hurried = service.with_timeout(Duration::from_millis(50));
    let err = hurried.mark_paid(id, OWNER, at(2024, 3, 2)).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));

    drop(holder);

    let reloaded = service.load(id, OWNER).await.unwrap();
    assert_eq!(reloaded.status, InvoiceStatus::Issued);
    assert!(reloaded.paid_at.is_none());

    // Lock is free again
    let paid = service.mark_paid(id, OWNER, at(2024, 3, 3)).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn test_different_invoices_do_not_block_each_other() {
    let service = memory_service();
    let a = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let b = issued_invoice(&service, OWNER, vec![position("B", dec!(1), dec!(10), dec!(19))]).await;

    let mut holder = service.store().begin().await.unwrap();
    holder.lock_invoice(a.id.unwrap(), OWNER).await.unwrap();

    let paid = service
        .with_timeout(Duration::from_millis(500))
        .mark_paid(b.id.unwrap(), OWNER, at(2024, 3, 2))
        .await
        .unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);

    holder.commit().await.unwrap();
}
