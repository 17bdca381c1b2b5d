// Invoice lifecycle through the service
//
// Covers issuance freezing totals, the paid/void terminal states, reset to
// draft, numbering per owner and the guarantee that a refused transition
// leaves the stored invoice untouched.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::*;
use invoicekit::core::OwnerId;
use invoicekit::invoices::InvoiceStatus;
use invoicekit::AppError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const OWNER: OwnerId = OwnerId(1);

#[tokio::test]
async fn test_draft_totals_are_live() {
    let service = memory_service();
    let draft = saved_draft(&service, OWNER, vec![position("Hosting", dec!(1), dec!(100.00), dec!(19))]).await;

    assert_eq!(draft.status, InvoiceStatus::Draft);
    assert_eq!(draft.net_total, dec!(100));
    assert_eq!(draft.gross_total, dec!(119));
    assert!(draft.number.is_none());

    // Positions edited out of band show up on the next load
    let id = draft.id.unwrap();
    service
        .store()
        .overwrite_positions(id, vec![position("Hosting", dec!(2), dec!(100.00), dec!(19))]);

    let reloaded = service.load(id, OWNER).await.unwrap();
    assert_eq!(reloaded.net_total, dec!(200));
    assert_eq!(reloaded.gross_total, dec!(238));
}

#[tokio::test]
async fn test_issue_freezes_totals() {
    let service = memory_service();
    let issued = issued_invoice(
        &service,
        OWNER,
        vec![
            position("Consulting", dec!(1), dec!(100), dec!(19)),
            position("Book", dec!(1), dec!(100), dec!(7)),
        ],
    )
    .await;
    let id = issued.id.unwrap();

    assert_eq!(issued.status, InvoiceStatus::Issued);
    assert_eq!(issued.gross_total, dec!(226));
    assert_eq!(issued.issued_at, Some(at(2024, 3, 1)));

    // Underlying positions change, frozen figures do not
    service
        .store()
        .overwrite_positions(id, vec![position("Consulting", dec!(10), dec!(100), dec!(19))]);

    let reloaded = service.load(id, OWNER).await.unwrap();
    assert_eq!(reloaded.net_total, dec!(200));
    assert_eq!(reloaded.gross_total, dec!(226));
    assert_eq!(reloaded.tax_amounts, issued.tax_amounts);
}

#[tokio::test]
async fn test_issue_assigns_number_and_issue_date() {
    let service = memory_service();
    let first = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(1), dec!(19))]).await;
    let second = issued_invoice(&service, OWNER, vec![position("B", dec!(1), dec!(1), dec!(19))]).await;

    assert_eq!(first.number.as_deref(), Some("2024-0001"));
    assert_eq!(second.number.as_deref(), Some("2024-0002"));
    assert_eq!(first.issue_date, Some(at(2024, 3, 1).date_naive()));

    // Sequences are per owner
    let other = issued_invoice(&service, OwnerId(2), vec![position("C", dec!(1), dec!(1), dec!(19))]).await;
    assert_eq!(other.counter, Some(1));
}

#[tokio::test]
async fn test_paid_invoice_cannot_be_voided() {
    let service = memory_service();
    let issued = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(50), dec!(19))]).await;
    let id = issued.id.unwrap();

    let paid = service.mark_paid(id, OWNER, at(2024, 3, 5)).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.paid_at, Some(at(2024, 3, 5)));

    let err = service.void(id, OWNER, at(2024, 3, 6)).await.unwrap_err();
    assert!(matches!(err, AppError::ForbiddenTransition { .. }));

    let reloaded = service.load(id, OWNER).await.unwrap();
    assert_eq!(reloaded.status, InvoiceStatus::Paid);
    assert!(reloaded.voided_at.is_none());
}

#[tokio::test]
async fn test_void_from_draft_and_issued() {
    let service = memory_service();

    let draft = saved_draft(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let voided = service.void(draft.id.unwrap(), OWNER, at(2024, 4, 1)).await.unwrap();
    assert_eq!(voided.status, InvoiceStatus::Voided);
    assert!(voided.number.is_none());
    assert_eq!(voided.gross_total, Decimal::ZERO);

    let issued = issued_invoice(&service, OWNER, vec![position("B", dec!(1), dec!(10), dec!(19))]).await;
    let voided = service.void(issued.id.unwrap(), OWNER, at(2024, 4, 2)).await.unwrap();
    assert_eq!(voided.status, InvoiceStatus::Voided);
    assert_eq!(voided.gross_total, dec!(11.9));
    assert_eq!(voided.voided_at, Some(at(2024, 4, 2)));
}

#[tokio::test]
async fn test_refused_transitions_leave_invoice_unchanged() {
    let service = memory_service();
    let draft = saved_draft(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let id = draft.id.unwrap();

    let err = service.mark_paid(id, OWNER, at(2024, 3, 1)).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: InvoiceStatus::Draft,
            to: InvoiceStatus::Paid
        }
    ));

    let err = service
        .transition(id, OWNER, InvoiceStatus::Draft, at(2024, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    let reloaded = service.load(id, OWNER).await.unwrap();
    assert_eq!(reloaded.status, InvoiceStatus::Draft);
    assert!(reloaded.paid_at.is_none());
    assert!(reloaded.counter.is_none());
}

#[tokio::test]
async fn test_issuing_twice_fails() {
    let service = memory_service();
    let issued = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;

    let err = service
        .issue(issued.id.unwrap(), OWNER, at(2024, 3, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_reset_to_draft_keeps_number() {
    let service = memory_service();
    let issued = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(100), dec!(19))]).await;
    let id = issued.id.unwrap();

    let draft = service.reset_to_draft(id, OWNER, at(2024, 4, 1)).await.unwrap();
    assert_eq!(draft.status, InvoiceStatus::Draft);
    assert_eq!(draft.updated_at, Some(at(2024, 4, 1)));
    assert_eq!(
        service.load(id, OWNER).await.unwrap().updated_at,
        Some(at(2024, 4, 1))
    );
    assert!(draft.issued_at.is_none());
    assert_eq!(draft.number, issued.number);
    // Live projection again
    assert_eq!(draft.gross_total, dec!(119));

    // Edit while in draft, then re-issue with the same number
    let mut edited = draft.clone();
    edited.set_positions(vec![position("A", dec!(2), dec!(100), dec!(19))]);
    service.save(&edited, OWNER).await.unwrap();

    let reissued = service.issue(id, OWNER, at(2024, 5, 1)).await.unwrap();
    assert_eq!(reissued.number, issued.number);
    assert_eq!(reissued.counter, issued.counter);
    assert_eq!(reissued.gross_total, dec!(238));
}

#[tokio::test]
async fn test_reset_to_draft_refused_from_terminal_states() {
    let service = memory_service();
    let issued = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let id = issued.id.unwrap();
    service.mark_paid(id, OWNER, at(2024, 3, 2)).await.unwrap();

    let err = service
        .reset_to_draft(id, OWNER, at(2024, 3, 3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: InvoiceStatus::Paid,
            to: InvoiceStatus::Draft
        }
    ));
    assert_eq!(service.load(id, OWNER).await.unwrap().status, InvoiceStatus::Paid);

    let draft = saved_draft(&service, OWNER, vec![]).await;
    assert!(service
        .reset_to_draft(draft.id.unwrap(), OWNER, at(2024, 3, 3))
        .await
        .is_err());
}

#[tokio::test]
async fn test_terminal_invoices_cannot_be_saved_or_deleted() {
    let service = memory_service();
    let issued = issued_invoice(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let id = issued.id.unwrap();
    let paid = service.mark_paid(id, OWNER, at(2024, 3, 2)).await.unwrap();

    let mut edited = paid.clone();
    edited.footer = "changed".to_string();
    assert!(matches!(
        service.save(&edited, OWNER).await,
        Err(AppError::Immutable(InvoiceStatus::Paid))
    ));
    assert!(matches!(
        service.delete(id, OWNER).await,
        Err(AppError::Immutable(InvoiceStatus::Paid))
    ));
}

#[tokio::test]
async fn test_delete_draft() {
    let service = memory_service();
    let draft = saved_draft(&service, OWNER, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let id = draft.id.unwrap();

    service.delete(id, OWNER).await.unwrap();

    assert!(matches!(service.load(id, OWNER).await, Err(AppError::NotFound(_))));
    assert!(service.store().raw_positions(id).is_empty());
}

#[tokio::test]
async fn test_list_is_owner_scoped_and_paged() {
    let service = memory_service();
    for _ in 0..3 {
        saved_draft(&service, OWNER, vec![]).await;
    }
    saved_draft(&service, OwnerId(2), vec![]).await;

    let all = service.list(OWNER, None, None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|i| i.owner_id == OWNER));

    let page = service.list(OWNER, Some(2), Some(2)).await.unwrap();
    assert_eq!(page.len(), 1);

    // Newest first
    let ids: Vec<i64> = all.iter().filter_map(|i| i.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(ids, sorted);
}
