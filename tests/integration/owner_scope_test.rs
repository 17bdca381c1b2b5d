// Tenant isolation
//
// Every operation is filtered by the caller's owner scope. A foreign invoice
// behaves exactly like a missing one, both in the error returned and in the
// public message it maps to.

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::ResponseError;
use helpers::*;
use invoicekit::core::OwnerId;
use invoicekit::invoices::InvoiceStatus;
use invoicekit::AppError;
use rust_decimal_macros::dec;

const ALICE: OwnerId = OwnerId(100);
const MALLORY: OwnerId = OwnerId(200);

#[tokio::test]
async fn test_load_foreign_invoice_is_not_found() {
    let service = memory_service();
    let draft = saved_draft(&service, ALICE, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let id = draft.id.unwrap();

    let foreign = service.load(id, MALLORY).await.unwrap_err();
    let missing = service.load(id + 1000, MALLORY).await.unwrap_err();

    assert!(matches!(foreign, AppError::NotFound(_)));
    assert_eq!(foreign.status_code(), missing.status_code());
    assert_eq!(foreign.public_message(), missing.public_message());
}

#[tokio::test]
async fn test_transitions_are_owner_scoped() {
    let service = memory_service();
    let draft = saved_draft(&service, ALICE, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let id = draft.id.unwrap();

    assert!(matches!(
        service.issue(id, MALLORY, at(2024, 3, 1)).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.void(id, MALLORY, at(2024, 3, 1)).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.reset_to_draft(id, MALLORY, at(2024, 3, 1)).await,
        Err(AppError::NotFound(_))
    ));

    let reloaded = service.load(id, ALICE).await.unwrap();
    assert_eq!(reloaded.status, InvoiceStatus::Draft);
    assert!(reloaded.counter.is_none());
}

#[tokio::test]
async fn test_save_under_foreign_scope_is_rejected() {
    let service = memory_service();
    let draft = saved_draft(&service, ALICE, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;

    // Alice's invoice submitted with Mallory's scope
    let err = service.save(&draft, MALLORY).await.unwrap_err();
    assert!(matches!(err, AppError::OwnershipViolation(_)));
    assert_eq!(err.public_message(), "Invoice not found");

    // Mallory claims Alice's invoice id as her own
    let mut hijack = draft.clone();
    hijack.owner_id = MALLORY;
    hijack.set_positions(vec![position("X", dec!(1), dec!(1), dec!(19))]);
    let err = service.save(&hijack, MALLORY).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let reloaded = service.load(draft.id.unwrap(), ALICE).await.unwrap();
    assert_eq!(reloaded.positions.len(), 1);
    assert_eq!(reloaded.positions[0].text, "A");
}

#[tokio::test]
async fn test_foreign_positions_are_rejected() {
    let service = memory_service();
    let mut invoice = draft_with(ALICE, vec![position("A", dec!(1), dec!(10), dec!(19))]);
    invoice.positions[0].owner_id = Some(MALLORY);

    assert!(matches!(
        service.save(&invoice, ALICE).await,
        Err(AppError::OwnershipViolation(_))
    ));
    assert!(service.store().is_empty());
}

#[tokio::test]
async fn test_delete_is_owner_scoped() {
    let service = memory_service();
    let draft = saved_draft(&service, ALICE, vec![position("A", dec!(1), dec!(10), dec!(19))]).await;
    let id = draft.id.unwrap();

    assert!(matches!(
        service.delete(id, MALLORY).await,
        Err(AppError::NotFound(_))
    ));
    assert!(service.load(id, ALICE).await.is_ok());
    assert_eq!(service.store().raw_positions(id).len(), 1);
}

#[test]
fn test_ownership_and_not_found_map_to_same_response() {
    let ownership = AppError::ownership("invoice 1 belongs to owner 2");
    let not_found = AppError::not_found("invoice 1");

    assert_eq!(ownership.status_code(), not_found.status_code());
    assert_eq!(ownership.public_message(), not_found.public_message());
}
