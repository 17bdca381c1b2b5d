// MySQL persistence gateway
//
// Runs the service against a real database. Requires TEST_DATABASE_URL and is
// ignored by default:
//   cargo test --test mysql_repository_test -- --ignored

#[path = "../helpers/mod.rs"]
mod helpers;

use std::sync::Arc;

use helpers::*;
use invoicekit::invoices::{
    InvoiceService, InvoiceSettings, InvoiceStatus, InvoiceStore, InvoiceTx,
    MySqlInvoiceRepository,
};
use invoicekit::AppError;
use rust_decimal_macros::dec;

async fn mysql_service() -> (InvoiceService<MySqlInvoiceRepository>, sqlx::MySqlPool) {
    let pool = create_test_pool().await;
    let service = InvoiceService::new(
        Arc::new(MySqlInvoiceRepository::new(pool.clone())),
        InvoiceSettings::default(),
    );
    (service, pool)
}

#[tokio::test]
#[ignore] // Requires MySQL connection
async fn test_save_load_and_replace_positions() {
    let (service, pool) = mysql_service().await;
    let owner = unique_owner();

    let draft = draft_with(
        owner,
        vec![
            position("Consulting", dec!(2), dec!(50.005), dec!(19)),
            position("Book", dec!(1), dec!(20), dec!(7)),
        ],
    );
    let saved = service.save(&draft, owner).await.unwrap();
    let id = saved.id.unwrap();
    assert_eq!(saved.positions.len(), 2);
    assert_eq!(saved.net_total, dec!(120.01));

    let mut edited = saved.clone();
    edited.set_positions(vec![position("Other", dec!(1), dec!(10), dec!(19))]);
    let replaced = service.save(&edited, owner).await.unwrap();
    assert_eq!(replaced.positions.len(), 1);
    assert_ne!(replaced.positions[0].id, saved.positions[0].id);

    // Draft totals are never persisted
    let (net, gross): (rust_decimal::Decimal, rust_decimal::Decimal) =
        sqlx::query_as("SELECT net_total, gross_total FROM invoices WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(net.is_zero() && gross.is_zero());

    cleanup_owner(&pool, owner).await;
}

#[tokio::test]
#[ignore] // Requires MySQL connection
async fn test_lifecycle_round_trip() {
    let (service, pool) = mysql_service().await;
    let owner = unique_owner();

    let saved = service
        .save(&draft_with(owner, vec![position("A", dec!(1), dec!(100), dec!(19))]), owner)
        .await
        .unwrap();
    let id = saved.id.unwrap();

    let issued = service.issue(id, owner, at(2024, 3, 1)).await.unwrap();
    assert_eq!(issued.number.as_deref(), Some("2024-0001"));

    let reloaded = service.load(id, owner).await.unwrap();
    assert_eq!(reloaded.status, InvoiceStatus::Issued);
    assert_eq!(reloaded.gross_total, dec!(119));
    assert_eq!(reloaded.tax_amounts, issued.tax_amounts);

    service.mark_paid(id, owner, at(2024, 3, 2)).await.unwrap();
    assert!(matches!(
        service.void(id, owner, at(2024, 3, 3)).await,
        Err(AppError::ForbiddenTransition { .. })
    ));

    cleanup_owner(&pool, owner).await;
}

#[tokio::test]
#[ignore] // Requires MySQL connection
async fn test_rows_are_owner_scoped() {
    let (service, pool) = mysql_service().await;
    let owner = unique_owner();
    let stranger = unique_owner();

    let saved = service
        .save(&draft_with(owner, vec![position("A", dec!(1), dec!(1), dec!(19))]), owner)
        .await
        .unwrap();
    let id = saved.id.unwrap();

    assert!(matches!(service.load(id, stranger).await, Err(AppError::NotFound(_))));
    assert!(matches!(service.delete(id, stranger).await, Err(AppError::NotFound(_))));
    assert!(service.list(stranger, None, None).await.unwrap().is_empty());

    cleanup_owner(&pool, owner).await;
}

#[tokio::test]
#[ignore] // Requires MySQL connection
async fn test_uncommitted_transaction_rolls_back() {
    let (service, pool) = mysql_service().await;
    let owner = unique_owner();

    {
        let mut tx = service.store().begin().await.unwrap();
        tx.insert_invoice(&draft_with(owner, vec![])).await.unwrap();
        tx.next_counter(owner).await.unwrap();
        // dropped without commit
    }

    assert!(service.list(owner, None, None).await.unwrap().is_empty());
    let mut tx = service.store().begin().await.unwrap();
    assert_eq!(tx.next_counter(owner).await.unwrap(), 1);
    drop(tx);

    cleanup_owner(&pool, owner).await;
}
