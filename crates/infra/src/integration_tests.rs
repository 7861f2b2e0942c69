//! End-to-end tests for the movement and reconciliation engines over
//! the in-memory store.
//!
//! Pins the conservation, non-negativity, merge-vs-create and
//! idempotent-classification properties, the warehouse-key and
//! zero-quantity policy decisions, and the audit decoupling contract.

use std::sync::Arc;

use rust_decimal::Decimal;

use stockcell_core::{CellId, ItemId, LedgerError, PrunitId, WarehouseId};
use stockcell_ledger::{
    ConditionState, DepletionPolicy, Expiration, IntakeRequest, LineStatus, ObservedLine,
    OperationType, PickRequest, RecordFilter, ReconciliationStatus, TransferRequest,
};

use crate::audit::{spawn_audit_worker, AuditHandle, RecordingSink};
use crate::movement::MovementEngine;
use crate::reconciliation::{ReconcileRequest, ReconciliationEngine};
use crate::store::{InMemoryLedgerStore, LedgerStore};

fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

fn intake(item: &str, cell: &str, qty: i64) -> IntakeRequest {
    IntakeRequest {
        item: ItemId::new(item),
        name: format!("item {item}"),
        shk: format!("shk-{item}"),
        prunit: PrunitId::new(1),
        prunit_name: "each".into(),
        cell: CellId::new(cell),
        warehouse: None,
        quantity: dec(qty),
        condition: ConditionState::Good,
        expiration: Expiration::none(),
        actor: "op-1".into(),
    }
}

fn pick(item: &str, cell: &str, qty: i64) -> PickRequest {
    PickRequest {
        item: ItemId::new(item),
        prunit: PrunitId::new(1),
        cell: CellId::new(cell),
        warehouse: None,
        quantity: dec(qty),
        policy: DepletionPolicy::RetainEmpty,
        actor: "op-1".into(),
    }
}

fn transfer(item: &str, from: &str, to: &str, qty: i64) -> TransferRequest {
    TransferRequest {
        item: ItemId::new(item),
        prunit: PrunitId::new(1),
        source_cell: CellId::new(from),
        target_cell: CellId::new(to),
        warehouse: None,
        quantity: dec(qty),
        condition: None,
        expiration: None,
        actor: "op-1".into(),
    }
}

fn observed(item: &str, qty: i64) -> ObservedLine {
    ObservedLine {
        item: ItemId::new(item),
        prunit: PrunitId::new(1),
        quantity: dec(qty),
    }
}

fn movement(store: Arc<InMemoryLedgerStore>) -> MovementEngine<Arc<InMemoryLedgerStore>> {
    MovementEngine::new(store, AuditHandle::disabled())
}

fn reconciliation(
    store: Arc<InMemoryLedgerStore>,
) -> ReconciliationEngine<Arc<InMemoryLedgerStore>> {
    ReconciliationEngine::new(store, AuditHandle::disabled())
}

async fn place_qty(store: &InMemoryLedgerStore, item: &str, cell: &str) -> Decimal {
    store
        .find_one(&pick(item, cell, 1).key())
        .await
        .unwrap()
        .map(|r| r.place_quantity)
        .unwrap_or(Decimal::ZERO)
}

#[tokio::test]
async fn pick_decrements_and_reports_both_quantities() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 10)).await.unwrap();

    let result = movement(store.clone()).pick(&pick("100", "A", 5)).await.unwrap();

    assert_eq!(result.previous_quantity, dec(10));
    assert_eq!(result.new_quantity, dec(5));
    assert!(!result.removed);
    assert_eq!(place_qty(&store, "100", "A").await, dec(5));
}

#[tokio::test]
async fn pick_beyond_available_fails_and_leaves_the_row_alone() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 10)).await.unwrap();

    let err = movement(store.clone())
        .pick(&pick("100", "A", 20))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LedgerError::InsufficientQuantity { available: dec(10) }
    );
    assert_eq!(place_qty(&store, "100", "A").await, dec(10));
}

#[tokio::test]
async fn pick_of_unknown_key_is_not_found() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let err = movement(store).pick(&pick("100", "A", 1)).await.unwrap_err();
    assert_eq!(err, LedgerError::NotFound);
}

#[tokio::test]
async fn pick_never_touches_product_quantity() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 10)).await.unwrap();

    movement(store.clone()).pick(&pick("100", "A", 4)).await.unwrap();

    let row = store.find_one(&pick("100", "A", 1).key()).await.unwrap().unwrap();
    assert_eq!(row.place_quantity, dec(6));
    assert_eq!(row.product_quantity, dec(10));
}

#[tokio::test]
async fn depletion_policy_retains_or_removes_the_zero_row() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = movement(store.clone());

    store.intake(&intake("100", "A", 5)).await.unwrap();
    let result = engine.pick(&pick("100", "A", 5)).await.unwrap();
    assert!(!result.removed);
    assert_eq!(place_qty(&store, "100", "A").await, dec(0));
    assert!(store.find_one(&pick("100", "A", 1).key()).await.unwrap().is_some());

    store.intake(&intake("200", "B", 5)).await.unwrap();
    let mut request = pick("200", "B", 5);
    request.policy = DepletionPolicy::RemoveEmpty;
    let result = engine.pick(&request).await.unwrap();
    assert!(result.removed);
    assert!(store.find_one(&request.key()).await.unwrap().is_none());
}

#[tokio::test]
async fn warehouse_key_null_is_exact() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = movement(store.clone());

    let mut draft = intake("100", "A", 10);
    draft.warehouse = Some(WarehouseId::new(7));
    store.intake(&draft).await.unwrap();

    // No warehouse on the key: the warehouse-7 row is invisible.
    let err = engine.pick(&pick("100", "A", 1)).await.unwrap_err();
    assert_eq!(err, LedgerError::NotFound);

    let mut request = pick("100", "A", 1);
    request.warehouse = Some(WarehouseId::new(7));
    assert!(engine.pick(&request).await.is_ok());

    // And the other way round: a NULL-warehouse row is invisible to a
    // warehouse-keyed pick.
    store.intake(&intake("200", "A", 10)).await.unwrap();
    let mut request = pick("200", "A", 1);
    request.warehouse = Some(WarehouseId::new(7));
    assert_eq!(engine.pick(&request).await.unwrap_err(), LedgerError::NotFound);
}

#[tokio::test]
async fn intake_merges_on_matching_key_and_creates_otherwise() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = movement(store.clone());

    let first = engine.intake(&intake("100", "A", 10)).await.unwrap();
    assert!(first.created());

    let merged = engine.intake(&intake("100", "A", 5)).await.unwrap();
    assert!(!merged.created());
    assert_eq!(merged.record_id(), first.record_id());
    assert_eq!(place_qty(&store, "100", "A").await, dec(15));

    // Different cell: a fresh record with a previously-unused id.
    let other = engine.intake(&intake("100", "B", 3)).await.unwrap();
    assert!(other.created());
    assert_ne!(other.record_id(), first.record_id());
    assert_eq!(store.find(&RecordFilter::default()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn intake_merge_overwrites_condition_and_expiration() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = movement(store.clone());

    engine.intake(&intake("100", "A", 10)).await.unwrap();

    let mut second = intake("100", "A", 2);
    second.condition = ConditionState::Defective;
    second.expiration = Expiration::on(chrono::NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
    engine.intake(&second).await.unwrap();

    let row = store.find_one(&second.key()).await.unwrap().unwrap();
    assert_eq!(row.condition, ConditionState::Defective);
    assert_eq!(row.expiration, second.expiration);
}

#[tokio::test]
async fn intake_rejects_non_positive_quantity() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let err = movement(store)
        .intake(&intake("100", "A", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn transfer_into_empty_cell_creates_the_target_record() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 10)).await.unwrap();

    let result = movement(store.clone())
        .transfer(&transfer("100", "A", "B", 5))
        .await
        .unwrap();

    assert!(result.target_created);
    assert_eq!(result.source.previous_quantity, dec(10));
    assert_eq!(result.source.new_quantity, dec(5));
    assert_eq!(result.target.previous_quantity, dec(0));
    assert_eq!(result.target.new_quantity, dec(5));

    let target = store
        .find_one(&transfer("100", "A", "B", 5).target_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(target.place_quantity, dec(5));
    assert_eq!(target.product_quantity, dec(5));
    assert_eq!(target.name, "item 100");
    assert_eq!(target.shk, "shk-100");
}

#[tokio::test]
async fn transfer_conserves_total_quantity_across_both_cells() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 10)).await.unwrap();
    store.intake(&intake("100", "B", 4)).await.unwrap();

    let before = place_qty(&store, "100", "A").await + place_qty(&store, "100", "B").await;

    let result = movement(store.clone())
        .transfer(&transfer("100", "A", "B", 3))
        .await
        .unwrap();
    assert!(!result.target_created);

    let a = place_qty(&store, "100", "A").await;
    let b = place_qty(&store, "100", "B").await;
    assert_eq!(a, dec(7));
    assert_eq!(b, dec(7));
    assert_eq!(a + b, before);
}

#[tokio::test]
async fn failed_transfer_leaves_both_cells_untouched() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 2)).await.unwrap();
    store.intake(&intake("100", "B", 4)).await.unwrap();

    let err = movement(store.clone())
        .transfer(&transfer("100", "A", "B", 5))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::InsufficientQuantity { available: dec(2) });

    assert_eq!(place_qty(&store, "100", "A").await, dec(2));
    assert_eq!(place_qty(&store, "100", "B").await, dec(4));
}

#[tokio::test]
async fn transfer_to_the_same_cell_is_rejected() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 10)).await.unwrap();

    let err = movement(store)
        .transfer(&transfer("100", "A", "A", 1))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::SameLocation);
}

#[tokio::test]
async fn created_transfer_target_inherits_condition_unless_overridden() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = movement(store.clone());

    let mut draft = intake("100", "A", 10);
    draft.condition = ConditionState::Defective;
    store.intake(&draft).await.unwrap();

    engine.transfer(&transfer("100", "A", "B", 2)).await.unwrap();
    let inherited = store
        .find_one(&transfer("100", "A", "B", 2).target_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inherited.condition, ConditionState::Defective);

    let mut overridden = transfer("100", "A", "C", 2);
    overridden.condition = Some(ConditionState::Good);
    engine.transfer(&overridden).await.unwrap();
    let target = store.find_one(&overridden.target_key()).await.unwrap().unwrap();
    assert_eq!(target.condition, ConditionState::Good);
}

#[tokio::test]
async fn reconcile_surplus_commits_the_observed_quantity() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 3)).await.unwrap();

    let result = reconciliation(store.clone())
        .reconcile_cell(&ReconcileRequest {
            cell: CellId::new("A"),
            warehouse: None,
            observed: vec![observed("100", 5)],
            actor: "op-1".into(),
            commit: true,
            notes: None,
        })
        .await
        .unwrap();

    assert_eq!(result.status, ReconciliationStatus::Discrepancy);
    assert_eq!(result.lines.len(), 1);
    assert_eq!(result.lines[0].status, LineStatus::Surplus);
    assert_eq!(result.lines[0].difference, dec(2));
    assert_eq!(result.corrections_applied, 1);
    assert_eq!(place_qty(&store, "100", "A").await, dec(5));
}

#[tokio::test]
async fn dry_run_records_missing_lines_without_touching_the_ledger() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 5)).await.unwrap();

    let result = reconciliation(store.clone())
        .reconcile_cell(&ReconcileRequest {
            cell: CellId::new("A"),
            warehouse: None,
            observed: vec![],
            actor: "op-1".into(),
            commit: false,
            notes: None,
        })
        .await
        .unwrap();

    assert_eq!(result.status, ReconciliationStatus::Discrepancy);
    assert_eq!(result.lines[0].status, LineStatus::Missing);
    assert_eq!(result.lines[0].difference, dec(-5));
    assert_eq!(result.corrections_applied, 0);

    // History persisted even on a dry run; ledger unchanged.
    let history = store.inventory_history(&CellId::new("A")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, LineStatus::Missing);
    assert_eq!(place_qty(&store, "100", "A").await, dec(5));
}

#[tokio::test]
async fn counting_exactly_the_ledger_is_idempotent() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.intake(&intake("100", "A", 5)).await.unwrap();
    store.intake(&intake("200", "A", 2)).await.unwrap();

    for commit in [false, true] {
        let result = reconciliation(store.clone())
            .reconcile_cell(&ReconcileRequest {
                cell: CellId::new("A"),
                warehouse: None,
                observed: vec![observed("100", 5), observed("200", 2)],
                actor: "op-1".into(),
                commit,
                notes: None,
            })
            .await
            .unwrap();

        assert_eq!(result.status, ReconciliationStatus::Match);
        assert_eq!(result.corrections_applied, 0);
    }

    assert_eq!(place_qty(&store, "100", "A").await, dec(5));
    assert_eq!(place_qty(&store, "200", "A").await, dec(2));
}

#[tokio::test]
async fn committed_surplus_on_an_empty_cell_creates_the_record() {
    let store = Arc::new(InMemoryLedgerStore::new());

    let result = reconciliation(store.clone())
        .reconcile_cell(&ReconcileRequest {
            cell: CellId::new("A"),
            warehouse: None,
            observed: vec![observed("300", 4)],
            actor: "op-1".into(),
            commit: true,
            notes: Some("found unregistered stock".into()),
        })
        .await
        .unwrap();

    assert_eq!(result.corrections_applied, 1);
    let row = store
        .find_one(&pick("300", "A", 1).key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.place_quantity, dec(4));
    assert_eq!(row.product_quantity, dec(4));
}

#[tokio::test]
async fn reconcile_rejects_negative_observed_quantities() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let err = reconciliation(store)
        .reconcile_cell(&ReconcileRequest {
            cell: CellId::new("A"),
            warehouse: None,
            observed: vec![observed("100", -1)],
            actor: "op-1".into(),
            commit: false,
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn warehouse_scoped_reconciliation_ignores_other_partitions() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let mut scoped = intake("100", "A", 5);
    scoped.warehouse = Some(WarehouseId::new(1));
    store.intake(&scoped).await.unwrap();
    let mut other = intake("100", "A", 9);
    other.warehouse = Some(WarehouseId::new(2));
    store.intake(&other).await.unwrap();

    let result = reconciliation(store.clone())
        .reconcile_cell(&ReconcileRequest {
            cell: CellId::new("A"),
            warehouse: Some(WarehouseId::new(1)),
            observed: vec![observed("100", 5)],
            actor: "op-1".into(),
            commit: true,
            notes: None,
        })
        .await
        .unwrap();

    assert_eq!(result.status, ReconciliationStatus::Match);

    // The warehouse-2 row was never part of the count.
    let mut key = pick("100", "A", 1).key();
    key.warehouse = Some(WarehouseId::new(2));
    let untouched = store.find_one(&key).await.unwrap().unwrap();
    assert_eq!(untouched.place_quantity, dec(9));
}

#[tokio::test]
async fn operations_emit_audit_entries_through_the_worker() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let sink = Arc::new(RecordingSink::new());
    let (handle, worker) = spawn_audit_worker(sink.clone(), 32);

    {
        let engine = MovementEngine::new(store.clone(), handle.clone());
        engine.intake(&intake("100", "A", 10)).await.unwrap();
        engine.pick(&pick("100", "A", 2)).await.unwrap();
        engine.transfer(&transfer("100", "A", "B", 3)).await.unwrap();

        let reconciler = ReconciliationEngine::new(store.clone(), handle);
        reconciler
            .reconcile_cell(&ReconcileRequest {
                cell: CellId::new("A"),
                warehouse: None,
                observed: vec![observed("100", 9)],
                actor: "op-1".into(),
                commit: true,
                notes: None,
            })
            .await
            .unwrap();
    }

    // All handles are gone; the worker drains and stops.
    worker.join().await;

    let operations: Vec<OperationType> =
        sink.entries().iter().map(|e| e.operation).collect();
    assert_eq!(
        operations,
        vec![
            OperationType::Intake,
            OperationType::Pick,
            OperationType::Transfer,
            OperationType::InventoryAdjust,
        ]
    );

    let entries = sink.entries();
    let transfer_entry = &entries[2];
    assert_eq!(transfer_entry.from_cell, Some(CellId::new("A")));
    assert_eq!(transfer_entry.to_cell, Some(CellId::new("B")));
    assert_eq!(transfer_entry.quantity, dec(3));
}

#[tokio::test]
async fn audit_failures_never_fail_the_operation() {
    // Tiny queue: entries may drop when the worker lags, but emitting
    // has no failure path and the ledger operations must all succeed.
    let store = Arc::new(InMemoryLedgerStore::new());
    let sink = Arc::new(RecordingSink::new());
    let (handle, worker) = spawn_audit_worker(sink, 1);

    let engine = MovementEngine::new(store, handle);
    engine.intake(&intake("100", "A", 10)).await.unwrap();
    engine.intake(&intake("200", "A", 10)).await.unwrap();
    engine.intake(&intake("300", "A", 10)).await.unwrap();

    drop(engine);
    worker.join().await;
}
