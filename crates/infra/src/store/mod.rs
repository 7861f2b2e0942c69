//! Ledger storage: one row per (item, packaging unit, cell, warehouse).

mod in_memory;
mod postgres;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

pub(crate) use postgres::map_sqlx_error as postgres_error;
pub(crate) use postgres::row_error as postgres_row_error;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use stockcell_core::{CellId, LedgerResult};
use stockcell_ledger::{
    Correction, DeductOutcome, DepletionPolicy, IntakeOutcome, IntakeRequest, InventoryRecord,
    RecordFilter, RecordPatch, StorageKey, StorageRecord, TransferOutcome, TransferRequest,
};

/// Durable table of storage records plus the reconciliation history.
///
/// The store is the single source of truth: engines keep no ledger state
/// between calls. Point lookups address rows by their full identity key
/// (`warehouse: None` matches only NULL-warehouse rows); scans use
/// [`RecordFilter`], where an absent warehouse spans all warehouses.
///
/// ## Atomicity requirements
///
/// Implementations must make the compound operations all-or-nothing:
///
/// - `deduct` decides on the stored quantity at write time (conditional
///   update judged by its affected-row count), never on a prior read,
///   and distinguishes a missing row from an insufficient one.
/// - `intake` merges into the existing row at the exact key or inserts
///   a new row with a fresh monotonic id; a concurrent insert of the
///   same key surfaces as a retriable `Conflict`.
/// - `transfer` commits both legs together or not at all.
/// - `apply_reconciliation` persists the history lines and the
///   corrective writes in one unit.
///
/// Callers validate requests before handing them to the store; the
/// store enforces only what cannot be checked without its state.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Filtered scan, in record-id order.
    async fn find(&self, filter: &RecordFilter) -> LedgerResult<Vec<StorageRecord>>;

    /// Point lookup by identity key.
    async fn find_one(&self, key: &StorageKey) -> LedgerResult<Option<StorageRecord>>;

    /// Insert a fully-populated record (the caller assigns the id).
    async fn insert(&self, record: &StorageRecord) -> LedgerResult<()>;

    /// Partial update; returns the affected-row count (0 = key absent).
    async fn update(&self, key: &StorageKey, patch: &RecordPatch) -> LedgerResult<u64>;

    /// Delete by key; returns the affected-row count.
    async fn delete(&self, key: &StorageKey) -> LedgerResult<u64>;

    /// Atomically subtract `quantity` from `place_quantity`, failing
    /// with `InsufficientQuantity` (carrying the available amount) when
    /// the row holds less, and `NotFound` when there is no row.
    async fn deduct(
        &self,
        key: &StorageKey,
        quantity: Decimal,
        policy: DepletionPolicy,
        actor: &str,
    ) -> LedgerResult<DeductOutcome>;

    /// Merge-or-create for buffer intake.
    async fn intake(&self, draft: &IntakeRequest) -> LedgerResult<IntakeOutcome>;

    /// Two-leg cell-to-cell transfer.
    async fn transfer(&self, plan: &TransferRequest) -> LedgerResult<TransferOutcome>;

    /// Persist reconciliation history lines and apply corrective writes
    /// in one unit. `corrections` is empty for a dry run.
    async fn apply_reconciliation(
        &self,
        lines: &[InventoryRecord],
        corrections: &[Correction],
    ) -> LedgerResult<()>;

    /// Read back persisted reconciliation lines for a cell, oldest first.
    async fn inventory_history(&self, cell: &CellId) -> LedgerResult<Vec<InventoryRecord>>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn find(&self, filter: &RecordFilter) -> LedgerResult<Vec<StorageRecord>> {
        (**self).find(filter).await
    }

    async fn find_one(&self, key: &StorageKey) -> LedgerResult<Option<StorageRecord>> {
        (**self).find_one(key).await
    }

    async fn insert(&self, record: &StorageRecord) -> LedgerResult<()> {
        (**self).insert(record).await
    }

    async fn update(&self, key: &StorageKey, patch: &RecordPatch) -> LedgerResult<u64> {
        (**self).update(key, patch).await
    }

    async fn delete(&self, key: &StorageKey) -> LedgerResult<u64> {
        (**self).delete(key).await
    }

    async fn deduct(
        &self,
        key: &StorageKey,
        quantity: Decimal,
        policy: DepletionPolicy,
        actor: &str,
    ) -> LedgerResult<DeductOutcome> {
        (**self).deduct(key, quantity, policy, actor).await
    }

    async fn intake(&self, draft: &IntakeRequest) -> LedgerResult<IntakeOutcome> {
        (**self).intake(draft).await
    }

    async fn transfer(&self, plan: &TransferRequest) -> LedgerResult<TransferOutcome> {
        (**self).transfer(plan).await
    }

    async fn apply_reconciliation(
        &self,
        lines: &[InventoryRecord],
        corrections: &[Correction],
    ) -> LedgerResult<()> {
        (**self).apply_reconciliation(lines, corrections).await
    }

    async fn inventory_history(&self, cell: &CellId) -> LedgerResult<Vec<InventoryRecord>> {
        (**self).inventory_history(cell).await
    }
}
