//! Storage ledger domain model.
//!
//! This crate contains the business rules for storage records, movement
//! operations and physical-count reconciliation, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod audit;
pub mod movement;
pub mod record;
pub mod reconcile;

pub use audit::{OperationLogEntry, OperationType};
pub use movement::{
    DeductOutcome, DepletionPolicy, IntakeOutcome, IntakeRequest, LegState, PickRequest,
    PickResult, TransferOutcome, TransferRequest, TransferResult,
};
pub use record::{
    ConditionState, Expiration, RecordFilter, RecordPatch, StorageKey, StorageRecord,
};
pub use reconcile::{
    classify_cell, overall_status, plan_corrections, ClassifiedLine, Correction, InventoryRecord,
    LineStatus, ObservedLine, ReconciliationStatus,
};
