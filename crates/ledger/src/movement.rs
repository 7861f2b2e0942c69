//! Movement operations: pick, buffer intake and cell-to-cell transfer.
//!
//! Requests validate themselves at the boundary; the store decides the
//! outcome. Quantities never go negative: an operation that would drive
//! `place_quantity` below zero fails with `InsufficientQuantity`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcell_core::{CellId, ItemId, LedgerError, LedgerResult, PrunitId, RecordId, WarehouseId};

use crate::record::{ConditionState, Expiration, StorageKey, StorageRecord};

/// What happens to a row whose `place_quantity` reaches zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepletionPolicy {
    /// Keep the row with `place_quantity = 0` (cell-keyed picks; also
    /// what transfers do to their source leg).
    #[default]
    RetainEmpty,
    /// Delete the row once depleted (legacy warehouse-keyed picks).
    RemoveEmpty,
}

fn ensure_positive(quantity: Decimal) -> LedgerResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    Ok(())
}

fn ensure_actor(actor: &str) -> LedgerResult<()> {
    if actor.trim().is_empty() {
        return Err(LedgerError::validation("actor is required"));
    }
    Ok(())
}

/// Pick (outtake) of a quantity from one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickRequest {
    pub item: ItemId,
    pub prunit: PrunitId,
    pub cell: CellId,
    pub warehouse: Option<WarehouseId>,
    pub quantity: Decimal,
    #[serde(default)]
    pub policy: DepletionPolicy,
    pub actor: String,
}

impl PickRequest {
    pub fn key(&self) -> StorageKey {
        StorageKey::new(
            self.item.clone(),
            self.prunit,
            self.cell.clone(),
            self.warehouse,
        )
    }

    pub fn validate(&self) -> LedgerResult<()> {
        ensure_positive(self.quantity)?;
        ensure_actor(&self.actor)
    }
}

/// Result of a successful pick: before/after quantities plus the
/// record's descriptive fields for caller-side display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickResult {
    pub record_id: RecordId,
    pub item: ItemId,
    pub name: String,
    pub shk: String,
    pub prunit: PrunitId,
    pub prunit_name: String,
    pub cell: CellId,
    pub warehouse: Option<WarehouseId>,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
    /// True when the pick depleted the row and the policy removed it.
    pub removed: bool,
}

/// Store-level outcome of an atomic conditional deduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductOutcome {
    /// The row as it stands after the deduction (pre-removal image when
    /// the policy deleted it).
    pub record: StorageRecord,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
    pub removed: bool,
}

impl DeductOutcome {
    pub fn into_pick_result(self) -> PickResult {
        PickResult {
            record_id: self.record.id,
            item: self.record.item,
            name: self.record.name,
            shk: self.record.shk,
            prunit: self.record.prunit,
            prunit_name: self.record.prunit_name,
            cell: self.record.cell,
            warehouse: self.record.warehouse,
            previous_quantity: self.previous_quantity,
            new_quantity: self.new_quantity,
            removed: self.removed,
        }
    }
}

/// Intake of a quantity into a (buffer) cell.
///
/// Carries the descriptive master-data fields so a record created on
/// first intake is fully seeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeRequest {
    pub item: ItemId,
    pub name: String,
    pub shk: String,
    pub prunit: PrunitId,
    pub prunit_name: String,
    pub cell: CellId,
    pub warehouse: Option<WarehouseId>,
    pub quantity: Decimal,
    #[serde(default)]
    pub condition: ConditionState,
    #[serde(default)]
    pub expiration: Expiration,
    pub actor: String,
}

impl IntakeRequest {
    pub fn key(&self) -> StorageKey {
        StorageKey::new(
            self.item.clone(),
            self.prunit,
            self.cell.clone(),
            self.warehouse,
        )
    }

    pub fn validate(&self) -> LedgerResult<()> {
        ensure_positive(self.quantity)?;
        ensure_actor(&self.actor)
    }

    /// Build the record an intake creates when no row exists at the key.
    pub fn seed_record(&self, id: RecordId, now: chrono::DateTime<chrono::Utc>) -> StorageRecord {
        StorageRecord {
            id,
            item: self.item.clone(),
            name: self.name.clone(),
            shk: self.shk.clone(),
            prunit: self.prunit,
            prunit_name: self.prunit_name.clone(),
            product_quantity: self.quantity,
            place_quantity: self.quantity,
            cell: self.cell.clone(),
            warehouse: self.warehouse,
            condition: self.condition,
            expiration: self.expiration.clone(),
            actor: self.actor.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of an intake: merged into the existing row or created a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IntakeOutcome {
    Merged {
        record_id: RecordId,
        previous_quantity: Decimal,
        new_quantity: Decimal,
    },
    Created {
        record_id: RecordId,
    },
}

impl IntakeOutcome {
    pub fn record_id(&self) -> RecordId {
        match self {
            IntakeOutcome::Merged { record_id, .. } => *record_id,
            IntakeOutcome::Created { record_id } => *record_id,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, IntakeOutcome::Created { .. })
    }
}

/// Transfer of a quantity between two cells of one warehouse scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub item: ItemId,
    pub prunit: PrunitId,
    pub source_cell: CellId,
    pub target_cell: CellId,
    pub warehouse: Option<WarehouseId>,
    pub quantity: Decimal,
    /// Overrides for a newly created target row; inherited from the
    /// source when absent.
    pub condition: Option<ConditionState>,
    pub expiration: Option<Expiration>,
    pub actor: String,
}

impl TransferRequest {
    pub fn source_key(&self) -> StorageKey {
        StorageKey::new(
            self.item.clone(),
            self.prunit,
            self.source_cell.clone(),
            self.warehouse,
        )
    }

    pub fn target_key(&self) -> StorageKey {
        StorageKey::new(
            self.item.clone(),
            self.prunit,
            self.target_cell.clone(),
            self.warehouse,
        )
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.source_cell == self.target_cell {
            return Err(LedgerError::SameLocation);
        }
        ensure_positive(self.quantity)?;
        ensure_actor(&self.actor)
    }

    /// Build the target record a transfer creates when none exists:
    /// descriptive fields come from the source row; condition and
    /// expiration from the explicit overrides, else the source.
    pub fn seed_target(
        &self,
        source: &StorageRecord,
        id: RecordId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StorageRecord {
        StorageRecord {
            id,
            item: source.item.clone(),
            name: source.name.clone(),
            shk: source.shk.clone(),
            prunit: source.prunit,
            prunit_name: source.prunit_name.clone(),
            product_quantity: self.quantity,
            place_quantity: self.quantity,
            cell: self.target_cell.clone(),
            warehouse: self.warehouse,
            condition: self.condition.unwrap_or(source.condition),
            expiration: self
                .expiration
                .clone()
                .unwrap_or_else(|| source.expiration.clone()),
            actor: self.actor.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Before/after quantities of one transfer leg.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegState {
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
}

/// Store-level outcome of a committed two-leg transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Source row pre-image (descriptive fields seed the result).
    pub source_record: StorageRecord,
    pub source: LegState,
    pub target: LegState,
    pub target_record_id: RecordId,
    pub target_created: bool,
}

/// Result of a successful transfer, both legs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub item: ItemId,
    pub name: String,
    pub prunit: PrunitId,
    pub source_cell: CellId,
    pub target_cell: CellId,
    pub warehouse: Option<WarehouseId>,
    pub quantity: Decimal,
    pub source: LegState,
    pub target: LegState,
    pub target_record_id: RecordId,
    pub target_created: bool,
}

impl TransferOutcome {
    pub fn into_transfer_result(self, request: &TransferRequest) -> TransferResult {
        TransferResult {
            item: self.source_record.item,
            name: self.source_record.name,
            prunit: self.source_record.prunit,
            source_cell: request.source_cell.clone(),
            target_cell: request.target_cell.clone(),
            warehouse: request.warehouse,
            quantity: request.quantity,
            source: self.source,
            target: self.target,
            target_record_id: self.target_record_id,
            target_created: self.target_created,
        }
    }
}
