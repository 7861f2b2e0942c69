//! Operation audit entries, one per ledger-affecting operation.
//!
//! Entries are append-only and delivered at most once; losing one never
//! fails the ledger operation that produced it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockcell_core::{CellId, ItemId, PrunitId};

use crate::record::ConditionState;

/// Ledger-affecting operation class, as written to the audit table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Pick,
    Intake,
    Transfer,
    InventoryAdjust,
    InventoryAdd,
}

impl OperationType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            OperationType::Pick => "pick",
            OperationType::Intake => "intake",
            OperationType::Transfer => "transfer",
            OperationType::InventoryAdjust => "inventory_adjust",
            OperationType::InventoryAdd => "inventory_add",
        }
    }
}

impl core::fmt::Display for OperationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: Uuid,
    pub operation: OperationType,
    pub item: ItemId,
    pub prunit: PrunitId,
    pub from_cell: Option<CellId>,
    pub to_cell: Option<CellId>,
    pub quantity: Decimal,
    pub condition: ConditionState,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl OperationLogEntry {
    pub fn new(
        operation: OperationType,
        item: ItemId,
        prunit: PrunitId,
        quantity: Decimal,
        condition: ConditionState,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            operation,
            item,
            prunit,
            from_cell: None,
            to_cell: None,
            quantity,
            condition,
            actor: actor.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn from_cell(mut self, cell: CellId) -> Self {
        self.from_cell = Some(cell);
        self
    }

    pub fn to_cell(mut self, cell: CellId) -> Self {
        self.to_cell = Some(cell);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_cells() {
        let entry = OperationLogEntry::new(
            OperationType::Transfer,
            ItemId::new("100"),
            PrunitId::new(1),
            Decimal::from(5),
            ConditionState::Good,
            "op-1",
        )
        .from_cell(CellId::new("A-01"))
        .to_cell(CellId::new("B-02"));

        assert_eq!(entry.from_cell, Some(CellId::new("A-01")));
        assert_eq!(entry.to_cell, Some(CellId::new("B-02")));
        assert_eq!(entry.operation.to_string(), "transfer");
    }
}
