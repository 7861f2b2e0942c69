//! Reconciliation engine: physical counts against the ledger.
//!
//! Classification itself is pure (`stockcell_ledger::reconcile`); this
//! engine loads the cell, persists one history line per classified line
//! regardless of commit mode, and applies the corrective writes in one
//! store transaction when committing.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockcell_core::{CellId, LedgerError, LedgerResult, WarehouseId};
use stockcell_ledger::{
    classify_cell, overall_status, plan_corrections, Correction, InventoryRecord,
    ObservedLine, OperationLogEntry, OperationType, RecordFilter, ReconciliationStatus,
};

use crate::audit::AuditHandle;
use crate::master_data::MasterData;
use crate::store::LedgerStore;

/// One physical count of one cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub cell: CellId,
    /// Restrict the count to one warehouse; absent spans all of them.
    pub warehouse: Option<WarehouseId>,
    pub observed: Vec<ObservedLine>,
    pub actor: String,
    /// Apply corrective writes, not just record the discrepancies.
    pub commit: bool,
    pub notes: Option<String>,
}

impl ReconcileRequest {
    fn validate(&self) -> LedgerResult<()> {
        if self.actor.trim().is_empty() {
            return Err(LedgerError::validation("actor is required"));
        }
        for line in &self.observed {
            if line.quantity < rust_decimal::Decimal::ZERO {
                return Err(LedgerError::validation(format!(
                    "observed quantity for {}/{} cannot be negative",
                    line.item, line.prunit
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub status: ReconciliationStatus,
    /// The persisted history lines, in classification order.
    pub lines: Vec<InventoryRecord>,
    pub corrections_applied: usize,
}

pub struct ReconciliationEngine<S> {
    store: S,
    audit: AuditHandle,
    master_data: Option<Arc<dyn MasterData>>,
}

impl<S: LedgerStore> ReconciliationEngine<S> {
    pub fn new(store: S, audit: AuditHandle) -> Self {
        Self {
            store,
            audit,
            master_data: None,
        }
    }

    /// Attach a master-data lookup so records created for surpluses get
    /// their descriptive fields resolved instead of left blank.
    pub fn with_master_data(mut self, master_data: Arc<dyn MasterData>) -> Self {
        self.master_data = Some(master_data);
        self
    }

    #[instrument(
        skip(self, request),
        fields(cell = %request.cell, observed = request.observed.len(), commit = request.commit),
        err
    )]
    pub async fn reconcile_cell(
        &self,
        request: &ReconcileRequest,
    ) -> LedgerResult<ReconciliationResult> {
        request.validate()?;

        let mut filter = RecordFilter::for_cell(request.cell.clone());
        if let Some(warehouse) = request.warehouse {
            filter = filter.with_warehouse(warehouse);
        }
        let current = self.store.find(&filter).await?;

        let classified = classify_cell(&current, &request.observed);
        let status = overall_status(&classified);

        let corrections = if request.commit {
            let mut corrections = plan_corrections(
                &classified,
                &request.cell,
                request.warehouse,
                &request.actor,
            )?;
            self.resolve_created_records(&mut corrections).await?;
            corrections
        } else {
            Vec::new()
        };

        let counted_at = Utc::now();
        let lines: Vec<InventoryRecord> = classified
            .into_iter()
            .map(|line| {
                line.into_inventory_record(
                    &request.cell,
                    request.warehouse,
                    &request.actor,
                    counted_at,
                    request.notes.clone(),
                )
            })
            .collect();

        self.store.apply_reconciliation(&lines, &corrections).await?;

        for correction in &corrections {
            self.audit.emit(match correction {
                Correction::SetPlaceQuantity {
                    key,
                    quantity,
                    actor,
                } => OperationLogEntry::new(
                    OperationType::InventoryAdjust,
                    key.item.clone(),
                    key.prunit,
                    *quantity,
                    stockcell_ledger::ConditionState::Good,
                    actor.clone(),
                )
                .to_cell(key.cell.clone()),
                Correction::CreateRecord(draft) => OperationLogEntry::new(
                    OperationType::InventoryAdd,
                    draft.item.clone(),
                    draft.prunit,
                    draft.quantity,
                    draft.condition,
                    draft.actor.clone(),
                )
                .to_cell(draft.cell.clone()),
            });
        }

        Ok(ReconciliationResult {
            status,
            lines,
            corrections_applied: corrections.len(),
        })
    }

    /// Fill in descriptive fields on records about to be created, when a
    /// master-data lookup is available. Lookup failures degrade to blank
    /// fields rather than failing the count.
    async fn resolve_created_records(
        &self,
        corrections: &mut [Correction],
    ) -> LedgerResult<()> {
        let Some(master_data) = &self.master_data else {
            return Ok(());
        };

        for correction in corrections {
            let Correction::CreateRecord(draft) = correction else {
                continue;
            };
            match master_data.item_by_id(&draft.item).await {
                Ok(Some(info)) => {
                    draft.name = info.name;
                    draft.shk = info.scan_code.unwrap_or_default();
                    draft.prunit_name = info.packaging_unit.unwrap_or_default();
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(item = %draft.item, error = %err,
                                   "master-data lookup failed; creating record with blank fields");
                }
            }
        }
        Ok(())
    }
}
