//! Movement engine: pick, buffer intake and cell-to-cell transfer.
//!
//! Validates requests at the boundary, delegates the atomic ledger
//! mutation to the injected store and emits one audit entry per
//! operation on the fire-and-forget path.

use tracing::instrument;

use stockcell_core::LedgerResult;
use stockcell_ledger::{
    IntakeOutcome, IntakeRequest, OperationLogEntry, OperationType, PickRequest, PickResult,
    TransferRequest, TransferResult,
};

use crate::audit::AuditHandle;
use crate::store::LedgerStore;

pub struct MovementEngine<S> {
    store: S,
    audit: AuditHandle,
}

impl<S: LedgerStore> MovementEngine<S> {
    pub fn new(store: S, audit: AuditHandle) -> Self {
        Self { store, audit }
    }

    /// Pick a quantity from one cell.
    ///
    /// `product_quantity` is never touched by a pick; what happens to a
    /// depleted row is the request's `policy`.
    #[instrument(
        skip(self, request),
        fields(key = %request.key(), quantity = %request.quantity),
        err
    )]
    pub async fn pick(&self, request: &PickRequest) -> LedgerResult<PickResult> {
        request.validate()?;

        let outcome = self
            .store
            .deduct(&request.key(), request.quantity, request.policy, &request.actor)
            .await?;

        self.audit.emit(
            OperationLogEntry::new(
                OperationType::Pick,
                request.item.clone(),
                request.prunit,
                request.quantity,
                outcome.record.condition,
                request.actor.clone(),
            )
            .from_cell(request.cell.clone()),
        );

        Ok(outcome.into_pick_result())
    }

    /// Intake a quantity into a (buffer) cell: additive merge into the
    /// row at the exact key, or a new record on first contact.
    #[instrument(
        skip(self, request),
        fields(key = %request.key(), quantity = %request.quantity),
        err
    )]
    pub async fn intake(&self, request: &IntakeRequest) -> LedgerResult<IntakeOutcome> {
        request.validate()?;

        let outcome = self.store.intake(request).await?;

        self.audit.emit(
            OperationLogEntry::new(
                OperationType::Intake,
                request.item.clone(),
                request.prunit,
                request.quantity,
                request.condition,
                request.actor.clone(),
            )
            .to_cell(request.cell.clone()),
        );

        Ok(outcome)
    }

    /// Move a quantity between two cells. Both legs commit together or
    /// not at all; one audit entry describes the whole movement.
    #[instrument(
        skip(self, request),
        fields(source = %request.source_key(), target = %request.target_key(), quantity = %request.quantity),
        err
    )]
    pub async fn transfer(&self, request: &TransferRequest) -> LedgerResult<TransferResult> {
        request.validate()?;

        let outcome = self.store.transfer(request).await?;

        self.audit.emit(
            OperationLogEntry::new(
                OperationType::Transfer,
                request.item.clone(),
                request.prunit,
                request.quantity,
                request
                    .condition
                    .unwrap_or(outcome.source_record.condition),
                request.actor.clone(),
            )
            .from_cell(request.source_cell.clone())
            .to_cell(request.target_cell.clone()),
        );

        Ok(outcome.into_transfer_result(request))
    }
}
