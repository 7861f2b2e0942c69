//! Postgres audit sink: appends to the operation-audit table.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use stockcell_core::LedgerResult;
use stockcell_ledger::OperationLogEntry;

use super::AuditSink;
use crate::store::postgres_error;

/// Appends one row per operation to `operation_log`.
#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: Arc<PgPool>,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl AuditSink for PgAuditLog {
    async fn record(&self, entry: &OperationLogEntry) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO operation_log (
                id, operation_type, product_id, prunit_id,
                from_location_id, to_location_id, quantity,
                condition_state, executor, operation_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.operation.as_db_str())
        .bind(entry.item.as_str())
        .bind(i32::from(entry.prunit))
        .bind(entry.from_cell.as_ref().map(|c| c.as_str().to_string()))
        .bind(entry.to_cell.as_ref().map(|c| c.as_str().to_string()))
        .bind(entry.quantity)
        .bind(entry.condition.as_db_str())
        .bind(entry.actor.as_str())
        .bind(entry.occurred_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| postgres_error("audit_record", e))?;

        Ok(())
    }
}
