//! Postgres-backed ledger store.
//!
//! ## Schema
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `storage_records` | one row per (article, packaging unit, cell, warehouse) |
//! | `inventory_history` | append-only reconciliation lines |
//!
//! Column names keep the normalized legacy schema (`article`, `shk`,
//! `place_qty`, `executor`, `id_scklad`, ...) so the scanner fleet and
//! existing reporting keep working. Quantity columns are NUMERIC and are
//! read as `rust_decimal::Decimal`.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | LedgerError | Scenario |
//! |------------|---------------|-------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | concurrent insert of the same identity key |
//! | Database (serialization failure) | `40001` | `Conflict` | concurrent transaction; retry |
//! | Database (deadlock detected) | `40P01` | `Conflict` | opposing transfers; retry |
//! | Database (other) | any other | `StoreUnavailable` | constraint/storage failure |
//! | PoolTimedOut | n/a | `Conflict` | pool exhausted within the acquire timeout; retry |
//! | PoolClosed / Io / other | n/a | `StoreUnavailable` | connection failure |
//!
//! ## Concurrency
//!
//! `deduct` is a single conditional `UPDATE ... AND place_qty >= $q`
//! judged by its affected rows, so two racing picks can never both
//! succeed on the last units. The compound operations (`intake`,
//! `transfer`, `apply_reconciliation`) take row locks with
//! `SELECT ... FOR UPDATE` inside one transaction, so a mid-sequence
//! failure rolls back every leg.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use stockcell_core::{CellId, ItemId, LedgerError, LedgerResult, PrunitId, RecordId, WarehouseId};
use stockcell_ledger::{
    ConditionState, Correction, DeductOutcome, DepletionPolicy, Expiration, IntakeOutcome,
    IntakeRequest, InventoryRecord, LegState, LineStatus, RecordFilter, RecordPatch, StorageKey,
    StorageRecord, TransferOutcome, TransferRequest,
};

use super::LedgerStore;

/// Postgres implementation of [`LedgerStore`].
///
/// Holds a shared connection pool; the pool's lifecycle is owned by the
/// process entry point (see [`crate::config::connect`]), never by this
/// type.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: Arc<PgPool>,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn begin(&self) -> LedgerResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self, filter), err)]
    async fn find(&self, filter: &RecordFilter) -> LedgerResult<Vec<StorageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, article, shk, product_qty, place_qty,
                   packaging_unit_id, packaging_unit_name, cell_id, warehouse_id,
                   condition_state, expiration_date, expiration_start, expiration_end,
                   executor, create_date, update_date
            FROM storage_records
            WHERE ($1::text IS NULL OR article = $1)
              AND ($2::int IS NULL OR packaging_unit_id = $2)
              AND ($3::text IS NULL OR cell_id = $3)
              AND ($4::int IS NULL OR warehouse_id = $4)
            ORDER BY id ASC
            "#,
        )
        .bind(filter.item.as_ref().map(|i| i.as_str().to_string()))
        .bind(filter.prunit.map(i32::from))
        .bind(filter.cell.as_ref().map(|c| c.as_str().to_string()))
        .bind(filter.warehouse.map(i32::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(StorageRow::from_row(&row).map_err(row_error)?.into_record()?);
        }
        Ok(records)
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    async fn find_one(&self, key: &StorageKey) -> LedgerResult<Option<StorageRecord>> {
        fetch_by_key(&*self.pool, key, false).await
    }

    #[instrument(skip(self, record), fields(key = %record.key()), err)]
    async fn insert(&self, record: &StorageRecord) -> LedgerResult<()> {
        insert_record(&*self.pool, record).await
    }

    #[instrument(skip(self, key, patch), fields(key = %key), err)]
    async fn update(&self, key: &StorageKey, patch: &RecordPatch) -> LedgerResult<u64> {
        if patch.is_empty() {
            return Err(LedgerError::validation("empty record patch"));
        }

        let expiration_set = patch.expiration.is_some();
        let expiration = patch.expiration.clone().unwrap_or_default();

        let result = sqlx::query(
            r#"
            UPDATE storage_records
            SET product_qty = COALESCE($5, product_qty),
                place_qty = COALESCE($6, place_qty),
                condition_state = COALESCE($7, condition_state),
                expiration_date = CASE WHEN $8 THEN $9 ELSE expiration_date END,
                expiration_start = CASE WHEN $8 THEN $10 ELSE expiration_start END,
                expiration_end = CASE WHEN $8 THEN $11 ELSE expiration_end END,
                executor = COALESCE($12, executor),
                update_date = NOW()
            WHERE article = $1 AND packaging_unit_id = $2 AND cell_id = $3
              AND warehouse_id IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(key.item.as_str())
        .bind(i32::from(key.prunit))
        .bind(key.cell.as_str())
        .bind(key.warehouse.map(i32::from))
        .bind(patch.product_quantity)
        .bind(patch.place_quantity)
        .bind(patch.condition.map(|c| c.as_db_str()))
        .bind(expiration_set)
        .bind(expiration.date)
        .bind(expiration.window_start)
        .bind(expiration.window_end)
        .bind(patch.actor.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    async fn delete(&self, key: &StorageKey) -> LedgerResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM storage_records
            WHERE article = $1 AND packaging_unit_id = $2 AND cell_id = $3
              AND warehouse_id IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(key.item.as_str())
        .bind(i32::from(key.prunit))
        .bind(key.cell.as_str())
        .bind(key.warehouse.map(i32::from))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, key, actor), fields(key = %key, quantity = %quantity), err)]
    async fn deduct(
        &self,
        key: &StorageKey,
        quantity: Decimal,
        policy: DepletionPolicy,
        actor: &str,
    ) -> LedgerResult<DeductOutcome> {
        let mut tx = self.begin().await?;

        // The quantity guard lives in the statement itself; the affected
        // row tells us whether the deduction happened.
        let row = sqlx::query(
            r#"
            UPDATE storage_records
            SET place_qty = place_qty - $5, executor = $6, update_date = NOW()
            WHERE article = $1 AND packaging_unit_id = $2 AND cell_id = $3
              AND warehouse_id IS NOT DISTINCT FROM $4
              AND place_qty >= $5
            RETURNING id, name, article, shk, product_qty, place_qty,
                      packaging_unit_id, packaging_unit_name, cell_id, warehouse_id,
                      condition_state, expiration_date, expiration_start, expiration_end,
                      executor, create_date, update_date
            "#,
        )
        .bind(key.item.as_str())
        .bind(i32::from(key.prunit))
        .bind(key.cell.as_str())
        .bind(key.warehouse.map(i32::from))
        .bind(quantity)
        .bind(actor)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("deduct", e))?;

        let Some(row) = row else {
            // Disambiguate: was the row absent, or merely short?
            let existing = fetch_by_key(&mut *tx, key, false).await?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(match existing {
                Some(record) => LedgerError::insufficient(record.place_quantity),
                None => LedgerError::NotFound,
            });
        };

        let record = StorageRow::from_row(&row).map_err(row_error)?.into_record()?;
        let new_quantity = record.place_quantity;
        let previous_quantity = new_quantity + quantity;

        let removed = policy == DepletionPolicy::RemoveEmpty && new_quantity == Decimal::ZERO;
        if removed {
            sqlx::query("DELETE FROM storage_records WHERE id = $1")
                .bind(i64::from(record.id))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("deduct_remove", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(DeductOutcome {
            record,
            previous_quantity,
            new_quantity,
            removed,
        })
    }

    #[instrument(skip(self, draft), fields(key = %draft.key(), quantity = %draft.quantity), err)]
    async fn intake(&self, draft: &IntakeRequest) -> LedgerResult<IntakeOutcome> {
        let mut tx = self.begin().await?;
        let outcome = merge_or_create(&mut tx, draft).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(outcome)
    }

    #[instrument(
        skip(self, plan),
        fields(source = %plan.source_key(), target = %plan.target_key(), quantity = %plan.quantity),
        err
    )]
    async fn transfer(&self, plan: &TransferRequest) -> LedgerResult<TransferOutcome> {
        let mut tx = self.begin().await?;

        let Some(source) = fetch_by_key(&mut *tx, &plan.source_key(), true).await? else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerError::NotFound);
        };

        if source.place_quantity < plan.quantity {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerError::insufficient(source.place_quantity));
        }

        let source_new: Decimal = sqlx::query(
            r#"
            UPDATE storage_records
            SET place_qty = place_qty - $2, executor = $3, update_date = NOW()
            WHERE id = $1
            RETURNING place_qty
            "#,
        )
        .bind(i64::from(source.id))
        .bind(plan.quantity)
        .bind(plan.actor.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transfer_source", e))?
        .try_get("place_qty")
        .map_err(row_error)?;

        let target = fetch_by_key(&mut *tx, &plan.target_key(), true).await?;
        let (target_record_id, target_previous, target_new, target_created) = match target {
            Some(existing) => {
                let new_qty: Decimal = sqlx::query(
                    r#"
                    UPDATE storage_records
                    SET place_qty = place_qty + $2, product_qty = product_qty + $2,
                        executor = $3, update_date = NOW()
                    WHERE id = $1
                    RETURNING place_qty
                    "#,
                )
                .bind(i64::from(existing.id))
                .bind(plan.quantity)
                .bind(plan.actor.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("transfer_target", e))?
                .try_get("place_qty")
                .map_err(row_error)?;

                (existing.id, new_qty - plan.quantity, new_qty, false)
            }
            None => {
                let id = next_record_id(&mut *tx).await?;
                let record = plan.seed_target(&source, id, Utc::now());
                insert_record(&mut *tx, &record).await?;
                (id, Decimal::ZERO, plan.quantity, true)
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        let source_previous = source.place_quantity;
        Ok(TransferOutcome {
            source_record: source,
            source: LegState {
                previous_quantity: source_previous,
                new_quantity: source_new,
            },
            target: LegState {
                previous_quantity: target_previous,
                new_quantity: target_new,
            },
            target_record_id,
            target_created,
        })
    }

    #[instrument(skip_all, fields(lines = lines.len(), corrections = corrections.len()), err)]
    async fn apply_reconciliation(
        &self,
        lines: &[InventoryRecord],
        corrections: &[Correction],
    ) -> LedgerResult<()> {
        let mut tx = self.begin().await?;

        for line in lines {
            insert_inventory_line(&mut tx, line).await?;
        }

        for correction in corrections {
            match correction {
                Correction::SetPlaceQuantity {
                    key,
                    quantity,
                    actor,
                } => {
                    let result = sqlx::query(
                        r#"
                        UPDATE storage_records
                        SET place_qty = $5, executor = $6, update_date = NOW()
                        WHERE article = $1 AND packaging_unit_id = $2 AND cell_id = $3
                          AND warehouse_id IS NOT DISTINCT FROM $4
                        "#,
                    )
                    .bind(key.item.as_str())
                    .bind(i32::from(key.prunit))
                    .bind(key.cell.as_str())
                    .bind(key.warehouse.map(i32::from))
                    .bind(*quantity)
                    .bind(actor.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("correction_update", e))?;

                    if result.rows_affected() == 0 {
                        tx.rollback()
                            .await
                            .map_err(|e| map_sqlx_error("rollback", e))?;
                        return Err(LedgerError::conflict(format!(
                            "record {key} vanished during reconciliation commit"
                        )));
                    }
                }
                Correction::CreateRecord(draft) => {
                    if fetch_by_key(&mut *tx, &draft.key(), true).await?.is_some() {
                        tx.rollback()
                            .await
                            .map_err(|e| map_sqlx_error("rollback", e))?;
                        return Err(LedgerError::conflict(format!(
                            "record {} appeared during reconciliation commit",
                            draft.key()
                        )));
                    }
                    let id = next_record_id(&mut *tx).await?;
                    insert_record(&mut *tx, &draft.seed_record(id, Utc::now())).await?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self, cell), fields(cell = %cell), err)]
    async fn inventory_history(&self, cell: &CellId) -> LedgerResult<Vec<InventoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT location_id, article, prunit_id, system_quantity, actual_quantity,
                   difference, executor, inventory_date, status, notes, id_scklad
            FROM inventory_history
            WHERE location_id = $1
            ORDER BY inventory_date ASC, article ASC
            "#,
        )
        .bind(cell.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("inventory_history", e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            lines.push(InventoryRow::from_row(&row).map_err(row_error)?.into_line()?);
        }
        Ok(lines)
    }
}

/// Point lookup, optionally taking a row lock for the transaction's
/// duration.
async fn fetch_by_key<'c, E>(
    executor: E,
    key: &StorageKey,
    lock: bool,
) -> LedgerResult<Option<StorageRecord>>
where
    E: sqlx::PgExecutor<'c>,
{
    let sql = if lock {
        r#"
        SELECT id, name, article, shk, product_qty, place_qty,
               packaging_unit_id, packaging_unit_name, cell_id, warehouse_id,
               condition_state, expiration_date, expiration_start, expiration_end,
               executor, create_date, update_date
        FROM storage_records
        WHERE article = $1 AND packaging_unit_id = $2 AND cell_id = $3
          AND warehouse_id IS NOT DISTINCT FROM $4
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT id, name, article, shk, product_qty, place_qty,
               packaging_unit_id, packaging_unit_name, cell_id, warehouse_id,
               condition_state, expiration_date, expiration_start, expiration_end,
               executor, create_date, update_date
        FROM storage_records
        WHERE article = $1 AND packaging_unit_id = $2 AND cell_id = $3
          AND warehouse_id IS NOT DISTINCT FROM $4
        "#
    };

    let row = sqlx::query(sql)
        .bind(key.item.as_str())
        .bind(i32::from(key.prunit))
        .bind(key.cell.as_str())
        .bind(key.warehouse.map(i32::from))
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error("fetch_by_key", e))?;

    match row {
        Some(row) => Ok(Some(
            StorageRow::from_row(&row).map_err(row_error)?.into_record()?,
        )),
        None => Ok(None),
    }
}

async fn insert_record<'c, E>(executor: E, record: &StorageRecord) -> LedgerResult<()>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO storage_records (
            id, name, article, shk, product_qty, place_qty,
            packaging_unit_id, packaging_unit_name, cell_id, warehouse_id,
            condition_state, expiration_date, expiration_start, expiration_end,
            executor, create_date, update_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(i64::from(record.id))
    .bind(record.name.as_str())
    .bind(record.item.as_str())
    .bind(record.shk.as_str())
    .bind(record.product_quantity)
    .bind(record.place_quantity)
    .bind(i32::from(record.prunit))
    .bind(record.prunit_name.as_str())
    .bind(record.cell.as_str())
    .bind(record.warehouse.map(i32::from))
    .bind(record.condition.as_db_str())
    .bind(record.expiration.date)
    .bind(record.expiration.window_start)
    .bind(record.expiration.window_end)
    .bind(record.actor.as_str())
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert", e))?;

    Ok(())
}

/// Next monotonic record id, derived from the current maximum.
///
/// Runs inside the caller's transaction; a concurrent allocation of the
/// same id surfaces as a unique violation mapped to `Conflict`.
async fn next_record_id<'c, E>(executor: E) -> LedgerResult<RecordId>
where
    E: sqlx::PgExecutor<'c>,
{
    let row = sqlx::query("SELECT COALESCE(MAX(id), 0) + 1 AS next_id FROM storage_records")
        .fetch_one(executor)
        .await
        .map_err(|e| map_sqlx_error("next_record_id", e))?;

    let next: i64 = row.try_get("next_id").map_err(row_error)?;
    Ok(RecordId::new(next))
}

/// Merge-or-create for intake, inside the caller's transaction.
async fn merge_or_create(
    tx: &mut Transaction<'_, Postgres>,
    draft: &IntakeRequest,
) -> LedgerResult<IntakeOutcome> {
    match fetch_by_key(&mut **tx, &draft.key(), true).await? {
        Some(existing) => {
            // Additive merge; condition and expiration are
            // last-write-wins per the intake contract.
            let new_qty: Decimal = sqlx::query(
                r#"
                UPDATE storage_records
                SET place_qty = place_qty + $2, product_qty = product_qty + $2,
                    condition_state = $3,
                    expiration_date = $4, expiration_start = $5, expiration_end = $6,
                    executor = $7, update_date = NOW()
                WHERE id = $1
                RETURNING place_qty
                "#,
            )
            .bind(i64::from(existing.id))
            .bind(draft.quantity)
            .bind(draft.condition.as_db_str())
            .bind(draft.expiration.date)
            .bind(draft.expiration.window_start)
            .bind(draft.expiration.window_end)
            .bind(draft.actor.as_str())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("intake_merge", e))?
            .try_get("place_qty")
            .map_err(row_error)?;

            Ok(IntakeOutcome::Merged {
                record_id: existing.id,
                previous_quantity: new_qty - draft.quantity,
                new_quantity: new_qty,
            })
        }
        None => {
            let id = next_record_id(&mut **tx).await?;
            insert_record(&mut **tx, &draft.seed_record(id, Utc::now())).await?;
            Ok(IntakeOutcome::Created { record_id: id })
        }
    }
}

async fn insert_inventory_line(
    tx: &mut Transaction<'_, Postgres>,
    line: &InventoryRecord,
) -> LedgerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_history (
            location_id, article, prunit_id, system_quantity, actual_quantity,
            difference, executor, inventory_date, status, notes, id_scklad
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(line.cell.as_str())
    .bind(line.item.as_str())
    .bind(i32::from(line.prunit))
    .bind(line.system_quantity)
    .bind(line.actual_quantity)
    .bind(line.difference)
    .bind(line.actor.as_str())
    .bind(line.counted_at)
    .bind(line.status.as_db_str())
    .bind(line.notes.as_deref())
    .bind(line.warehouse.map(i32::from))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_inventory_line", e))?;

    Ok(())
}

/// Map SQLx errors to the ledger taxonomy (see module docs).
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => LedgerError::Conflict(msg),
                _ => LedgerError::StoreUnavailable(msg),
            }
        }
        sqlx::Error::PoolTimedOut => LedgerError::Conflict(format!(
            "connection pool exhausted in {operation}; retry"
        )),
        other => LedgerError::StoreUnavailable(format!("sqlx error in {operation}: {other}")),
    }
}

pub(crate) fn row_error(err: sqlx::Error) -> LedgerError {
    LedgerError::unavailable(format!("failed to decode row: {err}"))
}

// SQLx row types

#[derive(Debug)]
struct StorageRow {
    id: i64,
    name: String,
    article: String,
    shk: String,
    product_qty: Decimal,
    place_qty: Decimal,
    packaging_unit_id: i32,
    packaging_unit_name: String,
    cell_id: String,
    warehouse_id: Option<i32>,
    condition_state: String,
    expiration_date: Option<NaiveDate>,
    expiration_start: Option<NaiveDate>,
    expiration_end: Option<NaiveDate>,
    executor: String,
    create_date: DateTime<Utc>,
    update_date: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for StorageRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StorageRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            article: row.try_get("article")?,
            shk: row.try_get("shk")?,
            product_qty: row.try_get("product_qty")?,
            place_qty: row.try_get("place_qty")?,
            packaging_unit_id: row.try_get("packaging_unit_id")?,
            packaging_unit_name: row.try_get("packaging_unit_name")?,
            cell_id: row.try_get("cell_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            condition_state: row.try_get("condition_state")?,
            expiration_date: row.try_get("expiration_date")?,
            expiration_start: row.try_get("expiration_start")?,
            expiration_end: row.try_get("expiration_end")?,
            executor: row.try_get("executor")?,
            create_date: row.try_get("create_date")?,
            update_date: row.try_get("update_date")?,
        })
    }
}

impl StorageRow {
    fn into_record(self) -> LedgerResult<StorageRecord> {
        Ok(StorageRecord {
            id: RecordId::new(self.id),
            item: ItemId::new(self.article),
            name: self.name,
            shk: self.shk,
            prunit: PrunitId::new(self.packaging_unit_id),
            prunit_name: self.packaging_unit_name,
            product_quantity: self.product_qty,
            place_quantity: self.place_qty,
            cell: CellId::new(self.cell_id),
            warehouse: self.warehouse_id.map(WarehouseId::new),
            condition: ConditionState::from_db_str(&self.condition_state)
                .map_err(|e| LedgerError::unavailable(format!("corrupt row: {e}")))?,
            expiration: Expiration {
                date: self.expiration_date,
                window_start: self.expiration_start,
                window_end: self.expiration_end,
            },
            actor: self.executor,
            created_at: self.create_date,
            updated_at: self.update_date,
        })
    }
}

#[derive(Debug)]
struct InventoryRow {
    location_id: String,
    article: String,
    prunit_id: i32,
    system_quantity: Decimal,
    actual_quantity: Decimal,
    difference: Decimal,
    executor: String,
    inventory_date: DateTime<Utc>,
    status: String,
    notes: Option<String>,
    id_scklad: Option<i32>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for InventoryRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(InventoryRow {
            location_id: row.try_get("location_id")?,
            article: row.try_get("article")?,
            prunit_id: row.try_get("prunit_id")?,
            system_quantity: row.try_get("system_quantity")?,
            actual_quantity: row.try_get("actual_quantity")?,
            difference: row.try_get("difference")?,
            executor: row.try_get("executor")?,
            inventory_date: row.try_get("inventory_date")?,
            status: row.try_get("status")?,
            notes: row.try_get("notes")?,
            id_scklad: row.try_get("id_scklad")?,
        })
    }
}

impl InventoryRow {
    fn into_line(self) -> LedgerResult<InventoryRecord> {
        Ok(InventoryRecord {
            cell: CellId::new(self.location_id),
            warehouse: self.id_scklad.map(WarehouseId::new),
            item: ItemId::new(self.article),
            prunit: PrunitId::new(self.prunit_id),
            system_quantity: self.system_quantity,
            actual_quantity: self.actual_quantity,
            difference: self.difference,
            status: LineStatus::from_db_str(&self.status)
                .map_err(|e| LedgerError::unavailable(format!("corrupt row: {e}")))?,
            actor: self.executor,
            counted_at: self.inventory_date,
            notes: self.notes,
        })
    }
}
