//! Read-only passthrough lookups into the linked master-data system.
//!
//! These are simple query forwards for display and enrichment; the
//! ledger never enforces anything based on them. Queries bind every
//! value; nothing is ever concatenated into SQL.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Row};

use stockcell_core::{ItemId, LedgerResult};

use crate::store::{postgres_error, postgres_row_error};

/// Item master data as the linked system exposes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: ItemId,
    pub name: String,
    pub scan_code: Option<String>,
    pub packaging_unit: Option<String>,
    pub quantity_per_pallet: Option<Decimal>,
}

/// Employee identity, used purely for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub id: String,
    pub full_name: String,
}

#[async_trait]
pub trait MasterData: Send + Sync {
    async fn item_by_id(&self, id: &ItemId) -> LedgerResult<Option<ItemInfo>>;
    async fn item_by_code(&self, scan_code: &str) -> LedgerResult<Option<ItemInfo>>;
    async fn employee_by_id(&self, id: &str) -> LedgerResult<Option<Employee>>;
}

/// Forwards lookups to the linked-system views.
#[derive(Debug, Clone)]
pub struct PgMasterData {
    pool: Arc<PgPool>,
}

impl PgMasterData {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_item(&self, sql: &str, value: &str) -> LedgerResult<Option<ItemInfo>> {
        let row = sqlx::query(sql)
            .bind(value)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| postgres_error("master_data_item", e))?;

        match row {
            Some(row) => {
                let item = ItemRow::from_row(&row).map_err(postgres_row_error)?;
                Ok(Some(ItemInfo {
                    id: ItemId::new(item.id),
                    name: item.name,
                    scan_code: item.shk,
                    packaging_unit: item.packaging_unit,
                    quantity_per_pallet: item.quantity_per_pallet,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MasterData for PgMasterData {
    async fn item_by_id(&self, id: &ItemId) -> LedgerResult<Option<ItemInfo>> {
        self.fetch_item(
            "SELECT id, name, shk, packaging_unit, quantity_per_pallet \
             FROM linked_articles WHERE id = $1",
            id.as_str(),
        )
        .await
    }

    async fn item_by_code(&self, scan_code: &str) -> LedgerResult<Option<ItemInfo>> {
        self.fetch_item(
            "SELECT id, name, shk, packaging_unit, quantity_per_pallet \
             FROM linked_articles WHERE shk = $1",
            scan_code,
        )
        .await
    }

    async fn employee_by_id(&self, id: &str) -> LedgerResult<Option<Employee>> {
        let row = sqlx::query("SELECT id, full_name FROM linked_employees WHERE id = $1")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| postgres_error("master_data_employee", e))?;

        match row {
            Some(row) => Ok(Some(Employee {
                id: row.try_get("id").map_err(postgres_row_error)?,
                full_name: row.try_get("full_name").map_err(postgres_row_error)?,
            })),
            None => Ok(None),
        }
    }
}

#[derive(Debug)]
struct ItemRow {
    id: String,
    name: String,
    shk: Option<String>,
    packaging_unit: Option<String>,
    quantity_per_pallet: Option<Decimal>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for ItemRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            shk: row.try_get("shk")?,
            packaging_unit: row.try_get("packaging_unit")?,
            quantity_per_pallet: row.try_get("quantity_per_pallet")?,
        })
    }
}
