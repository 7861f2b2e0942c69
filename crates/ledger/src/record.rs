//! Storage records: one row per (item, packaging unit, cell, warehouse).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcell_core::{CellId, ItemId, LedgerError, LedgerResult, PrunitId, RecordId, WarehouseId};

/// Good/defective classification of stored quantity.
///
/// Persisted with the legacy condition strings the scanner fleet sends,
/// so the mapping to the database representation is explicit here.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionState {
    #[default]
    Good,
    Defective,
}

impl ConditionState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ConditionState::Good => "кондиция",
            ConditionState::Defective => "некондиция",
        }
    }

    pub fn from_db_str(s: &str) -> LedgerResult<Self> {
        match s {
            "кондиция" => Ok(ConditionState::Good),
            "некондиция" => Ok(ConditionState::Defective),
            other => Err(LedgerError::validation(format!(
                "unknown condition state: {other}"
            ))),
        }
    }
}

/// Optional expiration marker: a single date, a start/end window, or nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiration {
    pub date: Option<NaiveDate>,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
}

impl Expiration {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn on(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    pub fn window(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            date: None,
            window_start: Some(start),
            window_end: Some(end),
        }
    }

    pub fn is_none(&self) -> bool {
        self.date.is_none() && self.window_start.is_none() && self.window_end.is_none()
    }
}

/// Identity key of a storage record.
///
/// The warehouse id is always part of the identity: a key with
/// `warehouse: None` addresses only rows whose warehouse id is NULL,
/// never rows in a concrete warehouse. Cross-warehouse scans go through
/// [`RecordFilter`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    pub item: ItemId,
    pub prunit: PrunitId,
    pub cell: CellId,
    pub warehouse: Option<WarehouseId>,
}

impl StorageKey {
    pub fn new(
        item: ItemId,
        prunit: PrunitId,
        cell: CellId,
        warehouse: Option<WarehouseId>,
    ) -> Self {
        Self {
            item,
            prunit,
            cell,
            warehouse,
        }
    }
}

impl core::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.warehouse {
            Some(w) => write!(f, "{}/{}@{}#{w}", self.item, self.prunit, self.cell),
            None => write!(f, "{}/{}@{}", self.item, self.prunit, self.cell),
        }
    }
}

/// One ledger row: the quantity of an item/packaging unit held in a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub id: RecordId,
    pub item: ItemId,
    /// Descriptive fields copied from master data at creation time.
    pub name: String,
    pub shk: String,
    pub prunit: PrunitId,
    pub prunit_name: String,
    /// Total quantity attributed to this record.
    pub product_quantity: Decimal,
    /// Quantity physically present in the cell; the value movements mutate.
    pub place_quantity: Decimal,
    pub cell: CellId,
    pub warehouse: Option<WarehouseId>,
    pub condition: ConditionState,
    pub expiration: Expiration,
    /// Operator who last mutated the record.
    pub actor: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageRecord {
    pub fn key(&self) -> StorageKey {
        StorageKey {
            item: self.item.clone(),
            prunit: self.prunit,
            cell: self.cell.clone(),
            warehouse: self.warehouse,
        }
    }

    /// Scan predicate; absent filter fields do not constrain the match.
    pub fn matches(&self, filter: &RecordFilter) -> bool {
        if let Some(item) = &filter.item {
            if &self.item != item {
                return false;
            }
        }
        if let Some(prunit) = filter.prunit {
            if self.prunit != prunit {
                return false;
            }
        }
        if let Some(cell) = &filter.cell {
            if &self.cell != cell {
                return false;
            }
        }
        if let Some(warehouse) = filter.warehouse {
            if self.warehouse != Some(warehouse) {
                return false;
            }
        }
        true
    }
}

/// Filtered-scan predicate over the ledger.
///
/// Unlike [`StorageKey`], an absent warehouse here means "any
/// warehouse", including rows with no warehouse at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub item: Option<ItemId>,
    pub prunit: Option<PrunitId>,
    pub cell: Option<CellId>,
    pub warehouse: Option<WarehouseId>,
}

impl RecordFilter {
    pub fn for_cell(cell: CellId) -> Self {
        Self {
            cell: Some(cell),
            ..Self::default()
        }
    }

    pub fn with_item(mut self, item: ItemId) -> Self {
        self.item = Some(item);
        self
    }

    pub fn with_prunit(mut self, prunit: PrunitId) -> Self {
        self.prunit = Some(prunit);
        self
    }

    pub fn with_warehouse(mut self, warehouse: WarehouseId) -> Self {
        self.warehouse = Some(warehouse);
        self
    }
}

/// Partial update of a storage record; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub product_quantity: Option<Decimal>,
    pub place_quantity: Option<Decimal>,
    pub condition: Option<ConditionState>,
    pub expiration: Option<Expiration>,
    pub actor: Option<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.product_quantity.is_none()
            && self.place_quantity.is_none()
            && self.condition.is_none()
            && self.expiration.is_none()
            && self.actor.is_none()
    }

    pub fn set_place_quantity(mut self, quantity: Decimal) -> Self {
        self.place_quantity = Some(quantity);
        self
    }

    pub fn set_product_quantity(mut self, quantity: Decimal) -> Self {
        self.product_quantity = Some(quantity);
        self
    }

    pub fn set_condition(mut self, condition: ConditionState) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn set_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn set_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Apply to a record in place (used by the in-memory store).
    pub fn apply_to(&self, record: &mut StorageRecord, updated_at: DateTime<Utc>) {
        if let Some(q) = self.product_quantity {
            record.product_quantity = q;
        }
        if let Some(q) = self.place_quantity {
            record.place_quantity = q;
        }
        if let Some(c) = self.condition {
            record.condition = c;
        }
        if let Some(e) = &self.expiration {
            record.expiration = e.clone();
        }
        if let Some(a) = &self.actor {
            record.actor = a.clone();
        }
        record.updated_at = updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(item: &str, cell: &str, warehouse: Option<i32>) -> StorageRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        StorageRecord {
            id: RecordId::new(1),
            item: ItemId::new(item),
            name: "test".into(),
            shk: "000".into(),
            prunit: PrunitId::new(1),
            prunit_name: "each".into(),
            product_quantity: Decimal::from(10),
            place_quantity: Decimal::from(10),
            cell: CellId::new(cell),
            warehouse: warehouse.map(WarehouseId::new),
            condition: ConditionState::Good,
            expiration: Expiration::none(),
            actor: "op-1".into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn condition_db_strings_round_trip() {
        for c in [ConditionState::Good, ConditionState::Defective] {
            assert_eq!(ConditionState::from_db_str(c.as_db_str()).unwrap(), c);
        }
        assert!(ConditionState::from_db_str("unknown").is_err());
    }

    #[test]
    fn filter_without_warehouse_spans_all() {
        let filter = RecordFilter::for_cell(CellId::new("A-01"));
        assert!(record("100", "A-01", None).matches(&filter));
        assert!(record("100", "A-01", Some(3)).matches(&filter));
        assert!(!record("100", "B-02", Some(3)).matches(&filter));
    }

    #[test]
    fn filter_with_warehouse_is_exact() {
        let filter = RecordFilter::for_cell(CellId::new("A-01")).with_warehouse(WarehouseId::new(3));
        assert!(record("100", "A-01", Some(3)).matches(&filter));
        assert!(!record("100", "A-01", Some(4)).matches(&filter));
        assert!(!record("100", "A-01", None).matches(&filter));
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(RecordPatch::default().is_empty());
        assert!(!RecordPatch::default().set_actor("op-2").is_empty());
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut rec = record("100", "A-01", None);
        let at = Utc.with_ymd_and_hms(2024, 5, 11, 9, 0, 0).unwrap();
        RecordPatch::default()
            .set_place_quantity(Decimal::from(4))
            .set_actor("op-2")
            .apply_to(&mut rec, at);

        assert_eq!(rec.place_quantity, Decimal::from(4));
        assert_eq!(rec.product_quantity, Decimal::from(10));
        assert_eq!(rec.actor, "op-2");
        assert_eq!(rec.updated_at, at);
        assert_eq!(rec.condition, ConditionState::Good);
    }
}
