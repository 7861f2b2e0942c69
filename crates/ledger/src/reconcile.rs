//! Physical-count reconciliation: classification and correction planning.
//!
//! Classification is a pure function of the cell's current ledger rows
//! and the observed count lines. Each run is independent and produces a
//! fresh set of append-only inventory records; corrective writes are
//! planned separately and applied only in commit mode.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockcell_core::{CellId, ItemId, LedgerError, LedgerResult, PrunitId, WarehouseId};

use crate::movement::IntakeRequest;
use crate::record::{ConditionState, Expiration, StorageKey, StorageRecord};

/// One observed (item, packaging unit, quantity) tuple from a physical count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedLine {
    pub item: ItemId,
    pub prunit: PrunitId,
    pub quantity: Decimal,
}

/// Per-line discrepancy classification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    /// Observed quantity equals the ledger quantity.
    Match,
    /// More was counted than the ledger holds.
    Surplus,
    /// Less was counted than the ledger holds.
    Shortage,
    /// A ledger row whose key did not appear in the count at all.
    Missing,
    /// Counted as zero and unknown to the ledger.
    NotFound,
}

impl LineStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LineStatus::Match => "match",
            LineStatus::Surplus => "surplus",
            LineStatus::Shortage => "shortage",
            LineStatus::Missing => "missing",
            LineStatus::NotFound => "not_found",
        }
    }

    pub fn from_db_str(s: &str) -> LedgerResult<Self> {
        match s {
            "match" => Ok(LineStatus::Match),
            "surplus" => Ok(LineStatus::Surplus),
            "shortage" => Ok(LineStatus::Shortage),
            "missing" => Ok(LineStatus::Missing),
            "not_found" => Ok(LineStatus::NotFound),
            other => Err(LedgerError::validation(format!(
                "unknown inventory line status: {other}"
            ))),
        }
    }
}

/// Overall outcome of one reconciliation run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Match,
    Discrepancy,
}

/// A classified line, before persistence.
///
/// `records` holds every ledger row backing the (item, prunit) key;
/// more than one only when the cell was scanned across warehouses and
/// the same key exists under several warehouse ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub item: ItemId,
    pub prunit: PrunitId,
    pub system_quantity: Decimal,
    pub actual_quantity: Decimal,
    pub difference: Decimal,
    pub status: LineStatus,
    pub records: Vec<StorageRecord>,
}

impl ClassifiedLine {
    /// The backing row, when it is unambiguous.
    pub fn record(&self) -> Option<&StorageRecord> {
        match self.records.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }

    pub fn into_inventory_record(
        self,
        cell: &CellId,
        warehouse: Option<WarehouseId>,
        actor: &str,
        counted_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> InventoryRecord {
        InventoryRecord {
            cell: cell.clone(),
            warehouse,
            item: self.item,
            prunit: self.prunit,
            system_quantity: self.system_quantity,
            actual_quantity: self.actual_quantity,
            difference: self.difference,
            status: self.status,
            actor: actor.to_string(),
            counted_at,
            notes,
        }
    }
}

/// Append-only reconciliation history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub cell: CellId,
    pub warehouse: Option<WarehouseId>,
    pub item: ItemId,
    pub prunit: PrunitId,
    pub system_quantity: Decimal,
    pub actual_quantity: Decimal,
    pub difference: Decimal,
    pub status: LineStatus,
    pub actor: String,
    pub counted_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Corrective ledger write derived from a classified line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    /// Set `place_quantity` on an existing row. Zeroes, never deletes.
    SetPlaceQuantity {
        key: StorageKey,
        quantity: Decimal,
        actor: String,
    },
    /// Surplus on an item the ledger does not know in this cell.
    CreateRecord(IntakeRequest),
}

/// Classify a cell: observed lines against the current ledger rows.
///
/// Produces one line per observed tuple, in input order, followed by one
/// `Missing` line per ledger row whose key never appeared in the count.
pub fn classify_cell(current: &[StorageRecord], observed: &[ObservedLine]) -> Vec<ClassifiedLine> {
    let mut by_key: HashMap<(&ItemId, PrunitId), Vec<&StorageRecord>> = HashMap::new();
    for record in current {
        by_key
            .entry((&record.item, record.prunit))
            .or_default()
            .push(record);
    }

    let mut seen: HashSet<(&ItemId, PrunitId)> = HashSet::new();
    let mut lines = Vec::with_capacity(current.len() + observed.len());

    for line in observed {
        seen.insert((&line.item, line.prunit));
        let records: Vec<StorageRecord> = by_key
            .get(&(&line.item, line.prunit))
            .map(|rs| rs.iter().map(|r| (*r).clone()).collect())
            .unwrap_or_default();

        let system_quantity: Decimal = records.iter().map(|r| r.place_quantity).sum();
        let difference = line.quantity - system_quantity;

        let status = if difference > Decimal::ZERO {
            LineStatus::Surplus
        } else if difference < Decimal::ZERO {
            LineStatus::Shortage
        } else if records.is_empty() {
            LineStatus::NotFound
        } else {
            LineStatus::Match
        };

        lines.push(ClassifiedLine {
            item: line.item.clone(),
            prunit: line.prunit,
            system_quantity,
            actual_quantity: line.quantity,
            difference,
            status,
            records,
        });
    }

    // Every unobserved ledger row becomes its own missing line, so a
    // later correction can target the exact row.
    for record in current {
        if seen.contains(&(&record.item, record.prunit)) {
            continue;
        }
        lines.push(ClassifiedLine {
            item: record.item.clone(),
            prunit: record.prunit,
            system_quantity: record.place_quantity,
            actual_quantity: Decimal::ZERO,
            difference: -record.place_quantity,
            status: LineStatus::Missing,
            records: vec![record.clone()],
        });
    }

    lines
}

/// `Match` only when every line matched.
pub fn overall_status(lines: &[ClassifiedLine]) -> ReconciliationStatus {
    if lines.iter().all(|l| l.status == LineStatus::Match) {
        ReconciliationStatus::Match
    } else {
        ReconciliationStatus::Discrepancy
    }
}

/// Derive the corrective writes for a commit-mode reconciliation.
///
/// Surplus, shortage and missing lines with a backing row become quantity
/// updates; a surplus with no row becomes a record creation. A key backed
/// by rows in several warehouses cannot be corrected blindly; the caller
/// must re-run the count scoped to one warehouse.
pub fn plan_corrections(
    lines: &[ClassifiedLine],
    cell: &CellId,
    warehouse: Option<WarehouseId>,
    actor: &str,
) -> LedgerResult<Vec<Correction>> {
    let mut corrections = Vec::new();

    for line in lines {
        match line.status {
            LineStatus::Match | LineStatus::NotFound => continue,
            LineStatus::Surplus | LineStatus::Shortage | LineStatus::Missing => {}
        }
        if line.difference == Decimal::ZERO {
            // A missing line over an already-zero row needs no write.
            continue;
        }

        match line.records.as_slice() {
            [record] => corrections.push(Correction::SetPlaceQuantity {
                key: record.key(),
                quantity: line.actual_quantity,
                actor: actor.to_string(),
            }),
            [] => corrections.push(Correction::CreateRecord(IntakeRequest {
                item: line.item.clone(),
                name: String::new(),
                shk: String::new(),
                prunit: line.prunit,
                prunit_name: String::new(),
                cell: cell.clone(),
                warehouse,
                quantity: line.actual_quantity,
                condition: ConditionState::Good,
                expiration: Expiration::none(),
                actor: actor.to_string(),
            })),
            _ => {
                return Err(LedgerError::validation(format!(
                    "item {}/{} exists under several warehouses in cell {}; \
                     reconcile with a warehouse filter",
                    line.item, line.prunit, cell
                )));
            }
        }
    }

    Ok(corrections)
}


#[cfg(test)]
mod properties {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use stockcell_core::RecordId;

    fn record(id: i64, item: u8, prunit: i32, qty: u32) -> StorageRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        StorageRecord {
            id: RecordId::new(id),
            item: ItemId::new(format!("item-{item}")),
            name: String::new(),
            shk: String::new(),
            prunit: PrunitId::new(prunit),
            prunit_name: String::new(),
            product_quantity: Decimal::from(qty),
            place_quantity: Decimal::from(qty),
            cell: CellId::new("A-01"),
            warehouse: None,
            condition: ConditionState::Good,
            expiration: Expiration::none(),
            actor: "op".into(),
            created_at: at,
            updated_at: at,
        }
    }

    // Small key space so collisions between ledger and count are common.
    fn ledger_strategy() -> impl Strategy<Value = Vec<StorageRecord>> {
        proptest::collection::vec((0u8..6, 1i32..3, 0u32..50), 0..8).prop_map(|rows| {
            let mut seen = std::collections::HashSet::new();
            let mut out = Vec::new();
            for (i, (item, prunit, qty)) in rows.into_iter().enumerate() {
                // Respect identity-key uniqueness within the cell.
                if seen.insert((item, prunit)) {
                    out.push(record(i as i64 + 1, item, prunit, qty));
                }
            }
            out
        })
    }

    fn observed_strategy() -> impl Strategy<Value = Vec<ObservedLine>> {
        proptest::collection::vec((0u8..6, 1i32..3, 0u32..50), 0..8).prop_map(|lines| {
            let mut seen = std::collections::HashSet::new();
            let mut out = Vec::new();
            for (item, prunit, qty) in lines {
                if seen.insert((item, prunit)) {
                    out.push(ObservedLine {
                        item: ItemId::new(format!("item-{item}")),
                        prunit: PrunitId::new(prunit),
                        quantity: Decimal::from(qty),
                    });
                }
            }
            out
        })
    }

    proptest! {
        #[test]
        fn every_row_and_line_is_accounted_for_exactly_once(
            ledger in ledger_strategy(),
            observed in observed_strategy(),
        ) {
            let lines = classify_cell(&ledger, &observed);

            let observed_keys: std::collections::HashSet<_> = observed
                .iter()
                .map(|l| (l.item.clone(), l.prunit))
                .collect();
            let unobserved_rows = ledger
                .iter()
                .filter(|r| !observed_keys.contains(&(r.item.clone(), r.prunit)))
                .count();

            prop_assert_eq!(lines.len(), observed.len() + unobserved_rows);
        }

        #[test]
        fn difference_arithmetic_is_conserved(
            ledger in ledger_strategy(),
            observed in observed_strategy(),
        ) {
            for line in classify_cell(&ledger, &observed) {
                prop_assert_eq!(line.difference, line.actual_quantity - line.system_quantity);
                match line.status {
                    LineStatus::Surplus => prop_assert!(line.difference > Decimal::ZERO),
                    LineStatus::Shortage => prop_assert!(line.difference < Decimal::ZERO),
                    LineStatus::Match | LineStatus::NotFound => {
                        prop_assert_eq!(line.difference, Decimal::ZERO)
                    }
                    LineStatus::Missing => prop_assert!(line.difference <= Decimal::ZERO),
                }
            }
        }

        #[test]
        fn counting_exactly_the_ledger_matches_with_no_corrections(
            ledger in ledger_strategy(),
        ) {
            let observed: Vec<ObservedLine> = ledger
                .iter()
                .map(|r| ObservedLine {
                    item: r.item.clone(),
                    prunit: r.prunit,
                    quantity: r.place_quantity,
                })
                .collect();

            let lines = classify_cell(&ledger, &observed);
            prop_assert_eq!(overall_status(&lines), ReconciliationStatus::Match);

            let corrections =
                plan_corrections(&lines, &CellId::new("A-01"), None, "op").unwrap();
            prop_assert!(corrections.is_empty());
        }
    }
}
