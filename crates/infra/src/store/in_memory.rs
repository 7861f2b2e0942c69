//! In-memory ledger store.
//!
//! Intended for tests/dev. Every compound operation mutates a working
//! copy under the write lock and swaps it in on success, so callers see
//! the same all-or-nothing behavior the Postgres store gets from
//! transactions.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use stockcell_core::{CellId, LedgerError, LedgerResult, RecordId};
use stockcell_ledger::{
    Correction, DeductOutcome, DepletionPolicy, IntakeOutcome, IntakeRequest, InventoryRecord,
    LegState, RecordFilter, RecordPatch, StorageKey, StorageRecord, TransferOutcome,
    TransferRequest,
};

use super::LedgerStore;

#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    rows: RwLock<Vec<StorageRecord>>,
    history: RwLock<Vec<InventoryRecord>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(rows: &[StorageRecord]) -> RecordId {
        let max = rows.iter().map(|r| i64::from(r.id)).max().unwrap_or(0);
        RecordId::new(max + 1)
    }

    fn read_rows(&self) -> LedgerResult<std::sync::RwLockReadGuard<'_, Vec<StorageRecord>>> {
        self.rows
            .read()
            .map_err(|_| LedgerError::unavailable("lock poisoned"))
    }

    fn write_rows(&self) -> LedgerResult<std::sync::RwLockWriteGuard<'_, Vec<StorageRecord>>> {
        self.rows
            .write()
            .map_err(|_| LedgerError::unavailable("lock poisoned"))
    }
}

fn position(rows: &[StorageRecord], key: &StorageKey) -> Option<usize> {
    rows.iter().position(|r| &r.key() == key)
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find(&self, filter: &RecordFilter) -> LedgerResult<Vec<StorageRecord>> {
        let rows = self.read_rows()?;
        let mut found: Vec<StorageRecord> =
            rows.iter().filter(|r| r.matches(filter)).cloned().collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    async fn find_one(&self, key: &StorageKey) -> LedgerResult<Option<StorageRecord>> {
        let rows = self.read_rows()?;
        Ok(position(&rows, key).map(|i| rows[i].clone()))
    }

    async fn insert(&self, record: &StorageRecord) -> LedgerResult<()> {
        let mut rows = self.write_rows()?;
        if position(&rows, &record.key()).is_some() {
            // Same failure class as the unique index in Postgres.
            return Err(LedgerError::conflict(format!(
                "record {} already exists",
                record.key()
            )));
        }
        rows.push(record.clone());
        Ok(())
    }

    async fn update(&self, key: &StorageKey, patch: &RecordPatch) -> LedgerResult<u64> {
        if patch.is_empty() {
            return Err(LedgerError::validation("empty record patch"));
        }
        let mut rows = self.write_rows()?;
        match position(&rows, key) {
            Some(i) => {
                patch.apply_to(&mut rows[i], Utc::now());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, key: &StorageKey) -> LedgerResult<u64> {
        let mut rows = self.write_rows()?;
        let before = rows.len();
        rows.retain(|r| &r.key() != key);
        Ok((before - rows.len()) as u64)
    }

    async fn deduct(
        &self,
        key: &StorageKey,
        quantity: Decimal,
        policy: DepletionPolicy,
        actor: &str,
    ) -> LedgerResult<DeductOutcome> {
        let mut rows = self.write_rows()?;
        let Some(i) = position(&rows, key) else {
            return Err(LedgerError::NotFound);
        };

        let previous_quantity = rows[i].place_quantity;
        if previous_quantity < quantity {
            return Err(LedgerError::insufficient(previous_quantity));
        }

        rows[i].place_quantity = previous_quantity - quantity;
        rows[i].actor = actor.to_string();
        rows[i].updated_at = Utc::now();

        let new_quantity = rows[i].place_quantity;
        let removed = policy == DepletionPolicy::RemoveEmpty && new_quantity == Decimal::ZERO;
        let record = if removed {
            rows.remove(i)
        } else {
            rows[i].clone()
        };

        Ok(DeductOutcome {
            record,
            previous_quantity,
            new_quantity,
            removed,
        })
    }

    async fn intake(&self, draft: &IntakeRequest) -> LedgerResult<IntakeOutcome> {
        let mut rows = self.write_rows()?;
        match position(&rows, &draft.key()) {
            Some(i) => {
                let previous_quantity = rows[i].place_quantity;
                rows[i].place_quantity += draft.quantity;
                rows[i].product_quantity += draft.quantity;
                rows[i].condition = draft.condition;
                rows[i].expiration = draft.expiration.clone();
                rows[i].actor = draft.actor.clone();
                rows[i].updated_at = Utc::now();
                Ok(IntakeOutcome::Merged {
                    record_id: rows[i].id,
                    previous_quantity,
                    new_quantity: rows[i].place_quantity,
                })
            }
            None => {
                let id = Self::next_id(&rows);
                rows.push(draft.seed_record(id, Utc::now()));
                Ok(IntakeOutcome::Created { record_id: id })
            }
        }
    }

    async fn transfer(&self, plan: &TransferRequest) -> LedgerResult<TransferOutcome> {
        let mut rows = self.write_rows()?;

        let Some(src) = position(&rows, &plan.source_key()) else {
            return Err(LedgerError::NotFound);
        };
        let source_record = rows[src].clone();
        if source_record.place_quantity < plan.quantity {
            return Err(LedgerError::insufficient(source_record.place_quantity));
        }

        let now = Utc::now();
        rows[src].place_quantity -= plan.quantity;
        rows[src].actor = plan.actor.clone();
        rows[src].updated_at = now;
        let source_new = rows[src].place_quantity;

        let (target_record_id, target_previous, target_new, target_created) =
            match position(&rows, &plan.target_key()) {
                Some(dst) => {
                    let previous = rows[dst].place_quantity;
                    rows[dst].place_quantity += plan.quantity;
                    rows[dst].product_quantity += plan.quantity;
                    rows[dst].actor = plan.actor.clone();
                    rows[dst].updated_at = now;
                    (rows[dst].id, previous, rows[dst].place_quantity, false)
                }
                None => {
                    let id = Self::next_id(&rows);
                    rows.push(plan.seed_target(&source_record, id, now));
                    (id, Decimal::ZERO, plan.quantity, true)
                }
            };

        Ok(TransferOutcome {
            source: LegState {
                previous_quantity: source_record.place_quantity,
                new_quantity: source_new,
            },
            target: LegState {
                previous_quantity: target_previous,
                new_quantity: target_new,
            },
            source_record,
            target_record_id,
            target_created,
        })
    }

    async fn apply_reconciliation(
        &self,
        lines: &[InventoryRecord],
        corrections: &[Correction],
    ) -> LedgerResult<()> {
        let mut rows = self.write_rows()?;
        let mut history = self
            .history
            .write()
            .map_err(|_| LedgerError::unavailable("lock poisoned"))?;

        // Apply corrections to a working copy; nothing is visible until
        // every write succeeded.
        let mut working = rows.clone();
        let now = Utc::now();

        for correction in corrections {
            match correction {
                Correction::SetPlaceQuantity {
                    key,
                    quantity,
                    actor,
                } => {
                    let Some(i) = position(&working, key) else {
                        return Err(LedgerError::conflict(format!(
                            "record {key} vanished during reconciliation commit"
                        )));
                    };
                    working[i].place_quantity = *quantity;
                    working[i].actor = actor.clone();
                    working[i].updated_at = now;
                }
                Correction::CreateRecord(draft) => {
                    if position(&working, &draft.key()).is_some() {
                        return Err(LedgerError::conflict(format!(
                            "record {} appeared during reconciliation commit",
                            draft.key()
                        )));
                    }
                    let id = Self::next_id(&working);
                    working.push(draft.seed_record(id, now));
                }
            }
        }

        *rows = working;
        history.extend(lines.iter().cloned());
        Ok(())
    }

    async fn inventory_history(&self, cell: &CellId) -> LedgerResult<Vec<InventoryRecord>> {
        let history = self
            .history
            .read()
            .map_err(|_| LedgerError::unavailable("lock poisoned"))?;
        Ok(history.iter().filter(|l| &l.cell == cell).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockcell_core::{ItemId, PrunitId};
    use stockcell_ledger::{ConditionState, Expiration};

    fn draft(item: &str, cell: &str, qty: i64) -> IntakeRequest {
        IntakeRequest {
            item: ItemId::new(item),
            name: format!("item {item}"),
            shk: format!("shk-{item}"),
            prunit: PrunitId::new(1),
            prunit_name: "each".into(),
            cell: CellId::new(cell),
            warehouse: None,
            quantity: Decimal::from(qty),
            condition: ConditionState::Good,
            expiration: Expiration::none(),
            actor: "op-1".into(),
        }
    }

    #[tokio::test]
    async fn intake_creates_then_merges() {
        let store = InMemoryLedgerStore::new();

        let first = store.intake(&draft("100", "A-01", 10)).await.unwrap();
        assert!(first.created());

        let second = store.intake(&draft("100", "A-01", 5)).await.unwrap();
        match second {
            IntakeOutcome::Merged {
                record_id,
                previous_quantity,
                new_quantity,
            } => {
                assert_eq!(record_id, first.record_id());
                assert_eq!(previous_quantity, Decimal::from(10));
                assert_eq!(new_quantity, Decimal::from(15));
            }
            other => panic!("expected merge, got {other:?}"),
        }

        let rows = store.find(&RecordFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_quantity, Decimal::from(15));
    }

    #[tokio::test]
    async fn record_ids_are_monotonic() {
        let store = InMemoryLedgerStore::new();
        let a = store.intake(&draft("100", "A-01", 1)).await.unwrap();
        let b = store.intake(&draft("200", "A-01", 1)).await.unwrap();
        assert!(b.record_id() > a.record_id());
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let store = InMemoryLedgerStore::new();
        store.intake(&draft("100", "A-01", 1)).await.unwrap();
        let record = store
            .find_one(&draft("100", "A-01", 1).key())
            .await
            .unwrap()
            .unwrap();
        let err = store.insert(&record).await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn deduct_retains_or_removes_depleted_rows() {
        let store = InMemoryLedgerStore::new();
        store.intake(&draft("100", "A-01", 5)).await.unwrap();
        let key = draft("100", "A-01", 5).key();

        let outcome = store
            .deduct(&key, Decimal::from(5), DepletionPolicy::RetainEmpty, "op-2")
            .await
            .unwrap();
        assert!(!outcome.removed);
        let row = store.find_one(&key).await.unwrap().unwrap();
        assert_eq!(row.place_quantity, Decimal::ZERO);
        assert_eq!(row.actor, "op-2");

        store.intake(&draft("200", "B-02", 5)).await.unwrap();
        let key = draft("200", "B-02", 5).key();
        let outcome = store
            .deduct(&key, Decimal::from(5), DepletionPolicy::RemoveEmpty, "op-2")
            .await
            .unwrap();
        assert!(outcome.removed);
        assert!(store.find_one(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_reconciliation_commit_changes_nothing() {
        let store = InMemoryLedgerStore::new();
        store.intake(&draft("100", "A-01", 5)).await.unwrap();

        let missing_key = draft("999", "A-01", 1).key();
        let good = Correction::SetPlaceQuantity {
            key: draft("100", "A-01", 5).key(),
            quantity: Decimal::from(9),
            actor: "op-1".into(),
        };
        let bad = Correction::SetPlaceQuantity {
            key: missing_key,
            quantity: Decimal::ONE,
            actor: "op-1".into(),
        };

        let err = store
            .apply_reconciliation(&[], &[good, bad])
            .await
            .unwrap_err();
        assert!(err.is_retriable());

        // First correction must not have leaked through.
        let row = store
            .find_one(&draft("100", "A-01", 5).key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.place_quantity, Decimal::from(5));
        assert!(store
            .inventory_history(&CellId::new("A-01"))
            .await
            .unwrap()
            .is_empty());
    }
}
