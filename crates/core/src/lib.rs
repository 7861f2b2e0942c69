//! Shared kernel for the storage ledger: typed identifiers and the
//! error taxonomy. No IO lives here.

pub mod error;
pub mod id;

pub use error::{LedgerError, LedgerResult};
pub use id::{CellId, ItemId, PrunitId, RecordId, WarehouseId};
