//! Process-wide tracing/logging setup, shared by every binary that
//! hosts the ledger.

/// Initialize tracing for the process.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;
