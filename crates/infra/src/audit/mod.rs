//! Fire-and-forget delivery of operation audit entries.
//!
//! Ledger operations emit through an [`AuditHandle`], which never blocks
//! and never fails the caller: entries travel over a bounded channel to
//! a worker task that writes them to the configured [`AuditSink`].
//! Delivery is at most once: a full channel or a failing sink drops
//! the entry with a warning, and the ledger operation's outcome is
//! unaffected.

mod postgres;

pub use postgres::PgAuditLog;

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use stockcell_core::LedgerResult;
use stockcell_ledger::OperationLogEntry;

/// Durable destination for operation log entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &OperationLogEntry) -> LedgerResult<()>;
}

#[async_trait]
impl<K> AuditSink for std::sync::Arc<K>
where
    K: AuditSink + ?Sized,
{
    async fn record(&self, entry: &OperationLogEntry) -> LedgerResult<()> {
        (**self).record(entry).await
    }
}

/// Non-blocking sender side of the audit pipeline.
///
/// Cheap to clone; engines hold one each. When every handle is dropped
/// the channel closes and the worker drains what is left and stops.
#[derive(Debug, Clone)]
pub struct AuditHandle {
    tx: Option<mpsc::Sender<OperationLogEntry>>,
}

impl AuditHandle {
    /// A handle that discards every entry. For tests and tooling that
    /// runs without an audit worker.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Hand an entry to the worker. Never blocks, never errors.
    pub fn emit(&self, entry: OperationLogEntry) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                warn!(operation = %entry.operation, item = %entry.item,
                      "audit queue full; entry dropped");
            }
            Err(TrySendError::Closed(entry)) => {
                warn!(operation = %entry.operation, item = %entry.item,
                      "audit worker stopped; entry dropped");
            }
        }
    }
}

/// Handle to wait for the worker after the last [`AuditHandle`] is gone.
#[derive(Debug)]
pub struct AuditWorkerHandle {
    join: tokio::task::JoinHandle<()>,
}

impl AuditWorkerHandle {
    /// Wait for the worker to drain and stop. Only returns once every
    /// `AuditHandle` clone has been dropped.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Spawn the audit worker on the current runtime.
///
/// `capacity` bounds how many undelivered entries may be in flight;
/// beyond it, `emit` drops rather than applying backpressure to the
/// ledger operation's response path.
pub fn spawn_audit_worker<K>(sink: K, capacity: usize) -> (AuditHandle, AuditWorkerHandle)
where
    K: AuditSink + 'static,
{
    let (tx, mut rx) = mpsc::channel::<OperationLogEntry>(capacity);

    let join = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if let Err(err) = sink.record(&entry).await {
                warn!(operation = %entry.operation, item = %entry.item, error = %err,
                      "audit sink write failed; entry dropped");
            }
        }
    });

    (AuditHandle { tx: Some(tx) }, AuditWorkerHandle { join })
}

/// Sink that keeps entries in memory. For tests and dev.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<OperationLogEntry>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<OperationLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record(&self, entry: &OperationLogEntry) -> LedgerResult<()> {
        self.entries
            .lock()
            .map_err(|_| stockcell_core::LedgerError::unavailable("lock poisoned"))?
            .push(entry.clone());
        Ok(())
    }
}
