//! Audit trail: one record per answered question.
//!
//! ```text
//! request task ── record() ──► bounded channel ──► drain task ──► JSONL file
//!                 (try_send, never waits)          (batch, flush on interval)
//! ```

pub mod config;
pub mod drain;
pub mod emitter;
pub mod report;
pub mod store;
pub mod types;

use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use config::{AuditConfig, DrainConfig};
pub use drain::{spawn_drain_task, AuditDrain};
pub use emitter::{audit_channel, AuditCounters, AuditEmitter, AuditReceiver, AuditStats};
pub use report::{AuditReport, ReportEntry};
pub use store::AuditStore;
pub use types::{truncate, AuditRecord, Outcome};

struct Running {
    emitter: AuditEmitter,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Front door for audit records. A disabled logger accepts and discards.
pub struct AuditLogger {
    running: Option<Running>,
}

impl AuditLogger {
    /// Start the drain task. Must be called inside a tokio runtime.
    pub fn start(config: &AuditConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let (emitter, receiver) = audit_channel(config.buffer_size);
        let store = AuditStore::new(&config.path);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = spawn_drain_task(receiver, store, config.drain.clone(), shutdown_rx);

        info!(path = %config.path.display(), buffer = config.buffer_size, "audit logger started");

        Self {
            running: Some(Running {
                emitter,
                shutdown,
                handle: Mutex::new(Some(handle)),
            }),
        }
    }

    pub fn disabled() -> Self {
        Self { running: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.running.is_some()
    }

    pub fn record(&self, record: AuditRecord) {
        if let Some(running) = &self.running {
            running.emitter.emit(record);
        }
    }

    pub fn stats(&self) -> AuditStats {
        self.running
            .as_ref()
            .map_or_else(AuditStats::default, |running| running.emitter.stats())
    }

    /// Stop the drain after writing everything already accepted. Records
    /// passed to `record()` afterwards are dropped.
    pub async fn shutdown(&self) {
        let Some(running) = &self.running else {
            return;
        };
        let _ = running.shutdown.send(true);
        let handle = running
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = ?e, "audit drain did not stop cleanly");
            }
        }
        let stats = self.stats();
        info!(
            written = stats.written,
            dropped = stats.dropped,
            write_failures = stats.write_failures,
            "audit logger stopped"
        );
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::disabled()
    }
}
