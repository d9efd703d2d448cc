//! Background task moving audit records from the channel to the sink.
//!
//! Runs until shutdown is signalled, then drains what is left and flushes.
//! A supervisor restarts the drain if it panics.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::config::DrainConfig;
use super::emitter::AuditReceiver;
use super::store::AuditStore;

pub struct AuditDrain {
    receiver: AuditReceiver,
    store: AuditStore,
    batch_size: usize,
    flush_interval: Duration,
}

impl AuditDrain {
    pub fn new(receiver: AuditReceiver, store: AuditStore, config: &DrainConfig) -> Self {
        Self {
            receiver,
            store,
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval(),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut flush_timer = interval(self.flush_interval);
        flush_timer.tick().await;

        info!(
            batch_size = self.batch_size,
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            path = %self.store.path().display(),
            "audit drain started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = flush_timer.tick() => {
                    let drained = self.drain_batch().await;
                    if drained > 0 {
                        debug!(records = drained, "drained audit records");
                    }
                    self.flush().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let remaining = self.drain_all().await;
        self.flush().await;
        info!(remaining, "audit drain stopped");
    }

    /// Write up to one batch. Returns how many records were taken.
    pub async fn drain_batch(&self) -> usize {
        let batch = self.receiver.recv_batch(self.batch_size);
        let count = batch.len();
        for record in batch {
            let result = self.store.append(&record).await;
            self.receiver.record_write(&result);
            if let Err(e) = result {
                warn!(error = %e, question_id = %record.id, "audit write failed");
            }
        }
        count
    }

    pub async fn drain_all(&self) -> usize {
        let mut total = 0;
        loop {
            let drained = self.drain_batch().await;
            if drained == 0 {
                return total;
            }
            total += drained;
        }
    }

    async fn flush(&self) {
        if let Err(e) = self.store.flush().await {
            warn!(error = %e, "audit flush failed");
        }
    }
}

const MAX_RESTARTS: u32 = 100;

/// Spawn the drain under a supervisor that restarts it after a panic.
pub fn spawn_drain_task(
    receiver: AuditReceiver,
    store: AuditStore,
    config: DrainConfig,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut restart_count = 0u32;

        loop {
            let drain = AuditDrain::new(receiver.clone(), store.clone(), &config);
            match tokio::spawn(drain.run(shutdown.clone())).await {
                Ok(()) => break,
                Err(e) => {
                    restart_count += 1;
                    error!(error = ?e, restart_count, "audit drain panicked, restarting");
                    if restart_count > MAX_RESTARTS {
                        error!("audit drain restarted too many times, giving up");
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::audit::emitter::audit_channel;
    use crate::audit::types::{AuditRecord, Outcome};
    use crate::question::Question;

    fn record(text: &str) -> AuditRecord {
        AuditRecord::new(&Question::new("10", text), Outcome::Success, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_drain_batch() {
        let (emitter, receiver) = audit_channel(100);
        let dir = tempdir().unwrap();
        let store = AuditStore::new(dir.path().join("audit.jsonl"));

        for i in 0..5 {
            emitter.emit(record(&format!("q{i}")));
        }

        let drain = AuditDrain::new(receiver, store.clone(), &DrainConfig::default());
        assert_eq!(drain.drain_batch().await, 5);
        assert_eq!(drain.drain_batch().await, 0);
        assert_eq!(emitter.stats().written, 5);

        store.flush().await.unwrap();
        let content = tokio::fs::read_to_string(dir.path().join("audit.jsonl"))
            .await
            .unwrap();
        assert_eq!(content.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_drains_remaining() {
        let (emitter, receiver) = audit_channel(100);
        let dir = tempdir().unwrap();
        let store = AuditStore::new(dir.path().join("audit.jsonl"));
        let (tx, rx) = watch::channel(false);

        let config = DrainConfig {
            batch_size: 2,
            flush_interval_ms: 60_000,
        };
        let handle = spawn_drain_task(receiver, store.clone(), config, rx);
        for i in 0..7 {
            emitter.emit(record(&format!("q{i}")));
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("audit.jsonl"))
            .await
            .unwrap();
        assert_eq!(content.lines().count(), 7);
    }
}
