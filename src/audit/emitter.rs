//! Both ends of the bounded audit channel and the counters they share.
//!
//! The answer path holds an [`AuditEmitter`]: `emit()` never waits and never
//! fails, and a record that does not fit is counted and discarded. The drain
//! holds the [`AuditReceiver`] and reports every write outcome into the same
//! [`AuditCounters`], so one snapshot describes the whole audit path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

use super::types::AuditRecord;

/// Process-level audit counters.
#[derive(Debug, Default)]
pub struct AuditCounters {
    emitted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    write_failures: AtomicU64,
}

impl AuditCounters {
    pub fn snapshot(&self) -> AuditStats {
        AuditStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Counters for the whole audit path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Records accepted by the channel.
    pub emitted: u64,
    /// Records discarded because the buffer was full or the drain was gone.
    pub dropped: u64,
    pub written: u64,
    pub write_failures: u64,
}

impl AuditStats {
    /// Accepted records the drain has not reached yet.
    pub fn pending(&self) -> u64 {
        self.emitted
            .saturating_sub(self.written)
            .saturating_sub(self.write_failures)
    }

    /// Share of questions that left no audit line, dropped or failed.
    pub fn loss_rate(&self) -> f64 {
        let offered = self.emitted + self.dropped;
        if offered == 0 {
            return 0.0;
        }
        (self.dropped + self.write_failures) as f64 / offered as f64
    }
}

/// Open a channel holding at most `capacity` unwritten records.
pub fn audit_channel(capacity: usize) -> (AuditEmitter, AuditReceiver) {
    let (sender, receiver) = bounded(capacity.max(1));
    let counters = Arc::new(AuditCounters::default());
    (
        AuditEmitter {
            sender,
            counters: counters.clone(),
        },
        AuditReceiver { receiver, counters },
    )
}

pub struct AuditEmitter {
    sender: Sender<AuditRecord>,
    counters: Arc<AuditCounters>,
}

impl AuditEmitter {
    /// Returns whether the record was accepted.
    #[inline]
    pub fn emit(&self, record: AuditRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => {
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> AuditStats {
        self.counters.snapshot()
    }
}

/// Drain side. Cloned when the drain restarts; clones share the counters.
#[derive(Clone)]
pub struct AuditReceiver {
    receiver: Receiver<AuditRecord>,
    counters: Arc<AuditCounters>,
}

impl AuditReceiver {
    /// Up to `max` records without blocking.
    pub fn recv_batch(&self, max: usize) -> Vec<AuditRecord> {
        self.receiver.try_iter().take(max).collect()
    }

    /// Count the outcome of writing one received record.
    pub fn record_write<E>(&self, result: &Result<(), E>) {
        let counter = match result {
            Ok(()) => &self.counters.written,
            Err(_) => &self.counters.write_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AuditStats {
        self.counters.snapshot()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audit::types::Outcome;
    use crate::question::Question;

    fn record(text: &str) -> AuditRecord {
        AuditRecord::new(&Question::new("10", text), Outcome::Success, Duration::ZERO)
    }

    #[test]
    fn test_full_buffer_drops_and_counts() {
        let (emitter, _receiver) = audit_channel(2);
        assert!(emitter.emit(record("a")));
        assert!(emitter.emit(record("b")));
        assert!(!emitter.emit(record("c")));

        let stats = emitter.stats();
        assert_eq!((stats.emitted, stats.dropped), (2, 1));
        assert_eq!(stats.pending(), 2);
    }

    #[test]
    fn test_gone_drain_drops() {
        let (emitter, receiver) = audit_channel(10);
        drop(receiver);
        assert!(!emitter.emit(record("a")));
        assert_eq!(emitter.stats().dropped, 1);
    }

    #[test]
    fn test_write_outcomes_show_up_on_the_emitter() {
        let (emitter, receiver) = audit_channel(10);
        for i in 0..5 {
            emitter.emit(record(&format!("q{i}")));
        }

        let batch = receiver.recv_batch(3);
        assert_eq!(batch.len(), 3);
        receiver.record_write::<()>(&Ok(()));
        receiver.record_write::<()>(&Ok(()));
        receiver.record_write(&Err("disk full"));

        let stats = emitter.stats();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.pending(), 2);
        assert!((stats.loss_rate() - 0.2).abs() < 1e-9);
        assert!(!receiver.is_empty());
    }
}
