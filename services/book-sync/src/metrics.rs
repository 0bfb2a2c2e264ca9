//! Feed counters
//!
//! Lock-free counters shared between the feed task and whoever wants to
//! observe it. Reads are relaxed: a `snapshot()` is a consistent-enough
//! view for dashboards, not a transactional one.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters updated by the connection state machine.
#[derive(Debug, Default)]
pub struct FeedMetrics {
    pub messages_received: AtomicU64,
    pub messages_unparseable: AtomicU64,
    pub messages_queued: AtomicU64,
    pub messages_applied: AtomicU64,
    pub messages_ignored: AtomicU64,
    pub sequence_gaps: AtomicU64,
    pub snapshots_merged: AtomicU64,
    pub snapshot_failures: AtomicU64,
    pub connection_attempts: AtomicU64,
    pub connection_failures: AtomicU64,
}

/// Point-in-time copy of [`FeedMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_unparseable: u64,
    pub messages_queued: u64,
    pub messages_applied: u64,
    pub messages_ignored: u64,
    pub sequence_gaps: u64,
    pub snapshots_merged: u64,
    pub snapshot_failures: u64,
    pub connection_attempts: u64,
    pub connection_failures: u64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            messages_received: load(&self.messages_received),
            messages_unparseable: load(&self.messages_unparseable),
            messages_queued: load(&self.messages_queued),
            messages_applied: load(&self.messages_applied),
            messages_ignored: load(&self.messages_ignored),
            sequence_gaps: load(&self.sequence_gaps),
            snapshots_merged: load(&self.snapshots_merged),
            snapshot_failures: load(&self.snapshot_failures),
            connection_attempts: load(&self.connection_attempts),
            connection_failures: load(&self.connection_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = FeedMetrics::new();
        FeedMetrics::incr(&metrics.messages_received);
        FeedMetrics::incr(&metrics.messages_received);
        FeedMetrics::incr(&metrics.sequence_gaps);

        let snap = metrics.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.sequence_gaps, 1);
        assert_eq!(snap.messages_applied, 0);
    }
}
