use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use quickclip_core::{
    Decision, HISTORY_KEY, HistoryItem, HistoryLog, ItemKind, TimestampMs, evaluate_candidate,
    next_capture_timestamp, welcome_item,
};
use tracing::{debug, info, warn};

use crate::{error::StoreError, store::PersistentStore};

/// Liveness handle for one execution context. A context torn down mid-flight
/// (navigation, popup close, runtime reload) invalidates its handle; every
/// store operation guard-checks it and aborts silently when it is gone.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    label: Arc<str>,
    alive: Arc<AtomicBool>,
}

impl ContextHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into().into(),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn invalidate(&self) {
        self.alive.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The item was inserted and written back.
    Appended { captured_at: TimestampMs },
    /// The candidate matched the dedup window; nothing was touched.
    Rejected,
    /// The operation was abandoned: dead context, unreadable snapshot, or a
    /// swallowed write failure. The stored log keeps its prior state.
    Dropped,
}

/// Per-context orchestrator of the read → guard → write cycle.
///
/// The cycle is not atomic: nothing serializes it against other contexts, and
/// overlapping cycles lose the earlier write. Route coordinators through the
/// arbiter to serialize them.
#[derive(Debug)]
pub struct SyncCoordinator<S> {
    store: Arc<S>,
    context: ContextHandle,
    last_assigned: AtomicU64,
}

impl<S: PersistentStore> SyncCoordinator<S> {
    pub fn new(store: Arc<S>, context: ContextHandle) -> Self {
        Self {
            store,
            context,
            last_assigned: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    /// Append a candidate: read the current snapshot (missing key reads as an
    /// empty log), evaluate the dedup guard, insert with a monotonically
    /// assigned capture timestamp, write back.
    pub async fn append(&self, content: String, kind: ItemKind) -> AppendOutcome {
        if !self.context.is_valid() {
            debug!(context = self.context.label(), "append skipped, context gone");
            return AppendOutcome::Dropped;
        }

        let Some(mut log) = self.read_snapshot().await else {
            return AppendOutcome::Dropped;
        };

        if evaluate_candidate(log.items(), &content) == Decision::Reject {
            debug!(context = self.context.label(), "candidate within dedup window");
            return AppendOutcome::Rejected;
        }

        let captured_at = self.assign_timestamp(&log);
        let item = match HistoryItem::new(kind, content, captured_at) {
            Ok(item) => item,
            Err(err) => {
                debug!(context = self.context.label(), "candidate dropped: {err}");
                return AppendOutcome::Dropped;
            }
        };

        log.insert(item);
        if self.write(&log).await {
            info!(
                context = self.context.label(),
                captured_at,
                entries = log.len(),
                "history appended"
            );
            AppendOutcome::Appended { captured_at }
        } else {
            AppendOutcome::Dropped
        }
    }

    /// Remove every entry captured at the given timestamp; returns how many
    /// were removed (0 when nothing matched or the operation was abandoned).
    pub async fn delete(&self, captured_at: TimestampMs) -> usize {
        if !self.context.is_valid() {
            debug!(context = self.context.label(), "delete skipped, context gone");
            return 0;
        }

        let Some(mut log) = self.read_snapshot().await else {
            return 0;
        };

        let removed = log.remove_at(captured_at);
        if removed == 0 {
            return 0;
        }

        if self.write(&log).await {
            info!(
                context = self.context.label(),
                captured_at, removed, "history entries deleted"
            );
            removed
        } else {
            0
        }
    }

    /// Reset the history to empty, regardless of prior state.
    pub async fn clear(&self) -> bool {
        if !self.context.is_valid() {
            debug!(context = self.context.label(), "clear skipped, context gone");
            return false;
        }

        // Same read-modify-write shape as append; the read also keeps the
        // liveness guard in front of the store round trip.
        let Some(mut log) = self.read_snapshot().await else {
            return false;
        };

        log.clear();
        if self.write(&log).await {
            info!(context = self.context.label(), "history cleared");
            true
        } else {
            false
        }
    }

    /// Seed the welcome entry when the stored log is absent or empty.
    /// Returns whether a seed write happened.
    pub async fn seed_welcome(&self) -> bool {
        if !self.context.is_valid() {
            return false;
        }

        let Some(existing) = self.read_snapshot().await else {
            return false;
        };
        if !existing.is_empty() {
            return false;
        }

        let mut log = HistoryLog::new();
        log.insert(welcome_item(now_unix_ms()));
        if self.write(&log).await {
            info!(context = self.context.label(), "welcome entry seeded");
            true
        } else {
            false
        }
    }

    async fn read_snapshot(&self) -> Option<HistoryLog> {
        match self.store.get(HISTORY_KEY).await {
            Ok(Some(log)) => Some(log),
            Ok(None) => Some(HistoryLog::new()),
            Err(err) => {
                warn!(context = self.context.label(), "snapshot read failed: {err}");
                None
            }
        }
    }

    /// Write the new log back, swallowing failures per the error taxonomy:
    /// the stored value keeps its prior state and the data from this cycle is
    /// lost, not retried.
    async fn write(&self, log: &HistoryLog) -> bool {
        match self.store.set(HISTORY_KEY, log).await {
            Ok(()) => true,
            Err(StoreError::QuotaExceeded { size, max }) => {
                warn!(
                    context = self.context.label(),
                    size, max, "store write over quota, entry lost"
                );
                false
            }
            Err(err) => {
                warn!(context = self.context.label(), "store write failed: {err}");
                false
            }
        }
    }

    fn assign_timestamp(&self, log: &HistoryLog) -> TimestampMs {
        let stored_max = log.iter().map(|item| item.captured_at).max().unwrap_or(0);
        let floor = self.last_assigned.load(Ordering::Relaxed).max(stored_max);
        let captured_at = next_capture_timestamp(floor, now_unix_ms());
        self.last_assigned.store(captured_at, Ordering::Relaxed);
        captured_at
    }
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
