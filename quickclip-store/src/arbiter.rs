use std::sync::Arc;

use quickclip_core::{ItemKind, TimestampMs};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::{
    coordinator::{AppendOutcome, ContextHandle, SyncCoordinator},
    store::PersistentStore,
};

/// Requests routed through the arbitration point. Each carries a oneshot
/// reply; a caller torn down mid-operation simply drops its receiver and the
/// reply send fails harmlessly.
#[derive(Debug)]
enum HistoryRequest {
    Append {
        content: String,
        kind: ItemKind,
        reply: oneshot::Sender<AppendOutcome>,
    },
    Delete {
        captured_at: TimestampMs,
        reply: oneshot::Sender<usize>,
    },
    Clear {
        reply: oneshot::Sender<bool>,
    },
    SeedWelcome {
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle every context uses to reach the arbiter.
///
/// When the arbiter task is gone (runtime shutdown), operations report the
/// same outcome as a dropped write: nothing happened, nothing is retried.
#[derive(Debug, Clone)]
pub struct ArbiterHandle {
    tx: mpsc::UnboundedSender<HistoryRequest>,
}

impl ArbiterHandle {
    pub async fn append(&self, content: impl Into<String>, kind: ItemKind) -> AppendOutcome {
        let (reply, response) = oneshot::channel();
        let request = HistoryRequest::Append {
            content: content.into(),
            kind,
            reply,
        };
        if self.tx.send(request).is_err() {
            return AppendOutcome::Dropped;
        }
        response.await.unwrap_or(AppendOutcome::Dropped)
    }

    pub async fn delete(&self, captured_at: TimestampMs) -> usize {
        let (reply, response) = oneshot::channel();
        if self
            .tx
            .send(HistoryRequest::Delete { captured_at, reply })
            .is_err()
        {
            return 0;
        }
        response.await.unwrap_or(0)
    }

    pub async fn clear(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if self.tx.send(HistoryRequest::Clear { reply }).is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    pub async fn seed_welcome(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if self.tx.send(HistoryRequest::SeedWelcome { reply }).is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }
}

/// Spawn the arbitration actor: one task owns the read-modify-write cycle and
/// serves requests strictly one at a time, so overlapping appends from
/// different contexts cannot overwrite each other's insertions, and capture
/// timestamps come out strictly increasing.
pub fn spawn_arbiter<S: PersistentStore>(store: Arc<S>) -> ArbiterHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let coordinator = SyncCoordinator::new(store, ContextHandle::new("arbiter"));
    tokio::spawn(run_arbiter(coordinator, rx));
    ArbiterHandle { tx }
}

async fn run_arbiter<S: PersistentStore>(
    coordinator: SyncCoordinator<S>,
    mut rx: mpsc::UnboundedReceiver<HistoryRequest>,
) {
    info!("history arbiter started");
    while let Some(request) = rx.recv().await {
        match request {
            HistoryRequest::Append {
                content,
                kind,
                reply,
            } => {
                let outcome = coordinator.append(content, kind).await;
                let _ = reply.send(outcome);
            }
            HistoryRequest::Delete { captured_at, reply } => {
                let removed = coordinator.delete(captured_at).await;
                let _ = reply.send(removed);
            }
            HistoryRequest::Clear { reply } => {
                let cleared = coordinator.clear().await;
                let _ = reply.send(cleared);
            }
            HistoryRequest::SeedWelcome { reply } => {
                let seeded = coordinator.seed_welcome().await;
                let _ = reply.send(seeded);
            }
        }
    }
    info!("history arbiter stopped");
}
