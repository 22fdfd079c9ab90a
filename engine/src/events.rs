//! Notifications emitted after sync passes.

use crate::{RecordId, TaskId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers see `Lagged` rather than blocking a pass.
pub const EVENT_CAPACITY: usize = 64;

/// What a completed pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// `(client id, server id)` for every create applied
    pub created: Vec<(TaskId, TaskId)>,
    /// Server ids updated
    pub updated: Vec<TaskId>,
    /// Server ids deleted
    pub deleted: Vec<TaskId>,
    /// Records dropped because their target never reached the server
    pub discarded: Vec<RecordId>,
}

impl PassReport {
    /// Number of records removed from the outbox.
    pub fn drained(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len() + self.discarded.len()
    }
}

/// Broadcast to UI layers after each pass that did any work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncEvent {
    /// Every queued record was applied or discarded.
    Completed(PassReport),
    /// The pass stopped at a failure; `remaining` records are still queued.
    Aborted { error: String, remaining: usize },
}

/// Sender side of the event channel.
#[derive(Debug, Clone)]
pub struct SyncEvents {
    tx: broadcast::Sender<SyncEvent>,
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: SyncEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(receivers, "emitted sync event");
    }
}
