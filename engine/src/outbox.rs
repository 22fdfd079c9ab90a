//! The outbox: a durable queue of mutations waiting to reach the server.
//!
//! The outbox itself imposes no order and never deduplicates. It hands out
//! strictly increasing `enqueued_at` stamps; the reconciler sorts by them.

use crate::clock::{MonotonicClock, SystemClock, WallClock};
use crate::table::Table;
use crate::{error::Result, RecordId, Task, TaskId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

/// Kind of queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl OpKind {
    /// Replay phases, in the order the reconciler runs them.
    pub const PHASES: [OpKind; 3] = [OpKind::Create, OpKind::Update, OpKind::Delete];
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Create => write!(f, "create"),
            OpKind::Update => write!(f, "update"),
            OpKind::Delete => write!(f, "delete"),
        }
    }
}

/// A queued mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOp {
    /// Queue-internal key, never reused
    pub record_id: RecordId,
    pub kind: OpKind,
    /// Id the client used for the task when the mutation was made
    pub client_ref: TaskId,
    /// Server id, when it was already known at enqueue time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ref: Option<TaskId>,
    /// Task state to submit (absent for deletes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Task>,
    pub enqueued_at: Timestamp,
}

/// A mutation before the outbox has stamped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOp {
    pub kind: OpKind,
    pub client_ref: TaskId,
    pub server_ref: Option<TaskId>,
    pub payload: Option<Task>,
}

impl NewOp {
    pub fn create(task: Task) -> Self {
        Self {
            kind: OpKind::Create,
            client_ref: task.id.clone(),
            server_ref: None,
            payload: Some(task),
        }
    }

    pub fn update(client_ref: impl Into<TaskId>, server_ref: Option<TaskId>, task: Task) -> Self {
        Self {
            kind: OpKind::Update,
            client_ref: client_ref.into(),
            server_ref,
            payload: Some(task),
        }
    }

    pub fn delete(client_ref: impl Into<TaskId>, server_ref: Option<TaskId>) -> Self {
        Self {
            kind: OpKind::Delete,
            client_ref: client_ref.into(),
            server_ref,
            payload: None,
        }
    }
}

/// Replay order: `enqueued_at`, ties broken by `record_id`.
impl Ord for PendingOp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.enqueued_at.cmp(&other.enqueued_at) {
            Ordering::Equal => self.record_id.cmp(&other.record_id),
            other => other,
        }
    }
}

impl PartialOrd for PendingOp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Durable pending-operation queue, keyed by `record_id`.
pub struct Outbox {
    table: Table<PendingOp>,
    clock: MonotonicClock,
    wall: Arc<dyn WallClock>,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("len", &self.table.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl Outbox {
    pub fn in_memory() -> Self {
        Self::from_table(Table::in_memory())
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::from_table(Table::open(path)?))
    }

    fn from_table(table: Table<PendingOp>) -> Self {
        let last = table.values().map(|op| op.enqueued_at).max().unwrap_or(0);
        Self {
            table,
            clock: MonotonicClock::resume_after(last),
            wall: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock used to stamp records.
    pub fn with_wall_clock(mut self, wall: Arc<dyn WallClock>) -> Self {
        self.wall = wall;
        self
    }

    /// Append a mutation with a fresh `record_id` and stamp. Never rejects.
    pub fn enqueue(&mut self, op: NewOp) -> Result<PendingOp> {
        let pending = PendingOp {
            record_id: uuid::Uuid::new_v4().to_string(),
            kind: op.kind,
            client_ref: op.client_ref,
            server_ref: op.server_ref,
            payload: op.payload,
            enqueued_at: self.clock.tick(self.wall.now_ms()),
        };

        self.table.insert(pending.record_id.clone(), pending.clone())?;

        tracing::debug!(
            record_id = %pending.record_id,
            kind = %pending.kind,
            client_ref = %pending.client_ref,
            "enqueued pending operation"
        );

        Ok(pending)
    }

    /// Every stored record, in no particular order.
    pub fn list_all(&self) -> Vec<PendingOp> {
        self.table.values().cloned().collect()
    }

    /// Delete one record. Unknown ids are ignored.
    pub fn remove(&mut self, record_id: &str) -> Result<()> {
        self.table.remove(record_id)?;
        Ok(())
    }

    /// Stored records, in no particular order, without cloning.
    pub fn iter(&self) -> impl Iterator<Item = &PendingOp> {
        self.table.values()
    }

    /// Whether a create for the given client id is still queued.
    pub fn has_pending_create(&self, client_ref: &str) -> bool {
        self.table
            .values()
            .any(|op| op.kind == OpKind::Create && op.client_ref == client_ref)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
