//! LocalStore - the client's three durable tables.
//!
//! The outbox, identity map and task cache are independent tables. They are
//! grouped here so a sync pass can borrow all three mutably at once.

use crate::{error::Result, IdentityMap, Outbox, PendingOp, TaskCache, TaskId};
use std::collections::HashSet;
use std::path::Path;

/// File name of the outbox table inside a data directory.
pub const OUTBOX_FILE: &str = "outbox.json";
/// File name of the identity map table inside a data directory.
pub const IDENTITY_FILE: &str = "identity.json";
/// File name of the task cache table inside a data directory.
pub const CACHE_FILE: &str = "cache.json";

/// Pending operations, identity mappings and cached tasks.
#[derive(Debug)]
pub struct LocalStore {
    pub outbox: Outbox,
    pub identities: IdentityMap,
    pub cache: TaskCache,
}

impl LocalStore {
    /// A store that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self {
            outbox: Outbox::in_memory(),
            identities: IdentityMap::in_memory(),
            cache: TaskCache::in_memory(),
        }
    }

    /// Open (or start) the tables under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let store = Self {
            outbox: Outbox::open(dir.join(OUTBOX_FILE))?,
            identities: IdentityMap::open(dir.join(IDENTITY_FILE))?,
            cache: TaskCache::open(dir.join(CACHE_FILE))?,
        };

        tracing::info!(
            dir = %dir.display(),
            pending = store.outbox.len(),
            mapped = store.identities.len(),
            cached = store.cache.len(),
            "opened local store"
        );

        Ok(store)
    }

    /// Whether any queued record targets the task known as `id`.
    ///
    /// A record targets a task through its client id, its explicit server
    /// id, or the server id its client id has since been mapped to.
    pub fn has_pending_for(&self, id: &str) -> bool {
        self.outbox.iter().any(|op| self.targets(op).any(|target| target == id))
    }

    /// Every task id some queued record targets.
    pub fn pending_task_ids(&self) -> HashSet<TaskId> {
        self.outbox
            .iter()
            .flat_map(|op| self.targets(op))
            .map(str::to_string)
            .collect()
    }

    fn targets<'a>(&'a self, op: &'a PendingOp) -> impl Iterator<Item = &'a str> {
        std::iter::once(op.client_ref.as_str())
            .chain(op.server_ref.as_deref())
            .chain(self.identities.get(&op.client_ref).map(String::as_str))
    }
}
