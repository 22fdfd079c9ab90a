//! Local task cache: the client's best-known view of every task.

use crate::table::Table;
use crate::task::is_client_id;
use crate::{error::Result, Task};
use std::path::PathBuf;

/// Durable task cache keyed by whichever id is currently known for a task.
#[derive(Debug)]
pub struct TaskCache {
    table: Table<Task>,
}

impl TaskCache {
    pub fn in_memory() -> Self {
        Self {
            table: Table::in_memory(),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            table: Table::open(path)?,
        })
    }

    /// Insert or overwrite by `task.id`.
    pub fn put(&mut self, task: Task) -> Result<()> {
        self.table.insert(task.id.clone(), task)?;
        Ok(())
    }

    /// Remove by id. Missing ids are ignored.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.table.remove(id)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.table.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table.contains(id)
    }

    /// Every cached task, unordered.
    pub fn get_all(&self) -> Vec<Task> {
        self.table.values().cloned().collect()
    }

    /// Swap in a fresh server listing.
    ///
    /// Server-keyed entries are dropped and replaced; client-keyed entries
    /// are kept because their creates have not reached the server yet.
    pub fn replace_server_view(&mut self, tasks: Vec<Task>) -> Result<()> {
        self.table.retain(|id, _| is_client_id(id))?;
        self.table.extend(
            tasks
                .into_iter()
                .filter(|task| !task.id.is_empty())
                .map(|task| (task.id.clone(), task)),
        )
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
