//! Client id to server id associations.

use crate::table::Table;
use crate::{error::Result, TaskId};
use std::path::PathBuf;

/// Durable map from client-generated ids to server-assigned ids.
///
/// The store overwrites on a repeated `set`; the reconciler only writes once
/// per client id, on the first successful create.
#[derive(Debug)]
pub struct IdentityMap {
    table: Table<TaskId>,
}

impl IdentityMap {
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

    pub fn set(&mut self, client_ref: impl Into<TaskId>, server_ref: impl Into<TaskId>) -> Result<()> {
        self.table.insert(client_ref.into(), server_ref.into())?;
        Ok(())
    }

    /// Server id for a client id. An empty key never resolves.
    pub fn get(&self, client_ref: &str) -> Option<&TaskId> {
        if client_ref.is_empty() {
            return None;
        }
        self.table.get(client_ref)
    }

    /// Resolve any id to its server form: mapped client ids are translated,
    /// everything else is returned unchanged.
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(String::as_str).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
