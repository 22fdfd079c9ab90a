//! Durable keyed tables.
//!
//! Each of the client's stores (outbox, identity map, task cache) is a
//! [`Table`]: a `BTreeMap` kept in memory and mirrored to one JSON file.
//! Every mutation rewrites the file through a temp file and a rename, so a
//! crash leaves either the old or the new snapshot on disk, never a torn one.

use crate::{error::Result, Error};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Version of the table file format.
pub const TABLE_FORMAT_VERSION: u32 = 1;

/// On-disk form of a table.
///
/// Uses BTreeMap instead of HashMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot<V> {
    /// Snapshot format version
    pub format_version: u32,
    /// Rows by key
    pub rows: BTreeMap<String, V>,
}

impl<V> TableSnapshot<V> {
    /// Reject snapshots written by an unknown format.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != TABLE_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported format version: {} (expected {})",
                self.format_version, TABLE_FORMAT_VERSION
            )));
        }
        Ok(())
    }
}

/// Borrowed form written on flush, so saving does not clone every row.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a, V> {
    format_version: u32,
    rows: &'a BTreeMap<String, V>,
}

/// A keyed table, optionally backed by a file.
#[derive(Debug, Clone)]
pub struct Table<V> {
    path: Option<PathBuf>,
    rows: BTreeMap<String, V>,
}

impl<V> Table<V>
where
    V: Serialize + DeserializeOwned,
{
    /// A table that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            rows: BTreeMap::new(),
        }
    }

    /// Open the table stored at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = match fs::read(&path) {
            Ok(bytes) => {
                let snapshot: TableSnapshot<V> = serde_json::from_slice(&bytes)?;
                snapshot.validate()?;
                snapshot.rows
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        tracing::debug!(path = %path.display(), rows = rows.len(), "opened table");

        Ok(Self {
            path: Some(path),
            rows,
        })
    }

    /// File backing this table, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.rows.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rows.contains_key(key)
    }

    /// Insert or overwrite a row and persist. Returns the previous row.
    ///
    /// If the write fails the row is put back the way it was, so memory never
    /// holds a change the file does not.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Result<Option<V>> {
        let key = key.into();
        let previous = self.rows.insert(key.clone(), value);
        if let Err(err) = self.flush() {
            self.restore(vec![(key, previous)]);
            return Err(err);
        }
        Ok(previous)
    }

    /// Remove a row and persist. Missing keys are not an error.
    pub fn remove(&mut self, key: &str) -> Result<Option<V>> {
        let Some(removed) = self.rows.remove(key) else {
            return Ok(None);
        };
        if let Err(err) = self.flush() {
            self.rows.insert(key.to_string(), removed);
            return Err(err);
        }
        Ok(Some(removed))
    }

    /// Keep only the rows matching `keep`, then persist once.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &V) -> bool) -> Result<()> {
        let dropped: Vec<String> = self
            .rows
            .iter()
            .filter(|(key, value)| !keep(key, value))
            .map(|(key, _)| key.clone())
            .collect();
        if dropped.is_empty() {
            return Ok(());
        }

        let undo = dropped
            .into_iter()
            .filter_map(|key| self.rows.remove_entry(&key))
            .map(|(key, value)| (key, Some(value)))
            .collect();
        self.commit(undo)
    }

    /// Insert many rows with a single write.
    pub fn extend(&mut self, rows: impl IntoIterator<Item = (String, V)>) -> Result<()> {
        let undo = rows
            .into_iter()
            .map(|(key, value)| {
                let previous = self.rows.insert(key.clone(), value);
                (key, previous)
            })
            .collect();
        self.commit(undo)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flush, undoing `undo` (key, prior row) on failure.
    fn commit(&mut self, undo: Vec<(String, Option<V>)>) -> Result<()> {
        let result = self.flush();
        if result.is_err() {
            self.restore(undo);
        }
        result
    }

    /// Applied newest first so repeated keys end at their oldest value.
    fn restore(&mut self, undo: Vec<(String, Option<V>)>) {
        for (key, prior) in undo.into_iter().rev() {
            match prior {
                Some(value) => self.rows.insert(key, value),
                None => self.rows.remove(&key),
            };
        }
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = SnapshotRef {
            format_version: TABLE_FORMAT_VERSION,
            rows: &self.rows,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
