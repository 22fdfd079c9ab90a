//! # Ferry Engine
//!
//! Offline outbox and reconciliation for task clients.
//!
//! A client keeps working while disconnected: every change is written to a
//! local cache and, when it cannot reach the server right away, appended to a
//! durable outbox. Once connectivity returns, the [`Reconciler`] replays the
//! outbox against the server and folds the results back into the cache.
//!
//! ## Core Concepts
//!
//! ### Tasks
//!
//! A [`Task`] is keyed by whichever id is currently known for it: a
//! client-generated id (`local-<uuid>`, see [`task::is_client_id`]) until the
//! server accepts it, the server-assigned id afterwards. Everything that comes
//! off the network goes through [`normalize`] first.
//!
//! ### Durable tables
//!
//! - [`Outbox`] - queued [`PendingOp`]s, keyed by record id
//! - [`IdentityMap`] - client id -> server id, written once per created task
//! - [`TaskCache`] - the best-known view of every task
//!
//! Each is a JSON file under the data directory, grouped in a [`LocalStore`].
//!
//! ### Reconciliation
//!
//! A pass replays creates, then updates, then deletes, each phase in enqueue
//! order. The first failure stops the pass and leaves everything untried in
//! the outbox. Updates and deletes whose task never reached the server are
//! dropped without a network call.
//!
//! ## Quick Start
//!
//! ```rust
//! use ferry_engine::{
//!     LocalStore, NewOp, Reconciler, StaticConnectivity, Task, TaskDraft, HttpRemote,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 1. Open the local tables
//! let mut store = LocalStore::in_memory();
//!
//! // 2. Queue a change made while offline
//! let task = Task::from_draft("local-1", TaskDraft::new("Write report"), chrono::Utc::now());
//! store.cache.put(task.clone())?;
//! store.outbox.enqueue(NewOp::create(task))?;
//! assert_eq!(store.outbox.len(), 1);
//!
//! // 3. Build a reconciler; `reconciler.run(&mut store).await` replays the outbox
//! let remote = HttpRemote::new("http://127.0.0.1:3000", ferry_engine::http::DEFAULT_TIMEOUT)?;
//! let _reconciler = Reconciler::new(Arc::new(remote), Arc::new(StaticConnectivity(false)));
//! # Ok(())
//! # }
//! ```
//!
//! UI layers normally go through [`TaskClient`], which does the optimistic
//! cache write, tries the server directly when it can, and queues otherwise.

pub mod cache;
pub mod client;
pub mod clock;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod http;
pub mod identity;
pub mod outbox;
pub mod reconcile;
pub mod remote;
pub mod store;
pub mod table;
pub mod task;

// Re-export main types at crate root
pub use cache::TaskCache;
pub use client::TaskClient;
pub use clock::{MonotonicClock, SystemClock, WallClock};
pub use connectivity::{ConnectivityFlag, ConnectivityProvider, StaticConnectivity};
pub use error::{Error, Violation};
pub use events::{PassReport, SyncEvent, SyncEvents};
pub use http::HttpRemote;
pub use identity::IdentityMap;
pub use outbox::{NewOp, OpKind, Outbox, PendingOp};
pub use reconcile::{PassOutcome, Reconciler};
pub use remote::{RemoteError, RemoteTasks};
pub use store::LocalStore;
pub use table::{Table, TableSnapshot, TABLE_FORMAT_VERSION};
pub use task::{normalize, Status, Task, TaskDraft, TaskPatch};

/// Type aliases for clarity
pub type TaskId = String;
pub type RecordId = String;
pub type Timestamp = u64;
