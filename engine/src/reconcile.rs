//! Outbox replay against the server.
//!
//! # Algorithm
//!
//! 1. Sample connectivity once; offline passes do nothing
//! 2. Sort every pending record by (enqueued_at, record_id)
//! 3. Replay in three phases: creates, then updates, then deletes
//! 4. Creates record the client id -> server id mapping and re-key the cache
//! 5. Updates and deletes resolve their target through that mapping; records
//!    with no resolvable target are discarded without a network call
//! 6. The first failure stops the whole pass; untried records stay queued
//!
//! Creates must run first because updates and deletes of a task created in
//! the same batch can only find its server id once the create has mapped it.
//! Calls are strictly sequential for the same reason.

use crate::error::{Error, Result, Violation};
use crate::events::{PassReport, SyncEvent, SyncEvents};
use crate::outbox::{OpKind, PendingOp};
use crate::task::{extract_id, merge_response, normalize, Task};
use crate::{ConnectivityProvider, LocalStore, RemoteTasks, TaskId};
use serde_json::json;
use std::sync::Arc;

/// How a pass ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Not reachable; nothing was attempted.
    Offline,
    /// The outbox was empty.
    Idle,
    /// Another pass was running; this trigger was dropped.
    AlreadyRunning,
    /// Every record was applied or discarded.
    Completed(PassReport),
}

/// Replays the outbox. One pass at a time; the `&mut LocalStore` borrow
/// keeps a second pass from starting on the same store.
pub struct Reconciler {
    remote: Arc<dyn RemoteTasks>,
    connectivity: Arc<dyn ConnectivityProvider>,
    events: SyncEvents,
}

impl Reconciler {
    pub fn new(remote: Arc<dyn RemoteTasks>, connectivity: Arc<dyn ConnectivityProvider>) -> Self {
        Self {
            remote,
            connectivity,
            events: SyncEvents::new(),
        }
    }

    /// Publish on an existing event channel instead of a private one.
    pub fn with_events(mut self, events: SyncEvents) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &SyncEvents {
        &self.events
    }

    pub fn remote(&self) -> &Arc<dyn RemoteTasks> {
        &self.remote
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Run one reconciliation pass.
    ///
    /// Returns the error that stopped the pass; everything not yet applied
    /// is still in the outbox for the next one.
    pub async fn run(&self, store: &mut LocalStore) -> Result<PassOutcome> {
        if !self.connectivity.is_online() {
            tracing::debug!("offline, skipping sync pass");
            return Ok(PassOutcome::Offline);
        }

        let mut pending = store.outbox.list_all();
        if pending.is_empty() {
            return Ok(PassOutcome::Idle);
        }
        pending.sort();

        tracing::info!(pending = pending.len(), "starting sync pass");

        let mut report = PassReport::default();
        match self.replay(store, &pending, &mut report).await {
            Ok(()) => {
                tracing::info!(
                    created = report.created.len(),
                    updated = report.updated.len(),
                    deleted = report.deleted.len(),
                    discarded = report.discarded.len(),
                    "sync pass completed"
                );
                self.events.emit(SyncEvent::Completed(report.clone()));
                Ok(PassOutcome::Completed(report))
            }
            Err(err) => {
                let remaining = store.outbox.len();
                match &err {
                    Error::ProtocolViolation { client_ref, reason } => tracing::error!(
                        %client_ref,
                        violation = %reason,
                        remaining,
                        "server broke the create contract, sync pass aborted"
                    ),
                    other => tracing::warn!(error = %other, remaining, "sync pass aborted"),
                }
                self.events.emit(SyncEvent::Aborted {
                    error: err.to_string(),
                    remaining,
                });
                Err(err)
            }
        }
    }

    async fn replay(
        &self,
        store: &mut LocalStore,
        pending: &[PendingOp],
        report: &mut PassReport,
    ) -> Result<()> {
        for phase in OpKind::PHASES {
            for op in pending.iter().filter(|op| op.kind == phase) {
                match phase {
                    OpKind::Create => self.apply_create(store, op, report).await?,
                    OpKind::Update => self.apply_update(store, op, report).await?,
                    OpKind::Delete => self.apply_delete(store, op, report).await?,
                }
            }
        }
        Ok(())
    }

    async fn apply_create(
        &self,
        store: &mut LocalStore,
        op: &PendingOp,
        report: &mut PassReport,
    ) -> Result<()> {
        let payload = create_payload(store, op);
        tracing::debug!(record_id = %op.record_id, client_ref = %op.client_ref, "replaying create");

        let response = self
            .remote
            .create(&payload, &op.client_ref)
            .await
            .map_err(|source| remote_error(op, source))?;

        let server_id = check_server_id(&op.client_ref, extract_id(&response))?;
        let task = merge_response(&payload, &response).rekeyed(server_id.clone());

        store.identities.set(op.client_ref.clone(), server_id.clone())?;
        store.cache.remove(&op.client_ref)?;
        store.cache.put(task)?;
        store.outbox.remove(&op.record_id)?;

        report.created.push((op.client_ref.clone(), server_id));
        Ok(())
    }

    async fn apply_update(
        &self,
        store: &mut LocalStore,
        op: &PendingOp,
        report: &mut PassReport,
    ) -> Result<()> {
        let target = store
            .identities
            .get(&op.client_ref)
            .cloned()
            .or_else(|| op.server_ref.clone());

        let (Some(server_id), Some(payload)) = (target, op.payload.clone()) else {
            return discard(store, op, report);
        };
        let payload = payload.rekeyed(server_id.clone());

        tracing::debug!(record_id = %op.record_id, %server_id, "replaying update");

        let response = self
            .remote
            .update(&server_id, &payload)
            .await
            .map_err(|source| remote_error(op, source))?;

        let task = match response {
            Some(body) => merge_response(&payload, &body).rekeyed(server_id.clone()),
            None => payload,
        };

        if op.client_ref != server_id {
            store.cache.remove(&op.client_ref)?;
        }
        store.cache.put(task)?;
        store.outbox.remove(&op.record_id)?;

        report.updated.push(server_id);
        Ok(())
    }

    async fn apply_delete(
        &self,
        store: &mut LocalStore,
        op: &PendingOp,
        report: &mut PassReport,
    ) -> Result<()> {
        let target = op
            .server_ref
            .clone()
            .or_else(|| store.identities.get(&op.client_ref).cloned());

        let Some(server_id) = target else {
            return discard(store, op, report);
        };

        tracing::debug!(record_id = %op.record_id, %server_id, "replaying delete");

        self.remote
            .delete(&server_id)
            .await
            .map_err(|source| remote_error(op, source))?;

        store.cache.remove(&server_id)?;
        store.cache.remove(&op.client_ref)?;
        store.outbox.remove(&op.record_id)?;

        report.deleted.push(server_id);
        Ok(())
    }
}

/// Validate the id a create response assigned.
pub fn check_server_id(client_ref: &str, returned: Option<TaskId>) -> Result<TaskId> {
    let violation = |reason| Error::ProtocolViolation {
        client_ref: client_ref.to_string(),
        reason,
    };

    match returned {
        None => Err(violation(Violation::MissingServerId)),
        Some(id) if id == client_ref => Err(violation(Violation::EchoedClientId)),
        Some(id) => Ok(id),
    }
}

/// What to submit for a create. Records written by this crate always carry
/// a payload; older or hand-edited ones fall back to the cached task.
fn create_payload(store: &LocalStore, op: &PendingOp) -> Task {
    op.payload
        .clone()
        .or_else(|| store.cache.get(&op.client_ref).cloned())
        .unwrap_or_else(|| normalize(&json!({ "id": op.client_ref })))
}

fn discard(store: &mut LocalStore, op: &PendingOp, report: &mut PassReport) -> Result<()> {
    tracing::debug!(
        record_id = %op.record_id,
        kind = %op.kind,
        client_ref = %op.client_ref,
        "discarding orphaned operation"
    );
    store.outbox.remove(&op.record_id)?;
    report.discarded.push(op.record_id.clone());
    Ok(())
}

fn remote_error(op: &PendingOp, source: crate::RemoteError) -> Error {
    Error::Remote {
        kind: op.kind,
        record_id: op.record_id.clone(),
        source,
    }
}
