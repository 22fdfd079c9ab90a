//! TaskClient - the entry point UI layers use.
//!
//! Every mutation lands in the cache first. When the server is reachable and
//! nothing older is queued for the same task, the mutation is sent straight
//! away; otherwise it goes to the outbox for the next sync pass.

use crate::outbox::NewOp;
use crate::reconcile::{check_server_id, PassOutcome};
use crate::task::{extract_id, is_client_id, merge_response, new_client_id, normalize};
use crate::{
    error::Result, Error, LocalStore, PendingOp, Reconciler, Status, SyncEvent, Task, TaskDraft,
    TaskId, TaskPatch,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// Local-first task operations backed by a [`LocalStore`] and a [`Reconciler`].
pub struct TaskClient {
    store: Mutex<LocalStore>,
    reconciler: Reconciler,
    /// Held for the duration of a pass; overlapping triggers are dropped.
    pass_gate: Mutex<()>,
}

impl TaskClient {
    pub fn new(store: LocalStore, reconciler: Reconciler) -> Self {
        Self {
            store: Mutex::new(store),
            reconciler,
            pass_gate: Mutex::new(()),
        }
    }

    /// Subscribe to pass completion and abort events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.reconciler.events().subscribe()
    }

    /// Create a task under a fresh client id.
    ///
    /// Returns the task as it is now cached: server-keyed when the server
    /// accepted it right away, client-keyed otherwise.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        let task = Task::from_draft(new_client_id(), draft, Utc::now());
        let mut store = self.store.lock().await;
        store.cache.put(task.clone())?;

        if self.reconciler.is_online() {
            match self.reconciler.remote().create(&task, &task.id).await {
                Ok(response) => match check_server_id(&task.id, extract_id(&response)) {
                    Ok(server_id) => {
                        let created = merge_response(&task, &response).rekeyed(server_id.clone());
                        store.identities.set(task.id.clone(), server_id)?;
                        store.cache.remove(&task.id)?;
                        store.cache.put(created.clone())?;
                        return Ok(created);
                    }
                    Err(err) => tracing::error!(error = %err, "create response rejected, queueing"),
                },
                Err(err) => tracing::warn!(error = %err, "create failed, queueing"),
            }
        }

        store.outbox.enqueue(NewOp::create(task.clone()))?;
        Ok(task)
    }

    /// Apply a partial edit to a task.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let mut store = self.store.lock().await;
        let current_id = store.identities.resolve(id).to_string();

        let mut task = store
            .cache
            .get(&current_id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        task.apply(&patch);
        store.cache.put(task.clone())?;

        let server_ref = (!is_client_id(&task.id)).then(|| task.id.clone());
        let queued_behind = store.has_pending_for(&task.id);

        if let Some(server_id) = &server_ref {
            if self.reconciler.is_online() && !queued_behind {
                match self.reconciler.remote().update(server_id, &task).await {
                    Ok(response) => {
                        let updated = match response {
                            Some(body) => merge_response(&task, &body).rekeyed(server_id.clone()),
                            None => task,
                        };
                        store.cache.put(updated.clone())?;
                        return Ok(updated);
                    }
                    Err(err) => tracing::warn!(error = %err, %server_id, "update failed, queueing"),
                }
            }
        }

        store
            .outbox
            .enqueue(NewOp::update(task.id.clone(), server_ref, task.clone()))?;
        Ok(task)
    }

    /// Move a task to another workflow state.
    pub async fn set_status(&self, id: &str, status: Status) -> Result<Task> {
        self.update_task(id, TaskPatch::status(status)).await
    }

    /// Delete a task locally and, now or later, on the server.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        let current_id = store.identities.resolve(id).to_string();

        if !store.cache.contains(&current_id) {
            return Err(Error::TaskNotFound(id.to_string()));
        }
        store.cache.remove(&current_id)?;

        if is_client_id(&current_id) {
            // Its create is still queued; the pass deletes it once created, or drops this.
            store.outbox.enqueue(NewOp::delete(current_id, None))?;
            return Ok(());
        }

        if self.reconciler.is_online() && !store.has_pending_for(&current_id) {
            match self.reconciler.remote().delete(&current_id).await {
                Ok(()) => return Ok(()),
                Err(err) => tracing::warn!(error = %err, server_id = %current_id, "delete failed, queueing"),
            }
        }

        store
            .outbox
            .enqueue(NewOp::delete(current_id.clone(), Some(current_id)))?;
        Ok(())
    }

    /// Look up a task by either of its ids.
    pub async fn get_task(&self, id: &str) -> Option<Task> {
        let store = self.store.lock().await;
        store.cache.get(store.identities.resolve(id)).cloned()
    }

    /// Every cached task, oldest first.
    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks = self.store.lock().await.cache.get_all();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Queued mutations in replay order.
    pub async fn pending_ops(&self) -> Vec<PendingOp> {
        let mut ops = self.store.lock().await.outbox.list_all();
        ops.sort();
        ops
    }

    /// Ids of every task with a queued mutation, under any of its ids.
    pub async fn pending_task_ids(&self) -> HashSet<TaskId> {
        self.store.lock().await.pending_task_ids()
    }

    pub async fn pending_count(&self) -> usize {
        self.store.lock().await.outbox.len()
    }

    /// Replace the cache's server view with a fresh listing.
    ///
    /// Tasks with queued mutations keep their local state. Returns `false`
    /// when offline.
    pub async fn refresh(&self) -> Result<bool> {
        if !self.reconciler.is_online() {
            return Ok(false);
        }

        let listed = self
            .reconciler
            .remote()
            .list()
            .await
            .map_err(Error::Listing)?;

        let mut store = self.store.lock().await;
        let touched = store.pending_task_ids();

        let tasks: Vec<Task> = listed
            .iter()
            .map(normalize)
            .filter_map(|task| {
                if touched.contains(&task.id) {
                    store.cache.get(&task.id).cloned()
                } else {
                    Some(task)
                }
            })
            .collect();

        tracing::debug!(tasks = tasks.len(), "refreshed server view");
        store.cache.replace_server_view(tasks)?;
        Ok(true)
    }

    /// Run one reconciliation pass unless one is already running.
    pub async fn sync(&self) -> Result<PassOutcome> {
        let Ok(_gate) = self.pass_gate.try_lock() else {
            tracing::debug!("sync pass already running, trigger dropped");
            return Ok(PassOutcome::AlreadyRunning);
        };

        let mut store = self.store.lock().await;
        self.reconciler.run(&mut store).await
    }

    /// Run a pass every time `reachable` flips to `true`.
    ///
    /// Pass the same channel the reconciler samples, so the pass sees the
    /// connectivity that triggered it.
    pub fn spawn_reconnect_worker(self: Arc<Self>, mut reachable: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while reachable.changed().await.is_ok() {
                if !*reachable.borrow_and_update() {
                    continue;
                }
                match self.sync().await {
                    Ok(outcome) => tracing::debug!(?outcome, "reconnect pass finished"),
                    Err(err) => tracing::warn!(error = %err, "reconnect pass aborted"),
                }
            }
        })
    }
}
