//! Task handlers - validate bodies and talk to the database.

use crate::db;
use crate::error::{AppError, Result};
use ferry_engine::{normalize, Task};
use serde_json::Value;
use sqlx::PgPool;

/// Outcome of a create request.
#[derive(Debug)]
pub struct Created {
    pub task: Value,
    /// `false` when an earlier request with the same key already created it
    pub inserted: bool,
}

/// Parse a request body into a task.
///
/// Bodies go through the same normalization clients apply to responses, so
/// `name` works for `title`, unknown statuses fall back to pending, and any
/// id in the body is ignored.
pub fn parse_body(body: &Value) -> Result<Task> {
    if !body.is_object() {
        return Err(AppError::BadRequest("task body must be a JSON object".into()));
    }
    Ok(normalize(body))
}

/// Create a task, honoring the idempotency key when one is given.
pub async fn handle_create(
    pool: &PgPool,
    body: &Value,
    idempotency_key: Option<&str>,
) -> Result<Created> {
    let task = parse_body(body)?;

    let (row, inserted) = db::insert_task(pool, &task, idempotency_key)
        .await?
        .ok_or_else(|| {
            AppError::Internal(format!(
                "task for idempotency key {:?} vanished during create",
                idempotency_key
            ))
        })?;

    if inserted {
        tracing::info!(id = row.id, "created task");
    } else {
        tracing::debug!(id = row.id, key = ?idempotency_key, "replayed create");
    }

    Ok(Created {
        task: row.to_json(),
        inserted,
    })
}

/// List every task, oldest first.
pub async fn handle_list(pool: &PgPool) -> Result<Vec<Value>> {
    let rows = db::list_tasks(pool).await?;
    Ok(rows.iter().map(db::StoredTask::to_json).collect())
}

/// Fetch one task.
pub async fn handle_get(pool: &PgPool, id: &str) -> Result<Value> {
    let row = match db::parse_task_id(id) {
        Some(id) => db::get_task(pool, id).await?,
        None => None,
    };
    row.map(|row| row.to_json())
        .ok_or_else(|| AppError::NotFound(format!("task {id}")))
}

/// Overwrite a task's fields.
pub async fn handle_update(pool: &PgPool, id: &str, body: &Value) -> Result<Value> {
    let task = parse_body(body)?;
    let row = match db::parse_task_id(id) {
        Some(id) => db::update_task(pool, id, &task).await?,
        None => None,
    };

    let row = row.ok_or_else(|| AppError::NotFound(format!("task {id}")))?;
    tracing::info!(id = row.id, status = %row.status, "updated task");
    Ok(row.to_json())
}

/// Delete a task. Deleting something that is already gone succeeds.
pub async fn handle_delete(pool: &PgPool, id: &str) -> Result<()> {
    let removed = match db::parse_task_id(id) {
        Some(id) => db::delete_task(pool, id).await?,
        None => false,
    };

    if removed {
        tracing::info!(%id, "deleted task");
    } else {
        tracing::debug!(%id, "delete of absent task");
    }
    Ok(())
}
