//! Database operations for the tasks table.

use chrono::{DateTime, Utc};
use ferry_engine::{Status, Task};
use serde_json::{json, Value};
use sqlx::{PgPool, Row};

const COLUMNS: &str = "id, title, description, status, owner, created_at, updated_at";

/// A stored task row from the database.
#[derive(Debug, Clone)]
pub struct StoredTask {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredTask {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredTask {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            status: row.try_get("status")?,
            owner: row.try_get("owner")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredTask {
    /// Wire form. The id goes out as a string under `_id`.
    pub fn to_json(&self) -> Value {
        json!({
            "_id": self.id.to_string(),
            "title": self.title,
            "description": self.description,
            "status": Status::parse(&self.status).unwrap_or_default().as_str(),
            "owner": self.owner,
            "createdAt": self.created_at.to_rfc3339(),
            "updatedAt": self.updated_at.to_rfc3339(),
        })
    }
}

/// Parse a path id. Anything that is not a row id cannot exist.
pub fn parse_task_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok().filter(|id| *id > 0)
}

/// Insert a task, or return the row an earlier request with the same
/// idempotency key created. The flag is `true` when a row was inserted.
///
/// `None` means the key matched a row that has since been deleted.
pub async fn insert_task(
    pool: &PgPool,
    task: &Task,
    idempotency_key: Option<&str>,
) -> Result<Option<(StoredTask, bool)>, sqlx::Error> {
    let inserted = sqlx::query_as::<_, StoredTask>(&format!(
        r#"
        INSERT INTO tasks (title, description, status, owner, idempotency_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (idempotency_key) DO NOTHING
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(&task.owner)
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = inserted {
        return Ok(Some((row, true)));
    }

    let existing = sqlx::query_as::<_, StoredTask>(&format!(
        "SELECT {COLUMNS} FROM tasks WHERE idempotency_key = $1"
    ))
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await?;

    Ok(existing.map(|row| (row, false)))
}

/// Get a task by id.
pub async fn get_task(pool: &PgPool, id: i64) -> Result<Option<StoredTask>, sqlx::Error> {
    sqlx::query_as::<_, StoredTask>(&format!("SELECT {COLUMNS} FROM tasks WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Every task, oldest first.
pub async fn list_tasks(pool: &PgPool) -> Result<Vec<StoredTask>, sqlx::Error> {
    sqlx::query_as::<_, StoredTask>(&format!(
        "SELECT {COLUMNS} FROM tasks ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await
}

/// Overwrite a task's fields. Returns `None` when no such task exists.
pub async fn update_task(
    pool: &PgPool,
    id: i64,
    task: &Task,
) -> Result<Option<StoredTask>, sqlx::Error> {
    sqlx::query_as::<_, StoredTask>(&format!(
        r#"
        UPDATE tasks SET
            title = $2,
            description = $3,
            status = $4,
            owner = COALESCE($5, owner),
            updated_at = now()
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(&task.owner)
    .fetch_optional(pool)
    .await
}

/// Delete a task. Returns whether a row was removed.
pub async fn delete_task(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
