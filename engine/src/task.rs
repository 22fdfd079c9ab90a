//! Task entity, client identifiers and payload normalization.

use crate::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title given to tasks whose payload carries none.
pub const UNTITLED: &str = "Untitled task";

/// Prefix carried by every client-generated identifier.
pub const CLIENT_ID_PREFIX: &str = "local-";

/// Generate a fresh client-side identifier for a task created before the server knows it.
pub fn new_client_id() -> TaskId {
    format!("{}{}", CLIENT_ID_PREFIX, uuid::Uuid::new_v4())
}

/// Whether `id` was generated locally and still awaits a server assignment.
pub fn is_client_id(id: &str) -> bool {
    id.starts_with(CLIENT_ID_PREFIX)
}

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl Status {
    /// Parse a status name, accepting the spellings clients and servers use in the wild.
    pub fn parse(name: &str) -> Option<Status> {
        let folded: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "pending" | "todo" => Some(Status::Pending),
            "inprogress" | "doing" => Some(Status::InProgress),
            "completed" | "complete" | "done" => Some(Status::Completed),
            _ => None,
        }
    }

    /// Clamp an arbitrary JSON value to a status, defaulting to [`Status::Pending`].
    pub fn from_value(value: Option<&Value>) -> Status {
        value
            .and_then(Value::as_str)
            .and_then(Status::parse)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task as the client currently knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Client-generated or server-assigned identifier
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
    /// Owning user, when the server tracks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a task from a draft under the given id.
    pub fn from_draft(id: impl Into<TaskId>, draft: TaskDraft, created_at: DateTime<Utc>) -> Self {
        let title = if draft.title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            draft.title
        };

        Self {
            id: id.into(),
            title,
            description: draft.description,
            status: draft.status,
            owner: draft.owner,
            created_at: Some(created_at),
        }
    }

    /// Whether the id is still a client placeholder.
    pub fn is_pending_assignment(&self) -> bool {
        is_client_id(&self.id)
    }

    /// Apply a partial edit in place.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }

    /// Same task under another id.
    pub fn rekeyed(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }
}

/// Fields supplied by the user when creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A partial edit; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.status.is_none()
    }
}

/// Extract an identifier from `id` or `_id`, accepting strings and numbers.
///
/// Empty strings count as absent.
pub fn extract_id(raw: &Value) -> Option<TaskId> {
    ["id", "_id"]
        .iter()
        .filter_map(|key| raw.get(*key))
        .find_map(scalar_string)
}

/// Coerce arbitrary JSON into a well-formed [`Task`].
///
/// Servers and optimistic client records disagree on field naming, so every
/// payload coming off the network passes through here before it is cached.
pub fn normalize(raw: &Value) -> Task {
    let title = first_field(raw, &["title", "name"])
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    let description = first_field(raw, &["description"])
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Task {
        id: extract_id(raw).unwrap_or_default(),
        title,
        description,
        status: Status::from_value(first_field(raw, &["status"])),
        owner: first_field(raw, &["owner", "ownerRef", "user"]).and_then(scalar_string),
        created_at: first_field(raw, &["createdAt", "created_at"]).and_then(parse_timestamp),
    }
}

/// Fold a server response over the task that was submitted.
///
/// Fields the server returned win; fields it left out keep their submitted
/// values. The submitted `id` never survives, since it may be a client id.
pub fn merge_response(submitted: &Task, response: &Value) -> Task {
    let mut merged = match serde_json::to_value(submitted) {
        Ok(Value::Object(fields)) => fields,
        _ => serde_json::Map::new(),
    };
    merged.remove("id");

    if let Value::Object(fields) = response {
        for (key, value) in fields.iter().filter(|(_, value)| !value.is_null()) {
            merged.insert(key.clone(), value.clone());
        }
    }

    normalize(&Value::Object(merged))
}

fn first_field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| raw.get(*name))
        .find(|value| !value.is_null())
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
