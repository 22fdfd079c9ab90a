//! Remote task collection contract.
//!
//! The reconciler only sees this trait. Every call either succeeds or
//! returns a [`RemoteError`]; the engine treats all failures alike and has no
//! retry logic of its own.

use crate::Task;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure of a remote call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("invalid server url: {0}")]
    InvalidUrl(String),
}

/// Operations on the server's task collection.
///
/// Responses are raw JSON: the server's field naming is not trusted, callers
/// run them through [`crate::normalize`].
#[async_trait]
pub trait RemoteTasks: Send + Sync {
    /// Create a task. The response must carry a server-assigned id distinct
    /// from the client id. `idempotency_key` lets the server collapse retries.
    async fn create(&self, payload: &Task, idempotency_key: &str) -> Result<Value, RemoteError>;

    /// Replace a task by server id. Servers may answer with no body.
    async fn update(&self, id: &str, payload: &Task) -> Result<Option<Value>, RemoteError>;

    /// Delete a task by server id.
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;

    /// Every task visible to this client.
    async fn list(&self) -> Result<Vec<Value>, RemoteError>;
}
