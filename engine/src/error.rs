//! Error types for the Ferry engine.

use crate::outbox::OpKind;
use crate::remote::RemoteError;
use crate::{RecordId, TaskId};
use thiserror::Error;

/// How a create response broke the server contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// The response carried no usable `id` / `_id`.
    MissingServerId,
    /// The server returned the client-generated id instead of assigning one.
    EchoedClientId,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::MissingServerId => write!(f, "response has no server id"),
            Violation::EchoedClientId => write!(f, "server echoed the client id"),
        }
    }
}

/// All possible errors from the Ferry engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Pass aborts
    #[error("{kind} of {record_id} failed: {source}")]
    Remote {
        kind: OpKind,
        record_id: RecordId,
        #[source]
        source: RemoteError,
    },

    #[error("protocol violation creating {client_ref}: {reason}")]
    ProtocolViolation {
        client_ref: TaskId,
        reason: Violation,
    },

    #[error("listing tasks failed: {0}")]
    Listing(#[source] RemoteError),

    // Local state errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

impl Error {
    /// True when the server broke its contract, as opposed to being unreachable or failing.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
