//! Error types for the CLI.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] ferry_engine::Error),

    #[error("remote error: {0}")]
    Remote(#[from] ferry_engine::RemoteError),

    #[error("invalid status {0:?} (expected pending, in_progress or completed)")]
    InvalidStatus(String),

    #[error("nothing to change: pass --title or --description")]
    EmptyEdit,

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
