//! Custom error types for the backup agent.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to split archive {path}: {source}")]
    Partition {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to upload {name}: {reason}")]
    Upload { name: String, reason: String },

    #[error("Failed to list remote artifacts: {0}")]
    List(String),

    #[error("Failed to delete remote artifact {id}: {reason}")]
    Delete { id: String, reason: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures of the human-readable size parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeParseError {
    #[error("invalid size format: {0} (expected format like '10MB', '1.5GB', etc.)")]
    InvalidFormat(String),

    #[error("invalid numeric value: {0}")]
    InvalidNumber(String),

    #[error("size must be greater than 0: {0}")]
    OutOfRange(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
