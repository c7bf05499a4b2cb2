//! Drive Backup Agent Library
//!
//! Archives local folders to `.tar.gz`, uploads them (split into parts when
//! large) to Google Drive, and prunes backups past the retention window.

pub mod archive;
pub mod config;
pub mod executor;
pub mod fs;
pub mod naming;
pub mod remote;
pub mod retention;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, RunSettings};
pub use executor::{BackupExecutor, PassReport};
pub use remote::RemoteStore;
pub use utils::errors::AgentError;
pub type Result<T> = std::result::Result<T, AgentError>;
