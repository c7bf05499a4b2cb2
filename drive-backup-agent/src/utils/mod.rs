//! Utility modules for the backup agent.

pub mod errors;
pub mod logger;
pub mod size;

pub use errors::{AgentError, Result, SizeParseError};
pub use size::parse_size;
