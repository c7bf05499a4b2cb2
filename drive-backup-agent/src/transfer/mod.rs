//! Upload coordination and transfer progress.

pub mod progress;
pub mod upload;
