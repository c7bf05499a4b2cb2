//! Logging configuration using tracing.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Resolve the effective filter directive. The debug flag wins over the
/// configured level; `RUST_LOG` (read in [`init`]) wins over both.
pub fn effective_level(level: &str, debug: bool) -> &str {
    if debug {
        "debug"
    } else {
        level
    }
}

/// Initialize logging with the specified level
pub fn init(level: &str, debug: bool) -> anyhow::Result<()> {
    let level = effective_level(level, debug);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
