//! Election Lifecycle & Ballot Integrity Engine
//!
//! In-memory engine for running institutional elections end to end:
//! lifecycle state machine, voter roll, at-most-one-vote ballot commit,
//! deterministic tally, one-way results publication, and a hash-chained
//! audit trail. [`ElectionService`] is the role-gated entry point.

pub mod audit;
pub mod config;
pub mod engine;
pub mod errors;
pub mod types;

// Re-export commonly used types
pub use engine::ElectionService;
pub use errors::{Error, ErrorKind, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the election engine with proper logging
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ballot=info".into()),
        )
        .init();

    tracing::info!("🗳️  Election engine v{} initialized", VERSION);
    Ok(())
}
