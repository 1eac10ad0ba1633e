//! Harness errors

use thiserror::Error;

/// Errors surfaced by the harness.
///
/// Timeouts and crashes of generated programs are classified execution
/// results, never errors: generation failures are contained per-iteration
/// by the driver as skips, and only harness-infrastructure failures
/// propagate here and terminate a campaign.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid harness configuration
    #[error("config error: {0}")]
    Config(String),

    /// The harness itself cannot make progress (e.g. cannot spawn an
    /// execution context); aborts the campaign
    #[error("harness infrastructure failure: {0}")]
    DriverFatal(String),

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize a persisted record
    #[error("serialization error: {0}")]
    Persist(#[from] serde_json::Error),
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
