//! Generation errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while producing a generated program.
///
/// Generation errors are contained by the campaign driver: the iteration is
/// recorded as skipped and the campaign continues.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The configuration is internally inconsistent
    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),

    /// The size budget cannot hold a minimal valid class file
    #[error("size budget too small: minimal class needs {needed} bytes, budget is {budget}")]
    SizeBudget {
        /// Bytes the emitted class file would occupy
        needed: usize,
        /// Configured maximum artifact size
        budget: u32,
    },

    /// The external generator process could not be started
    #[error("failed to spawn external generator '{command}': {source}")]
    Spawn {
        /// The configured generator command
        command: String,
        /// Underlying spawn error
        source: std::io::Error,
    },

    /// The external generator exited with a failure status
    #[error("external generator failed (status {status}): {stderr}")]
    GeneratorFailed {
        /// Exit status (or -1 when killed by a signal)
        status: i32,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// The external generator did not produce the expected class file
    #[error("external generator produced no artifact at {0}")]
    MissingArtifact(PathBuf),

    /// The produced artifact is empty
    #[error("external generator produced an empty artifact at {0}")]
    EmptyArtifact(PathBuf),

    /// IO error while reading or writing artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, GenerationError>;
