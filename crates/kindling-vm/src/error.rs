//! Error types for kindling-vm.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for kindling-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors that can occur while driving external tools or the VM.
#[derive(Debug, Error)]
pub enum VmError {
    /// The program could not be launched at all
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully
    #[error("`{command}` exited with code {code}: {stderr}")]
    Command {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The VM manager listing could not be understood
    #[error("unparseable VM listing: {0}")]
    Listing(String),

    /// VM did not reach the expected state within the polling ceiling
    #[error("VM {name} not {expected} after {attempts} attempts ({ceiling:?})")]
    NotReady {
        name: String,
        expected: String,
        attempts: u32,
        ceiling: Duration,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
