//! Error types for kindling-core.

use thiserror::Error;

/// Result type alias for kindling-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while provisioning or tearing down the environment.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from kindling-vm (process execution, VM lifecycle)
    #[error("VM error: {0}")]
    Vm(#[from] kindling_vm::VmError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration source could not be read
    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    /// Cluster still absent after the creation attempt
    #[error("cluster {name} not found after creation: {detail}")]
    ClusterMissing {
        /// Cluster name
        name: String,
        /// Output of the failed creation attempt
        detail: String,
    },

    /// CNI manifest could not be applied
    #[error("CNI manifest apply failed after {attempts} attempts: {detail}")]
    CniApply {
        /// Number of attempts made
        attempts: u32,
        /// Last error seen
        detail: String,
    },

    /// Two steps share a name
    #[error("duplicate step: {0}")]
    DuplicateStep(&'static str),

    /// A step depends on a step that is not in the graph
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency {
        /// Declaring step
        step: &'static str,
        /// Missing dependency
        dependency: &'static str,
    },

    /// The step graph contains a cycle
    #[error("dependency cycle among steps: {0:?}")]
    Cycle(Vec<&'static str>),

    /// One or more steps failed during a run
    #[error("provisioning failed: {}", .0.join(", "))]
    StepsFailed(Vec<String>),

    /// A step panicked
    #[error("step {0} panicked")]
    Panicked(&'static str),

    /// YAML rendering error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
