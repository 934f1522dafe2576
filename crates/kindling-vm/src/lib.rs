//! # kindling-vm
//!
//! VM management layer for kindling local Kubernetes environments.
//! Drives a Lima VM through the `limactl` CLI and provides the process
//! plumbing every other kindling crate shells out through.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kindling_vm::{SystemRunner, VmBuilder, VmState};
//! use std::sync::Arc;
//!
//! # async fn example() -> kindling_vm::Result<()> {
//! let vm = VmBuilder::new("myk8s-docker")
//!     .cpus(8)
//!     .memory_gib(16)
//!     .disk_gib(500)
//!     .lima_home("/Users/me/.lima")
//!     .build(Arc::new(SystemRunner::new()));
//!
//! // Creates, starts, or leaves the VM alone depending on what limactl reports.
//! vm.ensure_running().await?;
//! assert_eq!(vm.state().await?, Some(VmState::Running));
//!
//! // Best-effort: never fails.
//! vm.teardown(Some("myk8s")).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Idempotent Lifecycle**: ensure-running reuses, restarts, or creates the VM
//! - **Bounded Readiness**: every wait is a fixed number of polls at a fixed interval
//! - **Command Seam**: [`CommandRunner`] abstracts process execution so callers can be tested
//! - **Builder Pattern**: Ergonomic configuration with [`VmBuilder`]

mod builder;
mod config;
mod error;
mod lima;
mod poll;
mod runner;

pub use builder::VmBuilder;
pub use config::VmConfig;
pub use error::{Result, VmError};
pub use lima::{parse_listing, EnsureOutcome, LimaInstance, LimaVm, VmState};
pub use poll::{poll_until, Poll, PollOutcome};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};

#[cfg(any(test, feature = "test-support"))]
pub use runner::FakeRunner;
