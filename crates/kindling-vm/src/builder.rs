//! Builder pattern for ergonomic LimaVm configuration.

use crate::config::VmConfig;
use crate::lima::LimaVm;
use crate::poll::Poll;
use crate::runner::CommandRunner;
use std::path::PathBuf;
use std::sync::Arc;

/// Fluent builder for configuring [`LimaVm`] handles.
///
/// # Example
///
/// ```no_run
/// use kindling_vm::{SystemRunner, VmBuilder};
/// use std::sync::Arc;
///
/// let vm = VmBuilder::new("dev")
///     .cpus(4)
///     .memory_gib(8)
///     .build(Arc::new(SystemRunner::new()));
/// ```
#[derive(Debug, Clone)]
pub struct VmBuilder {
    config: VmConfig,
}

impl VmBuilder {
    /// Create a new builder for the named VM with default sizing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: VmConfig {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Set the number of virtual CPUs.
    pub fn cpus(mut self, count: u32) -> Self {
        self.config.cpus = count;
        self
    }

    /// Set the memory size in GiB.
    pub fn memory_gib(mut self, gib: u32) -> Self {
        self.config.memory_gib = gib;
        self
    }

    /// Set the disk size in GiB.
    pub fn disk_gib(mut self, gib: u32) -> Self {
        self.config.disk_gib = gib;
        self
    }

    /// Set the Lima template used on first creation.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.config.template = template.into();
        self
    }

    /// Set the hypervisor backend.
    pub fn vm_type(mut self, vm_type: impl Into<String>) -> Self {
        self.config.vm_type = vm_type.into();
        self
    }

    /// Set the limactl binary.
    pub fn limactl(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.limactl = path.into();
        self
    }

    /// Set the Lima state directory (`~/.lima`).
    pub fn lima_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.lima_home = path.into();
        self
    }

    /// Override the start/stop readiness polling.
    pub fn readiness(mut self, poll: Poll) -> Self {
        self.config.readiness = poll;
        self
    }

    /// Build and return the configuration without a handle.
    pub fn build_config(self) -> VmConfig {
        self.config
    }

    /// Build a handle that drives the VM through `runner`.
    pub fn build(self, runner: Arc<dyn CommandRunner>) -> LimaVm {
        LimaVm::new(self.config, runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builder_sizing() {
        let config = VmBuilder::new("dev")
            .cpus(4)
            .memory_gib(8)
            .disk_gib(100)
            .build_config();

        assert_eq!(config.name, "dev");
        assert_eq!(config.cpus, 4);
        assert_eq!(config.memory_gib, 8);
        assert_eq!(config.disk_gib, 100);
        assert_eq!(config.vm_type, "vz");
    }

    #[test]
    fn test_builder_readiness() {
        let config = VmBuilder::new("dev")
            .readiness(Poll::new(Duration::from_millis(10), 3))
            .build_config();

        assert_eq!(config.readiness.attempts, 3);
        assert_eq!(config.readiness.ceiling(), Duration::from_millis(30));
    }
}
