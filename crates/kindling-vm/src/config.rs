//! VM sizing and location configuration.

use crate::error::{Result, VmError};
use crate::poll::Poll;
use std::path::PathBuf;
use std::time::Duration;

/// Lima template that ships a Docker engine inside the guest.
pub const DOCKER_TEMPLATE: &str = "template:docker";

/// Readiness polling used for both start and stop: 30 attempts, 2 seconds apart.
pub const DEFAULT_READINESS: Poll = Poll::new(Duration::from_secs(2), 30);

/// Configuration for a single named Lima VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Instance name as known to limactl.
    pub name: String,
    /// vCPU count (default: 8).
    pub cpus: u32,
    /// Memory in GiB (default: 16).
    pub memory_gib: u32,
    /// Disk in GiB (default: 500).
    pub disk_gib: u32,
    /// Lima template used on first creation.
    pub template: String,
    /// Hypervisor backend (`vz` on Apple silicon).
    pub vm_type: String,
    /// Path or name of the limactl binary.
    pub limactl: PathBuf,
    /// Lima state directory, normally `~/.lima`.
    pub lima_home: PathBuf,
    /// Polling used while waiting for Running / Stopped.
    pub readiness: Poll,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            name: "myk8s-docker".to_string(),
            cpus: 8,
            memory_gib: 16,
            disk_gib: 500,
            template: DOCKER_TEMPLATE.to_string(),
            vm_type: "vz".to_string(),
            limactl: PathBuf::from("limactl"),
            lima_home: PathBuf::from(".lima"),
            readiness: DEFAULT_READINESS,
        }
    }
}

impl VmConfig {
    /// Directory Lima keeps for this instance.
    pub fn instance_dir(&self) -> PathBuf {
        self.lima_home.join(&self.name)
    }

    /// Directory holding the forwarded sockets.
    pub fn socket_dir(&self) -> PathBuf {
        self.instance_dir().join("sock")
    }

    /// Forwarded Docker engine socket on the host.
    pub fn docker_socket(&self) -> PathBuf {
        self.socket_dir().join("docker.sock")
    }

    /// `DOCKER_HOST` value pointing at the VM's engine.
    pub fn docker_host(&self) -> String {
        format!("unix://{}", self.docker_socket().display())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(VmError::Config("VM name is required".into()));
        }
        if self.cpus == 0 {
            return Err(VmError::Config("cpus must be > 0".into()));
        }
        if self.memory_gib == 0 {
            return Err(VmError::Config("memory must be > 0".into()));
        }
        if self.disk_gib == 0 {
            return Err(VmError::Config("disk must be > 0".into()));
        }
        if self.readiness.attempts == 0 {
            return Err(VmError::Config("readiness attempts must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.name, "myk8s-docker");
        assert_eq!(config.cpus, 8);
        assert_eq!(config.memory_gib, 16);
        assert_eq!(config.disk_gib, 500);
        assert_eq!(config.readiness.ceiling(), Duration::from_secs(60));
    }

    #[test]
    fn test_socket_paths() {
        let config = VmConfig {
            name: "dev".into(),
            lima_home: PathBuf::from("/home/u/.lima"),
            ..Default::default()
        };
        assert_eq!(
            config.docker_socket(),
            PathBuf::from("/home/u/.lima/dev/sock/docker.sock")
        );
        assert_eq!(config.docker_host(), "unix:///home/u/.lima/dev/sock/docker.sock");
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = VmConfig {
            cpus: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = VmConfig {
            name: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
