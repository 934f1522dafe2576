//! Every on-disk location the pipeline touches, derived once from settings.

use crate::config::Settings;
use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};

/// Number of worker nodes in the cluster topology.
pub const WORKER_COUNT: usize = 3;

/// Container path each node mounts its host directory at.
pub const NODE_MOUNT_PATH: &str = "/var/lib/disk1";

/// Host platform, which decides how the VM is registered for boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// launchd agent under `~/Library/LaunchAgents`
    MacOs,
    /// systemd user unit under `~/.config/systemd/user`
    Linux,
}

impl Platform {
    /// Platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }
}

/// Resolved filesystem layout for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// User home directory.
    pub home: PathBuf,
    /// Lima state directory (`~/.lima`).
    pub lima_home: PathBuf,
    /// Cluster topology descriptor.
    pub kind_config: PathBuf,
    /// Host directory mounted into the control-plane node.
    pub control_mount: PathBuf,
    /// Host directories mounted into each worker node.
    pub worker_mounts: Vec<PathBuf>,
    /// Boot registration file for the VM.
    pub boot_agent: PathBuf,
    /// `~/.kube`.
    pub kube_dir: PathBuf,
    /// Cluster-scoped credential file.
    pub kubeconfig: PathBuf,
    /// Default credential path clients read without `KUBECONFIG`.
    pub default_kubeconfig: PathBuf,
    /// Shell startup files that receive the `KUBECONFIG` export.
    pub shell_profiles: Vec<PathBuf>,
    /// Generated activation helper.
    pub activation_script: PathBuf,
}

impl Paths {
    /// Derive the layout from settings and explicit roots.
    ///
    /// * `home` - user home directory
    /// * `workdir` - directory the topology descriptor is written to
    /// * `mount_root` - parent of the per-node mount directories (`/tmp`)
    pub fn new(
        settings: &Settings,
        platform: Platform,
        home: impl Into<PathBuf>,
        workdir: &Path,
        mount_root: &Path,
    ) -> Self {
        let home = home.into();
        let cluster = &settings.cluster_name;
        let vm = &settings.vm_name;
        let kube_dir = home.join(".kube");

        let boot_agent = match platform {
            Platform::MacOs => home
                .join("Library")
                .join("LaunchAgents")
                .join(format!("dev.lima.{vm}.plist")),
            Platform::Linux => home
                .join(".config")
                .join("systemd")
                .join("user")
                .join(format!("lima-{vm}.service")),
        };

        Self {
            lima_home: home.join(".lima"),
            kind_config: workdir.join("kind-config.yaml"),
            control_mount: mount_root.join(format!("{cluster}-control-disk")),
            worker_mounts: (1..=WORKER_COUNT)
                .map(|i| mount_root.join(format!("{cluster}-worker{i}-disk")))
                .collect(),
            boot_agent,
            kubeconfig: kube_dir.join(format!("{cluster}-config")),
            default_kubeconfig: kube_dir.join("config"),
            kube_dir,
            shell_profiles: vec![home.join(".zshrc"), home.join(".bashrc")],
            activation_script: home.join("bin").join("use-k8s.sh"),
            home,
        }
    }

    /// Derive the layout from the user's home, the current directory, and `/tmp`.
    pub fn from_env(settings: &Settings, workdir: Option<&Path>) -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Config("cannot determine home directory".into()))?;
        let workdir = match workdir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        Ok(Self::new(
            settings,
            Platform::current(),
            home,
            &workdir,
            Path::new("/tmp"),
        ))
    }

    /// All per-node mount directories, control plane first.
    pub fn mount_dirs(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.control_mount).chain(self.worker_mounts.iter())
    }

    /// Line exported into each shell profile.
    pub fn kubeconfig_export(&self) -> String {
        format!("export KUBECONFIG={}", self.kubeconfig.display())
    }
}
