//! LimaVm type - main interface for managing the Lima VM.

use crate::config::VmConfig;
use crate::error::{Result, VmError};
use crate::poll::{poll_until, PollOutcome};
use crate::runner::{CommandRunner, CommandSpec};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// State of a Lima instance as reported by `limactl list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum VmState {
    /// VM is running
    Running,
    /// VM exists but is stopped
    Stopped,
    /// Lima could not determine the instance health
    Broken,
    /// Any status this crate does not know about
    #[serde(other)]
    Unknown,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmState::Running => write!(f, "Running"),
            VmState::Stopped => write!(f, "Stopped"),
            VmState::Broken => write!(f, "Broken"),
            VmState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One entry of `limactl list --json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimaInstance {
    /// Instance name.
    pub name: String,
    /// Current status.
    pub status: VmState,
    /// Instance directory, when reported.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Parse `limactl list --json` output.
///
/// limactl prints one JSON object per line; older releases printed a single
/// array. Both are accepted. Empty output means "no instances".
pub fn parse_listing(stdout: &str) -> Result<Vec<LimaInstance>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| VmError::Listing(e.to_string()));
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| VmError::Listing(format!("{e}: {line}"))))
        .collect()
}

/// What [`LimaVm::ensure_running`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// VM was already running; nothing was executed
    AlreadyRunning,
    /// VM existed but was stopped and has been started
    Started,
    /// VM did not exist and has been created
    Created,
}

/// Handle to a named Lima VM.
///
/// The handle holds no VM state of its own: every call re-queries limactl,
/// which is what makes the operations safe to repeat.
pub struct LimaVm {
    config: VmConfig,
    runner: Arc<dyn CommandRunner>,
}

impl LimaVm {
    /// Create a handle for `config`, executing through `runner`.
    pub fn new(config: VmConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Get the configuration of this VM.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Get the VM name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// `DOCKER_HOST` value for the VM's engine.
    pub fn docker_host(&self) -> String {
        self.config.docker_host()
    }

    fn limactl(&self) -> CommandSpec {
        CommandSpec::new(self.config.limactl.to_string_lossy())
    }

    /// List every Lima instance on the host.
    pub async fn list(&self) -> Result<Vec<LimaInstance>> {
        let spec = self.limactl().args(["list", "--json"]);
        let out = self.runner.run_checked(&spec).await?;
        parse_listing(&out.stdout)
    }

    /// Current state of this VM, or `None` if it does not exist.
    pub async fn state(&self) -> Result<Option<VmState>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|i| i.name == self.config.name)
            .map(|i| i.status))
    }

    /// Ensure exactly one VM with the configured name is running.
    ///
    /// This will:
    /// 1. Query the listing; a Running entry means nothing to do
    /// 2. Start a stopped entry, or create a fresh VM if absent
    /// 3. Poll until the listing reports Running
    ///
    /// # Errors
    /// Returns [`VmError::NotReady`] if the VM is not Running within the
    /// readiness ceiling, or the command error if start/create fails.
    pub async fn ensure_running(&self) -> Result<EnsureOutcome> {
        self.config.validate()?;
        let name = &self.config.name;

        let outcome = match self.state().await? {
            Some(VmState::Running) => {
                tracing::info!(vm = %name, "VM already running, skipping creation");
                return Ok(EnsureOutcome::AlreadyRunning);
            }
            Some(state) => {
                tracing::info!(vm = %name, %state, "Starting existing VM");
                let spec = self.limactl().args(["start", "--tty=false", name.as_str()]);
                self.runner
                    .run_checked(&spec)
                    .await
                    .map_err(|e| start_error(name, e))?;
                EnsureOutcome::Started
            }
            None => {
                tracing::info!(
                    vm = %name,
                    cpus = self.config.cpus,
                    memory_gib = self.config.memory_gib,
                    disk_gib = self.config.disk_gib,
                    "Creating VM"
                );
                let spec = self.limactl().args([
                    "start".to_string(),
                    "--tty=false".to_string(),
                    "--name".to_string(),
                    name.clone(),
                    self.config.template.clone(),
                    "--cpus".to_string(),
                    self.config.cpus.to_string(),
                    "--memory".to_string(),
                    self.config.memory_gib.to_string(),
                    "--disk".to_string(),
                    self.config.disk_gib.to_string(),
                    "--vm-type".to_string(),
                    self.config.vm_type.clone(),
                ]);
                self.runner
                    .run_checked(&spec)
                    .await
                    .map_err(|e| start_error(name, e))?;
                EnsureOutcome::Created
            }
        };

        self.wait_for(VmState::Running).await?;
        tracing::info!(vm = %name, ?outcome, "VM is running");
        Ok(outcome)
    }

    /// Poll the listing until this VM reports `expected`.
    ///
    /// A VM that is absent counts as Stopped.
    pub async fn wait_for(&self, expected: VmState) -> Result<()> {
        let poll = self.config.readiness;
        let label = format!("vm {} {}", self.config.name, expected);

        let outcome = poll_until(poll, &label, |_| async move {
            let state = self.state().await?.unwrap_or(VmState::Stopped);
            Ok::<_, VmError>((state == expected).then_some(()))
        })
        .await;

        match outcome {
            PollOutcome::Ready { .. } => Ok(()),
            PollOutcome::Exhausted { attempts } => Err(VmError::NotReady {
                name: self.config.name.clone(),
                expected: expected.to_string(),
                attempts,
                ceiling: poll.ceiling(),
            }),
        }
    }

    /// Remove the VM and everything it left behind. Never fails.
    ///
    /// This will:
    /// 1. Delete `cluster` from the VM's engine, if given
    /// 2. Stop the VM and wait for it to report Stopped
    /// 3. Force-delete the VM
    /// 4. Remove leftover forwarded sockets
    pub async fn teardown(&self, cluster: Option<&str>) {
        let name = &self.config.name;
        tracing::info!(vm = %name, "Tearing down VM");

        if let Some(cluster) = cluster {
            let spec = CommandSpec::new("kind")
                .args(["delete", "cluster", "--name", cluster])
                .env("DOCKER_HOST", self.docker_host());
            self.runner.run_best_effort(&spec).await;
        }

        let stop = self.limactl().args(["stop", name.as_str()]);
        if self.runner.run_best_effort(&stop).await {
            if let Err(e) = self.wait_for(VmState::Stopped).await {
                tracing::warn!(vm = %name, error = %e, "VM did not stop cleanly, forcing delete");
            }
        }

        let delete = self.limactl().args(["delete", "--force", name.as_str()]);
        self.runner.run_best_effort(&delete).await;

        let removed = remove_dir_entries(self.config.socket_dir()).await;
        tracing::info!(vm = %name, sockets_removed = removed, "VM cleanup completed");
    }
}

fn start_error(name: &str, e: VmError) -> VmError {
    tracing::error!(vm = %name, error = %e, "VM start failed");
    e
}

/// Remove every entry of `dir`, ignoring failures. Returns how many went.
async fn remove_dir_entries(dir: PathBuf) -> usize {
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let result = match entry.file_type().await {
            Ok(ft) if ft.is_dir() => tokio::fs::remove_dir_all(&path).await,
            _ => tokio::fs::remove_file(&path).await,
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "ignored cleanup failure"),
        }
    }
    removed
}
