//! Shared, read-only inputs every pipeline step works from.

use crate::cluster::ClusterManager;
use crate::cni::Cni;
use crate::config::Settings;
use crate::health::{HealthChecker, HealthReport};
use crate::kube::Kubectl;
use crate::paths::{Paths, Platform};
use crate::profile::ProfileRegistry;
use kindling_vm::{CommandRunner, LimaVm, VmBuilder};
use std::sync::{Arc, Mutex};

/// Everything a step needs. Steps keep no state of their own; whatever they
/// create lives outside the process and is re-queried on every run.
pub struct Context {
    pub settings: Settings,
    pub paths: Paths,
    pub platform: Platform,
    pub runner: Arc<dyn CommandRunner>,
    verification: Mutex<Option<HealthReport>>,
}

impl Context {
    /// Create a context from resolved settings and paths.
    pub fn new(
        settings: Settings,
        paths: Paths,
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            settings,
            paths,
            platform,
            runner,
            verification: Mutex::new(None),
        }
    }

    /// Handle to the configured VM.
    pub fn vm(&self) -> LimaVm {
        VmBuilder::new(self.settings.vm_name.clone())
            .cpus(self.settings.cpus)
            .memory_gib(self.settings.memory_gib)
            .disk_gib(self.settings.disk_gib)
            .lima_home(self.paths.lima_home.clone())
            .build(self.runner.clone())
    }

    /// `DOCKER_HOST` for the VM's engine.
    pub fn docker_host(&self) -> String {
        self.vm().docker_host()
    }

    /// Handle to the configured cluster.
    pub fn cluster(&self) -> ClusterManager {
        ClusterManager::new(
            self.settings.cluster_name.clone(),
            self.docker_host(),
            self.runner.clone(),
        )
    }

    /// kubectl bound to the cluster-scoped credential file.
    pub fn kubectl(&self) -> Kubectl {
        Kubectl::new(self.paths.kubeconfig.clone())
    }

    /// CNI operations for the cluster.
    pub fn cni(&self) -> Cni {
        Cni::new(self.kubectl(), self.runner.clone())
    }

    /// Shell startup files that receive the `KUBECONFIG` export.
    pub fn profiles(&self) -> ProfileRegistry {
        ProfileRegistry::new(self.paths.shell_profiles.clone())
    }

    /// Health checks for the whole environment.
    pub fn health(&self) -> HealthChecker {
        HealthChecker::new(
            self.vm(),
            self.cluster(),
            self.kubectl(),
            self.runner.clone(),
            self.paths.activation_script.clone(),
        )
    }

    /// Keep the report produced by the verification step for the caller.
    pub(crate) fn record_verification(&self, report: HealthReport) {
        *self.verification.lock().unwrap_or_else(|e| e.into_inner()) = Some(report);
    }

    /// Take the report produced by the verification step, if it ran.
    pub fn take_verification(&self) -> Option<HealthReport> {
        self.verification
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}
