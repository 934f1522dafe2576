//! The provisioning environment: one configured graph plus its context.

use crate::config::Settings;
use crate::context::Context;
use crate::dag::{RunReport, StepGraph};
use crate::error::Result;
use crate::health::HealthReport;
use crate::paths::{Paths, Platform};
use crate::steps::provisioning_graph;
use kindling_vm::{CommandRunner, SystemRunner};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RULE: &str = "=====================================================================";

/// Values exported by a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outputs {
    pub cluster_name: String,
    pub kubeconfig_path: PathBuf,
}

/// Result of [`Environment::up`].
#[derive(Debug, Clone)]
pub struct UpReport {
    pub run: RunReport,
    pub outputs: Outputs,
    /// Health report from the verification step.
    pub verification: Option<HealthReport>,
}

/// A local Kubernetes environment: VM, Docker context and kind cluster.
pub struct Environment {
    ctx: Arc<Context>,
    graph: StepGraph<Context>,
}

impl Environment {
    /// Create an environment executing through `runner`.
    ///
    /// # Errors
    /// Returns an error if the settings are invalid.
    pub fn new(
        settings: Settings,
        paths: Paths,
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        settings.validate()?;
        let graph = provisioning_graph()?;
        Ok(Self {
            ctx: Arc::new(Context::new(settings, paths, platform, runner)),
            graph,
        })
    }

    /// Create an environment for this host, running real commands.
    pub fn for_host(settings: Settings, workdir: Option<&Path>) -> Result<Self> {
        let paths = Paths::from_env(&settings, workdir)?;
        Self::new(settings, paths, Platform::current(), Arc::new(SystemRunner::new()))
    }

    /// Shared step context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Values a successful run exports.
    pub fn outputs(&self) -> Outputs {
        Outputs {
            cluster_name: self.ctx.settings.cluster_name.clone(),
            kubeconfig_path: self.ctx.paths.kubeconfig.clone(),
        }
    }

    /// Provision everything, skipping whatever already exists.
    ///
    /// # Errors
    /// [`CoreError::StepsFailed`](crate::CoreError::StepsFailed) naming every
    /// failed step. Steps downstream of a failure are skipped; unrelated
    /// branches still run.
    pub async fn up(&self) -> Result<UpReport> {
        let settings = &self.ctx.settings;
        tracing::info!(
            vm = %settings.vm_name,
            cluster = %settings.cluster_name,
            cpus = settings.cpus,
            memory_gib = settings.memory_gib,
            disk_gib = settings.disk_gib,
            "Provisioning environment"
        );

        let run = self.graph.run(self.ctx.clone()).await.into_result()?;
        Ok(UpReport {
            run,
            outputs: self.outputs(),
            verification: self.ctx.take_verification(),
        })
    }

    /// Remove everything `up` created, in reverse order. Never fails.
    pub async fn down(&self) {
        tracing::info!(
            vm = %self.ctx.settings.vm_name,
            cluster = %self.ctx.settings.cluster_name,
            "Tearing down environment"
        );
        self.graph.teardown(&self.ctx).await;
        tracing::info!("Teardown complete");
    }

    /// Run only the health checks.
    pub async fn verify(&self) -> HealthReport {
        self.ctx.health().run().await
    }

    /// Steps grouped into concurrent waves, without running anything.
    pub fn plan(&self) -> Vec<Vec<&'static str>> {
        self.graph.waves()
    }

    /// Closing message telling the user how to reach the cluster.
    pub fn summary_banner(&self) -> String {
        let settings = &self.ctx.settings;
        let paths = &self.ctx.paths;
        format!(
            "{RULE}
🎉 Setup complete! Your Kubernetes cluster is ready to use.

To use kubectl with this cluster, do ONE of the following:
  1. In a new terminal: source ~/.bashrc  (or ~/.zshrc)
  2. In this terminal: {export}
  3. Run the helper script: source {script}

Cluster Name: {cluster}
Lima VM Name: {vm}
{RULE}",
            export = paths.kubeconfig_export(),
            script = paths.activation_script.display(),
            cluster = settings.cluster_name,
            vm = settings.vm_name,
        )
    }
}
