//! Cluster configuration: control-plane taint and the CNI.

use super::{INSTALL_CNI, TAINT_CONTROL_PLANE, WAIT_FOR_CNI};
use crate::context::Context;
use crate::dag::Step;
use crate::error::Result;
use async_trait::async_trait;

const CONTROL_PLANE_TAINT: &str = "node-role.kubernetes.io/control-plane:NoSchedule";

/// Keeps workloads off the control-plane node. Failure is only a warning.
pub struct TaintControlPlane;

#[async_trait]
impl Step<Context> for TaintControlPlane {
    fn name(&self) -> &'static str {
        TAINT_CONTROL_PLANE
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        let node = ctx.settings.control_plane_node();
        let spec = ctx
            .kubectl()
            .cmd(["taint", "nodes", node.as_str(), CONTROL_PLANE_TAINT, "--overwrite"]);
        if ctx.runner.run_best_effort(&spec).await {
            tracing::info!(node = %node, "Tainted control plane");
        } else {
            tracing::warn!(node = %node, "Failed to taint control plane");
        }
        Ok(())
    }
}

/// Applies the CNI manifest with retries.
pub struct InstallCni;

#[async_trait]
impl Step<Context> for InstallCni {
    fn name(&self) -> &'static str {
        INSTALL_CNI
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        ctx.cni().install().await
    }

    async fn delete(&self, ctx: &Context) {
        ctx.cni().uninstall().await;
    }
}

/// Waits for the CNI pods. A timeout does not fail the run.
pub struct WaitForCni;

#[async_trait]
impl Step<Context> for WaitForCni {
    fn name(&self) -> &'static str {
        WAIT_FOR_CNI
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        ctx.cni().wait_ready().await;
        Ok(())
    }
}
