//! The provisioning steps and the graph that orders them.
//!
//! ```text
//! create-dirs ──┐
//!               ├─▶ lima-vm ─┬─▶ boot-agent ─────┐
//! create-kind-config ┘       └─▶ docker-context ─┴─▶ kind-cluster ─▶ export-kubeconfig
//!                                                                         │
//!        ┌──────────────────────┬─────────────────────┬──────────────────┘
//!        ▼                      ▼                     ▼
//!   shell-profiles     taint-control-plane      install-cni ─▶ wait-for-cni
//!        │                                                          │
//!        └─────────────────────────▶ verify-cluster ◀───────────────┘
//! ```

mod cluster;
mod credentials;
mod host;
mod network;
mod verify;
mod vm;
mod workspace;

pub use cluster::KindCluster;
pub use credentials::{render_activation_script, ExportKubeconfig, ShellProfiles};
pub use host::{render_plist, render_unit, BootAgent, DockerContext};
pub use network::{InstallCni, TaintControlPlane, WaitForCni};
pub use verify::VerifyCluster;
pub use vm::LimaVmStep;
pub use workspace::{CreateDirs, CreateKindConfig};

use crate::context::Context;
use crate::dag::StepGraph;
use crate::error::Result;

pub const CREATE_DIRS: &str = "create-dirs";
pub const CREATE_KIND_CONFIG: &str = "create-kind-config";
pub const LIMA_VM: &str = "lima-vm";
pub const BOOT_AGENT: &str = "boot-agent";
pub const DOCKER_CONTEXT: &str = "docker-context";
pub const KIND_CLUSTER: &str = "kind-cluster";
pub const EXPORT_KUBECONFIG: &str = "export-kubeconfig";
pub const SHELL_PROFILES: &str = "shell-profiles";
pub const TAINT_CONTROL_PLANE: &str = "taint-control-plane";
pub const INSTALL_CNI: &str = "install-cni";
pub const WAIT_FOR_CNI: &str = "wait-for-cni";
pub const VERIFY_CLUSTER: &str = "verify-cluster";

/// Build the full provisioning graph.
pub fn provisioning_graph() -> Result<StepGraph<Context>> {
    StepGraph::builder()
        .step(CreateDirs, &[])
        .step(CreateKindConfig, &[])
        .step(LimaVmStep, &[CREATE_DIRS, CREATE_KIND_CONFIG])
        .step(BootAgent, &[LIMA_VM])
        .step(DockerContext, &[LIMA_VM])
        .step(KindCluster, &[BOOT_AGENT, DOCKER_CONTEXT])
        .step(ExportKubeconfig, &[KIND_CLUSTER])
        .step(ShellProfiles, &[EXPORT_KUBECONFIG])
        .step(TaintControlPlane, &[EXPORT_KUBECONFIG])
        .step(InstallCni, &[EXPORT_KUBECONFIG])
        .step(WaitForCni, &[INSTALL_CNI])
        .step(VerifyCluster, &[WAIT_FOR_CNI, SHELL_PROFILES])
        .build()
}
