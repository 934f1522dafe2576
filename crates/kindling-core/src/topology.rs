//! Cluster topology descriptor consumed by `kind create cluster --config`.

use crate::error::Result;
use crate::paths::{Paths, NODE_MOUNT_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level kind `Cluster` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindConfig {
    pub kind: String,
    pub api_version: String,
    pub networking: Networking,
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Networking {
    /// The built-in kindnet CNI is disabled; Calico is installed instead.
    #[serde(rename = "disableDefaultCNI")]
    pub disable_default_cni: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub role: NodeRole,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_mounts: Vec<Mount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
}

impl NodeSpec {
    fn with_mount(role: NodeRole, host_path: &Path) -> Self {
        Self {
            role,
            extra_mounts: vec![Mount {
                host_path: host_path.to_path_buf(),
                container_path: PathBuf::from(NODE_MOUNT_PATH),
            }],
        }
    }
}

impl KindConfig {
    /// One control-plane node plus one worker per worker mount directory.
    pub fn from_paths(paths: &Paths) -> Self {
        let mut nodes = vec![NodeSpec::with_mount(NodeRole::ControlPlane, &paths.control_mount)];
        nodes.extend(
            paths
                .worker_mounts
                .iter()
                .map(|dir| NodeSpec::with_mount(NodeRole::Worker, dir)),
        );
        Self {
            kind: "Cluster".to_string(),
            api_version: "kind.x-k8s.io/v1alpha4".to_string(),
            networking: Networking {
                disable_default_cni: true,
            },
            nodes,
        }
    }

    /// Total node count.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
