//! Host-side preparation: mount directories and the topology descriptor.

use super::{CREATE_DIRS, CREATE_KIND_CONFIG};
use crate::context::Context;
use crate::dag::Step;
use crate::error::Result;
use crate::topology::KindConfig;
use async_trait::async_trait;
use std::io::ErrorKind;

/// Creates the per-node mount directories. They hold node data, so they are
/// never deleted.
pub struct CreateDirs;

#[async_trait]
impl Step<Context> for CreateDirs {
    fn name(&self) -> &'static str {
        CREATE_DIRS
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        for dir in ctx.paths.mount_dirs() {
            tokio::fs::create_dir_all(dir).await?;
            tracing::debug!(dir = %dir.display(), "Mount directory ready");
        }
        Ok(())
    }
}

/// Writes the kind topology descriptor.
pub struct CreateKindConfig;

#[async_trait]
impl Step<Context> for CreateKindConfig {
    fn name(&self) -> &'static str {
        CREATE_KIND_CONFIG
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        let config = KindConfig::from_paths(&ctx.paths);
        let path = &ctx.paths.kind_config;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, config.to_yaml()?).await?;
        tracing::info!(path = %path.display(), nodes = config.node_count(), "Wrote cluster topology");
        Ok(())
    }

    async fn delete(&self, ctx: &Context) {
        let path = &ctx.paths.kind_config;
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::info!(path = %path.display(), "Removed cluster topology"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove cluster topology"),
        }
    }
}
