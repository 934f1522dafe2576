//! kind cluster step.

use super::KIND_CLUSTER;
use crate::context::Context;
use crate::dag::Step;
use crate::error::Result;
use async_trait::async_trait;

/// Creates the kind cluster inside the VM's engine unless it already exists.
pub struct KindCluster;

#[async_trait]
impl Step<Context> for KindCluster {
    fn name(&self) -> &'static str {
        KIND_CLUSTER
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        ctx.cluster().ensure(&ctx.paths.kind_config).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context) {
        ctx.cluster().delete().await;
    }
}
