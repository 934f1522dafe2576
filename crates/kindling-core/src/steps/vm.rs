//! Lima VM step.

use super::LIMA_VM;
use crate::context::Context;
use crate::dag::Step;
use crate::error::Result;
use async_trait::async_trait;

/// Ensures the Lima VM is running; teardown removes it and its sockets.
pub struct LimaVmStep;

#[async_trait]
impl Step<Context> for LimaVmStep {
    fn name(&self) -> &'static str {
        LIMA_VM
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        ctx.vm().ensure_running().await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context) {
        ctx.vm().teardown(Some(ctx.settings.cluster_name.as_str())).await;
    }
}
