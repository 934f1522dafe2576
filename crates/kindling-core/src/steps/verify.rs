//! Final health verification step.

use super::VERIFY_CLUSTER;
use crate::context::Context;
use crate::dag::Step;
use crate::error::Result;
use crate::health::CheckStatus;
use async_trait::async_trait;

/// Runs the health checks and keeps the report for the caller.
///
/// Purely observational: the step succeeds whatever the checks say.
pub struct VerifyCluster;

#[async_trait]
impl Step<Context> for VerifyCluster {
    fn name(&self) -> &'static str {
        VERIFY_CLUSTER
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        let report = ctx.health().run().await;
        tracing::info!(
            passed = report.count(CheckStatus::Pass),
            total = report.checks.len(),
            "Cluster verification finished"
        );
        ctx.record_verification(report);
        Ok(())
    }
}
