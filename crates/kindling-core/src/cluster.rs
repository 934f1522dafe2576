//! kind cluster lifecycle inside the VM's Docker engine.

use crate::error::{CoreError, Result};
use crate::kube::kind;
use kindling_vm::CommandRunner;
use std::path::Path;
use std::sync::Arc;

/// What [`ClusterManager::ensure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOutcome {
    /// A cluster with this name already existed
    AlreadyPresent,
    /// The cluster was created
    Created,
}

/// Handle to one named kind cluster, scoped to a Docker socket.
pub struct ClusterManager {
    name: String,
    docker_host: String,
    runner: Arc<dyn CommandRunner>,
}

/// Parse `kind get clusters` output into names.
///
/// kind prints "No kind clusters found." on stderr when empty, so stdout is
/// one name per line.
pub fn parse_clusters(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

impl ClusterManager {
    /// Create a handle for cluster `name` on the engine at `docker_host`.
    pub fn new(
        name: impl Into<String>,
        docker_host: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            docker_host: docker_host.into(),
            runner,
        }
    }

    /// Cluster name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of every cluster on this engine.
    pub async fn list(&self) -> Result<Vec<String>> {
        let spec = kind(&self.docker_host, ["get", "clusters"]);
        let out = self.runner.run_checked(&spec).await?;
        Ok(parse_clusters(&out.stdout))
    }

    /// Check if the cluster exists.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.list().await?.iter().any(|c| c == &self.name))
    }

    /// Create the cluster from `config` unless it already exists.
    ///
    /// # Errors
    /// [`CoreError::ClusterMissing`] if the cluster is still not listed after
    /// the creation attempt.
    pub async fn ensure(&self, config: &Path) -> Result<ClusterOutcome> {
        if self.exists().await? {
            tracing::info!(cluster = %self.name, "Cluster already exists, skipping creation");
            return Ok(ClusterOutcome::AlreadyPresent);
        }

        tracing::info!(cluster = %self.name, config = %config.display(), "Creating kind cluster");
        let spec = kind(
            &self.docker_host,
            [
                "create".to_string(),
                "cluster".to_string(),
                "--name".to_string(),
                self.name.clone(),
                "--config".to_string(),
                config.to_string_lossy().into_owned(),
            ],
        );
        let out = self.runner.run(&spec).await?;
        if !out.success() {
            tracing::warn!(cluster = %self.name, exit_code = out.exit_code, "kind create cluster failed");
        }

        if !self.exists().await? {
            return Err(CoreError::ClusterMissing {
                name: self.name.clone(),
                detail: out.stderr.trim().to_string(),
            });
        }
        tracing::info!(cluster = %self.name, "Cluster created");
        Ok(ClusterOutcome::Created)
    }

    /// Delete the cluster if present. Never fails.
    pub async fn delete(&self) {
        match self.exists().await {
            Ok(true) => {
                tracing::info!(cluster = %self.name, "Deleting kind cluster");
                let spec = kind(&self.docker_host, ["delete", "cluster", "--name", self.name.as_str()]);
                self.runner.run_best_effort(&spec).await;
            }
            Ok(false) => tracing::info!(cluster = %self.name, "Cluster not found, skipping deletion"),
            Err(e) => tracing::debug!(cluster = %self.name, error = %e, "Cluster listing failed, skipping deletion"),
        }
    }

    /// Write the cluster's credentials to `path`.
    pub async fn export_kubeconfig(&self, path: &Path) -> Result<()> {
        let spec = kind(
            &self.docker_host,
            [
                "export".to_string(),
                "kubeconfig".to_string(),
                "--name".to_string(),
                self.name.clone(),
                "--kubeconfig".to_string(),
                path.to_string_lossy().into_owned(),
            ],
        );
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindling_vm::{CommandOutput, FakeRunner};

    const HOST: &str = "unix:///h/.lima/dev/sock/docker.sock";

    fn manager(fake: Arc<FakeRunner>) -> ClusterManager {
        ClusterManager::new("myk8s", HOST, fake)
    }

    #[test]
    fn test_parse_clusters() {
        assert_eq!(parse_clusters("kind\nmyk8s\n\n"), vec!["kind", "myk8s"]);
        assert!(parse_clusters("").is_empty());
    }

    #[tokio::test]
    async fn test_ensure_skips_existing_cluster() {
        let fake = Arc::new(FakeRunner::new().on("kind get clusters", vec![CommandOutput::ok("myk8s\n")]));
        let outcome = manager(fake.clone()).ensure(Path::new("kind-config.yaml")).await.unwrap();

        assert_eq!(outcome, ClusterOutcome::AlreadyPresent);
        assert_eq!(fake.count("kind create"), 0);
        assert_eq!(fake.calls()[0].env_value("DOCKER_HOST"), Some(HOST));
    }

    #[tokio::test]
    async fn test_ensure_creates_missing_cluster() {
        let fake = Arc::new(FakeRunner::new().on(
            "kind get clusters",
            vec![CommandOutput::ok("other\n"), CommandOutput::ok("other\nmyk8s\n")],
        ));
        let outcome = manager(fake.clone()).ensure(Path::new("/w/kind-config.yaml")).await.unwrap();

        assert_eq!(outcome, ClusterOutcome::Created);
        assert_eq!(
            fake.lines(),
            vec![
                "kind get clusters",
                "kind create cluster --name myk8s --config /w/kind-config.yaml",
                "kind get clusters",
            ]
        );
    }

    #[tokio::test]
    async fn test_ensure_fails_when_still_absent() {
        let fake = Arc::new(
            FakeRunner::new()
                .on("kind create", vec![CommandOutput::failed(1, "node image pull failed")]),
        );
        let err = manager(fake).ensure(Path::new("c.yaml")).await.unwrap_err();
        match err {
            CoreError::ClusterMissing { name, detail } => {
                assert_eq!(name, "myk8s");
                assert_eq!(detail, "node image pull failed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_delete_only_when_present() {
        let fake = Arc::new(FakeRunner::new());
        manager(fake.clone()).delete().await;
        assert_eq!(fake.count("kind delete"), 0);

        let fake = Arc::new(FakeRunner::new().on("kind get clusters", vec![CommandOutput::ok("myk8s\n")]));
        manager(fake.clone()).delete().await;
        assert_eq!(fake.count("kind delete cluster --name myk8s"), 1);
    }
}
