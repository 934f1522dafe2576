//! Command builders for kubectl and kind.

use kindling_vm::CommandSpec;
use std::path::{Path, PathBuf};

/// kubectl bound to one credential file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kubectl {
    kubeconfig: PathBuf,
}

impl Kubectl {
    /// Create a builder that passes `KUBECONFIG=<kubeconfig>` to every call.
    pub fn new(kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            kubeconfig: kubeconfig.into(),
        }
    }

    /// Credential file in use.
    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }

    /// `kubectl <args>` with `KUBECONFIG` set.
    pub fn cmd<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("kubectl")
            .args(args)
            .env("KUBECONFIG", self.kubeconfig.to_string_lossy())
    }

    /// `kubectl -n <namespace> get pods -l <selector> --no-headers`.
    pub fn pods_by_label(&self, namespace: &str, selector: &str) -> CommandSpec {
        self.cmd(["-n", namespace, "get", "pods", "-l", selector, "--no-headers"])
    }
}

/// `kind <args>` against the engine at `docker_host`.
pub fn kind<I, S>(docker_host: &str, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("kind")
        .args(args)
        .env("DOCKER_HOST", docker_host)
}

/// `docker <args>` against the engine at `docker_host`.
pub fn docker<I, S>(docker_host: &str, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("docker")
        .args(args)
        .env("DOCKER_HOST", docker_host)
}
