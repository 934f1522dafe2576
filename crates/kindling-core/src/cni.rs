//! Calico CNI installation and readiness.

use crate::error::{CoreError, Result};
use crate::kube::Kubectl;
use kindling_vm::{poll_until, CommandRunner, Poll, PollOutcome};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Manifest applied to install the CNI.
pub const CALICO_MANIFEST: &str =
    "https://raw.githubusercontent.com/projectcalico/calico/v3.28.2/manifests/calico.yaml";

/// Namespace holding the CNI and DNS workloads.
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Label selecting the CNI daemon pods.
pub const CNI_SELECTOR: &str = "k8s-app=calico-node";

/// Label selecting the cluster DNS pods.
pub const DNS_SELECTOR: &str = "k8s-app=kube-dns";

/// Overlay settings applied to the calico-node daemonset after install.
const OVERLAY_ENV: [&str; 2] = ["CALICO_IPV4POOL_VXLAN=Always", "CALICO_IPV4POOL_IPIP=Off"];

/// Manifest apply schedule: 3 attempts, 5s apart.
pub const APPLY_RETRY: Poll = Poll::new(Duration::from_secs(5), 3);

/// Overall readiness budget.
pub const READY_TIMEOUT: Duration = Duration::from_secs(120);

/// Pause between readiness probes.
pub const READY_INTERVAL: Duration = Duration::from_secs(3);

/// Per-probe bound for `kubectl wait`, so the outer loop stays responsive.
const WAIT_PROBE_TIMEOUT: &str = "--timeout=3s";

/// Lists each pod with its container ready flags, one pod per line.
const READY_FLAGS_JSONPATH: &str =
    "jsonpath={range .items[*]}{.metadata.name}{\" \"}{.status.containerStatuses[*].ready}{\"\\n\"}{end}";

/// Count pods whose every container reports ready.
///
/// Input is the output of [`READY_FLAGS_JSONPATH`]: `<pod> <flag> <flag>...`
/// per line. A pod with no container statuses yet is not ready.
///
/// Returns `(ready, total)`.
pub fn count_ready_pods(stdout: &str) -> (usize, usize) {
    let mut ready = 0;
    let mut total = 0;
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        total += 1;
        let mut flags = line.split_whitespace().skip(1).peekable();
        if flags.peek().is_some() && flags.all(|f| f == "true") {
            ready += 1;
        }
    }
    (ready, total)
}

/// CNI operations against one cluster.
pub struct Cni {
    kubectl: Kubectl,
    runner: Arc<dyn CommandRunner>,
    apply_retry: Poll,
    readiness: Poll,
}

impl Cni {
    /// Create with the default apply and readiness schedules.
    pub fn new(kubectl: Kubectl, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            kubectl,
            runner,
            apply_retry: APPLY_RETRY,
            readiness: Poll::from_timeout(READY_TIMEOUT, READY_INTERVAL),
        }
    }

    /// Readiness schedule in use.
    pub fn readiness(&self) -> Poll {
        self.readiness
    }

    /// Apply the manifest, then tune the overlay mode.
    ///
    /// # Errors
    /// [`CoreError::CniApply`] when every apply attempt failed. Overlay
    /// tuning failures are only logged.
    pub async fn install(&self) -> Result<()> {
        let apply = self.kubectl.cmd(["apply", "-f", CALICO_MANIFEST]);
        let last_error = Mutex::new(String::new());

        tracing::info!(manifest = CALICO_MANIFEST, "Installing CNI");
        let outcome = poll_until(self.apply_retry, "cni apply", |_| {
            let (apply, last_error) = (&apply, &last_error);
            async move {
                let out = self.runner.run(apply).await.map_err(|e| e.to_string())?;
                if out.success() {
                    return Ok(Some(()));
                }
                let stderr = out.stderr.trim().to_string();
                *last_error.lock().unwrap_or_else(|e| e.into_inner()) = stderr.clone();
                Err::<Option<()>, String>(stderr)
            }
        })
        .await;

        if let PollOutcome::Exhausted { attempts } = outcome {
            return Err(CoreError::CniApply {
                attempts,
                detail: last_error.into_inner().unwrap_or_else(|e| e.into_inner()),
            });
        }

        for setting in OVERLAY_ENV {
            let spec = self
                .kubectl
                .cmd(["set", "env", "-n", SYSTEM_NAMESPACE, "ds/calico-node", setting]);
            if !self.runner.run_best_effort(&spec).await {
                tracing::warn!(setting, "Failed to tune CNI overlay");
            }
        }
        Ok(())
    }

    /// Poll until every CNI pod is ready.
    ///
    /// Returns whether readiness was reached. A timeout is only a warning:
    /// the current pod status is logged and the caller carries on.
    pub async fn wait_ready(&self) -> bool {
        let wait = self.kubectl.cmd([
            "wait",
            "--for=condition=ready",
            "pods",
            "-l",
            CNI_SELECTOR,
            "-n",
            SYSTEM_NAMESPACE,
            WAIT_PROBE_TIMEOUT,
        ]);
        let flags = self.kubectl.cmd([
            "-n",
            SYSTEM_NAMESPACE,
            "get",
            "pods",
            "-l",
            CNI_SELECTOR,
            "-o",
            READY_FLAGS_JSONPATH,
        ]);

        tracing::info!(attempts = self.readiness.attempts, "Waiting for CNI pods to be ready");
        let outcome = poll_until(self.readiness, "cni ready", |_| {
            let (wait, flags) = (&wait, &flags);
            async move {
                if self.runner.run(wait).await?.success() {
                    tracing::info!("All CNI pods are ready");
                    return Ok::<_, CoreError>(Some(()));
                }
                let out = self.runner.run_checked(flags).await?;
                let (ready, total) = count_ready_pods(&out.stdout);
                if total >= 1 && ready == total {
                    tracing::info!(ready, total, "All CNI pods are ready");
                    return Ok(Some(()));
                }
                tracing::info!(ready, total, "Waiting for CNI pods");
                Ok(None)
            }
        })
        .await;

        if outcome.is_ready() {
            return true;
        }

        tracing::warn!(
            timeout_secs = READY_TIMEOUT.as_secs(),
            "Timed out waiting for CNI pods to be ready"
        );
        let status = self
            .kubectl
            .cmd(["-n", SYSTEM_NAMESPACE, "get", "pods", "-l", CNI_SELECTOR]);
        if let Ok(out) = self.runner.run(&status).await {
            tracing::warn!(pods = %out.stdout.trim(), "Current CNI pod status");
        }
        false
    }

    /// Remove the manifest. Never fails.
    pub async fn uninstall(&self) {
        tracing::info!("Removing CNI");
        let spec = self
            .kubectl
            .cmd(["delete", "-f", CALICO_MANIFEST, "--ignore-not-found=true"]);
        self.runner.run_best_effort(&spec).await;
    }
}
