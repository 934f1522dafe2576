//! Point-in-time health checks for a provisioned environment.
//!
//! Eight independent checks run concurrently; each classifies only its own
//! query and none of them can stop the others. Nothing here retries.

use crate::cluster::ClusterManager;
use crate::cni::{CNI_SELECTOR, DNS_SELECTOR, SYSTEM_NAMESPACE};
use crate::kube::{docker, Kubectl};
use crate::paths::WORKER_COUNT;
use futures::future::{join_all, BoxFuture, FutureExt};
use kindling_vm::{CommandRunner, CommandSpec, LimaVm, VmState};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Classification of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

impl CheckStatus {
    fn symbol(self) -> &'static str {
        match self {
            Self::Pass => "✅",
            Self::Fail => "❌",
            Self::Warn => "⚠️",
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

pub const CHECK_VM: &str = "VM running";
pub const CHECK_RUNTIME: &str = "Runtime reachable";
pub const CHECK_CLUSTER: &str = "Cluster present";
pub const CHECK_API: &str = "API server reachable";
pub const CHECK_NODES: &str = "Nodes ready";
pub const CHECK_SYSTEM_PODS: &str = "System pods running";
pub const CHECK_CNI: &str = "CNI pods running";
pub const CHECK_DNS: &str = "DNS pods running";

/// Results of every check, in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub checks: Vec<CheckResult>,
    /// Troubleshooting lines, filled when the API server is unreachable.
    pub hints: Vec<String>,
    /// `kubectl get nodes -o wide` table, captured when the API answers.
    pub nodes: Option<String>,
    /// `kubectl -n kube-system get pods` table, captured when the API answers.
    pub system_pods: Option<String>,
}

impl HealthReport {
    /// Check if every check passed.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Pass)
    }

    /// Look up a check by name.
    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Number of checks with `status`.
    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            writeln!(f, "{} {}: {}", check.status.symbol(), check.name, check.detail)?;
        }
        for (title, table) in [
            ("Kubernetes Nodes:", &self.nodes),
            ("Kubernetes System Pods:", &self.system_pods),
        ] {
            if let Some(table) = table {
                writeln!(f)?;
                writeln!(f, "{title}")?;
                writeln!(f, "{}", table.trim_end())?;
            }
        }
        if !self.hints.is_empty() {
            writeln!(f)?;
            writeln!(f, "Troubleshooting steps:")?;
            for (i, hint) in self.hints.iter().enumerate() {
                writeln!(f, "  {}. {hint}", i + 1)?;
            }
        }
        write!(
            f,
            "{} checks: {} passed, {} failed, {} warnings",
            self.checks.len(),
            self.count(CheckStatus::Pass),
            self.count(CheckStatus::Fail),
            self.count(CheckStatus::Warn)
        )
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classify `limactl list` state.
pub fn classify_vm(name: &str, state: Option<VmState>) -> (CheckStatus, String) {
    match state {
        Some(VmState::Running) => (CheckStatus::Pass, format!("{name} is Running")),
        Some(state) => (CheckStatus::Fail, format!("{name} is {state}")),
        None => (CheckStatus::Fail, format!("{name} not found")),
    }
}

/// Classify `kubectl get nodes --no-headers` output against the expected count.
pub fn classify_nodes(stdout: &str, expected: usize) -> (CheckStatus, String) {
    let statuses: Vec<&str> = stdout
        .lines()
        .filter_map(|l| l.split_whitespace().nth(1))
        .collect();
    let total = statuses.len();
    let ready = statuses.iter().filter(|s| **s == "Ready").count();
    let detail = format!("{ready}/{total} Ready, expected {expected}");

    if total == 0 || ready < total {
        (CheckStatus::Fail, detail)
    } else if total != expected {
        (CheckStatus::Warn, detail)
    } else {
        (CheckStatus::Pass, detail)
    }
}

const FAILING_POD_STATES: [&str; 5] = [
    "CrashLoopBackOff",
    "Error",
    "ImagePullBackOff",
    "ErrImagePull",
    "Failed",
];

/// Classify `kubectl get pods --no-headers` output.
///
/// Every pod Running is a pass; a pod in a crash or pull failure state is a
/// failure; anything else (Pending, ContainerCreating) is still settling.
pub fn classify_pods(stdout: &str) -> (CheckStatus, String) {
    let statuses: Vec<&str> = stdout
        .lines()
        .filter_map(|l| l.split_whitespace().nth(2))
        .collect();
    let total = statuses.len();
    let running = statuses.iter().filter(|s| **s == "Running").count();
    let detail = format!("{running}/{total} Running");

    if total == 0 {
        (CheckStatus::Fail, "no pods found".to_string())
    } else if running == total {
        (CheckStatus::Pass, detail)
    } else if statuses.iter().any(|s| FAILING_POD_STATES.contains(s)) {
        (CheckStatus::Fail, detail)
    } else {
        (CheckStatus::Warn, detail)
    }
}

// ============================================================================
// Checker
// ============================================================================

/// Runs the health checks against one environment.
pub struct HealthChecker {
    vm: LimaVm,
    cluster: ClusterManager,
    kubectl: Kubectl,
    runner: Arc<dyn CommandRunner>,
    activation_script: PathBuf,
    expected_nodes: usize,
}

impl HealthChecker {
    /// Create a checker expecting one control plane plus the worker count.
    pub fn new(
        vm: LimaVm,
        cluster: ClusterManager,
        kubectl: Kubectl,
        runner: Arc<dyn CommandRunner>,
        activation_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            vm,
            cluster,
            kubectl,
            runner,
            activation_script: activation_script.into(),
            expected_nodes: 1 + WORKER_COUNT,
        }
    }

    /// Run every check concurrently and collect the report.
    pub async fn run(&self) -> HealthReport {
        let checks: Vec<BoxFuture<'_, CheckResult>> = vec![
            self.check_vm().boxed(),
            self.check_runtime().boxed(),
            self.check_cluster().boxed(),
            self.check_api().boxed(),
            self.check_nodes().boxed(),
            self.check_pods(CHECK_SYSTEM_PODS, None).boxed(),
            self.check_pods(CHECK_CNI, Some(CNI_SELECTOR)).boxed(),
            self.check_pods(CHECK_DNS, Some(DNS_SELECTOR)).boxed(),
        ];
        let checks = join_all(checks).await;

        for check in &checks {
            match check.status {
                CheckStatus::Pass => tracing::debug!(check = check.name, detail = %check.detail, "Check passed"),
                CheckStatus::Warn => tracing::warn!(check = check.name, detail = %check.detail, "Check warned"),
                CheckStatus::Fail => tracing::warn!(check = check.name, detail = %check.detail, "Check failed"),
            }
        }

        let api_down = checks
            .iter()
            .any(|c| c.name == CHECK_API && c.status == CheckStatus::Fail);
        let (hints, nodes, system_pods) = if api_down {
            (self.hints().await, None, None)
        } else {
            let (nodes, pods) = futures::join!(
                self.table(self.kubectl.cmd(["get", "nodes", "-o", "wide"])),
                self.table(self.kubectl.cmd(["-n", SYSTEM_NAMESPACE, "get", "pods"])),
            );
            (Vec::new(), nodes, pods)
        };

        HealthReport {
            checks,
            hints,
            nodes,
            system_pods,
        }
    }

    async fn table(&self, spec: CommandSpec) -> Option<String> {
        match self.runner.run_checked(&spec).await {
            Ok(out) if !out.stdout.trim().is_empty() => Some(out.stdout),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(cmd = %spec, error = %e, "Resource listing failed");
                None
            }
        }
    }

    async fn hints(&self) -> Vec<String> {
        let clusters = match self.cluster.list().await {
            Ok(list) if list.is_empty() => "none".to_string(),
            Ok(list) => list.join(", "),
            Err(e) => format!("listing failed ({e})"),
        };
        let kubeconfig = self.kubectl.kubeconfig().display();
        vec![
            format!("Clusters in VM {}: {clusters}", self.vm.name()),
            format!("Your kubeconfig is at: {kubeconfig}"),
            format!("Try running: source {}", self.activation_script.display()),
            format!("Or explicitly: kubectl --kubeconfig={kubeconfig} get nodes"),
        ]
    }

    async fn check_vm(&self) -> CheckResult {
        match self.vm.state().await {
            Ok(state) => {
                let (status, detail) = classify_vm(self.vm.name(), state);
                CheckResult::new(CHECK_VM, status, detail)
            }
            Err(e) => CheckResult::new(CHECK_VM, CheckStatus::Fail, e.to_string()),
        }
    }

    async fn check_runtime(&self) -> CheckResult {
        let spec = docker(&self.vm.docker_host(), ["ps"]);
        match self.runner.run_checked(&spec).await {
            Ok(_) => CheckResult::new(CHECK_RUNTIME, CheckStatus::Pass, self.vm.docker_host()),
            Err(e) => CheckResult::new(CHECK_RUNTIME, CheckStatus::Fail, e.to_string()),
        }
    }

    async fn check_cluster(&self) -> CheckResult {
        match self.cluster.exists().await {
            Ok(true) => CheckResult::new(CHECK_CLUSTER, CheckStatus::Pass, self.cluster.name()),
            Ok(false) => CheckResult::new(
                CHECK_CLUSTER,
                CheckStatus::Fail,
                format!("{} not found", self.cluster.name()),
            ),
            Err(e) => CheckResult::new(CHECK_CLUSTER, CheckStatus::Fail, e.to_string()),
        }
    }

    async fn check_api(&self) -> CheckResult {
        let spec = self.kubectl.cmd(["cluster-info"]);
        match self.runner.run_checked(&spec).await {
            Ok(out) => {
                let first = out.stdout.lines().next().unwrap_or("reachable").trim();
                CheckResult::new(CHECK_API, CheckStatus::Pass, first)
            }
            Err(e) => CheckResult::new(CHECK_API, CheckStatus::Fail, e.to_string()),
        }
    }

    async fn check_nodes(&self) -> CheckResult {
        let spec = self.kubectl.cmd(["get", "nodes", "--no-headers"]);
        match self.runner.run_checked(&spec).await {
            Ok(out) => {
                let (status, detail) = classify_nodes(&out.stdout, self.expected_nodes);
                CheckResult::new(CHECK_NODES, status, detail)
            }
            Err(e) => CheckResult::new(CHECK_NODES, CheckStatus::Fail, e.to_string()),
        }
    }

    async fn check_pods(&self, name: &'static str, selector: Option<&str>) -> CheckResult {
        let spec = match selector {
            Some(selector) => self.kubectl.pods_by_label(SYSTEM_NAMESPACE, selector),
            None => self
                .kubectl
                .cmd(["-n", SYSTEM_NAMESPACE, "get", "pods", "--no-headers"]),
        };
        match self.runner.run_checked(&spec).await {
            Ok(out) => {
                let (status, detail) = classify_pods(&out.stdout);
                CheckResult::new(name, status, detail)
            }
            Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string()),
        }
    }
}
