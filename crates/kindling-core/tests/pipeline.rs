//! Pipeline scenarios against a scripted command runner and a temporary home.

use kindling_core::steps::{KIND_CLUSTER, LIMA_VM};
use kindling_core::{CoreError, Environment, Paths, Platform, Settings};
use kindling_vm::{CommandOutput, FakeRunner};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const NODES: &str = "\
myk8s-control-plane   Ready   control-plane   2m   v1.31.0
myk8s-worker          Ready   <none>          2m   v1.31.0
myk8s-worker2         Ready   <none>          2m   v1.31.0
myk8s-worker3         Ready   <none>          2m   v1.31.0
";

const PODS: &str = "\
calico-node-x7k2p   1/1   Running   0   2m
coredns-abcde       1/1   Running   0   2m
";

const KUBECONFIG: &str = "apiVersion: v1\nclusters:\n- cluster:\n    server: https://localhost:6443\n  name: kind-myk8s\n";

fn running() -> CommandOutput {
    CommandOutput::ok("{\"name\":\"myk8s-docker\",\"status\":\"Running\"}\n")
}

fn stopped() -> CommandOutput {
    CommandOutput::ok("{\"name\":\"myk8s-docker\",\"status\":\"Stopped\"}\n")
}

fn cluster_queries(fake: FakeRunner) -> FakeRunner {
    fake.on("kubectl cluster-info", vec![CommandOutput::ok("Kubernetes control plane is running\n")])
        .on("kubectl get nodes", vec![CommandOutput::ok(NODES)])
        .on("kubectl -n kube-system get pods", vec![CommandOutput::ok(PODS)])
}

/// A machine with nothing provisioned yet.
fn clean_machine() -> FakeRunner {
    cluster_queries(
        FakeRunner::new()
            .on("limactl list", vec![CommandOutput::ok(""), running()])
            .on("kind get clusters", vec![CommandOutput::ok(""), CommandOutput::ok("myk8s\n")]),
    )
}

/// A machine where the VM and cluster already exist.
fn provisioned_machine() -> FakeRunner {
    cluster_queries(
        FakeRunner::new()
            .on("limactl list", vec![running()])
            .on("kind get clusters", vec![CommandOutput::ok("myk8s\n")]),
    )
}

fn environment(home: &Path, fake: Arc<FakeRunner>) -> (Environment, Paths) {
    let settings = Settings::default();
    let paths = Paths::new(
        &settings,
        Platform::Linux,
        home,
        &home.join("work"),
        &home.join("mnt"),
    );
    let env = Environment::new(settings, paths.clone(), Platform::Linux, fake).unwrap();
    (env, paths)
}

/// kind writes the credential file; the fake runner cannot, so seed it.
fn seed_kubeconfig(paths: &Paths) {
    std::fs::create_dir_all(&paths.kube_dir).unwrap();
    std::fs::write(&paths.kubeconfig, KUBECONFIG).unwrap();
}

fn occurrences(path: &Path, line: &str) -> usize {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| l.trim() == line)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_fresh_provisioning() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(clean_machine());
    let (env, paths) = environment(home.path(), fake.clone());
    seed_kubeconfig(&paths);

    let report = env.up().await.unwrap();
    assert!(report.run.succeeded());
    assert_eq!(report.run.steps.len(), 12);
    assert_eq!(report.outputs.cluster_name, "myk8s");
    assert_eq!(report.outputs.kubeconfig_path, paths.kubeconfig);

    // One VM, one cluster.
    assert_eq!(
        fake.count("limactl start --tty=false --name myk8s-docker template:docker --cpus 8 --memory 16 --disk 500 --vm-type vz"),
        1
    );
    assert_eq!(
        fake.count(&format!(
            "kind create cluster --name myk8s --config {}",
            paths.kind_config.display()
        )),
        1
    );

    // Workspace.
    for dir in paths.mount_dirs() {
        assert!(dir.is_dir(), "{} missing", dir.display());
    }
    let topology = std::fs::read_to_string(&paths.kind_config).unwrap();
    assert!(topology.contains("disableDefaultCNI: true"));
    assert!(paths.boot_agent.exists());

    // Credentials.
    let kubeconfig = std::fs::read_to_string(&paths.kubeconfig).unwrap();
    assert!(kubeconfig.contains("server: https://127.0.0.1:6443"));
    assert_eq!(
        std::fs::read_link(&paths.default_kubeconfig).unwrap(),
        paths.kubeconfig
    );
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&paths.kubeconfig).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let mode = std::fs::metadata(&paths.activation_script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    // Shell integration.
    let export = paths.kubeconfig_export();
    for profile in &paths.shell_profiles {
        assert_eq!(occurrences(profile, &export), 1);
    }

    // CNI.
    assert_eq!(fake.count("kubectl apply -f https://raw.githubusercontent.com/projectcalico"), 1);
    assert_eq!(fake.count("kubectl taint nodes myk8s-control-plane"), 1);

    // Verification.
    let verification = report.verification.unwrap();
    assert_eq!(verification.checks.len(), 8);
    assert!(verification.all_passed(), "{verification}");
}

#[tokio::test(start_paused = true)]
async fn test_rerun_creates_nothing() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(provisioned_machine());
    let (env, paths) = environment(home.path(), fake.clone());
    seed_kubeconfig(&paths);

    env.up().await.unwrap();
    env.up().await.unwrap();

    assert_eq!(fake.count("limactl start"), 0);
    assert_eq!(fake.count("kind create"), 0);
    let export = paths.kubeconfig_export();
    for profile in &paths.shell_profiles {
        assert_eq!(occurrences(profile, &export), 1);
    }
    // Link from the first run is kept, not recreated.
    assert_eq!(
        std::fs::read_link(&paths.default_kubeconfig).unwrap(),
        paths.kubeconfig
    );
}

#[tokio::test(start_paused = true)]
async fn test_existing_default_kubeconfig_is_kept() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(provisioned_machine());
    let (env, paths) = environment(home.path(), fake);
    seed_kubeconfig(&paths);
    std::fs::write(&paths.default_kubeconfig, "apiVersion: v1\nkind: Config\n").unwrap();

    env.up().await.unwrap();
    env.down().await;

    let meta = std::fs::symlink_metadata(&paths.default_kubeconfig).unwrap();
    assert!(!meta.file_type().is_symlink());
    assert_eq!(
        std::fs::read_to_string(&paths.default_kubeconfig).unwrap(),
        "apiVersion: v1\nkind: Config\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_removes_everything() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(clean_machine());
    let (env, paths) = environment(home.path(), fake.clone());
    seed_kubeconfig(&paths);
    env.up().await.unwrap();

    fake.push("limactl list", vec![stopped()]);
    env.down().await;

    assert!(fake.count("kind delete cluster --name myk8s") >= 1);
    assert_eq!(fake.count("limactl stop myk8s-docker"), 1);
    assert_eq!(fake.count("limactl delete --force myk8s-docker"), 1);
    assert_eq!(fake.count("docker context rm lima-myk8s-docker"), 2);
    assert_eq!(fake.count("kubectl config delete-context kind-myk8s"), 1);
    assert_eq!(fake.count("kubectl delete -f"), 1);

    assert!(!paths.kubeconfig.exists());
    assert!(std::fs::symlink_metadata(&paths.default_kubeconfig).is_err());
    assert!(!paths.activation_script.exists());
    assert!(!paths.kind_config.exists());
    assert!(!paths.boot_agent.exists());
    let export = paths.kubeconfig_export();
    for profile in &paths.shell_profiles {
        assert_eq!(occurrences(profile, &export), 0);
    }
    // Node data survives.
    assert!(paths.control_mount.is_dir());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_of_nothing_is_quiet() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(FakeRunner::new().on("limactl stop", vec![CommandOutput::failed(1, "not found")]));
    let (env, paths) = environment(home.path(), fake.clone());

    env.down().await;

    assert_eq!(fake.count("kind delete cluster --name myk8s"), 1);
    assert_eq!(fake.count("limactl delete --force"), 1);
    assert!(!paths.default_kubeconfig.exists());
}

#[tokio::test(start_paused = true)]
async fn test_vm_failure_skips_downstream() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(
        FakeRunner::new().on("limactl start", vec![CommandOutput::failed(1, "vz is not supported")]),
    );
    let (env, paths) = environment(home.path(), fake.clone());

    let err = env.up().await.unwrap_err();
    match err {
        CoreError::StepsFailed(failed) => {
            assert_eq!(failed.len(), 1);
            assert!(failed[0].starts_with(LIMA_VM), "{failed:?}");
        }
        other => panic!("unexpected error: {other}"),
    }

    // Independent preparation ran; nothing after the VM did.
    assert!(paths.kind_config.exists());
    assert!(paths.control_mount.is_dir());
    assert_eq!(fake.count("kind"), 0);
    assert_eq!(fake.count("docker"), 0);
    assert_eq!(fake.count("kubectl"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_cluster_after_create_is_fatal() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(
        FakeRunner::new()
            .on("limactl list", vec![running()])
            .on("kind create", vec![CommandOutput::failed(1, "failed to create cluster")]),
    );
    let (env, _) = environment(home.path(), fake.clone());

    let err = env.up().await.unwrap_err();
    assert!(err.to_string().contains(KIND_CLUSTER), "{err}");
    assert_eq!(fake.count("kind export"), 0);
    // Host integration ran before the cluster step.
    assert_eq!(fake.count("docker context create lima-myk8s-docker"), 1);
}

#[tokio::test]
async fn test_plan_waves() {
    let home = TempDir::new().unwrap();
    let (env, _) = environment(home.path(), Arc::new(FakeRunner::new()));
    let plan = env.plan();
    assert_eq!(plan.len(), 8);
    assert_eq!(plan[0], vec!["create-dirs", "create-kind-config"]);
    assert_eq!(plan.last().unwrap(), &vec!["verify-cluster"]);
}

#[test]
fn test_invalid_settings_rejected() {
    let home = TempDir::new().unwrap();
    let settings = Settings {
        vm_name: "Not Valid".to_string(),
        ..Settings::default()
    };
    let paths = Paths::new(&settings, Platform::Linux, home.path(), home.path(), home.path());
    let result = Environment::new(settings, paths, Platform::Linux, Arc::new(FakeRunner::new()));
    assert!(matches!(result, Err(CoreError::Config(_))));
}
