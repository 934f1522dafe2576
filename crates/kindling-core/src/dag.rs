//! Dependency-ordered step execution.
//!
//! A [`StepGraph`] is a validated DAG of named [`Step`]s. [`StepGraph::run`]
//! starts every step whose dependencies have all succeeded, running
//! independent steps concurrently. A failed step marks everything downstream
//! of it as skipped; unrelated branches keep going. [`StepGraph::teardown`]
//! runs delete actions one at a time in reverse dependency order.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// One unit of the pipeline with a create action and a best-effort delete.
#[async_trait]
pub trait Step<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    /// Unique name within the graph.
    fn name(&self) -> &'static str;

    /// Bring the artifact into existence. Must be safe to repeat.
    async fn create(&self, ctx: &C) -> Result<()>;

    /// Remove the artifact. Must tolerate it never having been created.
    async fn delete(&self, _ctx: &C) {}
}

struct Node<C: Send + Sync + 'static> {
    step: Arc<dyn Step<C>>,
    deps: Vec<&'static str>,
}

/// Builder collecting steps before validation.
pub struct StepGraphBuilder<C: Send + Sync + 'static> {
    nodes: Vec<Node<C>>,
}

impl<C: Send + Sync + 'static> StepGraphBuilder<C> {
    /// Add a step with its direct dependencies.
    pub fn step(mut self, step: impl Step<C> + 'static, deps: &[&'static str]) -> Self {
        self.nodes.push(Node {
            step: Arc::new(step),
            deps: deps.to_vec(),
        });
        self
    }

    /// Validate names, dependencies and acyclicity.
    ///
    /// # Errors
    /// [`CoreError::DuplicateStep`], [`CoreError::UnknownDependency`] or
    /// [`CoreError::Cycle`].
    pub fn build(self) -> Result<StepGraph<C>> {
        let mut index = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.step.name(), i).is_some() {
                return Err(CoreError::DuplicateStep(node.step.name()));
            }
        }

        let n = self.nodes.len();
        let mut deps = vec![Vec::new(); n];
        let mut dependents = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for &dep in &node.deps {
                let j = *index.get(dep).ok_or(CoreError::UnknownDependency {
                    step: node.step.name(),
                    dependency: dep,
                })?;
                deps[i].push(j);
                dependents[j].push(i);
            }
        }

        // Kahn's algorithm; insertion order breaks ties so output is stable.
        let mut indegree: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_front() {
            order.push(i);
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.push_back(d);
                }
            }
        }
        if order.len() != n {
            let stuck = (0..n)
                .filter(|i| !order.contains(i))
                .map(|i| self.nodes[i].step.name())
                .collect();
            return Err(CoreError::Cycle(stuck));
        }

        Ok(StepGraph {
            nodes: self.nodes,
            deps,
            dependents,
            order,
        })
    }
}

/// A validated, executable step graph.
pub struct StepGraph<C: Send + Sync + 'static> {
    nodes: Vec<Node<C>>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

/// Final state of one step after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Create action completed
    Succeeded,
    /// Create action returned an error
    Failed(String),
    /// Not run because a dependency failed
    Skipped {
        /// The failed step that caused the skip
        because: &'static str,
    },
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(e) => write!(f, "failed: {e}"),
            Self::Skipped { because } => write!(f, "skipped ({because} failed)"),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: &'static str,
    pub status: StepStatus,
    pub elapsed: Option<Duration>,
}

/// Outcome of a whole run, in topological order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
}

impl RunReport {
    /// Check if every step succeeded.
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Succeeded)
    }

    /// Names of failed steps.
    pub fn failed(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed(_)))
            .map(|s| s.name)
            .collect()
    }

    /// Status of a named step.
    pub fn status(&self, name: &str) -> Option<&StepStatus> {
        self.steps.iter().find(|s| s.name == name).map(|s| &s.status)
    }

    /// Convert into an error if anything failed.
    pub fn into_result(self) -> Result<Self> {
        if self.succeeded() {
            return Ok(self);
        }
        let failed = self
            .steps
            .iter()
            .filter_map(|s| match &s.status {
                StepStatus::Failed(e) => Some(format!("{}: {e}", s.name)),
                _ => None,
            })
            .collect();
        Err(CoreError::StepsFailed(failed))
    }
}

enum State {
    Pending,
    Running,
    Done(StepStatus, Option<Duration>),
}

impl<C: Send + Sync + 'static> StepGraph<C> {
    /// Start building a graph.
    pub fn builder() -> StepGraphBuilder<C> {
        StepGraphBuilder { nodes: Vec::new() }
    }

    /// Step names in topological order.
    pub fn order(&self) -> Vec<&'static str> {
        self.order.iter().map(|&i| self.nodes[i].step.name()).collect()
    }

    /// Direct dependencies of a step.
    pub fn dependencies(&self, name: &str) -> Option<Vec<&'static str>> {
        let i = self.nodes.iter().position(|n| n.step.name() == name)?;
        Some(self.deps[i].iter().map(|&j| self.nodes[j].step.name()).collect())
    }

    /// Steps grouped into waves; every step in a wave can run concurrently
    /// once all earlier waves are done.
    pub fn waves(&self) -> Vec<Vec<&'static str>> {
        let mut level = vec![0usize; self.nodes.len()];
        for &i in &self.order {
            level[i] = self.deps[i].iter().map(|&j| level[j] + 1).max().unwrap_or(0);
        }
        let depth = level.iter().max().map_or(0, |m| m + 1);
        let mut waves = vec![Vec::new(); depth];
        for &i in &self.order {
            waves[level[i]].push(self.nodes[i].step.name());
        }
        waves
    }

    /// Execute every create action in dependency order.
    ///
    /// Never returns early: the report lists every step as succeeded,
    /// failed, or skipped.
    pub async fn run(&self, ctx: Arc<C>) -> RunReport {
        let n = self.nodes.len();
        let mut remaining: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut state: Vec<State> = (0..n).map(|_| State::Pending).collect();
        let mut tasks = JoinSet::new();

        for &i in &self.order {
            if remaining[i] == 0 {
                self.spawn(&mut tasks, &mut state, i, ctx.clone());
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (i, result, elapsed) = match joined {
                Ok(done) => done,
                Err(e) => {
                    // Tasks are never aborted and panics are caught inside.
                    tracing::error!(error = %e, "Step task failed to join");
                    continue;
                }
            };
            let name = self.nodes[i].step.name();

            match result {
                Ok(()) => {
                    tracing::info!(step = name, elapsed_ms = elapsed.as_millis() as u64, "Step succeeded");
                    state[i] = State::Done(StepStatus::Succeeded, Some(elapsed));
                    for &d in &self.dependents[i] {
                        remaining[d] -= 1;
                        if remaining[d] == 0 && matches!(state[d], State::Pending) {
                            self.spawn(&mut tasks, &mut state, d, ctx.clone());
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(step = name, error = %e, "Step failed");
                    state[i] = State::Done(StepStatus::Failed(e.to_string()), Some(elapsed));
                    self.skip_downstream(i, &mut state);
                }
            }
        }

        let steps = self
            .order
            .iter()
            .map(|&i| {
                let (status, elapsed) = match std::mem::replace(&mut state[i], State::Pending) {
                    State::Done(status, elapsed) => (status, elapsed),
                    // Unreachable for a validated graph; report rather than panic.
                    State::Pending | State::Running => (
                        StepStatus::Failed("step never ran".to_string()),
                        None,
                    ),
                };
                StepReport {
                    name: self.nodes[i].step.name(),
                    status,
                    elapsed,
                }
            })
            .collect();
        RunReport { steps }
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<(usize, Result<()>, Duration)>,
        state: &mut [State],
        i: usize,
        ctx: Arc<C>,
    ) {
        let step = self.nodes[i].step.clone();
        state[i] = State::Running;
        tracing::info!(step = step.name(), "Starting step");

        tasks.spawn(async move {
            let start = Instant::now();
            let name = step.name();
            let result = AssertUnwindSafe(step.create(&ctx))
                .catch_unwind()
                .await
                .unwrap_or(Err(CoreError::Panicked(name)));
            (i, result, start.elapsed())
        });
    }

    fn skip_downstream(&self, failed: usize, state: &mut [State]) {
        let because = self.nodes[failed].step.name();
        let mut queue: VecDeque<usize> = self.dependents[failed].iter().copied().collect();
        while let Some(d) = queue.pop_front() {
            if matches!(state[d], State::Pending) {
                tracing::warn!(step = self.nodes[d].step.name(), because, "Skipping step");
                state[d] = State::Done(StepStatus::Skipped { because }, None);
                queue.extend(self.dependents[d].iter().copied());
            }
        }
    }

    /// Run every delete action in reverse dependency order. Never fails.
    pub async fn teardown(&self, ctx: &C) {
        for &i in self.order.iter().rev() {
            let step = &self.nodes[i].step;
            tracing::info!(step = step.name(), "Deleting");
            if AssertUnwindSafe(step.delete(ctx)).catch_unwind().await.is_err() {
                tracing::error!(step = step.name(), "Delete panicked, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records events; steps named in `fail` return an error.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn position(&self, event: &str) -> usize {
            self.events()
                .iter()
                .position(|e| e == event)
                .unwrap_or_else(|| panic!("missing event {event}"))
        }
    }

    struct TestStep {
        name: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl Step<Recorder> for TestStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn create(&self, ctx: &Recorder) -> Result<()> {
            ctx.events.lock().unwrap().push(format!("start {}", self.name));
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            ctx.events.lock().unwrap().push(format!("end {}", self.name));
            if ctx.fail.contains(&self.name) {
                return Err(CoreError::Config(format!("{} broke", self.name)));
            }
            Ok(())
        }

        async fn delete(&self, ctx: &Recorder) {
            ctx.events.lock().unwrap().push(format!("delete {}", self.name));
        }
    }

    fn step(name: &'static str, delay_ms: u64) -> TestStep {
        TestStep { name, delay_ms }
    }

    /// vm -> {agent, context} -> cluster; plus an unrelated `dirs` root.
    fn diamond() -> StepGraph<Recorder> {
        StepGraph::builder()
            .step(step("vm", 10), &[])
            .step(step("agent", 30), &["vm"])
            .step(step("context", 30), &["vm"])
            .step(step("cluster", 10), &["agent", "context"])
            .step(step("dirs", 5), &[])
            .build()
            .unwrap()
    }

    #[test]
    fn test_validation_errors() {
        let dup = StepGraph::<Recorder>::builder()
            .step(step("a", 0), &[])
            .step(step("a", 0), &[])
            .build();
        assert!(matches!(dup, Err(CoreError::DuplicateStep("a"))));

        let unknown = StepGraph::<Recorder>::builder()
            .step(step("a", 0), &["ghost"])
            .build();
        assert!(matches!(
            unknown,
            Err(CoreError::UnknownDependency { step: "a", dependency: "ghost" })
        ));

        let cycle = StepGraph::<Recorder>::builder()
            .step(step("a", 0), &["b"])
            .step(step("b", 0), &["a"])
            .step(step("c", 0), &[])
            .build();
        match cycle {
            Err(CoreError::Cycle(names)) => assert_eq!(names, vec!["a", "b"]),
            _ => panic!("expected cycle"),
        }
    }

    #[test]
    fn test_order_and_waves() {
        let graph = diamond();
        assert_eq!(graph.order(), vec!["vm", "dirs", "agent", "context", "cluster"]);
        assert_eq!(
            graph.waves(),
            vec![vec!["vm", "dirs"], vec!["agent", "context"], vec!["cluster"]]
        );
        assert_eq!(graph.dependencies("cluster"), Some(vec!["agent", "context"]));
        assert_eq!(graph.dependencies("nope"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_respects_dependencies_and_parallelism() {
        let graph = diamond();
        let ctx = Arc::new(Recorder::default());

        let report = graph.run(ctx.clone()).await;
        assert!(report.succeeded());
        assert_eq!(report.steps.len(), 5);

        // Dependencies finish before dependents start.
        assert!(ctx.position("end vm") < ctx.position("start agent"));
        assert!(ctx.position("end agent") < ctx.position("start cluster"));
        assert!(ctx.position("end context") < ctx.position("start cluster"));
        // Siblings overlap.
        assert!(ctx.position("start context") < ctx.position("end agent"));
        assert!(ctx.position("start agent") < ctx.position("end context"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_skips_only_dependents() {
        let graph = StepGraph::builder()
            .step(step("vm", 1), &[])
            .step(step("agent", 1), &["vm"])
            .step(step("context", 1), &["vm"])
            .step(step("cluster", 1), &["agent", "context"])
            .step(step("export", 1), &["cluster"])
            .step(step("dirs", 1), &[])
            .build()
            .unwrap();
        let ctx = Arc::new(Recorder {
            fail: vec!["agent"],
            ..Default::default()
        });

        let report = graph.run(ctx.clone()).await;
        assert!(!report.succeeded());
        assert_eq!(report.failed(), vec!["agent"]);
        assert_eq!(report.status("context"), Some(&StepStatus::Succeeded));
        assert_eq!(report.status("dirs"), Some(&StepStatus::Succeeded));
        assert_eq!(
            report.status("cluster"),
            Some(&StepStatus::Skipped { because: "agent" })
        );
        assert_eq!(
            report.status("export"),
            Some(&StepStatus::Skipped { because: "agent" })
        );
        assert!(!ctx.events().iter().any(|e| e.contains("cluster")));

        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("agent: invalid configuration: agent broke"));
    }

    #[tokio::test]
    async fn test_teardown_reverse_order() {
        let graph = diamond();
        let ctx = Recorder::default();
        graph.teardown(&ctx).await;

        let events = ctx.events();
        assert_eq!(
            events,
            vec![
                "delete cluster",
                "delete context",
                "delete agent",
                "delete dirs",
                "delete vm"
            ]
        );
    }

    struct Panicky;

    #[async_trait]
    impl Step<Recorder> for Panicky {
        fn name(&self) -> &'static str {
            "panicky"
        }

        async fn create(&self, _ctx: &Recorder) -> Result<()> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let graph = StepGraph::builder()
            .step(Panicky, &[])
            .step(step("after", 0), &["panicky"])
            .build()
            .unwrap();
        let report = graph.run(Arc::new(Recorder::default())).await;
        assert_eq!(report.failed(), vec!["panicky"]);
        assert_eq!(
            report.status("after"),
            Some(&StepStatus::Skipped { because: "panicky" })
        );
    }
}
