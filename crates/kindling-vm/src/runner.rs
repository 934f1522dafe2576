//! External process execution.
//!
//! Every tool kindling drives (limactl, docker, kind, kubectl, launchctl)
//! goes through [`CommandRunner`]. Production code uses [`SystemRunner`];
//! tests use the scripted `FakeRunner`.

use crate::error::{Result, VmError};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tracing::{debug, trace, warn};

/// Maximum captured output per stream in bytes (1 MB).
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// A fully described command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments, passed verbatim (no shell).
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Start describing an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for this invocation only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Look up an environment override.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code (-1 if killed by a signal).
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into [`VmError::Command`].
    pub fn check(self, spec: &CommandSpec) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(VmError::Command {
                command: spec.to_string(),
                code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Executes external commands.
///
/// `run` only fails when the process cannot be spawned; a non-zero exit is
/// reported through [`CommandOutput::exit_code`]. Use `run_checked` when a
/// non-zero exit should be an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and capture its output.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run the command and fail on a non-zero exit.
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.run(spec).await?.check(spec)
    }

    /// Run the command for its side effect, logging instead of failing.
    ///
    /// Returns whether it succeeded.
    async fn run_best_effort(&self, spec: &CommandSpec) -> bool {
        match self.run(spec).await {
            Ok(out) if out.success() => true,
            Ok(out) => {
                debug!(cmd = %spec, exit_code = out.exit_code, stderr = %out.stderr.trim(), "ignored command failure");
                false
            }
            Err(e) => {
                debug!(cmd = %spec, error = %e, "ignored command failure");
                false
            }
        }
    }
}

/// Truncate a string to max bytes, preserving UTF-8 boundaries.
fn truncate_output(s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_string();
    truncated.push_str("\n... [output truncated]");
    truncated
}

/// Runs commands as real child processes via `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(cmd = %spec, "executing command");

        let output = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                warn!(program = %spec.program, error = %source, "command execution failed");
                VmError::Spawn {
                    program: spec.program.clone(),
                    source,
                }
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = truncate_output(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            MAX_OUTPUT_SIZE,
        );
        let stderr = truncate_output(
            String::from_utf8_lossy(&output.stderr).into_owned(),
            MAX_OUTPUT_SIZE,
        );
        debug!(
            cmd = %spec,
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "command completed"
        );
        trace!(stdout = %stdout, stderr = %stderr, "command output");

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Script {
        prefix: String,
        replies: VecDeque<CommandOutput>,
    }

    /// Scripted runner for tests.
    ///
    /// Replies are matched by command-line prefix (program plus arguments,
    /// without environment). Each matching call consumes one reply; the last
    /// reply of a script repeats forever. Unscripted commands succeed with
    /// empty output. Every call is recorded.
    #[derive(Default)]
    pub struct FakeRunner {
        scripts: Mutex<Vec<Script>>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        /// Create a runner where every command succeeds silently.
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the replies for commands starting with `prefix`.
        ///
        /// Later scripts take precedence over earlier ones with the same prefix.
        pub fn on(self, prefix: &str, replies: Vec<CommandOutput>) -> Self {
            self.push(prefix, replies);
            self
        }

        /// Like [`FakeRunner::on`] but through a shared reference.
        pub fn push(&self, prefix: &str, replies: Vec<CommandOutput>) {
            let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
            scripts.insert(
                0,
                Script {
                    prefix: prefix.to_string(),
                    replies: replies.into(),
                },
            );
        }

        /// Every recorded call, in order.
        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        /// Recorded command lines, in order.
        pub fn lines(&self) -> Vec<String> {
            self.calls().iter().map(ToString::to_string).collect()
        }

        /// Number of recorded calls whose command line starts with `prefix`.
        pub fn count(&self, prefix: &str) -> usize {
            self.lines().iter().filter(|l| l.starts_with(prefix)).count()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            let line = spec.to_string();
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(spec.clone());

            let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
            let reply = scripts
                .iter_mut()
                .find(|s| line.starts_with(&s.prefix))
                .and_then(|s| {
                    if s.replies.len() > 1 {
                        s.replies.pop_front()
                    } else {
                        s.replies.front().cloned()
                    }
                });
            Ok(reply.unwrap_or_default())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRunner;
