//! Out-of-process execution of the instrumented test suite.
//!
//! The child writes freely to stdout/stderr while it runs, so both pipes are
//! drained concurrently with waiting for it to exit. Waiting first and reading
//! afterwards would deadlock as soon as the child fills a pipe buffer.

pub mod output;

use crate::config::RuntimeConfig;
use crate::error::{LocalizationError, LocalizationFailure};
use crate::ipc::{ExecutionOutcome, RendezvousServer, Registry};
use crate::payload::{ExecutionPayload, ExecutionRequest};
use output::{drain, OutputTail};
use std::collections::HashSet;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

/// Everything one execution needs: where to run, what to put on the
/// classpath, and the instructions for the child.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionJob {
    pub working_dir: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub request: ExecutionRequest,
}

/// Runs a test suite and reports the raw payload.
///
/// [`ProcessRunner`] is the real implementation; tests substitute executors
/// that return canned payloads.
pub trait TestExecutor {
    fn execute(
        &self,
        job: &ExecutionJob,
    ) -> impl Future<Output = Result<ExecutionPayload, LocalizationFailure>> + Send;
}

/// Launches the instrumented runtime as a child process.
pub struct ProcessRunner {
    config: RuntimeConfig,
    registry: Registry,
}

impl ProcessRunner {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Exchanges currently registered; zero whenever no execution is running.
    pub fn pending_exchanges(&self) -> usize {
        self.registry.len()
    }

    /// Runner classpath, working directory, then the job's entries, with
    /// relative entries resolved against the working directory and
    /// duplicates removed.
    pub fn classpath(&self, job: &ExecutionJob) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.config
            .extra_classpath
            .iter()
            .chain(std::iter::once(&job.working_dir))
            .chain(job.classpath.iter())
            .map(|entry| resolve_against(&job.working_dir, entry))
            .filter(|entry| seen.insert(entry.clone()))
            .collect()
    }

    /// Arguments passed to the runtime executable.
    pub fn arguments(
        &self,
        job: &ExecutionJob,
        port: u16,
        key: &str,
    ) -> Result<Vec<OsString>, LocalizationError> {
        let agent = self.agent_path()?;
        let classpath = std::env::join_paths(self.classpath(job)).map_err(|e| {
            LocalizationError::Launch(format!("classpath entry cannot be joined: {}", e))
        })?;

        let mut javaagent = OsString::from("-javaagent:");
        javaagent.push(agent.as_os_str());

        Ok(vec![
            javaagent,
            OsString::from("-cp"),
            classpath,
            OsString::from(&self.config.entry_point),
            OsString::from(port.to_string()),
            OsString::from(key),
        ])
    }

    fn agent_path(&self) -> Result<PathBuf, LocalizationError> {
        let agent = self.config.agent_path.as_ref().ok_or_else(|| {
            LocalizationError::Launch("no instrumentation agent configured".to_string())
        })?;
        if !agent.exists() {
            return Err(LocalizationError::Launch(format!(
                "instrumentation agent not found at {}",
                agent.display()
            )));
        }
        agent.canonicalize().map_err(|e| {
            LocalizationError::Launch(format!(
                "cannot resolve instrumentation agent {}: {}",
                agent.display(),
                e
            ))
        })
    }

    async fn launch(&self, job: &ExecutionJob) -> Result<ExecutionPayload, LocalizationFailure> {
        let start = Instant::now();
        let server = RendezvousServer::bind(self.registry.clone())
            .await
            .map_err(LocalizationError::Ipc)?;
        // Unregisters on every exit path below.
        let registration = self.registry.register(job.request.clone());

        let program = self.config.resolve_java_executable();
        let args = self.arguments(job, server.port(), registration.key())?;

        tracing::info!(
            "Launching {} ({} classes, {} tests) in {}",
            program.display(),
            job.request.classes.classes_to_instrument.len(),
            job.request.tests.tests_to_execute.len(),
            job.working_dir.display()
        );

        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&job.working_dir)
            .env(&self.config.mode_env_var, "true")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LocalizationError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let tail = Mutex::new(OutputTail::new(self.config.max_captured_output_bytes));
        let mirror = self.config.mirror_output;
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        if mirror {
            eprintln!(">>> Begin subprocess output");
        }
        let run = async {
            tokio::try_join!(
                drain(stdout, &tail, mirror),
                drain(stderr, &tail, mirror),
                child.wait(),
            )
        };
        let result = tokio::time::timeout(timeout, run).await;
        if mirror {
            eprintln!("<<< End subprocess output");
        }

        let captured = || {
            tail.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .contents()
        };

        let status = match result {
            Ok(Ok((out_bytes, err_bytes, status))) => {
                tracing::debug!(
                    "Test runtime exited with {} after {}ms ({} bytes stdout, {} bytes stderr)",
                    status,
                    start.elapsed().as_millis(),
                    out_bytes,
                    err_bytes
                );
                status
            }
            Ok(Err(e)) => {
                tracing::warn!("Lost test runtime output ({}), killing it", e);
                kill(&mut child).await;
                return Err(LocalizationFailure::with_output(
                    LocalizationError::Stream(e),
                    captured(),
                ));
            }
            Err(_) => {
                tracing::warn!("Test runtime exceeded {:?}, killing it", timeout);
                kill(&mut child).await;
                return Err(LocalizationFailure::with_output(
                    LocalizationError::Timeout(timeout),
                    captured(),
                ));
            }
        };

        match registration.take_outcome() {
            Some(ExecutionOutcome::Success { payload }) => {
                if !status.success() {
                    tracing::warn!(
                        "Test runtime exited with {} but deposited results, using them",
                        status
                    );
                }
                Ok(payload)
            }
            Some(ExecutionOutcome::Failure { message }) => Err(LocalizationFailure::with_output(
                LocalizationError::ChildReported(message),
                captured(),
            )),
            None => Err(LocalizationFailure::with_output(
                LocalizationError::NoResponse {
                    status: status.to_string(),
                },
                captured(),
            )),
        }
    }
}

impl TestExecutor for ProcessRunner {
    async fn execute(&self, job: &ExecutionJob) -> Result<ExecutionPayload, LocalizationFailure> {
        let result = self.launch(job).await;
        match &result {
            Ok(payload) => tracing::info!(
                "Test runtime reported {} tests and {} elements",
                payload.tests.len(),
                payload.elements.len()
            ),
            Err(failure) => tracing::warn!("Instrumented test run failed: {}", failure),
        }
        result
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill test runtime: {}", e);
    }
}

fn resolve_against(base: &Path, entry: &Path) -> PathBuf {
    if entry.is_absolute() {
        entry.to_path_buf()
    } else {
        base.join(entry)
    }
}
