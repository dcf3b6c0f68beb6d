//! Process execution for contract tasks.
//!
//! A task attempt spawns the exact argv in its own process group, drains both
//! output streams concurrently into bounded buffers and waits for exit, the
//! task timeout or a phase abort, whichever comes first. The final attempt's
//! output is pushed to the evidence store.

pub mod capture;
pub mod retry;

use crate::config::RunnerConfig;
use crate::contract::Task;
use crate::error::CommandError;
use crate::evidence::EvidenceStore;
use crate::report::{ExecutionResult, TaskError, TaskErrorKind, TaskStatus};
use async_trait::async_trait;
use capture::Captured;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Signals and location shared by every task of a run.
#[derive(Debug, Clone)]
pub struct RunControl {
    /// Run-level cancellation: no new attempt starts once raised. In-flight
    /// attempts finish.
    pub cancel: CancellationToken,
    /// Phase hard stop: in-flight processes are killed and recorded `timeout`.
    pub abort: CancellationToken,
    /// Base working directory; a task `workdir` is joined onto it.
    pub workdir: PathBuf,
}

impl RunControl {
    pub fn new(cancel: CancellationToken, workdir: impl Into<PathBuf>) -> Self {
        Self {
            cancel,
            abort: CancellationToken::new(),
            workdir: workdir.into(),
        }
    }

    /// Same run, fresh abort token for one phase.
    pub fn for_phase(&self, abort: CancellationToken) -> Self {
        Self {
            cancel: self.cancel.clone(),
            abort,
            workdir: self.workdir.clone(),
        }
    }
}

/// Executes one task to a terminal result. The scheduler depends only on this.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Always returns a terminal result (`success`, `failed` or `timeout`).
    async fn run(&self, task: &Task, control: &RunControl) -> ExecutionResult;
}

pub struct CommandRunner {
    evidence: Arc<EvidenceStore>,
    config: RunnerConfig,
}

/// What one attempt produced, before evidence is stored.
struct Attempt {
    status: TaskStatus,
    exit_code: Option<i32>,
    stdout: Captured,
    stderr: Captured,
    error: Option<TaskError>,
    /// Ended by a phase abort; never retried.
    aborted: bool,
}

impl Attempt {
    fn spawn_failed(message: String) -> Self {
        Self {
            status: TaskStatus::Failed,
            exit_code: None,
            stdout: Captured::default(),
            stderr: Captured::default(),
            error: Some(TaskError {
                kind: TaskErrorKind::Spawn,
                message,
            }),
            aborted: false,
        }
    }
}

#[derive(Debug)]
enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Aborted,
}

impl CommandRunner {
    pub fn new(evidence: Arc<EvidenceStore>, config: RunnerConfig) -> Self {
        Self { evidence, config }
    }

    async fn attempt(&self, task: &Task, control: &RunControl, timeout_ms: u64) -> Attempt {
        let argv = task.argv();
        let Some((program, args)) = argv.split_first() else {
            return Attempt::spawn_failed("empty command".into());
        };
        let workdir = task
            .workdir
            .as_ref()
            .map_or_else(|| control.workdir.clone(), |dir| control.workdir.join(dir));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&workdir)
            .envs(&task.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = CommandError::Spawn {
                    program: program.clone(),
                    message: e.to_string(),
                };
                return Attempt::spawn_failed(err.to_string());
            }
        };

        let limit = self.config.max_output_bytes;
        let stop_reading = CancellationToken::new();
        let stdout = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(capture::drain(pipe, limit, stop_reading.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(capture::drain(pipe, limit, stop_reading.clone())));

        let waited = race_exit(
            child.wait(),
            Duration::from_millis(timeout_ms),
            &control.abort,
        )
        .await;
        if !matches!(waited, Waited::Exited(_)) {
            self.terminate(&mut child).await;
        }

        let grace = Duration::from_millis(self.config.kill_grace_ms);
        let stdout = collect(stdout, &stop_reading, grace, &task.id).await;
        let stderr = collect(stderr, &stop_reading, grace, &task.id).await;

        let (status, exit_code, error) = match waited {
            Waited::Exited(Ok(status)) => classify_exit(status),
            Waited::Exited(Err(e)) => (
                TaskStatus::Failed,
                None,
                Some(TaskError {
                    kind: TaskErrorKind::Spawn,
                    message: format!("failed waiting for process: {e}"),
                }),
            ),
            Waited::TimedOut => (
                TaskStatus::Timeout,
                None,
                Some(TaskError {
                    kind: TaskErrorKind::Timeout,
                    message: CommandError::Timeout(timeout_ms).to_string(),
                }),
            ),
            Waited::Aborted => (
                TaskStatus::Timeout,
                None,
                Some(TaskError {
                    kind: TaskErrorKind::Timeout,
                    message: "killed at phase timeout".into(),
                }),
            ),
        };

        Attempt {
            status,
            exit_code,
            stdout,
            stderr,
            error,
            aborted: control.abort.is_cancelled() && status == TaskStatus::Timeout,
        }
    }

    /// SIGTERM the task's process group, wait the grace period, then SIGKILL.
    async fn terminate(&self, child: &mut Child) {
        let grace = Duration::from_millis(self.config.kill_grace_ms);
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            signal_group(pid, libc::SIGTERM);
            let exited = tokio::time::timeout(grace, child.wait()).await.is_ok();
            // Stragglers in the group would keep the output pipes open.
            signal_group(pid, libc::SIGKILL);
            if exited {
                return;
            }
        }
        if let Err(e) = child.start_kill() {
            tracing::debug!("kill after timeout failed: {e}");
        }
        let _ = child.wait().await;
    }

    /// Push the final attempt's output to the evidence store.
    async fn store_evidence(&self, attempt: &Attempt, result: &mut ExecutionResult) {
        let retries = self.config.evidence_retries;
        let stdout = self.evidence.put_with_retry(&attempt.stdout.bytes, retries).await;
        let stderr = self.evidence.put_with_retry(&attempt.stderr.bytes, retries).await;
        match (stdout, stderr) {
            (Ok(out), Ok(err)) => {
                result.stdout_digest = Some(out);
                result.stderr_digest = Some(err);
            }
            (out, err) => {
                result.stdout_digest = out.as_ref().ok().cloned();
                result.stderr_digest = err.as_ref().ok().cloned();
                let message = [out.err(), err.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| CommandError::Evidence(e.to_string()).to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                tracing::error!(task = %result.task_id, "{message}");
                result.status = TaskStatus::Failed;
                result.error = Some(TaskError {
                    kind: TaskErrorKind::EvidenceIo,
                    message,
                });
            }
        }
    }
}

#[async_trait]
impl TaskRunner for CommandRunner {
    async fn run(&self, task: &Task, control: &RunControl) -> ExecutionResult {
        let started = Instant::now();
        let timeout_ms = task.timeout_ms.unwrap_or(self.config.default_timeout_ms);
        let max_attempts = task.retry.max_attempts.max(1);

        let mut attempt_count = 0;
        let last = loop {
            attempt_count += 1;
            let attempt = self.attempt(task, control, timeout_ms).await;
            if attempt.status == TaskStatus::Success
                || attempt.aborted
                || attempt_count >= max_attempts
            {
                break attempt;
            }
            if control.cancel.is_cancelled() {
                tracing::debug!(task = %task.id, "run cancelled, not retrying");
                break attempt;
            }

            let delay = retry::backoff_delay(&task.retry, attempt_count);
            tracing::warn!(
                task = %task.id,
                attempt = attempt_count,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "task attempt failed, retrying: {}",
                attempt.error.as_ref().map_or("", |e| e.message.as_str())
            );
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = control.cancel.cancelled() => break attempt,
                () = control.abort.cancelled() => {
                    break Attempt {
                        status: TaskStatus::Timeout,
                        error: Some(TaskError {
                            kind: TaskErrorKind::Timeout,
                            message: "phase timeout during retry backoff".into(),
                        }),
                        aborted: true,
                        ..attempt
                    };
                }
            }
        };

        let mut result = ExecutionResult {
            task_id: task.id.clone(),
            status: last.status,
            exit_code: last.exit_code,
            stdout_digest: None,
            stderr_digest: None,
            stdout_truncated: last.stdout.truncated,
            stderr_truncated: last.stderr.truncated,
            duration_ms: 0,
            attempt_count,
            error: last.error.clone(),
            skip_reason: None,
        };
        self.store_evidence(&last, &mut result).await;
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        result
    }
}

fn classify_exit(status: ExitStatus) -> (TaskStatus, Option<i32>, Option<TaskError>) {
    match status.code() {
        Some(0) => (TaskStatus::Success, Some(0), None),
        Some(code) => (
            TaskStatus::Failed,
            Some(code),
            Some(TaskError {
                kind: TaskErrorKind::NonZeroExit,
                message: CommandError::NonZeroExit(code).to_string(),
            }),
        ),
        None => {
            #[cfg(unix)]
            let message = {
                use std::os::unix::process::ExitStatusExt;
                status.signal().map_or_else(
                    || CommandError::Signalled.to_string(),
                    |sig| format!("{} ({sig})", CommandError::Signalled),
                )
            };
            #[cfg(not(unix))]
            let message = CommandError::Signalled.to_string();
            (
                TaskStatus::Failed,
                None,
                Some(TaskError {
                    kind: TaskErrorKind::Signalled,
                    message,
                }),
            )
        }
    }
}

/// Exit, task timeout or phase abort, whichever comes first. Exit wins a tie
/// with the deadline.
async fn race_exit<F>(exit: F, timeout: Duration, abort: &CancellationToken) -> Waited
where
    F: Future<Output = std::io::Result<ExitStatus>>,
{
    tokio::select! {
        biased;
        status = exit => Waited::Exited(status),
        () = tokio::time::sleep(timeout) => Waited::TimedOut,
        () = abort.cancelled() => Waited::Aborted,
    }
}

/// Join a drain task. A stream still open `wait` after exit (a detached
/// grandchild holding the pipe) is stopped; the bytes read so far are kept.
async fn collect(
    handle: Option<JoinHandle<std::io::Result<Captured>>>,
    stop: &CancellationToken,
    wait: Duration,
    task_id: &str,
) -> Captured {
    let Some(mut handle) = handle else {
        return Captured::default();
    };
    let joined = match tokio::time::timeout(wait, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            tracing::warn!(task = %task_id, "output stream still open after exit; keeping what was read");
            stop.cancel();
            handle.await
        }
    };
    match joined {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            tracing::warn!(task = %task_id, "output read failed: {e}");
            Captured {
                bytes: Vec::new(),
                truncated: true,
            }
        }
        Err(e) => {
            tracing::warn!(task = %task_id, "output reader panicked: {e}");
            Captured {
                bytes: Vec::new(),
                truncated: true,
            }
        }
    }
}

#[cfg(unix)]
pub(crate) fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) on the process group created for this child; no memory
    // is shared with the callee.
    unsafe {
        libc::kill(-pid, signal);
    }
}
