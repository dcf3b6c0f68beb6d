use super::traits::GateContext;
use crate::contract::GateSpec;
use crate::error::GateError;
use crate::runner::capture::drain;
#[cfg(unix)]
use crate::runner::signal_group;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Cap on checker output kept for interpretation.
const MAX_CHECK_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CheckOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CheckOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Read `command` (+ optional `shell`) from gate params into an argv.
pub fn command_from_params(params: &Value) -> Result<Vec<String>, String> {
    let shell = params
        .get("shell")
        .map(|v| v.as_bool().ok_or("`shell` must be a boolean"))
        .transpose()?
        .unwrap_or(false);

    match params.get("command") {
        Some(Value::Array(items)) => {
            let argv = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or("`command` entries must be strings")
                })
                .collect::<Result<Vec<_>, _>>()?;
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err("`command` must be a non-empty argument list".into());
            }
            if shell {
                if argv.len() != 1 {
                    return Err("shell commands take exactly one script string".into());
                }
                return Ok(vec!["sh".into(), "-c".into(), argv[0].clone()]);
            }
            Ok(argv)
        }
        Some(Value::String(script)) if shell && !script.trim().is_empty() => {
            Ok(vec!["sh".into(), "-c".into(), script.clone()])
        }
        Some(Value::String(_)) => {
            Err("string commands require `shell: true`; use an argument list instead".into())
        }
        Some(_) => Err("`command` must be a list of strings".into()),
        None => Err("missing `command`".into()),
    }
}

/// Spawn a checker with the run context exposed through env vars and,
/// optionally, stdin. Only spawn/wait failures are errors.
///
/// Stdin is fed while both output streams are drained, so a checker that logs
/// before reading never deadlocks against a large payload. The checker runs in
/// its own process group; the group is killed once the checker exits, or when
/// this future is dropped at the gate timeout.
pub async fn run_check(
    argv: &[String],
    spec: &GateSpec,
    ctx: &GateContext,
    stdin_payload: Option<Vec<u8>>,
) -> Result<CheckOutput, GateError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(GateError::InvalidParams {
            gate: spec.id.clone(),
            message: "empty command".into(),
        });
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(&ctx.workdir)
        .env("PHASEGATE_PLAN_HASH", &ctx.plan_hash)
        .env("PHASEGATE_TASK_ID", &ctx.contract_id)
        .env("PHASEGATE_GATE_ID", &spec.id)
        .env("PHASEGATE_SCOPE", spec.scope.to_string())
        .env("PHASEGATE_PHASE", ctx.phase.as_deref().unwrap_or_default())
        .stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| GateError::Spawn(format!("{program}: {e}")))?;
    let mut group = GroupGuard(child.id());
    let pid = group.0;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let feed = async {
        if let (Some(payload), Some(mut pipe)) = (stdin_payload, stdin) {
            // A checker that ignores stdin may exit before reading; that is fine.
            if let Err(e) = pipe.write_all(&payload).await {
                tracing::debug!(gate = %spec.id, "checker closed stdin early: {e}");
            }
        }
    };
    let exited = async {
        let status = child.wait().await;
        // Stragglers in the group would keep the output pipes open.
        kill_group(pid);
        status
    };

    let (status, (), stdout, stderr) = tokio::join!(
        exited,
        feed,
        read_bounded(stdout, &spec.id),
        read_bounded(stderr, &spec.id),
    );
    group.0 = None;

    let status = status.map_err(|e| GateError::Spawn(format!("{program}: {e}")))?;
    Ok(CheckOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

async fn read_bounded<R>(pipe: Option<R>, gate_id: &str) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Vec::new();
    };
    match drain(pipe, MAX_CHECK_OUTPUT_BYTES, CancellationToken::new()).await {
        Ok(captured) => captured.bytes,
        Err(e) => {
            tracing::warn!(gate = %gate_id, "checker output read failed: {e}");
            Vec::new()
        }
    }
}

/// Kills the checker's process group on drop unless cleared.
struct GroupGuard(Option<u32>);

impl Drop for GroupGuard {
    fn drop(&mut self) {
        kill_group(self.0);
    }
}

fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        signal_group(pid, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Last non-empty line of `text`, trimmed and cut to `max_chars`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let line = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    if line.chars().count() > max_chars {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
