//! Subprocess execution shared by the classical strategies.
//!
//! Runs one phase (compile, run, report) with captured output, a timeout,
//! and an optional address-space ceiling applied through the launching
//! shell's `ulimit`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::ExecutionError;

/// Fallback ceiling for a single phase when the request sets no timeout.
const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(300);

/// One subprocess invocation.
pub(crate) struct CommandSpec {
    pub phase: &'static str,
    pub program: String,
    pub args: Vec<String>,
    pub envs: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
    pub max_memory_mb: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    #[allow(dead_code)]
    pub stderr: String,
}

/// Run the command to completion, failing on spawn errors, timeouts, and
/// non-zero exit (with stdout/stderr preserved in the error).
pub(crate) async fn run(spec: CommandSpec) -> Result<CommandOutput, ExecutionError> {
    let mut command = match spec.max_memory_mb {
        // `ulimit -v` takes KiB and applies to the exec'd child.
        Some(mb) => {
            let mut c = Command::new("sh");
            c.arg("-c")
                .arg(format!("ulimit -v {}; exec \"$0\" \"$@\"", mb * 1024))
                .arg(&spec.program)
                .args(&spec.args);
            c
        }
        None => {
            let mut c = Command::new(&spec.program);
            c.args(&spec.args);
            c
        }
    };

    command
        .envs(&spec.envs)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(
        phase = spec.phase,
        program = %spec.program,
        args = ?spec.args,
        cwd = %spec.cwd.display(),
        "Running command"
    );

    let child = command.spawn().map_err(|e| ExecutionError::Spawn {
        command: spec.program.clone(),
        reason: e.to_string(),
    })?;

    let timeout = spec.timeout.unwrap_or(DEFAULT_PHASE_TIMEOUT);
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ExecutionError::Timeout {
            phase: spec.phase.to_string(),
            timeout,
        })??;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ExecutionError::CommandFailed {
            phase: spec.phase.to_string(),
            status: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}
