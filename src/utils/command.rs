//! Utilities for running commands with proper error handling and timeouts

use anyhow::{Context, Result};
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use tracing::{debug, error};

/// Run a command to completion, optionally bounded by `timeout`.
///
/// The exit status is not checked; on timeout the child is killed.
pub fn spawn_output(mut cmd: Command, timeout: Option<Duration>) -> Result<Output> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let program = cmd.get_program().to_string_lossy().into_owned();

    let Some(timeout_duration) = timeout else {
        return cmd
            .output()
            .with_context(|| format!("Failed to execute {}", program));
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start timeout runtime")?;

    runtime.block_on(async {
        let mut child = tokio::process::Command::from(cmd);
        child.kill_on_drop(true);

        match tokio::time::timeout(timeout_duration, child.output()).await {
            Ok(output) => output.with_context(|| format!("Failed to execute {}", program)),
            Err(_) => Err(anyhow::anyhow!(
                "Command timed out after {} seconds",
                timeout_duration.as_secs()
            )),
        }
    })
}

/// Run a command with optional timeout, failing on a non-zero exit code
pub fn run_command(program: &str, args: &[&str], timeout: Option<Duration>) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args);

    debug!("Running command: {} {}", program, args.join(" "));

    let output = spawn_output(cmd, timeout)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} {}", program, args.join(" "));
        error!("Stderr: {}", stderr);
        anyhow::bail!(
            "Command failed with exit code {:?}: {}",
            output.status.code(),
            stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        debug!("Command output: {}", stdout.trim_end());
    }

    Ok(output)
}

/// Run a command and return stdout as string
pub fn run_command_stdout(program: &str, args: &[&str], timeout: Option<Duration>) -> Result<String> {
    let output = run_command(program, args, timeout)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a shell command with extra environment variables.
///
/// Unlike [`run_command`], a non-zero exit code is returned to the caller
/// in the `Output` rather than as an error.
pub fn run_shell_command(
    command: &str,
    env: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<Output> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.envs(env.iter().copied());

    debug!("Running shell command: {}", command);
    spawn_output(cmd, timeout)
}
