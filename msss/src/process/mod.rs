//! External process execution.
//!
//! Every external astronomy tool is invoked through a [`ProcessRunner`].
//! Tools inherit the orchestrator's stdout/stderr so their output reaches
//! the operator unmodified; only the exit status is inspected.

mod invocation;

pub use invocation::StageInvocation;

use async_trait::async_trait;
use msss_shared::errors::{MsssError, MsssResult};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;

/// Runs a script inside the environment set up by an init script.
///
/// `$0` is the init script, `"$@"` the tool and its arguments.
const INIT_WRAPPER: &str = r#"source "$0" && exec "$@""#;

/// Executes external tools.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion. Fails on spawn failure or nonzero exit.
    async fn run(&self, invocation: &StageInvocation) -> MsssResult<()>;

    /// Run to completion and return captured stdout. stderr still passes
    /// through.
    async fn capture(&self, invocation: &StageInvocation) -> MsssResult<String>;
}

pub type SharedRunner = Arc<dyn ProcessRunner>;

/// Runs tools as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> SharedRunner {
        Arc::new(Self)
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: &StageInvocation) -> MsssResult<()> {
        tracing::debug!(command = %invocation.command_line(), "Running external tool");
        let start = Instant::now();

        let mut cmd = build_command(invocation);
        cmd.stdout(Stdio::inherit());
        let status = cmd
            .status()
            .await
            .map_err(|e| start_error(invocation, e))?;

        check_status(invocation, status)?;
        tracing::info!(
            executable = %invocation.executable,
            duration_ms = start.elapsed().as_millis() as u64,
            "External tool finished"
        );
        Ok(())
    }

    async fn capture(&self, invocation: &StageInvocation) -> MsssResult<String> {
        tracing::debug!(command = %invocation.command_line(), "Querying external tool");

        let mut cmd = build_command(invocation);
        cmd.stdout(Stdio::piped());
        let output = cmd
            .output()
            .await
            .map_err(|e| start_error(invocation, e))?;

        check_status(invocation, output.status)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn build_command(invocation: &StageInvocation) -> Command {
    let mut cmd = match &invocation.initscript {
        Some(script) => {
            let mut cmd = Command::new("bash");
            cmd.arg("-c")
                .arg(INIT_WRAPPER)
                .arg(script)
                .arg(&invocation.executable);
            cmd
        }
        None => Command::new(&invocation.executable),
    };
    cmd.args(&invocation.args);

    if let Some(dir) = &invocation.current_dir {
        cmd.current_dir(dir);
    }

    // Batch tools never read stdin; keep them off the operator's terminal.
    cmd.stdin(Stdio::null());
    cmd.stderr(Stdio::inherit());
    cmd.kill_on_drop(false);
    cmd
}

fn start_error(invocation: &StageInvocation, e: std::io::Error) -> MsssError {
    let reason = match e.kind() {
        std::io::ErrorKind::NotFound => "executable not found".to_string(),
        _ => e.to_string(),
    };
    tracing::error!(executable = %invocation.executable, %reason, "Failed to start external tool");
    MsssError::ProcessStart {
        executable: invocation.executable.clone(),
        reason,
    }
}

fn check_status(invocation: &StageInvocation, status: ExitStatus) -> MsssResult<()> {
    if status.success() {
        return Ok(());
    }
    tracing::error!(
        command = %invocation.command_line(),
        code = ?status.code(),
        "External tool failed"
    );
    Err(MsssError::ProcessFailure {
        executable: invocation.executable.clone(),
        code: status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_success() {
        let result = SystemRunner.run(&StageInvocation::new("true")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_process_failure() {
        let err = SystemRunner
            .run(&StageInvocation::new("sh").arg("-c").arg("exit 3"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MsssError::ProcessFailure { code: Some(3), .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_executable_is_start_failure() {
        let err = SystemRunner
            .run(&StageInvocation::new("msss-no-such-tool-xyz"))
            .await
            .unwrap_err();
        match err {
            MsssError::ProcessStart { executable, reason } => {
                assert_eq!(executable, "msss-no-such-tool-xyz");
                assert_eq!(reason, "executable not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_capture_returns_stdout() {
        let out = SystemRunner
            .capture(&StageInvocation::new("echo").arg("hello").arg("world"))
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_initscript_environment_is_visible() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("init.sh");
        std::fs::write(&script, "export MSSS_INIT_MARKER=awimager-2.0\n").unwrap();

        let out = SystemRunner
            .capture(
                &StageInvocation::new("sh")
                    .arg("-c")
                    .arg("echo $MSSS_INIT_MARKER")
                    .initscript(Some(script.as_path())),
            )
            .await
            .unwrap();
        assert_eq!(out.trim(), "awimager-2.0");
    }

    #[tokio::test]
    async fn test_current_dir_is_applied() {
        let dir = TempDir::new().unwrap();
        let out = SystemRunner
            .capture(&StageInvocation::new("pwd").current_dir(dir.path()))
            .await
            .unwrap();
        let reported = std::path::PathBuf::from(out.trim()).canonicalize().unwrap();
        assert_eq!(reported, dir.path().canonicalize().unwrap());
    }
}
