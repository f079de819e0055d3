//! Command spawning: `sh -c`/`powershell -Command`, with stdout/stderr
//! drained concurrently and routed to the logger (§4.7 "Command spawn").
//!
//! A simplified sibling of the teacher's `turborepo-process` child actor:
//! no pty, no signal forwarding, just "run it, stream its output, report
//! the exit code" — everything this executor's retry/timeout wrapper needs.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::info;

#[derive(Debug)]
pub struct CommandOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

/// The seam for `docker`/`remote` task execution (§6: "to remote/docker:
/// each receives `(command, env, workdir)` and returns ok/error; the core
/// treats both as alternative command runners behind the same shape").
/// No concrete implementation ships; a task requesting either without one
/// registered on the `Executor` fails with `DockerUnavailable`/
/// `RemoteUnavailable` (SPEC_FULL.md §H).
pub trait ExternalRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        command: &'a str,
        env: &'a BTreeMap<String, String>,
        workdir: &'a Path,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<CommandOutcome>> + Send + 'a>>;
}

/// Spawns `cmd` under the platform shell, draining stdout/stderr
/// concurrently line-by-line and logging each line prefixed with
/// `task_name`. `kill_on_drop` is set so an abandoned future (as happens on
/// timeout) tears the child down rather than orphaning it.
pub async fn run_command(
    task_name: &str,
    cmd: &str,
    env: &BTreeMap<String, String>,
    workdir: &Path,
) -> std::io::Result<CommandOutcome> {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("powershell");
        c.args(["-Command", cmd]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", cmd]);
        c
    };
    command
        .current_dir(workdir)
        .envs(env)
        .kill_on_drop(true)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let mut child = command.spawn()?;
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let task_out = task_name.to_string();
    let task_err = task_name.to_string();
    let out_drain = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(task = %task_out, "{line}");
        }
    });
    let err_drain = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(task = %task_err, "{line}");
        }
    });

    let status = child.wait().await?;
    let _ = out_drain.await;
    let _ = err_drain.await;

    Ok(CommandOutcome {
        success: status.success(),
        code: status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_reports_zero_exit() {
        let outcome = run_command("t", "exit 0", &BTreeMap::new(), Path::new("."))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.code, Some(0));
    }

    #[tokio::test]
    async fn failing_command_reports_nonzero_exit() {
        let outcome = run_command("t", "exit 3", &BTreeMap::new(), Path::new("."))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.code, Some(3));
    }

    #[tokio::test]
    async fn env_overlay_is_visible_to_child() {
        let mut env = BTreeMap::new();
        env.insert("FLUX_TEST_CHILD_VAR".to_string(), "present".to_string());
        let outcome = run_command(
            "t",
            "test \"$FLUX_TEST_CHILD_VAR\" = present",
            &env,
            Path::new("."),
        )
        .await
        .unwrap();
        assert!(outcome.success);
    }
}
