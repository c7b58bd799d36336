//! Subprocess plumbing shared by the exec tools.

use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::warn;

use crate::types::{elapsed_label, ExecutionResult};

/// Run a prepared command under a hard deadline.
///
/// The child is placed in its own process group; on timeout the whole group
/// is killed and the child's exit is awaited before returning. Captured
/// output is truncated to `max_output` bytes per stream.
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
    max_output: usize,
) -> ExecutionResult {
    command
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let start = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecutionResult::failure("Unexpected", format!("failed to spawn process: {e}"))
        },
    };

    let pid = child.id();
    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    // Child::wait is cancel-safe, so it can be retried after the timeout.
    let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status.ok(), false),
        Err(_) => {
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            // Reap the child so no zombie outlives the call.
            let _ = child.wait().await;
            (None, true)
        },
    };

    let stdout = truncate_output(stdout_task.await.unwrap_or_default(), max_output);
    let stderr = truncate_output(stderr_task.await.unwrap_or_default(), max_output);

    if timed_out {
        let seconds = timeout.as_secs();
        warn!(timeout = seconds, "execution timed out, process group killed");
        return ExecutionResult::failure(
            "TimeoutError",
            format!("Execution timeout after {seconds}s"),
        )
        .with_stderr(format!("Execution timeout after {seconds}s"))
        .with_execution_time(format!(">{seconds}s"));
    }

    let Some(status) = status else {
        return ExecutionResult::failure("Unexpected", "failed to wait for process exit");
    };
    let return_code = status.code().unwrap_or(-1);

    let mut result = ExecutionResult {
        success: return_code == 0,
        stdout,
        stderr,
        return_code,
        execution_time: elapsed_label(start),
        metadata: serde_json::Map::new(),
        error_kind: String::new(),
        error_message: String::new(),
    };
    // A nonzero exit normally explains itself on stderr; when it does not,
    // the failure still has to name a cause.
    if !result.success && result.stderr.is_empty() {
        result.error_kind = "Unexpected".to_string();
        result.error_message = format!("process exited with status {return_code}");
    }
    result
}

async fn read_stream<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buffer = Vec::new();
    let _ = reader.read_to_end(&mut buffer).await;
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Cap captured output, marking the cut.
pub fn truncate_output(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("... [truncated]");
    }
    text
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // The child leads its own group, so the group id equals its pid.
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let result = run_with_timeout(shell("echo hello"), Duration::from_secs(5), 100_000).await;
        assert!(result.success);
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.return_code, 0);
        assert!(result.execution_time.ends_with('s'));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure_with_a_cause() {
        let result = run_with_timeout(shell("exit 3"), Duration::from_secs(5), 100_000).await;
        assert!(!result.success);
        assert_eq!(result.return_code, 3);
        assert!(!result.error_kind.is_empty() || !result.stderr.is_empty());
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let result =
            run_with_timeout(shell("echo oops >&2; exit 1"), Duration::from_secs(5), 100_000).await;
        assert!(!result.success);
        assert_eq!(result.stderr, "oops\n");
        // stderr explains the failure, no synthetic kind needed
        assert!(result.error_kind.is_empty());
    }

    #[tokio::test]
    async fn timeout_kills_the_whole_group() {
        let start = Instant::now();
        let result = run_with_timeout(
            shell("sleep 30 & sleep 30"),
            Duration::from_millis(300),
            100_000,
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, "TimeoutError");
        assert_eq!(result.execution_time, ">0s");
        // Group kill means we do not wait out the sleeps.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn truncation_marks_the_cut_and_respects_char_boundaries() {
        assert_eq!(truncate_output("short".into(), 100), "short");
        assert_eq!(truncate_output("abcdef".into(), 3), "abc... [truncated]");
        // Multi-byte char straddling the limit is dropped whole.
        let cut = truncate_output("aé".into(), 2);
        assert_eq!(cut, "a... [truncated]");
    }
}
