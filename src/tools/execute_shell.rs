//! The `execute_shell` tool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::info;

use crate::auth::RequestScope;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::server::{ToolHandler, ToolRegistry};
use crate::tools::process::run_with_timeout;
use crate::tools::ToolContext;
use crate::types::ExecutionResult;

#[derive(Debug, Deserialize)]
struct ShellArgs {
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    cwd: Option<String>,
}

struct ExecuteShell {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for ExecuteShell {
    async fn handle(&self, args: Value, _scope: RequestScope) -> Result<ExecutionResult> {
        let args: ShellArgs =
            serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        if args.command.trim().is_empty() {
            return Err(Error::validation("command must be a non-empty string"));
        }

        let max = self.config.exec_timeout.as_secs().max(1);
        let timeout = Duration::from_secs(args.timeout.map_or(max, |t| t.clamp(1, max)));

        let cwd = args
            .cwd
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| self.config.work_dir.clone());
        if !cwd.exists() {
            std::fs::create_dir_all(&cwd)
                .map_err(|e| Error::internal(format!("cannot create working directory: {e}")))?;
        }

        info!(length = args.command.len(), timeout = timeout.as_secs(), "running shell command");

        let mut command = Command::new("bash");
        command.arg("-c").arg(&args.command).current_dir(&cwd);

        let result = run_with_timeout(command, timeout, self.config.max_output).await;
        Ok(result.with_metadata("command", args.command.as_str()))
    }
}

/// Register `execute_shell`.
pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<()> {
    let max = ctx.config.exec_timeout.as_secs();
    registry.register(
        "execute_shell",
        "Run a shell command with bash. Pipes, redirection and environment \
         variables all work; output is captured and truncated if oversized.",
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to run, e.g. 'ls -la' or 'ps aux | grep python'"
                },
                "timeout": {
                    "type": "integer",
                    "default": max,
                    "minimum": 1,
                    "maximum": max,
                    "description": "Execution timeout in seconds"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory; defaults to the server work directory"
                }
            },
            "required": ["command"]
        }),
        Arc::new(ExecuteShell {
            config: ctx.config.clone(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> ExecuteShell {
        let dir = tempfile::tempdir().unwrap();
        ExecuteShell {
            config: Arc::new(Config::for_tests(dir.keep())),
        }
    }

    #[tokio::test]
    async fn runs_a_command_and_records_it_in_metadata() {
        let result = handler()
            .handle(json!({"command": "echo hi"}), RequestScope::allow_all())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.metadata["command"], json!("echo hi"));
    }

    #[tokio::test]
    async fn empty_command_is_a_validation_error() {
        let err = handler()
            .handle(json!({"command": "  "}), RequestScope::allow_all())
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[tokio::test]
    async fn missing_command_is_a_validation_error() {
        let err = handler()
            .handle(json!({}), RequestScope::allow_all())
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[tokio::test]
    async fn timeout_surfaces_as_a_result_not_an_error() {
        let result = handler()
            .handle(
                json!({"command": "sleep 30", "timeout": 1}),
                RequestScope::allow_all(),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, "TimeoutError");
    }
}
