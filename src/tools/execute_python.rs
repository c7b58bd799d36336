//! The `execute_python` tool.
//!
//! Source is written to a timestamped scratch file under the work
//! directory, then run with `python3`. Scratch files are left in place and
//! swept on the next startup.

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
struct PythonArgs {
    code: String,
    #[serde(default)]
    timeout: Option<u64>,
}

struct ExecutePython {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for ExecutePython {
    async fn handle(&self, args: Value, _scope: RequestScope) -> Result<ExecutionResult> {
        let args: PythonArgs =
            serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        if args.code.is_empty() {
            return Err(Error::validation("code must be a non-empty string"));
        }

        let max = self.config.exec_timeout.as_secs().max(1);
        let timeout = Duration::from_secs(args.timeout.map_or(max, |t| t.clamp(1, max)));

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let scratch = self.config.work_dir.join(format!("exec_{timestamp}.py"));
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| Error::internal(format!("cannot create work directory: {e}")))?;
        tokio::fs::write(&scratch, &args.code)
            .await
            .map_err(|e| Error::internal(format!("cannot write scratch file: {e}")))?;

        info!(length = args.code.len(), timeout = timeout.as_secs(), "running python code");

        let mut command = Command::new("python3");
        command.arg(&scratch).current_dir(&self.config.work_dir);

        let result = run_with_timeout(command, timeout, self.config.max_output).await;
        Ok(result.with_metadata("temp_file", scratch.display().to_string()))
    }
}

/// Register `execute_python`.
pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<()> {
    let max = ctx.config.exec_timeout.as_secs();
    registry.register(
        "execute_python",
        "Run Python 3 source code and return its stdout, stderr and exit \
         status. The standard library and any installed packages are \
         available; print() is how results come back.",
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python 3 source code to run"
                },
                "timeout": {
                    "type": "integer",
                    "default": max,
                    "minimum": 1,
                    "maximum": max,
                    "description": "Execution timeout in seconds"
                }
            },
            "required": ["code"]
        }),
        Arc::new(ExecutePython {
            config: ctx.config.clone(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> ExecutePython {
        let dir = tempfile::tempdir().unwrap();
        ExecutePython {
            config: Arc::new(Config::for_tests(dir.keep())),
        }
    }

    #[tokio::test]
    async fn runs_code_and_leaves_a_scratch_file() {
        let tool = handler();
        let result = tool
            .handle(json!({"code": "print(2 + 2)"}), RequestScope::allow_all())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "4\n");

        let scratch = result.metadata["temp_file"].as_str().unwrap();
        assert!(std::path::Path::new(scratch).exists());
        assert!(scratch.contains("exec_"));
    }

    #[tokio::test]
    async fn empty_code_is_a_validation_error() {
        let err = handler()
            .handle(json!({"code": ""}), RequestScope::allow_all())
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[tokio::test]
    async fn python_exceptions_come_back_on_stderr() {
        let result = handler()
            .handle(
                json!({"code": "raise RuntimeError('boom')"}),
                RequestScope::allow_all(),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.stderr.contains("RuntimeError"));
        assert_ne!(result.return_code, 0);
    }
}
