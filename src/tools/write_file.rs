//! The `write_file` tool.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::RequestScope;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::server::{ToolHandler, ToolRegistry};
use crate::tools::ToolContext;
use crate::types::ExecutionResult;

#[derive(Debug, Deserialize)]
struct WriteArgs {
    file_path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

struct WriteFile {
    _config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for WriteFile {
    async fn handle(&self, args: Value, _scope: RequestScope) -> Result<ExecutionResult> {
        let args: WriteArgs =
            serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        if args.file_path.is_empty() {
            return Err(Error::validation("file_path must be a non-empty string"));
        }

        let start = Instant::now();
        let path = std::path::Path::new(&args.file_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return Ok(ExecutionResult::failure("IoError", e.to_string())
                        .with_metadata("file_path", args.file_path.as_str())
                        .timed(start));
                }
            }
        }

        let write_result = if args.append {
            use tokio::io::AsyncWriteExt;
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
            {
                Ok(mut file) => file.write_all(args.content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(path, &args.content).await
        };

        if let Err(e) = write_result {
            let kind = match e.kind() {
                std::io::ErrorKind::PermissionDenied => "PermissionError",
                _ => "IoError",
            };
            return Ok(ExecutionResult::failure(kind, e.to_string())
                .with_metadata("file_path", args.file_path.as_str())
                .timed(start));
        }

        let mode = if args.append { "appended" } else { "written" };
        Ok(
            ExecutionResult::success(format!(
                "{} {} bytes to {}",
                mode,
                args.content.len(),
                args.file_path
            ))
            .with_metadata("file_path", args.file_path.as_str())
            .with_metadata("bytes_written", args.content.len())
            .timed(start),
        )
    }
}

/// Register `write_file`.
pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<()> {
    registry.register(
        "write_file",
        "Write (or append) UTF-8 text to a file, creating parent directories \
         as needed.",
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Text content to write"
                },
                "append": {
                    "type": "boolean",
                    "default": false,
                    "description": "Append instead of overwriting"
                }
            },
            "required": ["file_path", "content"]
        }),
        Arc::new(WriteFile {
            _config: ctx.config.clone(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> (WriteFile, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFile {
            _config: Arc::new(Config::for_tests(dir.path().to_path_buf())),
        };
        (tool, dir)
    }

    #[tokio::test]
    async fn writes_creating_parents() {
        let (tool, dir) = handler();
        let path = dir.path().join("nested/deep/out.txt");
        let result = tool
            .handle(
                json!({"file_path": path.display().to_string(), "content": "hello"}),
                RequestScope::allow_all(),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.metadata["bytes_written"], json!(5));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn append_extends_the_file() {
        let (tool, dir) = handler();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "a").unwrap();
        tool.handle(
            json!({"file_path": path.display().to_string(), "content": "b", "append": true}),
            RequestScope::allow_all(),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ab");
    }

    #[tokio::test]
    async fn missing_content_is_a_validation_error() {
        let (tool, dir) = handler();
        let path = dir.path().join("out.txt");
        let err = tool
            .handle(
                json!({"file_path": path.display().to_string()}),
                RequestScope::allow_all(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
    }
}
