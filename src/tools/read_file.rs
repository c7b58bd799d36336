//! The `read_file` tool.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::RequestScope;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::server::{ToolHandler, ToolRegistry};
use crate::tools::process::truncate_output;
use crate::tools::ToolContext;
use crate::types::ExecutionResult;

#[derive(Debug, Deserialize)]
struct ReadArgs {
    file_path: String,
    /// 1-based first line to return.
    #[serde(default)]
    offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    limit: Option<usize>,
}

struct ReadFile {
    config: Arc<Config>,
}

#[async_trait]
impl ToolHandler for ReadFile {
    async fn handle(&self, args: Value, _scope: RequestScope) -> Result<ExecutionResult> {
        let args: ReadArgs =
            serde_json::from_value(args).map_err(|e| Error::validation(e.to_string()))?;
        if args.file_path.is_empty() {
            return Err(Error::validation("file_path must be a non-empty string"));
        }

        let start = Instant::now();
        let content = match tokio::fs::read_to_string(&args.file_path).await {
            Ok(content) => content,
            Err(e) => {
                let kind = match e.kind() {
                    std::io::ErrorKind::NotFound => "FileNotFoundError",
                    std::io::ErrorKind::PermissionDenied => "PermissionError",
                    _ => "IoError",
                };
                return Ok(ExecutionResult::failure(kind, e.to_string())
                    .with_metadata("file_path", args.file_path.as_str())
                    .timed(start));
            },
        };

        let total_lines = content.lines().count();
        let offset = args.offset.unwrap_or(1).max(1);
        let selected: String = match args.limit {
            Some(limit) => content
                .lines()
                .skip(offset - 1)
                .take(limit)
                .collect::<Vec<_>>()
                .join("\n"),
            None if offset > 1 => content
                .lines()
                .skip(offset - 1)
                .collect::<Vec<_>>()
                .join("\n"),
            None => content,
        };

        Ok(
            ExecutionResult::success(truncate_output(selected, self.config.max_output))
                .with_metadata("file_path", args.file_path.as_str())
                .with_metadata("total_lines", total_lines)
                .timed(start),
        )
    }
}

/// Register `read_file`.
pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<()> {
    registry.register(
        "read_file",
        "Read a UTF-8 text file, optionally a line range of it.",
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to read"
                },
                "offset": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "First line to return, 1-based"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["file_path"]
        }),
        Arc::new(ReadFile {
            config: ctx.config.clone(),
        }),
    )
}
