//! The uniform outcome of any tool invocation.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::protocol::{CallToolResult, Content};

/// Uniform result produced by every tool handler.
///
/// A failed execution (`success = false`) is a perfectly good JSON-RPC
/// *result*: it becomes `{isError: true}` in the `tools/call` envelope and
/// never an `error` object. The invariant enforced by the constructors is
/// that a failure always carries at least one of `error_kind`,
/// `error_message` or `stderr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the execution succeeded at the application level.
    pub success: bool,
    /// Captured standard output (possibly truncated).
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error (possibly truncated).
    #[serde(default)]
    pub stderr: String,
    /// Process exit code, or `-1` when no process ran to completion.
    #[serde(default)]
    pub return_code: i32,
    /// Wall-clock duration label, e.g. `"0.412s"` or `">300s"`.
    #[serde(default = "zero_duration")]
    pub execution_time: String,
    /// Ordered metadata side-channel, passed through to the client verbatim.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Failure classification (`TimeoutError`, `PermissionError`, ...).
    #[serde(default)]
    pub error_kind: String,
    /// Failure detail.
    #[serde(default)]
    pub error_message: String,
}

fn zero_duration() -> String {
    "0.000s".to_string()
}

impl ExecutionResult {
    /// A successful result with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
            return_code: 0,
            execution_time: zero_duration(),
            metadata: Map::new(),
            error_kind: String::new(),
            error_message: String::new(),
        }
    }

    /// A failed result with a populated kind and message.
    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            return_code: -1,
            execution_time: zero_duration(),
            metadata: Map::new(),
            error_kind: kind.into(),
            error_message: message,
        }
    }

    /// Attach stderr output.
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Set the process exit code.
    pub fn with_return_code(mut self, code: i32) -> Self {
        self.return_code = code;
        self
    }

    /// Add one metadata entry, preserving insertion order.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stamp the elapsed time since `start`.
    pub fn timed(mut self, start: Instant) -> Self {
        self.execution_time = elapsed_label(start);
        self
    }

    /// Set an explicit execution-time label (e.g. `">30s"` after a timeout).
    pub fn with_execution_time(mut self, label: impl Into<String>) -> Self {
        self.execution_time = label.into();
        self
    }

    /// Render the human-readable summary block.
    ///
    /// Deterministic concatenation of metadata lines (skipping
    /// `version_info` and empty values), the timing and return-code lines,
    /// an error line on failure, then stdout and stderr when present.
    pub fn to_text_output(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for (key, value) in &self.metadata {
            if key == "version_info" || is_blank(value) {
                continue;
            }
            lines.push(format!("{}: {}", title_case(key), display_value(value)));
        }
        lines.push(format!("Execution Time: {}", self.execution_time));
        lines.push(format!("Return Code: {}", self.return_code));
        if !self.success {
            lines.push(format!("Error: [{}] {}", self.error_kind, self.error_message));
        }
        if !self.stdout.is_empty() {
            lines.push(format!("Standard Output:\n{}", self.stdout));
        }
        if !self.stderr.is_empty() {
            lines.push(format!("Standard Error:\n{}", self.stderr));
        }
        lines.join("\n")
    }

    /// Wrap into the `tools/call` response envelope.
    pub fn into_call_result(self) -> CallToolResult {
        let text = self.to_text_output();
        CallToolResult {
            content: vec![Content::Text { text }],
            is_error: !self.success,
            metadata: if self.metadata.is_empty() {
                None
            } else {
                Some(self.metadata)
            },
        }
    }
}

/// Format a duration since `start` as the conventional seconds label.
pub fn elapsed_label(start: Instant) -> String {
    format!("{:.3}s", start.elapsed().as_secs_f64())
}

/// Values the summary skips: null, empty strings/containers, `false`, zero.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `work_dir` -> `Work Dir`.
fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn failure_always_names_its_cause() {
        let r = ExecutionResult::failure("TimeoutError", "Execution timeout after 2s");
        assert!(!r.success);
        assert!(!r.error_kind.is_empty() || !r.error_message.is_empty() || !r.stderr.is_empty());
    }

    #[test]
    fn summary_renders_in_fixed_order() {
        let r = ExecutionResult::success("hello\n")
            .with_metadata("command", "echo hello")
            .with_metadata("version_info", "hidden")
            .with_metadata("empty", "")
            .with_execution_time("0.004s");
        let text = r.to_text_output();
        assert_eq!(
            text,
            "Command: echo hello\n\
             Execution Time: 0.004s\n\
             Return Code: 0\n\
             Standard Output:\nhello\n"
        );
    }

    #[test]
    fn failure_summary_includes_error_line() {
        let r = ExecutionResult::failure("PermissionError", "no mailbox bound")
            .with_stderr("denied");
        let text = r.to_text_output();
        assert!(text.contains("Error: [PermissionError] no mailbox bound"));
        assert!(text.contains("Standard Error:\ndenied"));
    }

    #[test]
    fn metadata_survives_the_envelope_byte_for_byte() {
        let mut meta = Map::new();
        meta.insert("url".into(), json!("https://example.com"));
        meta.insert("took_ms".into(), json!(42));
        meta.insert("nested".into(), json!({"a": [1, 2, 3]}));

        let mut r = ExecutionResult::success("ok");
        r.metadata = meta.clone();

        let before = serde_json::to_vec(&meta).unwrap();
        let envelope = r.into_call_result();
        let after = serde_json::to_vec(envelope.metadata.as_ref().unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn failed_result_sets_is_error_not_an_rpc_error() {
        let envelope = ExecutionResult::failure("RemoteError", "agent said no").into_call_result();
        assert!(envelope.is_error);
        let Content::Text { text } = &envelope.content[0];
        assert!(text.contains("[RemoteError]"));
    }

    #[test]
    fn title_case_handles_multi_word_keys() {
        assert_eq!(title_case("file_path"), "File Path");
        assert_eq!(title_case("url"), "Url");
    }

    #[test]
    fn blank_values_are_skipped() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!("")));
        assert!(is_blank(&json!(0)));
        assert!(is_blank(&json!(false)));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!("x")));
        assert!(!is_blank(&json!(1)));
    }
}
