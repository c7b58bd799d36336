//! Per-token access policies and the token table.

use std::collections::HashMap;

use glob::Pattern;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::ToolInfo;

/// Access policy attached to one bearer token.
///
/// Patterns are shell globs (`*`, `?`, `[set]`) matched case-sensitively
/// against the full tool name. Exclusion always wins over inclusion.
#[derive(Debug, Clone, Default)]
pub struct TokenPolicy {
    /// Patterns of tools this token may call.
    pub allowed_patterns: Vec<String>,
    /// Patterns of tools this token may never call, evaluated first.
    pub excluded_patterns: Vec<String>,
    /// Optional bound mailbox identity.
    pub mailbox_id: Option<String>,
}

impl TokenPolicy {
    /// The development-mode policy: everything allowed, nothing bound.
    pub fn allow_all() -> Self {
        Self {
            allowed_patterns: vec!["*".to_string()],
            excluded_patterns: Vec::new(),
            mailbox_id: None,
        }
    }

    /// Whether this policy permits calling `tool_name`.
    ///
    /// Exclusion is evaluated before inclusion: any excluded pattern match
    /// denies the call regardless of the allow list.
    pub fn can_invoke(&self, tool_name: &str) -> bool {
        if self
            .excluded_patterns
            .iter()
            .any(|p| pattern_matches(p, tool_name))
        {
            return false;
        }
        if self.allowed_patterns.iter().any(|p| p == "*") {
            return true;
        }
        self.allowed_patterns
            .iter()
            .any(|p| pattern_matches(p, tool_name))
    }

    /// Order-preserving sublist of `defs` this policy may call.
    pub fn filter<'a>(&self, defs: &'a [ToolInfo]) -> Vec<&'a ToolInfo> {
        defs.iter().filter(|d| self.can_invoke(&d.name)).collect()
    }
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(name),
        Err(_) => false,
    }
}

/// One entry of the configured token table, as it appears on disk.
#[derive(Debug, Deserialize)]
struct TokenEntry {
    api_key: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    exclude_tools: Vec<String>,
    #[serde(default)]
    mailbox: Option<String>,
}

/// Immutable token -> policy table, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    policies: HashMap<String, TokenPolicy>,
}

impl TokenTable {
    /// Parse the table from the configured JSON array of
    /// `{api_key, tools, exclude_tools, mailbox?}` objects.
    pub fn from_json(value: Value) -> Result<Self> {
        let entries: Vec<TokenEntry> = serde_json::from_value(value)
            .map_err(|e| Error::internal(format!("invalid token table: {e}")))?;

        let mut policies = HashMap::new();
        for entry in entries {
            for pattern in entry.tools.iter().chain(entry.exclude_tools.iter()) {
                if pattern != "*" && Pattern::new(pattern).is_err() {
                    warn!(pattern, "invalid glob pattern in token table");
                }
            }
            policies.insert(
                entry.api_key,
                TokenPolicy {
                    allowed_patterns: entry.tools,
                    excluded_patterns: entry.exclude_tools,
                    mailbox_id: entry.mailbox,
                },
            );
        }
        Ok(Self { policies })
    }

    /// Look up the policy for a presented token.
    pub fn resolve(&self, token: &str) -> Option<&TokenPolicy> {
        self.policies.get(token)
    }

    /// Number of configured tokens.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// True when no tokens are configured (development mode).
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
