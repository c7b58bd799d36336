//! The `gmail_profile` tool.
//!
//! Reports the mailbox identity bound to the calling token. This is the
//! canonical consumer of [`RequestScope::require_mailbox`]: a token without
//! a (known) binding gets a `PermissionError` result, not an RPC error.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::auth::RequestScope;
use crate::error::Result;
use crate::server::{ToolHandler, ToolRegistry};
use crate::tools::ToolContext;
use crate::types::ExecutionResult;

struct MailboxProfile;

#[async_trait]
impl ToolHandler for MailboxProfile {
    async fn handle(&self, _args: Value, scope: RequestScope) -> Result<ExecutionResult> {
        let start = Instant::now();
        match scope.require_mailbox() {
            Ok(credentials) => {
                let mailbox_id = scope.policy.mailbox_id.clone().unwrap_or_default();
                Ok(
                    ExecutionResult::success(format!("Mailbox bound: {mailbox_id}"))
                        .with_metadata("mailbox", mailbox_id.as_str())
                        .with_metadata("token_uri", credentials.token_uri.as_str())
                        .timed(start),
                )
            },
            Err(reason) => Ok(ExecutionResult::failure("PermissionError", reason).timed(start)),
        }
    }
}

/// Register `gmail_profile`.
pub fn register(registry: &mut ToolRegistry, _ctx: &ToolContext) -> Result<()> {
    registry.register(
        "gmail_profile",
        "Show which mailbox account this API key is bound to.",
        json!({ "type": "object", "properties": {}, "required": [] }),
        Arc::new(MailboxProfile),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MailboxDirectory, TokenTable};

    #[tokio::test]
    async fn unbound_token_gets_a_permission_error_result() {
        let result = MailboxProfile
            .handle(json!({}), RequestScope::allow_all())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, "PermissionError");
    }

    #[tokio::test]
    async fn bound_token_sees_its_mailbox() {
        let tokens = TokenTable::from_json(json!([
            {"api_key": "T", "tools": ["*"], "mailbox": "alice@example.com"}
        ]))
        .unwrap();
        let mailboxes = MailboxDirectory::from_json(json!({
            "alice@example.com": {
                "client_id": "id",
                "client_secret": "secret",
                "refresh_token": "refresh"
            }
        }))
        .unwrap();
        let scope = RequestScope::new(
            tokens.resolve("T").unwrap().clone(),
            "T".to_string(),
            &mailboxes,
        );

        let result = MailboxProfile.handle(json!({}), scope).await.unwrap();
        assert!(result.success);
        assert_eq!(result.metadata["mailbox"], json!("alice@example.com"));
    }
}
