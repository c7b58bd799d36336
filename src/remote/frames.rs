//! Wire frames exchanged with the remote browser agent.
//!
//! Frames are JSON text messages over the WebSocket; field names are
//! snake_case on the wire (`request_id`, `client_id`, `user_agent`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The agent's opening frame: `{type:"auth", token, client_id, ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthFrame {
    /// Shared secret presented by the agent.
    #[serde(default)]
    pub token: String,
    /// Agent-chosen identifier.
    #[serde(default)]
    pub client_id: String,
    /// Agent's user-agent string.
    #[serde(default)]
    pub user_agent: String,
    /// Agent-local timestamp of the connection attempt.
    #[serde(default)]
    pub timestamp: String,
}

/// Server reply to the auth frame.
#[derive(Debug, Clone, Serialize)]
pub struct AuthReply {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl AuthReply {
    /// `{type:"auth_success"}`
    pub fn success() -> Self {
        Self {
            kind: "auth_success",
            message: None,
        }
    }

    /// `{type:"auth_failed", message}`
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: "auth_failed",
            message: Some(message.into()),
        }
    }
}

/// A command frame sent to the agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentCommand {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Correlation id; the reply must echo it.
    pub request_id: Uuid,
    /// Browser action to perform.
    pub action: String,
    /// Action parameters.
    pub params: Value,
}

impl AgentCommand {
    /// Build a command with a fresh correlation id.
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            kind: "command",
            request_id: Uuid::new_v4(),
            action: action.into(),
            params,
        }
    }
}

/// A `{type:"response", ...}` frame from the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandReply {
    /// Correlation id of the command being answered.
    pub request_id: Uuid,
    /// Whether the agent executed the command successfully.
    #[serde(default)]
    pub success: bool,
    /// Result payload on success.
    #[serde(default)]
    pub data: Option<Value>,
    /// Failure description on `success: false`.
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_frame_uses_wire_field_names() {
        let cmd = AgentCommand::new("get_url", json!({}));
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["type"], "command");
        assert_eq!(v["action"], "get_url");
        assert!(v["request_id"].is_string());
        assert_eq!(v["params"], json!({}));
    }

    #[test]
    fn auth_replies_serialize_to_the_two_known_shapes() {
        let ok = serde_json::to_value(AuthReply::success()).unwrap();
        assert_eq!(ok, json!({"type": "auth_success"}));

        let bad = serde_json::to_value(AuthReply::failed("invalid token")).unwrap();
        assert_eq!(bad, json!({"type": "auth_failed", "message": "invalid token"}));
    }

    #[test]
    fn reply_parses_with_optional_fields_absent() {
        let id = Uuid::new_v4();
        let reply: CommandReply =
            serde_json::from_value(json!({"request_id": id, "success": true})).unwrap();
        assert_eq!(reply.request_id, id);
        assert!(reply.success);
        assert!(reply.data.is_none());
        assert!(reply.error.is_none());
    }

    #[test]
    fn reply_with_malformed_id_is_unparseable() {
        let res: Result<CommandReply, _> =
            serde_json::from_value(json!({"request_id": "not-a-uuid", "success": true}));
        assert!(res.is_err());
    }

    #[test]
    fn auth_frame_defaults_identity_fields() {
        let auth: AuthFrame = serde_json::from_value(json!({"token": "s3cret"})).unwrap();
        assert_eq!(auth.token, "s3cret");
        assert_eq!(auth.client_id, "");
        assert_eq!(auth.user_agent, "");
    }
}
