//! Per-request authorization scope and the mailbox directory.

use std::collections::HashMap;

use http::header::{HeaderMap, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::auth::policy::{TokenPolicy, TokenTable};
use crate::error::{Error, Result};

/// OAuth2 credentials for one bound mailbox.
#[derive(Clone, Deserialize)]
pub struct MailboxCredentials {
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Token endpoint; defaults to the Google OAuth2 endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

// Secrets stay out of logs.
impl std::fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Mailbox id -> credentials, loaded once at startup.
///
/// Tokens reference mailboxes by id only; the credentials live here so the
/// token table never carries secondary-identity secrets.
#[derive(Debug, Clone, Default)]
pub struct MailboxDirectory {
    accounts: HashMap<String, MailboxCredentials>,
}

impl MailboxDirectory {
    /// Parse the directory from a JSON object keyed by mailbox id.
    pub fn from_json(value: Value) -> Result<Self> {
        let accounts: HashMap<String, MailboxCredentials> = serde_json::from_value(value)
            .map_err(|e| Error::internal(format!("invalid mailbox directory: {e}")))?;
        Ok(Self { accounts })
    }

    /// Look up credentials by mailbox id.
    pub fn get(&self, mailbox_id: &str) -> Option<&MailboxCredentials> {
        self.accounts.get(mailbox_id)
    }

    /// Number of configured mailboxes.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// True when no mailboxes are configured.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Everything a handler may learn about the request that invoked it.
///
/// Created by [`authorize`] per HTTP request and discarded with the
/// response. Handlers that have no use for it simply ignore it.
#[derive(Debug, Clone)]
pub struct RequestScope {
    /// Policy of the authenticated token.
    pub policy: TokenPolicy,
    /// The token itself, for handlers that key per-token state.
    pub token_id: String,
    /// Credentials of the bound mailbox, when bound and known.
    pub mailbox: Option<MailboxCredentials>,
    /// Cancelled when the client gives up on the request.
    pub cancellation: CancellationToken,
}

impl RequestScope {
    /// Build a scope for the given policy, resolving the mailbox binding.
    pub fn new(policy: TokenPolicy, token_id: String, mailboxes: &MailboxDirectory) -> Self {
        let mailbox = policy
            .mailbox_id
            .as_deref()
            .and_then(|id| mailboxes.get(id))
            .cloned();
        Self {
            policy,
            token_id,
            mailbox,
            cancellation: CancellationToken::new(),
        }
    }

    /// A development-mode scope: allow-all policy, nothing bound.
    pub fn allow_all() -> Self {
        Self {
            policy: TokenPolicy::allow_all(),
            token_id: String::new(),
            mailbox: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Credentials of the bound mailbox, or the reason there are none.
    ///
    /// The `Err` string is a handler-layer failure: callers report it as an
    /// `ExecutionResult` with `error_kind = "PermissionError"`, not through
    /// the RPC error channel.
    pub fn require_mailbox(&self) -> std::result::Result<&MailboxCredentials, String> {
        let Some(mailbox_id) = self.policy.mailbox_id.as_deref() else {
            return Err("This API Key has no mailbox bound".to_string());
        };
        self.mailbox.as_ref().ok_or_else(|| {
            format!("Mailbox '{mailbox_id}' is not configured; check the mailbox directory")
        })
    }
}

/// Parse the `Authorization` header and resolve the request scope.
///
/// With no tokens configured at all the server runs in development mode and
/// every request gets an allow-all scope. Otherwise the header must be
/// exactly `Bearer <token>` (scheme case-insensitive) and the token must be
/// known.
pub fn authorize(
    headers: &HeaderMap,
    tokens: &TokenTable,
    mailboxes: &MailboxDirectory,
) -> Result<RequestScope> {
    if tokens.is_empty() {
        return Ok(RequestScope::allow_all());
    }

    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(Error::missing_auth_header)?;

    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") {
        warn!("malformed Authorization header");
        return Err(Error::malformed_auth_header());
    }

    let token = parts[1];
    let policy = tokens.resolve(token).ok_or_else(|| {
        warn!("unknown API key presented");
        Error::InvalidToken
    })?;

    Ok(RequestScope::new(
        policy.clone(),
        token.to_string(),
        mailboxes,
    ))
}
