//! Environment-driven configuration.
//!
//! Every key is read exactly once at startup; the resulting [`Config`] is
//! immutable for the life of the process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::{MailboxDirectory, TokenTable};
use crate::error::{Error, Result};

/// Default JSON-RPC port.
pub const DEFAULT_PORT: u16 = 8000;
/// Default agent-bridge port.
pub const DEFAULT_AGENT_PORT: u16 = 8001;
/// Default per-tool execution timeout.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(300);
/// Default cap on captured stdout/stderr length.
pub const DEFAULT_MAX_OUTPUT: usize = 100_000;

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for both listeners.
    pub host: String,
    /// JSON-RPC endpoint port.
    pub port: u16,
    /// Agent bridge port.
    pub agent_port: u16,
    /// Shared secret the remote agent must present.
    pub agent_secret: String,
    /// Whether the agent bridge listens at all.
    pub agent_enabled: bool,
    /// Scratch directory for subprocess tools; wiped at startup.
    pub work_dir: PathBuf,
    /// Upper bound on subprocess execution time.
    pub exec_timeout: Duration,
    /// Upper bound on captured output length.
    pub max_output: usize,
    /// Token -> policy table.
    pub tokens: TokenTable,
    /// Mailbox id -> credentials directory.
    pub mailboxes: MailboxDirectory,
}

impl Config {
    /// Read the full configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let tokens = match load_json_env("TOOLGATE_API_KEYS") {
            Some(value) => TokenTable::from_json(value)?,
            None => TokenTable::default(),
        };
        if tokens.is_empty() {
            warn!("no API keys configured; authentication disabled (development mode)");
        } else {
            info!(count = tokens.len(), "API key authentication enabled");
        }

        let mailboxes = match load_json_env("TOOLGATE_MAILBOXES") {
            Some(value) => MailboxDirectory::from_json(value)?,
            None => MailboxDirectory::default(),
        };
        if !mailboxes.is_empty() {
            info!(count = mailboxes.len(), "mailbox directory loaded");
        }

        let agent_secret = std::env::var("TOOLGATE_AGENT_SECRET").unwrap_or_default();
        // An empty secret disables the bridge unless the flag says otherwise.
        let agent_enabled = match std::env::var("TOOLGATE_AGENT_ENABLED") {
            Ok(v) => v.eq_ignore_ascii_case("true") || v == "1",
            Err(_) => !agent_secret.is_empty(),
        };
        if agent_enabled && agent_secret.is_empty() {
            warn!("agent bridge enabled without a shared secret");
        }

        Ok(Self {
            host: std::env::var("TOOLGATE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("TOOLGATE_PORT", DEFAULT_PORT)?,
            agent_port: parse_env("TOOLGATE_AGENT_PORT", DEFAULT_AGENT_PORT)?,
            agent_secret,
            agent_enabled,
            work_dir: std::env::var("TOOLGATE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("workspace")),
            exec_timeout: Duration::from_secs(parse_env(
                "TOOLGATE_EXEC_TIMEOUT",
                DEFAULT_EXEC_TIMEOUT.as_secs(),
            )?),
            max_output: parse_env("TOOLGATE_MAX_OUTPUT", DEFAULT_MAX_OUTPUT)?,
            tokens,
            mailboxes,
        })
    }

    /// A minimal configuration for tests: no tokens, temp-style defaults.
    pub fn for_tests(work_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            agent_port: 0,
            agent_secret: String::new(),
            agent_enabled: false,
            work_dir,
            exec_timeout: Duration::from_secs(30),
            max_output: DEFAULT_MAX_OUTPUT,
            tokens: TokenTable::default(),
            mailboxes: MailboxDirectory::default(),
        }
    }
}

/// Read an env var holding JSON, either plain or base64-encoded.
fn load_json_env(key: &str) -> Option<Value> {
    let raw = std::env::var(key).ok()?;
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(&raw) {
        return Some(value);
    }
    base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::internal(format!("invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Remove everything under the work directory, creating it if absent.
///
/// Returns the number of entries removed. Individual failures are logged
/// and skipped so one stubborn file cannot wedge startup.
pub fn cleanup_work_dir(dir: &Path) -> usize {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "cannot create work directory");
        return 0;
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "cannot clean work entry"),
        }
    }
    if removed > 0 {
        info!(removed, dir = %dir.display(), "work directory cleaned");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_base64_json_both_load() {
        let plain = r#"[{"api_key":"T","tools":["*"]}]"#;
        std::env::set_var("TOOLGATE_TEST_PLAIN", plain);
        let v = load_json_env("TOOLGATE_TEST_PLAIN").unwrap();
        assert!(v.is_array());

        let encoded = base64::engine::general_purpose::STANDARD.encode(plain);
        std::env::set_var("TOOLGATE_TEST_B64", encoded);
        let v = load_json_env("TOOLGATE_TEST_B64").unwrap();
        assert_eq!(v[0]["api_key"], "T");

        std::env::set_var("TOOLGATE_TEST_GARBAGE", "not json at all");
        assert!(load_json_env("TOOLGATE_TEST_GARBAGE").is_none());
    }

    #[test]
    fn cleanup_empties_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("exec_1.py"), "print(1)").unwrap();
        std::fs::create_dir(dir.path().join("screenshots")).unwrap();
        std::fs::write(dir.path().join("screenshots/a.png"), [0u8; 4]).unwrap();

        let removed = cleanup_work_dir(dir.path());
        assert_eq!(removed, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn cleanup_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fresh");
        assert_eq!(cleanup_work_dir(&target), 0);
        assert!(target.is_dir());
    }
}
