//! Browser-automation facade over the agent call site.
//!
//! A fixed vocabulary of page operations, each a single
//! [`AgentCallSite::send`]. The facade is fully async: there is no cached
//! URL or title to go stale, every read round-trips to the agent.

use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};

use crate::remote::{AgentCallSite, AgentError};

/// Default timeout handed to the agent for waits and navigation, in ms.
pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 30_000;
/// Slack added on top of the agent-visible timeout for the local wait.
pub const TIMEOUT_SLACK: Duration = Duration::from_secs(5);
/// Screenshots are slow; they get a fixed generous deadline.
pub const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(60);

/// Browser-automation API handed to tool handlers.
#[derive(Debug, Clone)]
pub struct PageFacade {
    calls: AgentCallSite,
}

impl PageFacade {
    /// Wrap a call site.
    pub fn new(calls: AgentCallSite) -> Self {
        Self { calls }
    }

    fn command_timeout(agent_timeout_ms: u64) -> Duration {
        Duration::from_millis(agent_timeout_ms) + TIMEOUT_SLACK
    }

    /// Navigate to `url`, waiting for the given load state.
    pub async fn navigate(
        &self,
        url: &str,
        wait_until: &str,
        timeout_ms: u64,
    ) -> Result<Value, AgentError> {
        self.calls
            .send(
                "navigate",
                json!({ "url": url, "wait_until": wait_until, "timeout": timeout_ms }),
                Self::command_timeout(timeout_ms),
            )
            .await
    }

    /// Capture a screenshot, decoded from the agent's base64 payload.
    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, AgentError> {
        let data = self
            .calls
            .send(
                "screenshot",
                json!({ "full_page": full_page }),
                SCREENSHOT_TIMEOUT,
            )
            .await?;
        decode_base64_field(&data, "base64")
    }

    /// Current page URL.
    pub async fn url(&self) -> Result<String, AgentError> {
        let data = self.calls.send("get_url", json!({}), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS)).await?;
        Ok(string_field(&data, "url"))
    }

    /// Current page title.
    pub async fn title(&self) -> Result<String, AgentError> {
        let data = self.calls.send("get_title", json!({}), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS)).await?;
        Ok(string_field(&data, "title"))
    }

    /// Viewport dimensions, when the agent reports them.
    pub async fn viewport(&self) -> Result<Option<Value>, AgentError> {
        let data = self.calls.send("get_viewport", json!({}), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS)).await?;
        Ok(data.get("viewport").filter(|v| !v.is_null()).cloned())
    }

    /// Wait for a selector to reach `state`; true when found.
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        state: &str,
        timeout_ms: u64,
    ) -> Result<bool, AgentError> {
        let data = self
            .calls
            .send(
                "wait_for_selector",
                json!({ "selector": selector, "state": state, "timeout": timeout_ms }),
                Self::command_timeout(timeout_ms),
            )
            .await?;
        Ok(data.get("found").and_then(Value::as_bool).unwrap_or(false))
    }

    /// Wait until the page URL matches `pattern` (glob-style).
    pub async fn wait_for_url(&self, pattern: &str, timeout_ms: u64) -> Result<(), AgentError> {
        self.calls
            .send(
                "wait_for_url",
                json!({ "url_pattern": pattern, "timeout": timeout_ms }),
                Self::command_timeout(timeout_ms),
            )
            .await?;
        Ok(())
    }

    /// Wait until a script evaluates truthy in the page.
    pub async fn wait_for_function(&self, script: &str, timeout_ms: u64) -> Result<(), AgentError> {
        self.calls
            .send(
                "wait_for_function",
                json!({ "script": script, "timeout": timeout_ms }),
                Self::command_timeout(timeout_ms),
            )
            .await?;
        Ok(())
    }

    /// Sleep inside the agent for `timeout_ms`.
    pub async fn wait_for_timeout(&self, timeout_ms: u64) -> Result<(), AgentError> {
        self.calls
            .send(
                "wait_for_timeout",
                json!({ "timeout": timeout_ms }),
                Self::command_timeout(timeout_ms),
            )
            .await?;
        Ok(())
    }

    /// Number of elements matching `selector`.
    pub async fn query_count(&self, selector: &str) -> Result<u64, AgentError> {
        let data = self
            .calls
            .send("query_selector_all", json!({ "selector": selector }), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS))
            .await?;
        Ok(data.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    /// Inner text of the first element matching `selector`.
    pub async fn inner_text(&self, selector: &str) -> Result<String, AgentError> {
        let data = self
            .calls
            .send("inner_text", json!({ "selector": selector }), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS))
            .await?;
        Ok(string_field(&data, "text"))
    }

    /// Full page HTML.
    pub async fn content(&self) -> Result<String, AgentError> {
        let data = self.calls.send("get_content", json!({}), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS)).await?;
        Ok(string_field(&data, "html"))
    }

    /// Evaluate a script in the page, optionally passing one argument.
    pub async fn evaluate(&self, script: &str, arg: Option<Value>) -> Result<Value, AgentError> {
        let mut params = json!({ "script": script });
        if let Some(arg) = arg {
            params["arg"] = arg;
        }
        let data = self.calls.send("evaluate", params, Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS)).await?;
        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Scroll the page by pixel deltas.
    pub async fn scroll(&self, delta_x: i64, delta_y: i64) -> Result<(), AgentError> {
        self.calls
            .send(
                "scroll",
                json!({ "delta_x": delta_x, "delta_y": delta_y }),
                Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS),
            )
            .await?;
        Ok(())
    }

    /// All cookies visible to the page.
    pub async fn cookies(&self) -> Result<Vec<Value>, AgentError> {
        let data = self.calls.send("get_cookies", json!({}), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS)).await?;
        Ok(data
            .get("cookies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Add one cookie.
    pub async fn add_cookie(&self, cookie: Value) -> Result<(), AgentError> {
        self.calls
            .send("add_cookie", json!({ "cookie": cookie }), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS))
            .await?;
        Ok(())
    }

    /// Clear all cookies.
    pub async fn clear_cookies(&self) -> Result<(), AgentError> {
        self.calls.send("clear_cookies", json!({}), Self::command_timeout(DEFAULT_AGENT_TIMEOUT_MS)).await?;
        Ok(())
    }

    /// Handle to the `index`-th element matching `selector`.
    pub fn element(&self, selector: impl Into<String>, index: u64) -> ElementFacade {
        ElementFacade {
            calls: self.calls.clone(),
            selector: selector.into(),
            index,
        }
    }
}

/// A specific element addressed by selector and match index.
#[derive(Debug, Clone)]
pub struct ElementFacade {
    calls: AgentCallSite,
    selector: String,
    index: u64,
}

impl ElementFacade {
    fn params(&self) -> Value {
        json!({ "selector": self.selector, "index": self.index })
    }

    fn timeout() -> Duration {
        PageFacade::command_timeout(DEFAULT_AGENT_TIMEOUT_MS)
    }

    /// Click the element.
    pub async fn click(&self, click_count: u64) -> Result<(), AgentError> {
        let mut params = self.params();
        params["click_count"] = json!(click_count);
        self.calls.send("element_click", params, Self::timeout()).await?;
        Ok(())
    }

    /// Type text into the element, with an optional per-key delay.
    pub async fn type_text(&self, text: &str, delay_ms: u64) -> Result<(), AgentError> {
        let mut params = self.params();
        params["text"] = json!(text);
        params["delay"] = json!(delay_ms);
        self.calls.send("element_type", params, Self::timeout()).await?;
        Ok(())
    }

    /// Press a key while the element is focused.
    pub async fn press(&self, key: &str) -> Result<(), AgentError> {
        let mut params = self.params();
        params["key"] = json!(key);
        self.calls.send("element_press", params, Self::timeout()).await?;
        Ok(())
    }

    /// Inner text of the element.
    pub async fn inner_text(&self) -> Result<String, AgentError> {
        let data = self
            .calls
            .send("element_inner_text", self.params(), Self::timeout())
            .await?;
        Ok(string_field(&data, "text"))
    }

    /// Read an attribute, `None` when absent.
    pub async fn get_attribute(&self, name: &str) -> Result<Option<String>, AgentError> {
        let mut params = self.params();
        params["name"] = json!(name);
        let data = self
            .calls
            .send("element_get_attribute", params, Self::timeout())
            .await?;
        Ok(data
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Screenshot of just this element.
    pub async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        let data = self
            .calls
            .send("element_screenshot", self.params(), SCREENSHOT_TIMEOUT)
            .await?;
        decode_base64_field(&data, "base64")
    }

    /// Scroll the element into view.
    pub async fn scroll_into_view(&self) -> Result<(), AgentError> {
        self.calls
            .send("element_scroll_into_view", self.params(), Self::timeout())
            .await?;
        Ok(())
    }
}

fn string_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn decode_base64_field(data: &Value, key: &str) -> Result<Vec<u8>, AgentError> {
    let encoded = data.get(key).and_then(Value::as_str).unwrap_or_default();
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| AgentError::Remote(format!("invalid base64 screenshot payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_timeouts_carry_slack() {
        assert_eq!(
            PageFacade::command_timeout(30_000),
            Duration::from_secs(35)
        );
        assert_eq!(PageFacade::command_timeout(0), TIMEOUT_SLACK);
    }

    #[test]
    fn base64_decoding_rejects_garbage() {
        let ok = decode_base64_field(&json!({"base64": "aGk="}), "base64").unwrap();
        assert_eq!(ok, b"hi");
        assert!(decode_base64_field(&json!({"base64": "!!"}), "base64").is_err());
        // Absent field decodes as empty, matching an agent that sent nothing.
        assert_eq!(decode_base64_field(&json!({}), "base64").unwrap(), Vec::<u8>::new());
    }
}
