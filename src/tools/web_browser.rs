//! The `web_*` tool family, backed by the remote browser agent.
//!
//! Every tool here is one or two [`PageFacade`] calls. Agent-side failures
//! (timeout, disconnect, remote error, no agent at all) come back as
//! `ExecutionResult` failures with the matching `error_kind`; they never
//! become JSON-RPC errors.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::Result;
use crate::remote::{AgentError, PageFacade};
use crate::server::{HandlerFuture, ToolRegistry, TypedTool};
use crate::tools::process::truncate_output;
use crate::tools::ToolContext;
use crate::types::ExecutionResult;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn agent_failure(start: Instant, err: &AgentError) -> ExecutionResult {
    ExecutionResult::failure(err.kind(), err.to_string()).timed(start)
}

#[derive(Debug, Deserialize)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
struct NavigateArgs {
    url: String,
    #[serde(default = "default_wait_until")]
    wait_until: String,
    #[serde(default = "default_timeout_ms")]
    timeout: u64,
}

fn default_wait_until() -> String {
    "load".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Deserialize)]
struct ScreenshotArgs {
    #[serde(default)]
    full_page: bool,
}

#[derive(Debug, Deserialize)]
struct ExtractArgs {
    #[serde(default)]
    selector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClickArgs {
    selector: String,
    #[serde(default)]
    index: u64,
    #[serde(default = "default_click_count")]
    click_count: u64,
    #[serde(default = "default_timeout_ms")]
    timeout: u64,
}

fn default_click_count() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
struct FillArgs {
    selector: String,
    text: String,
    #[serde(default)]
    index: u64,
    #[serde(default)]
    delay: u64,
    #[serde(default)]
    press_enter: bool,
}

#[derive(Debug, Deserialize)]
struct EvaluateArgs {
    script: String,
    #[serde(default)]
    arg: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WaitArgs {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    url_pattern: Option<String>,
    #[serde(default)]
    script: Option<String>,
    #[serde(default = "default_wait_state")]
    state: String,
    #[serde(default = "default_timeout_ms")]
    timeout: u64,
}

fn default_wait_state() -> String {
    "visible".to_string()
}

#[derive(Debug, Deserialize)]
struct ScrollArgs {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    delta_x: i64,
    #[serde(default)]
    delta_y: i64,
}

#[derive(Debug, Deserialize)]
struct SetCookieArgs {
    cookie: Value,
}

async fn navigate(page: PageFacade, args: NavigateArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    match page.navigate(&args.url, &args.wait_until, args.timeout).await {
        Ok(_) => Ok(ExecutionResult::success(format!("Navigated to {}", args.url))
            .with_metadata("url", args.url.as_str())
            .with_metadata("wait_until", args.wait_until.as_str())
            .timed(start)),
        Err(e) => Ok(agent_failure(start, &e).with_metadata("url", args.url.as_str())),
    }
}

async fn screenshot(
    page: PageFacade,
    config: Arc<Config>,
    args: ScreenshotArgs,
) -> Result<ExecutionResult> {
    let start = Instant::now();
    let bytes = match page.screenshot(args.full_page).await {
        Ok(bytes) => bytes,
        Err(e) => return Ok(agent_failure(start, &e)),
    };

    let dir = config.work_dir.join("screenshots");
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        return Ok(ExecutionResult::failure("IoError", e.to_string()).timed(start));
    }
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let path = dir.join(format!("screenshot_{timestamp}.png"));
    if let Err(e) = tokio::fs::write(&path, &bytes).await {
        return Ok(ExecutionResult::failure("IoError", e.to_string()).timed(start));
    }

    Ok(
        ExecutionResult::success(format!("Screenshot saved to {}", path.display()))
            .with_metadata("file_path", path.display().to_string())
            .with_metadata("size_bytes", bytes.len())
            .with_metadata("full_page", args.full_page)
            .timed(start),
    )
}

async fn extract(
    page: PageFacade,
    config: Arc<Config>,
    args: ExtractArgs,
) -> Result<ExecutionResult> {
    let start = Instant::now();
    let text = match &args.selector {
        Some(selector) => page.inner_text(selector).await,
        None => page.content().await,
    };
    match text {
        Ok(text) => {
            let length = text.len();
            let mut result =
                ExecutionResult::success(truncate_output(text, config.max_output))
                    .with_metadata("length", length);
            if let Some(selector) = args.selector {
                result = result.with_metadata("selector", selector);
            }
            Ok(result.timed(start))
        },
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

async fn click(page: PageFacade, args: ClickArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    match page
        .wait_for_selector(&args.selector, "visible", args.timeout)
        .await
    {
        Ok(true) => {},
        Ok(false) => {
            return Ok(ExecutionResult::failure(
                "TimeoutError",
                format!(
                    "selector '{}' did not become visible within {}ms",
                    args.selector, args.timeout
                ),
            )
            .with_metadata("selector", args.selector.as_str())
            .timed(start))
        },
        Err(e) => return Ok(agent_failure(start, &e).with_metadata("selector", args.selector.as_str())),
    }

    match page
        .element(args.selector.clone(), args.index)
        .click(args.click_count)
        .await
    {
        Ok(()) => Ok(ExecutionResult::success(format!("Clicked {}", args.selector))
            .with_metadata("selector", args.selector.as_str())
            .with_metadata("index", args.index)
            .timed(start)),
        Err(e) => Ok(agent_failure(start, &e).with_metadata("selector", args.selector.as_str())),
    }
}

async fn fill(page: PageFacade, args: FillArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    let element = page.element(args.selector.clone(), args.index);
    if let Err(e) = element.type_text(&args.text, args.delay).await {
        return Ok(agent_failure(start, &e).with_metadata("selector", args.selector.as_str()));
    }
    if args.press_enter {
        if let Err(e) = element.press("Enter").await {
            return Ok(agent_failure(start, &e).with_metadata("selector", args.selector.as_str()));
        }
    }
    Ok(
        ExecutionResult::success(format!("Filled {}", args.selector))
            .with_metadata("selector", args.selector.as_str())
            .with_metadata("chars", args.text.len())
            .timed(start),
    )
}

async fn evaluate(page: PageFacade, args: EvaluateArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    match page.evaluate(&args.script, args.arg).await {
        Ok(result) => {
            let rendered =
                serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
            Ok(ExecutionResult::success(rendered)
                .with_metadata("script_length", args.script.len())
                .timed(start))
        },
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

async fn wait(page: PageFacade, args: WaitArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    let outcome = if let Some(selector) = &args.selector {
        match page.wait_for_selector(selector, &args.state, args.timeout).await {
            Ok(true) => Ok(format!("selector '{selector}' reached state '{}'", args.state)),
            Ok(false) => {
                return Ok(ExecutionResult::failure(
                    "TimeoutError",
                    format!("selector '{selector}' not found within {}ms", args.timeout),
                )
                .timed(start))
            },
            Err(e) => Err(e),
        }
    } else if let Some(pattern) = &args.url_pattern {
        page.wait_for_url(pattern, args.timeout)
            .await
            .map(|()| format!("url matched '{pattern}'"))
    } else if let Some(script) = &args.script {
        page.wait_for_function(script, args.timeout)
            .await
            .map(|()| "script returned true".to_string())
    } else {
        page.wait_for_timeout(args.timeout)
            .await
            .map(|()| format!("waited {}ms", args.timeout))
    };

    match outcome {
        Ok(message) => Ok(ExecutionResult::success(message).timed(start)),
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

async fn scroll(page: PageFacade, args: ScrollArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    let outcome = match &args.selector {
        Some(selector) => page.element(selector.clone(), 0).scroll_into_view().await,
        None => page.scroll(args.delta_x, args.delta_y).await,
    };
    match outcome {
        Ok(()) => Ok(ExecutionResult::success("Scrolled").timed(start)),
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

async fn get_url(page: PageFacade, _args: NoArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    match page.url().await {
        Ok(url) => Ok(ExecutionResult::success(url.clone())
            .with_metadata("url", url)
            .timed(start)),
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

async fn get_title(page: PageFacade, _args: NoArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    match page.title().await {
        Ok(title) => Ok(ExecutionResult::success(title.clone())
            .with_metadata("title", title)
            .timed(start)),
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

async fn get_cookies(page: PageFacade, _args: NoArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    match page.cookies().await {
        Ok(cookies) => {
            let rendered = serde_json::to_string_pretty(&cookies).unwrap_or_default();
            Ok(ExecutionResult::success(rendered)
                .with_metadata("count", cookies.len())
                .timed(start))
        },
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

async fn set_cookie(page: PageFacade, args: SetCookieArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    if !args.cookie.is_object() {
        return Err(crate::error::Error::validation("cookie must be an object"));
    }
    let name = args.cookie.get("name").and_then(Value::as_str).map(str::to_string);
    match page.add_cookie(args.cookie).await {
        Ok(()) => {
            let mut result = ExecutionResult::success("Cookie added");
            if let Some(name) = name {
                result = result.with_metadata("name", name);
            }
            Ok(result.timed(start))
        },
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

async fn clear_cookies(page: PageFacade, _args: NoArgs) -> Result<ExecutionResult> {
    let start = Instant::now();
    match page.clear_cookies().await {
        Ok(()) => Ok(ExecutionResult::success("Cookies cleared").timed(start)),
        Err(e) => Ok(agent_failure(start, &e)),
    }
}

/// Register the whole `web_*` family.
#[allow(clippy::too_many_lines)]
pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<()> {
    let selector_prop = json!({
        "type": "string",
        "description": "CSS selector addressing the target element"
    });
    let timeout_prop = json!({
        "type": "integer",
        "default": DEFAULT_TIMEOUT_MS,
        "description": "Timeout in milliseconds"
    });

    let page = ctx.page.clone();
    registry.register(
        "web_navigate",
        "Navigate the remote browser to a URL and wait for the page to load.",
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Destination URL" },
                "wait_until": {
                    "type": "string",
                    "enum": ["load", "domcontentloaded", "networkidle", "commit"],
                    "default": "load"
                },
                "timeout": timeout_prop.clone()
            },
            "required": ["url"]
        }),
        Arc::new(TypedTool::new(move |args: NavigateArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { navigate(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    let config = ctx.config.clone();
    registry.register(
        "web_screenshot",
        "Capture a screenshot of the current page and save it under the work \
         directory.",
        json!({
            "type": "object",
            "properties": {
                "full_page": { "type": "boolean", "default": false }
            },
            "required": []
        }),
        Arc::new(TypedTool::new(move |args: ScreenshotArgs, _scope| {
            let page = page.clone();
            let config = config.clone();
            Box::pin(async move { screenshot(page, config, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    let config = ctx.config.clone();
    registry.register(
        "web_extract",
        "Extract text from the page: the inner text of a selector, or the \
         full page HTML when no selector is given.",
        json!({
            "type": "object",
            "properties": { "selector": selector_prop.clone() },
            "required": []
        }),
        Arc::new(TypedTool::new(move |args: ExtractArgs, _scope| {
            let page = page.clone();
            let config = config.clone();
            Box::pin(async move { extract(page, config, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_click",
        "Wait for an element to become visible, then click it.",
        json!({
            "type": "object",
            "properties": {
                "selector": selector_prop.clone(),
                "index": { "type": "integer", "default": 0 },
                "click_count": { "type": "integer", "default": 1 },
                "timeout": timeout_prop.clone()
            },
            "required": ["selector"]
        }),
        Arc::new(TypedTool::new(move |args: ClickArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { click(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_fill",
        "Type text into an element, optionally pressing Enter afterwards.",
        json!({
            "type": "object",
            "properties": {
                "selector": selector_prop.clone(),
                "text": { "type": "string" },
                "index": { "type": "integer", "default": 0 },
                "delay": { "type": "integer", "default": 0, "description": "Per-key delay in ms" },
                "press_enter": { "type": "boolean", "default": false }
            },
            "required": ["selector", "text"]
        }),
        Arc::new(TypedTool::new(move |args: FillArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { fill(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_evaluate",
        "Evaluate a JavaScript expression in the page and return its result.",
        json!({
            "type": "object",
            "properties": {
                "script": { "type": "string", "description": "JavaScript to evaluate" },
                "arg": { "description": "Optional argument passed to the script" }
            },
            "required": ["script"]
        }),
        Arc::new(TypedTool::new(move |args: EvaluateArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { evaluate(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_wait",
        "Wait for a selector, a URL pattern, a script to return true, or \
         simply a fixed delay.",
        json!({
            "type": "object",
            "properties": {
                "selector": selector_prop.clone(),
                "url_pattern": { "type": "string", "description": "URL glob to wait for" },
                "script": { "type": "string", "description": "Script that must return true" },
                "state": {
                    "type": "string",
                    "enum": ["visible", "hidden", "attached", "detached"],
                    "default": "visible"
                },
                "timeout": timeout_prop.clone()
            },
            "required": []
        }),
        Arc::new(TypedTool::new(move |args: WaitArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { wait(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_scroll",
        "Scroll the page by pixel deltas, or scroll an element into view.",
        json!({
            "type": "object",
            "properties": {
                "selector": selector_prop.clone(),
                "delta_x": { "type": "integer", "default": 0 },
                "delta_y": { "type": "integer", "default": 0 }
            },
            "required": []
        }),
        Arc::new(TypedTool::new(move |args: ScrollArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { scroll(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_get_url",
        "Get the current page URL.",
        json!({ "type": "object", "properties": {}, "required": [] }),
        Arc::new(TypedTool::new(move |args: NoArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { get_url(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_get_title",
        "Get the current page title.",
        json!({ "type": "object", "properties": {}, "required": [] }),
        Arc::new(TypedTool::new(move |args: NoArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { get_title(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_get_cookies",
        "List all cookies visible to the current page.",
        json!({ "type": "object", "properties": {}, "required": [] }),
        Arc::new(TypedTool::new(move |args: NoArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { get_cookies(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_set_cookie",
        "Add a cookie to the browser context.",
        json!({
            "type": "object",
            "properties": {
                "cookie": {
                    "type": "object",
                    "description": "Cookie object with at least name, value and domain or url"
                }
            },
            "required": ["cookie"]
        }),
        Arc::new(TypedTool::new(move |args: SetCookieArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { set_cookie(page, args).await }) as HandlerFuture
        })),
    )?;

    let page = ctx.page.clone();
    registry.register(
        "web_clear_cookies",
        "Clear every cookie in the browser context.",
        json!({ "type": "object", "properties": {}, "required": [] }),
        Arc::new(TypedTool::new(move |args: NoArgs, _scope| {
            let page = page.clone();
            Box::pin(async move { clear_cookies(page, args).await }) as HandlerFuture
        })),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::AgentHub;

    #[tokio::test]
    async fn web_tools_fail_softly_without_an_agent() {
        let hub = AgentHub::new("secret");
        let page = PageFacade::new(hub.call_site());

        let result = get_url(page.clone(), NoArgs {}).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, "Disconnected");

        let result = navigate(
            page,
            NavigateArgs {
                url: "https://example.com".into(),
                wait_until: "load".into(),
                timeout: 1_000,
            },
        )
        .await
        .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, "Disconnected");
        assert_eq!(result.metadata["url"], json!("https://example.com"));
    }
}
