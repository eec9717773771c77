//! Registry surface for the browser session: one thin tool per operation,
//! each validating its own arguments and delegating to the session handle.

use async_trait::async_trait;
use clawbot_core::{Error, Result};
use serde_json::{json, Value};

use super::session::ScrollDirection;
use crate::{Tool, ToolContext, ToolSchema};

const DEFAULT_SCROLL_AMOUNT: i64 = 500;

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::Validation(format!("Missing required parameter: {}", key)))
}

// ============ browser_open ============

pub struct BrowserOpenTool;

#[async_trait]
impl Tool for BrowserOpenTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_open",
            description: "Open a URL in the browser (starts the browser if needed)",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "URL to open; bare domains get https:// prefixed"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "url").map(|_| ())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let url = params["url"].as_str().unwrap();
        ctx.browser.open(url).await
    }
}

// ============ browser_screenshot ============

pub struct BrowserScreenshotTool;

#[async_trait]
impl Tool for BrowserScreenshotTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_screenshot",
            description: "Capture the current browser page to a PNG file",
            parameters: json!({
                "type": "object",
                "properties": {
                    "full_page": {
                        "type": "boolean",
                        "description": "Capture the full page instead of the viewport (default false)"
                    }
                }
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let full_page = params
            .get("full_page")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        ctx.browser.screenshot(full_page).await
    }
}

// ============ browser_read ============

pub struct BrowserReadTool;

#[async_trait]
impl Tool for BrowserReadTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_read",
            description: "Read the visible text of the current browser page",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        ctx.browser.extract_text().await
    }
}

// ============ browser_google ============

pub struct BrowserGoogleTool;

#[async_trait]
impl Tool for BrowserGoogleTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_google",
            description: "Google search in the browser, returning structured results",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "query").map(|_| ())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let query = params["query"].as_str().unwrap();
        ctx.browser.search_google(query).await
    }
}

// ============ browser_click ============

pub struct BrowserClickTool;

#[async_trait]
impl Tool for BrowserClickTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_click",
            description: "Click the first element matching a CSS selector",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector of the element to click"
                    }
                },
                "required": ["selector"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "selector").map(|_| ())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let selector = params["selector"].as_str().unwrap();
        ctx.browser.click(selector).await
    }
}

// ============ browser_input ============

pub struct BrowserInputTool;

#[async_trait]
impl Tool for BrowserInputTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_input",
            description: "Type text into a form field matched by a CSS selector",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector of the input field"
                    },
                    "text": {
                        "type": "string",
                        "description": "Text to enter"
                    }
                },
                "required": ["selector", "text"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "selector")?;
        if params.get("text").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: text".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let selector = params["selector"].as_str().unwrap();
        let text = params["text"].as_str().unwrap();
        ctx.browser.type_text(selector, text).await
    }
}

// ============ browser_links ============

pub struct BrowserLinksTool;

#[async_trait]
impl Tool for BrowserLinksTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_links",
            description: "List links (text + href) on the current browser page",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        ctx.browser.links().await
    }
}

// ============ browser_scroll ============

pub struct BrowserScrollTool;

#[async_trait]
impl Tool for BrowserScrollTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_scroll",
            description: "Scroll the browser page",
            parameters: json!({
                "type": "object",
                "properties": {
                    "direction": {
                        "type": "string",
                        "enum": ["down", "up", "top", "bottom"],
                        "description": "Scroll direction (default down)"
                    },
                    "amount": {
                        "type": "integer",
                        "description": "Scroll amount in pixels (default 500)"
                    }
                }
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if let Some(direction) = params.get("direction").and_then(|v| v.as_str()) {
            if ScrollDirection::parse(direction).is_none() {
                return Err(Error::Validation(format!(
                    "Unknown scroll direction: {} (expected down, up, top or bottom)",
                    direction
                )));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let direction = params
            .get("direction")
            .and_then(|v| v.as_str())
            .and_then(ScrollDirection::parse)
            .unwrap_or(ScrollDirection::Down);
        let amount = params
            .get("amount")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_SCROLL_AMOUNT);
        ctx.browser.scroll(direction, amount).await
    }
}

// ============ browser_close ============

pub struct BrowserCloseTool;

#[async_trait]
impl Tool for BrowserCloseTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_close",
            description: "Close the browser session",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        ctx.browser.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrowserHandle;
    use clawbot_core::Config;

    fn test_ctx() -> ToolContext {
        let config = Config::default();
        let dir = std::env::temp_dir().join("clawbot-browser-tool-test");
        ToolContext {
            workspace: dir.clone(),
            browser: BrowserHandle::new(
                config.tools.browser.clone(),
                dir.join("shots"),
                dir.join("profile"),
            ),
            config,
        }
    }

    #[test]
    fn test_open_validate() {
        assert!(BrowserOpenTool
            .validate(&json!({"url": "example.com"}))
            .is_ok());
        assert!(BrowserOpenTool.validate(&json!({})).is_err());
        assert!(BrowserOpenTool.validate(&json!({"url": "  "})).is_err());
    }

    #[test]
    fn test_click_validate() {
        assert!(BrowserClickTool
            .validate(&json!({"selector": "a.main"}))
            .is_ok());
        assert!(BrowserClickTool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_input_validate() {
        assert!(BrowserInputTool
            .validate(&json!({"selector": "#q", "text": "rust"}))
            .is_ok());
        assert!(BrowserInputTool.validate(&json!({"selector": "#q"})).is_err());
        // Empty text is a legal fill value.
        assert!(BrowserInputTool
            .validate(&json!({"selector": "#q", "text": ""}))
            .is_ok());
    }

    #[test]
    fn test_scroll_validate_rejects_unknown_direction() {
        assert!(BrowserScrollTool
            .validate(&json!({"direction": "sideways"}))
            .is_err());
        assert!(BrowserScrollTool
            .validate(&json!({"direction": "down"}))
            .is_ok());
        // Missing direction defaults to down.
        assert!(BrowserScrollTool.validate(&json!({})).is_ok());
    }

    #[tokio::test]
    async fn test_screenshot_on_stopped_session_fails() {
        let ctx = test_ctx();
        let result = BrowserScreenshotTool.execute(ctx, json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_close_on_stopped_session_succeeds() {
        let ctx = test_ctx();
        let result = BrowserCloseTool.execute(ctx, json!({})).await.unwrap();
        assert_eq!(result["status"], "closed");
    }
}
