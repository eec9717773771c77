use async_trait::async_trait;
use clawbot_core::{Error, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::{clip_output, Tool, ToolContext, ToolSchema};

const FETCH_CAP: usize = 3000;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// ============ web_search ============

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_search",
            description: "Search the web (DuckDuckGo) and return result titles, URLs and snippets",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "count": {
                        "type": "integer",
                        "description": "Number of results (1-10, default 5)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("query").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: query".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let query = params["query"].as_str().unwrap();
        let count = params
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(ctx.config.tools.web.search_count as u64)
            .min(10) as usize;

        let results = duckduckgo_search(query, count, ctx.config.tools.web.fetch_timeout_secs).await?;
        Ok(json!({ "query": query, "results": results }))
    }
}

/// Scrape the DuckDuckGo HTML endpoint. No API key, works headless, and the
/// markup has been stable for years; an empty result set is returned as-is
/// rather than treated as a failure.
async fn duckduckgo_search(query: &str, count: usize, timeout_secs: u64) -> Result<Vec<Value>> {
    use scraper::{Html, Selector};

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Tool(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .get("https://html.duckduckgo.com/html/")
        .query(&[("q", query)])
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::Timeout("Search request timed out".to_string())
            } else {
                Error::Tool(format!("Search request failed: {}", e))
            }
        })?;

    if !response.status().is_success() {
        return Err(Error::Tool(format!(
            "Search returned status {}",
            response.status()
        )));
    }

    let html = response
        .text()
        .await
        .map_err(|e| Error::Tool(format!("Failed to read search response: {}", e)))?;

    // Html (scraper) is not Send; keep it in a tight scope with no awaits.
    let results: Vec<Value> = {
        let document = Html::parse_document(&html);
        let result_sel = Selector::parse("div.result").unwrap();
        let title_sel = Selector::parse("a.result__a").unwrap();
        let snippet_sel = Selector::parse("a.result__snippet, .result__snippet").unwrap();

        let mut results = Vec::new();
        for el in document.select(&result_sel) {
            if results.len() >= count {
                break;
            }
            let title_el = el.select(&title_sel).next();
            let title = title_el
                .map(|e| e.text().collect::<Vec<_>>().join("").trim().to_string())
                .unwrap_or_default();
            let url = title_el
                .and_then(|e| e.value().attr("href").map(|h| h.to_string()))
                .unwrap_or_default();
            if title.is_empty() || url.is_empty() {
                continue;
            }
            let snippet = el
                .select(&snippet_sel)
                .next()
                .map(|e| e.text().collect::<Vec<_>>().join("").trim().to_string())
                .unwrap_or_default();
            results.push(json!({
                "title": title,
                "url": url,
                "snippet": snippet,
            }));
        }
        results
    };

    tracing::debug!(count = results.len(), query, "DuckDuckGo results");
    Ok(results)
}

// ============ fetch_url ============

pub struct FetchUrlTool;

#[async_trait]
impl Tool for FetchUrlTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "fetch_url",
            description: "Fetch a web page and return its visible text content",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "URL to fetch"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("url").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: url".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let url = params["url"].as_str().unwrap();
        let timeout_secs = ctx.config.tools.web.fetch_timeout_secs;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Tool(format!("Failed to create HTTP client: {}", e)))?;

        let response = client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Fetch timed out after {} seconds", timeout_secs))
                } else {
                    Error::Tool(format!("Fetch failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Tool(format!("Failed to read response body: {}", e)))?;

        let text = html_to_text(&body);

        Ok(json!({
            "url": url,
            "status": status,
            "content": clip_output(&text, FETCH_CAP),
        }))
    }
}

/// Strip an HTML document down to its visible text, one line per text node.
/// Script, style and noscript subtrees are dropped.
fn html_to_text(html: &str) -> String {
    use scraper::Html;

    let document = Html::parse_document(html);
    let mut lines = Vec::new();
    collect_visible_text(document.root_element(), &mut lines);
    lines.join("\n")
}

fn collect_visible_text(el: scraper::ElementRef<'_>, out: &mut Vec<String>) {
    if matches!(el.value().name(), "script" | "style" | "noscript") {
        return;
    }
    for child in el.children() {
        if let Some(child_el) = scraper::ElementRef::wrap(child) {
            collect_visible_text(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_web_search_validate() {
        assert!(WebSearchTool.validate(&json!({"query": "rust"})).is_ok());
        assert!(WebSearchTool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_fetch_url_validate() {
        assert!(FetchUrlTool
            .validate(&json!({"url": "https://example.com"}))
            .is_ok());
        assert!(FetchUrlTool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_html_to_text_strips_markup() {
        let html = "<html><body><h1>Title</h1><p>Some <b>bold</b> text</p>\
                    <script>var x = 1;</script></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("bold"));
        assert!(!text.contains("var x"));
    }
}
