//! Tool-call extraction from model output.
//!
//! Tool invocations travel inside fenced blocks tagged `tool`, each carrying
//! a JSON object with a `tool` name and an optional `args` mapping. Model
//! output is untrusted text: malformed blocks are skipped, never fatal, and
//! anything outside the convention is ordinary prose.

use clawbot_core::ToolCall;
use once_cell::sync::Lazy;
use regex::Regex;

static TOOL_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    // (?s) so a block body can span lines.
    Regex::new(r"(?s)```tool\s*\n?(.*?)\n?```").expect("tool block regex")
});

/// Extract tool calls in source order. Never fails.
pub fn parse_tool_calls(response: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    for cap in TOOL_BLOCK_RE.captures_iter(response) {
        let body = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let parsed: serde_json::Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let name = match parsed.get("tool").and_then(|v| v.as_str()) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => continue,
        };
        let arguments = parsed
            .get("args")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        calls.push(ToolCall { name, arguments });
    }
    calls
}

/// Remove every fenced tool block, leaving the surrounding prose.
pub fn strip_tool_blocks(response: &str) -> String {
    TOOL_BLOCK_RE.replace_all(response, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_blocks_yields_empty() {
        assert!(parse_tool_calls("Just a plain answer.").is_empty());
        assert!(parse_tool_calls("").is_empty());
    }

    #[test]
    fn test_single_block() {
        let response = "Let me check.\n```tool\n{\"tool\": \"shell\", \"args\": {\"command\": \"ls\"}}\n```\nDone.";
        let calls = parse_tool_calls(response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "shell");
        assert_eq!(calls[0].arg_str("command"), Some("ls"));
    }

    #[test]
    fn test_multiple_blocks_in_source_order() {
        let response = "\
```tool
{\"tool\": \"web_search\", \"args\": {\"query\": \"rust\"}}
```
Some prose between.
```tool
{\"tool\": \"fetch_url\", \"args\": {\"url\": \"https://example.com\"}}
```";
        let calls = parse_tool_calls(response);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[1].name, "fetch_url");
    }

    #[test]
    fn test_malformed_block_skipped_good_one_kept() {
        let response = "\
```tool
{not valid json
```
```tool
{\"tool\": \"system_info\"}
```";
        let calls = parse_tool_calls(response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "system_info");
    }

    #[test]
    fn test_missing_tool_field_skipped() {
        let response = "```tool\n{\"args\": {\"command\": \"ls\"}}\n```";
        assert!(parse_tool_calls(response).is_empty());
    }

    #[test]
    fn test_missing_args_parses_as_empty() {
        let calls = parse_tool_calls("```tool\n{\"tool\": \"browser_links\"}\n```");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.is_empty());
    }

    #[test]
    fn test_other_fences_are_prose() {
        let response = "```python\nprint('hi')\n```\n```json\n{\"tool\": \"shell\"}\n```";
        assert!(parse_tool_calls(response).is_empty());
    }

    #[test]
    fn test_strip_removes_blocks_keeps_prose() {
        let response = "Before.\n```tool\n{\"tool\": \"shell\", \"args\": {}}\n```\nAfter.";
        let stripped = strip_tool_blocks(response);
        assert!(!stripped.contains("```"));
        assert!(stripped.contains("Before."));
        assert!(stripped.contains("After."));
    }

    #[test]
    fn test_strip_on_clean_text_is_identity() {
        assert_eq!(strip_tool_blocks("No tools here."), "No tools here.");
    }

    #[test]
    fn test_multiline_args_block() {
        let response = "```tool\n{\n  \"tool\": \"write_file\",\n  \"args\": {\n    \"path\": \"a.txt\",\n    \"content\": \"line1\\nline2\"\n  }\n}\n```";
        let calls = parse_tool_calls(response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arg_str("path"), Some("a.txt"));
    }
}
