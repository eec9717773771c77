pub mod browser;
pub mod exec;
pub mod fs;
pub mod image;
pub mod registry;
pub mod system_info;
pub mod web;

use async_trait::async_trait;
use clawbot_core::{Config, Result};
use serde_json::Value;
use std::path::PathBuf;

pub use browser::BrowserHandle;
pub use registry::ToolRegistry;

/// Truncate a string to at most `max_chars` characters, respecting UTF-8 char
/// boundaries. Returns a borrowed slice if no truncation is needed.
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    if s.len() <= max_chars {
        return s;
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Clip a string to `max_chars`, appending a truncation marker when clipped.
pub fn clip_output(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        s.to_string()
    } else {
        format!("{}\n... (output truncated)", safe_truncate(s, max_chars))
    }
}

/// Shared state handed to every tool execution.
#[derive(Clone)]
pub struct ToolContext {
    pub workspace: PathBuf,
    pub config: Config,
    /// The process-wide browser session, injected rather than ambient so the
    /// ownership and serialization discipline stay visible.
    pub browser: BrowserHandle,
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    fn validate(&self, params: &Value) -> Result<()>;
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_short_string() {
        assert_eq!(safe_truncate("hello", 10), "hello");
    }

    #[test]
    fn test_safe_truncate_at_boundary() {
        assert_eq!(safe_truncate("hello world", 5), "hello");
    }

    #[test]
    fn test_safe_truncate_multibyte() {
        // Each char is 3 bytes; cutting at 4 must back off to a boundary.
        let s = "한국어";
        let t = safe_truncate(s, 4);
        assert_eq!(t, "한");
    }

    #[test]
    fn test_clip_output_marker() {
        let clipped = clip_output(&"a".repeat(100), 10);
        assert!(clipped.starts_with("aaaaaaaaaa"));
        assert!(clipped.ends_with("(output truncated)"));
    }
}
