use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation parsed out of model output.
///
/// Produced by the fenced-block parser; the order of appearance in the
/// response defines execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name, e.g. "shell" or "browser_open".
    pub name: String,
    /// Arguments object. Missing `args` in the fenced block parses as empty.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: &str, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            arguments,
        }
    }

    /// Convenience accessor for a string argument.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Uniform result envelope every tool returns through the registry.
///
/// `success == true` always carries a payload and no error; `success == false`
/// always carries a human-readable error and no payload. The constructors are
/// the only way the rest of the codebase builds one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

impl From<crate::error::Result<Value>> for ToolResult {
    fn from(result: crate::error::Result<Value>) -> Self {
        match result {
            Ok(payload) => ToolResult::ok(payload),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}

/// One round of the agent loop: the prompt sent, the raw model response, and
/// the tool calls/results it produced. A request's trace is the ordered
/// sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTurn {
    pub prompt: String,
    pub response: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_ok_shape() {
        let r = ToolResult::ok(json!({"stdout": "hi"}));
        assert!(r.success);
        assert!(r.payload.is_some());
        assert!(r.error.is_none());
    }

    #[test]
    fn test_tool_result_fail_shape() {
        let r = ToolResult::fail("boom");
        assert!(!r.success);
        assert!(r.payload.is_none());
        assert_eq!(r.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_tool_result_from_err() {
        let r: ToolResult = Err::<Value, _>(crate::Error::Tool("bad".into())).into();
        assert!(!r.success);
        assert!(r.error.unwrap().contains("bad"));
    }

    #[test]
    fn test_tool_result_serializes_without_absent_fields() {
        let r = ToolResult::fail("nope");
        let s = serde_json::to_string(&r).unwrap();
        assert!(!s.contains("payload"));
        assert!(s.contains("nope"));
    }

    #[test]
    fn test_tool_call_arg_str() {
        let mut args = Map::new();
        args.insert("url".to_string(), json!("https://example.com"));
        let call = ToolCall::new("browser_open", args);
        assert_eq!(call.arg_str("url"), Some("https://example.com"));
        assert_eq!(call.arg_str("missing"), None);
    }
}
