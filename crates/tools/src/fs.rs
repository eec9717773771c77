use async_trait::async_trait;
use clawbot_core::{Error, Result};
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::{clip_output, Tool, ToolContext, ToolSchema};

const READ_CAP: usize = 5000;

fn expand_path(path: &str, workspace: &std::path::Path) -> PathBuf {
    if path.starts_with("~/") {
        dirs::home_dir()
            .map(|h| h.join(&path[2..]))
            .unwrap_or_else(|| PathBuf::from(path))
    } else if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        workspace.join(path)
    }
}

// ============ read_file ============

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_file",
            description: "Read the contents of a text file",
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to read"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("path").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: path".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let path_str = params["path"].as_str().unwrap();
        let path = expand_path(path_str, &ctx.workspace);

        if !path.exists() {
            return Err(Error::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(Error::Tool(format!("Not a file: {}", path.display())));
        }

        let content = tokio::fs::read_to_string(&path).await?;
        Ok(json!({
            "path": path.display().to_string(),
            "content": clip_output(&content, READ_CAP),
        }))
    }
}

// ============ write_file ============

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "write_file",
            description: "Write content to a file, creating parent directories if needed",
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to write"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["path", "content"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("path").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: path".to_string(),
            ));
        }
        if params.get("content").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: content".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let path_str = params["path"].as_str().unwrap();
        let content = params["content"].as_str().unwrap();
        let path = expand_path(path_str, &ctx.workspace);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes_written = content.len();
        tokio::fs::write(&path, content).await?;

        Ok(json!({
            "path": path.display().to_string(),
            "bytes_written": bytes_written,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrowserHandle;
    use clawbot_core::Config;
    use serde_json::json;

    fn test_ctx(workspace: PathBuf) -> ToolContext {
        let config = Config::default();
        ToolContext {
            browser: BrowserHandle::new(
                config.tools.browser.clone(),
                workspace.join("shots"),
                workspace.join("profile"),
            ),
            workspace,
            config,
        }
    }

    #[test]
    fn test_read_file_validate() {
        assert!(ReadFileTool.validate(&json!({"path": "/tmp/x"})).is_ok());
        assert!(ReadFileTool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_write_file_validate() {
        assert!(WriteFileTool
            .validate(&json!({"path": "t.txt", "content": "hi"}))
            .is_ok());
        assert!(WriteFileTool.validate(&json!({"path": "t.txt"})).is_err());
        assert!(WriteFileTool.validate(&json!({"content": "hi"})).is_err());
    }

    #[test]
    fn test_expand_path_absolute() {
        let ws = PathBuf::from("/workspace");
        assert_eq!(expand_path("/etc/hosts", &ws), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_expand_path_relative() {
        let ws = PathBuf::from("/workspace");
        assert_eq!(
            expand_path("foo/bar.txt", &ws),
            PathBuf::from("/workspace/foo/bar.txt")
        );
    }

    #[test]
    fn test_expand_path_tilde() {
        let ws = PathBuf::from("/workspace");
        let expanded = expand_path("~/test.txt", &ws);
        assert!(expanded.to_string_lossy().contains("test.txt"));
        assert!(!expanded.starts_with("/workspace"));
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let written = WriteFileTool
            .execute(
                ctx.clone(),
                json!({"path": "notes/hello.txt", "content": "hello clawbot"}),
            )
            .await
            .unwrap();
        assert_eq!(written["bytes_written"], 13);

        let read = ReadFileTool
            .execute(ctx, json!({"path": "notes/hello.txt"}))
            .await
            .unwrap();
        assert_eq!(read["content"], "hello clawbot");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());
        let result = ReadFileTool.execute(ctx, json!({"path": "nope.txt"})).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_large_file_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());
        let big = "b".repeat(20_000);
        WriteFileTool
            .execute(ctx.clone(), json!({"path": "big.txt", "content": big}))
            .await
            .unwrap();
        let read = ReadFileTool
            .execute(ctx, json!({"path": "big.txt"}))
            .await
            .unwrap();
        let content = read["content"].as_str().unwrap();
        assert!(content.len() < 6000);
        assert!(content.ends_with("(output truncated)"));
    }
}
