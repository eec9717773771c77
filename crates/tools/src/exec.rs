use async_trait::async_trait;
use clawbot_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::{clip_output, Tool, ToolContext, ToolSchema};

const STDOUT_CAP: usize = 2000;
const STDERR_CAP: usize = 500;

static DENY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"rm\s+-rf\s+/",
        r"rm\s+-rf\s+~",
        r"rm\s+-rf\s+\*",
        r"\bdd\b.*\bif=",
        r"\bshutdown\b",
        r"\breboot\b",
        r":\(\)\s*\{\s*:\|:\s*&\s*\}\s*;", // fork bomb
        r">\s*/dev/sd",
        r"mkfs\.",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn is_dangerous_command(command: &str) -> bool {
    DENY_PATTERNS.iter().any(|re| re.is_match(command))
}

// ============ shell ============

pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "shell",
            description: "Execute a shell command (ls, cat, git, docker, ...)",
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command to execute"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let command = params
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("Missing required parameter: command".to_string()))?;

        if is_dangerous_command(command) {
            return Err(Error::Validation(
                "Command matches dangerous pattern and is blocked".to_string(),
            ));
        }

        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let command = params["command"].as_str().unwrap();
        let timeout_secs = ctx.config.tools.shell.timeout_secs;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&ctx.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the output future on timeout must take the child with it.
            .kill_on_drop(true);

        let result = timeout(Duration::from_secs(timeout_secs), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                Ok(json!({
                    "exit_code": output.status.code(),
                    "stdout": clip_output(&stdout, STDOUT_CAP),
                    "stderr": clip_output(&stderr, STDERR_CAP),
                }))
            }
            Ok(Err(e)) => Err(Error::Tool(format!("Failed to execute command: {}", e))),
            Err(_) => Err(Error::Timeout(format!(
                "Command timed out after {} seconds",
                timeout_secs
            ))),
        }
    }
}

// ============ python ============

pub struct PythonTool;

#[async_trait]
impl Tool for PythonTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "python",
            description: "Run a Python snippet with python3 and return its output",
            parameters: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Python source to execute"
                    }
                },
                "required": ["code"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("code").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: code".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let code = params["code"].as_str().unwrap();
        let timeout_secs = ctx.config.tools.python.timeout_secs;

        let script_path =
            std::env::temp_dir().join(format!("clawbot_{}.py", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&script_path, code).await?;

        let mut cmd = Command::new("python3");
        cmd.arg(&script_path)
            .current_dir(&ctx.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = timeout(Duration::from_secs(timeout_secs), cmd.output()).await;
        let _ = tokio::fs::remove_file(&script_path).await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                Ok(json!({
                    "exit_code": output.status.code(),
                    "output": clip_output(&stdout, STDOUT_CAP),
                    "stderr": clip_output(&stderr, STDERR_CAP),
                }))
            }
            Ok(Err(e)) => Err(Error::Tool(format!("Failed to run python3: {}", e))),
            Err(_) => Err(Error::Timeout(format!(
                "Python script timed out after {} seconds",
                timeout_secs
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shell_schema() {
        let schema = ShellTool.schema();
        assert_eq!(schema.name, "shell");
    }

    #[test]
    fn test_shell_validate_ok() {
        assert!(ShellTool.validate(&json!({"command": "ls -la"})).is_ok());
    }

    #[test]
    fn test_shell_validate_missing_command() {
        assert!(ShellTool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_shell_validate_deny_rm_rf() {
        assert!(ShellTool.validate(&json!({"command": "rm -rf /"})).is_err());
    }

    #[test]
    fn test_shell_validate_deny_mkfs() {
        assert!(ShellTool
            .validate(&json!({"command": "mkfs.ext4 /dev/sda"}))
            .is_err());
    }

    #[test]
    fn test_python_validate() {
        assert!(PythonTool.validate(&json!({"code": "print(1)"})).is_ok());
        assert!(PythonTool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_dangerous_pattern_detection() {
        assert!(is_dangerous_command("dd if=/dev/zero of=/dev/sda"));
        assert!(!is_dangerous_command("echo hello"));
    }
}
