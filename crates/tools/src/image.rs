use async_trait::async_trait;
use clawbot_core::{Error, Result};
use serde_json::{json, Value};

use crate::{safe_truncate, Tool, ToolContext, ToolSchema};

const PROMPT_CAP: usize = 500;

/// Tool: image. Builds a pollinations.ai generation URL from a prompt.
/// The chat adapter downloads/forwards the image; this tool performs no
/// network I/O itself.
pub struct ImageTool;

pub fn generation_url(prompt: &str) -> String {
    let encoded = urlencoding::encode(prompt);
    format!(
        "https://image.pollinations.ai/prompt/{}?width=1024&height=1024&model=flux&nologo=true",
        encoded
    )
}

#[async_trait]
impl Tool for ImageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "image",
            description: "Generate an image from a text prompt and return its URL",
            parameters: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Description of the image to generate"
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let prompt = params.get("prompt").and_then(|v| v.as_str()).unwrap_or("");
        if prompt.trim().is_empty() {
            return Err(Error::Validation(
                "Missing required parameter: prompt".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let prompt = params["prompt"].as_str().unwrap_or("");
        let prompt = safe_truncate(prompt.trim(), PROMPT_CAP);
        Ok(json!({
            "prompt": prompt,
            "url": generation_url(prompt),
        }))
    }
}
