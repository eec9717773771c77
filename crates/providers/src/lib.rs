pub mod anthropic;
pub mod factory;
pub mod openai;

use async_trait::async_trait;
use clawbot_core::Result;

/// A text-completion capability.
///
/// The agent loop speaks to the model purely through text: the prompt carries
/// the conversation state and tool outputs, the system instruction carries the
/// tool protocol, and tool invocations come back embedded in the response as
/// fenced blocks. Implementations may fail or time out; the loop handles both.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String>;
}

pub use anthropic::AnthropicProvider;
pub use factory::create_provider;
pub use openai::OpenAIProvider;
