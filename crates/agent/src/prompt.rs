//! System instruction and prompt composition for the agent loop.

use clawbot_tools::ToolRegistry;

/// Terminal message when the completion service fails or times out. Not
/// retried within the request; the user can simply ask again.
pub const COMPLETION_FAILURE_MESSAGE: &str =
    "Sorry, I ran into a problem while processing your request. Please try again in a moment.";

/// Terminal message when the iteration budget runs out with tools still
/// being requested.
pub const BUDGET_EXCEEDED_MESSAGE: &str =
    "I couldn't finish this within my tool budget. Try breaking the request into smaller steps.";

/// Fixed behavioral instruction plus the current tool listing.
pub fn system_prompt(registry: &ToolRegistry) -> String {
    format!(
        "You are a capable automation assistant with direct access to this computer \
and a real browser.

## Available tools
{tools}

## Tool protocol
To use a tool, include a fenced block tagged `tool` in your reply:

```tool
{{\"tool\": \"shell\", \"args\": {{\"command\": \"ls -la\"}}}}
```

You may request several tools in one reply; they run in the order written. \
When you have everything you need, reply in plain text with no tool blocks.

## Rules
1. Use tools whenever the request needs real data or real actions.
2. Answer directly when no tool is needed.
3. Explain results in a friendly, concise way.",
        tools = registry.describe()
    )
}

/// Follow-up prompt for the next round: restate the request, inject all tool
/// outputs, let the model answer or ask for more tools.
pub fn follow_up_prompt(user_prompt: &str, tool_outputs: &str) -> String {
    format!(
        "Original request: {user_prompt}\n\n\
Tool results:\n{tool_outputs}\n\n\
Answer the user using these results, or request further tools if needed."
    )
}
