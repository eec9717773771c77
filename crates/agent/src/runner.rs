//! The bounded tool-augmented reasoning loop.
//!
//! Each round asks the completion service for a response, extracts tool
//! calls, executes them through the registry in source order, and folds the
//! results into a follow-up prompt. A response with no tool calls is the
//! terminal success path; a completion failure or an exhausted iteration
//! budget terminates with a fixed message. `run` never returns an error.

use clawbot_core::{AgentTurn, ToolCall, ToolResult};
use clawbot_providers::Provider;
use clawbot_storage::MemoryStore;
use clawbot_tools::{clip_output, ToolContext, ToolRegistry};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::parser;
use crate::prompt::{self, BUDGET_EXCEEDED_MESSAGE, COMPLETION_FAILURE_MESSAGE};

/// Rendered tool output cap inside follow-up prompts.
const RESULT_RENDER_CAP: usize = 2000;

pub struct AgentOutcome {
    pub final_text: String,
    pub trace: Vec<AgentTurn>,
}

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    ctx: ToolContext,
    max_iterations: u32,
    completion_timeout: Duration,
    memory: Option<(Arc<MemoryStore>, String)>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, registry: ToolRegistry, ctx: ToolContext) -> Self {
        let max_iterations = ctx.config.agent.max_tool_iterations.max(1);
        let completion_timeout = Duration::from_secs(ctx.config.agent.completion_timeout_secs);
        Self {
            provider,
            registry,
            ctx,
            max_iterations,
            completion_timeout,
            memory: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Attach a memory journal; the loop records both sides of the exchange
    /// and the tool results for this user.
    pub fn with_memory(mut self, store: Arc<MemoryStore>, user_id: &str) -> Self {
        self.memory = Some((store, user_id.to_string()));
        self
    }

    /// Run one request to completion. All failure modes surface as a
    /// returned message; the caller never sees an error.
    pub async fn run(&self, user_prompt: &str, context: &str) -> AgentOutcome {
        let system = prompt::system_prompt(&self.registry);
        let mut trace: Vec<AgentTurn> = Vec::new();

        if let Some((store, user_id)) = &self.memory {
            let _ = store.add_message(user_id, "user", user_prompt);
            maybe_learn_fact(store, user_id, user_prompt);
        }

        let mut current_prompt = if context.is_empty() {
            user_prompt.to_string()
        } else {
            format!("{}\n\nUser: {}", context, user_prompt)
        };

        for iteration in 0..self.max_iterations {
            debug!(iteration, "Completion call");
            let completion = tokio::time::timeout(
                self.completion_timeout,
                self.provider.complete(&current_prompt, &system),
            )
            .await;

            let response = match completion {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(error = %e, iteration, "Completion failed");
                    return self.finish(COMPLETION_FAILURE_MESSAGE.to_string(), trace);
                }
                Err(_) => {
                    warn!(iteration, "Completion timed out");
                    return self.finish(COMPLETION_FAILURE_MESSAGE.to_string(), trace);
                }
            };

            let tool_calls = parser::parse_tool_calls(&response);

            if tool_calls.is_empty() {
                // Terminal success: return the response with any stray
                // fencing removed.
                let final_text = parser::strip_tool_blocks(&response);
                trace.push(AgentTurn {
                    prompt: current_prompt,
                    response,
                    tool_calls: Vec::new(),
                    tool_results: Vec::new(),
                });
                return self.finish(final_text, trace);
            }

            // Execute strictly in parsed order. Results reach the next round
            // only through the aggregated follow-up prompt.
            let mut tool_results: Vec<ToolResult> = Vec::new();
            let mut rendered: Vec<String> = Vec::new();
            for call in &tool_calls {
                info!(tool = %call.name, iteration, "Executing tool");
                let result = self
                    .registry
                    .execute(
                        &call.name,
                        self.ctx.clone(),
                        Value::Object(call.arguments.clone()),
                    )
                    .await;
                let line = render_result(call, &result);
                if let Some((store, user_id)) = &self.memory {
                    let _ = store.add_message(user_id, "tool", &line);
                }
                rendered.push(line);
                tool_results.push(result);
            }

            trace.push(AgentTurn {
                prompt: current_prompt.clone(),
                response,
                tool_calls,
                tool_results,
            });

            current_prompt = prompt::follow_up_prompt(user_prompt, &rendered.join("\n"));
        }

        warn!(max_iterations = self.max_iterations, "Iteration budget exhausted");
        self.finish(BUDGET_EXCEEDED_MESSAGE.to_string(), trace)
    }

    fn finish(&self, final_text: String, trace: Vec<AgentTurn>) -> AgentOutcome {
        if let Some((store, user_id)) = &self.memory {
            let _ = store.add_message(user_id, "assistant", &final_text);
        }
        AgentOutcome { final_text, trace }
    }
}

/// One line per tool outcome, as fed back to the model.
fn render_result(call: &ToolCall, result: &ToolResult) -> String {
    match (&result.payload, &result.error) {
        (Some(payload), _) if result.success => {
            format!("[{}] {}", call.name, clip_output(&payload.to_string(), RESULT_RENDER_CAP))
        }
        (_, Some(error)) => format!("[{}] error: {}", call.name, error),
        _ => format!("[{}] error: unknown failure", call.name),
    }
}

/// The journal picks up self-introductions so later requests carry them as
/// context. Deliberately naive, mirroring the fact heuristic the memory
/// layer has always used.
fn maybe_learn_fact(store: &MemoryStore, user_id: &str, text: &str) {
    let lower = text.to_lowercase();
    if lower.contains("my name is") || lower.contains("call me") {
        let fact: String = text.chars().take(100).collect();
        let _ = store.learn_fact(user_id, &fact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clawbot_core::{Config, Error, Result};
    use clawbot_tools::BrowserHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted provider: returns queued responses in order, then repeats the
    /// last one. Counts how many completion calls were made.
    struct MockProvider {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        async fn complete(&self, _prompt: &str, _system: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Provider("upstream unavailable".to_string()));
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                Ok(responses.remove(0))
            } else {
                Ok(responses.first().cloned().unwrap_or_default())
            }
        }
    }

    fn test_ctx() -> ToolContext {
        let config = Config::default();
        let dir = std::env::temp_dir().join("clawbot-runner-test");
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

    fn make_loop(provider: Arc<MockProvider>) -> AgentLoop {
        AgentLoop::new(provider, ToolRegistry::with_defaults(), test_ctx())
    }

    const TOOL_RESPONSE: &str =
        "Checking.\n```tool\n{\"tool\": \"image\", \"args\": {\"prompt\": \"a cat\"}}\n```";

    #[tokio::test]
    async fn test_no_tool_calls_terminates_after_one_completion() {
        let provider = Arc::new(MockProvider::new(vec!["Just an answer."]));
        let outcome = make_loop(provider.clone()).run("hi", "").await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(outcome.final_text, "Just an answer.");
        assert_eq!(outcome.trace.len(), 1);
        assert!(outcome.trace[0].tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let provider = Arc::new(MockProvider::new(vec![TOOL_RESPONSE, "Here is your image."]));
        let outcome = make_loop(provider.clone()).run("draw a cat", "").await;
        assert_eq!(provider.call_count(), 2);
        assert_eq!(outcome.final_text, "Here is your image.");
        assert_eq!(outcome.trace.len(), 2);
        assert_eq!(outcome.trace[0].tool_calls.len(), 1);
        assert!(outcome.trace[0].tool_results[0].success);
        // The follow-up prompt restates the request and injects the result.
        assert!(outcome.trace[1].prompt.contains("draw a cat"));
        assert!(outcome.trace[1].prompt.contains("[image]"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_makes_exactly_k_calls() {
        let provider = Arc::new(MockProvider::new(vec![TOOL_RESPONSE]));
        let outcome = make_loop(provider.clone())
            .with_max_iterations(3)
            .run("loop forever", "")
            .await;
        assert_eq!(provider.call_count(), 3);
        assert_eq!(outcome.final_text, BUDGET_EXCEEDED_MESSAGE);
        assert_eq!(outcome.trace.len(), 3);
    }

    #[tokio::test]
    async fn test_completion_failure_returns_fixed_message() {
        let provider = Arc::new(MockProvider::failing());
        let outcome = make_loop(provider.clone()).run("hi", "").await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(outcome.final_text, COMPLETION_FAILURE_MESSAGE);
        assert!(outcome.trace.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_recorded_as_failed_result() {
        let response = "```tool\n{\"tool\": \"teleport\", \"args\": {}}\n```";
        let provider = Arc::new(MockProvider::new(vec![response, "Could not do that."]));
        let outcome = make_loop(provider).run("teleport me", "").await;
        let first = &outcome.trace[0];
        assert!(!first.tool_results[0].success);
        assert_eq!(first.tool_results[0].error.as_deref(), Some("unknown tool"));
        assert_eq!(outcome.final_text, "Could not do that.");
    }

    #[tokio::test]
    async fn test_context_prefixes_first_prompt() {
        let provider = Arc::new(MockProvider::new(vec!["ok"]));
        let outcome = make_loop(provider)
            .run("what did I say", "Known about this user: likes rust")
            .await;
        assert!(outcome.trace[0].prompt.contains("likes rust"));
        assert!(outcome.trace[0].prompt.contains("what did I say"));
    }

    #[tokio::test]
    async fn test_memory_records_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::open(dir.path().join("memory.json")));
        let provider = Arc::new(MockProvider::new(vec!["Nice to meet you!"]));
        let outcome = make_loop(provider)
            .with_memory(store.clone(), "u1")
            .run("my name is Kim", "")
            .await;
        assert_eq!(outcome.final_text, "Nice to meet you!");
        let rec = store.get_record("u1").unwrap();
        assert_eq!(rec.history.len(), 2);
        assert_eq!(rec.history[0].role, "user");
        assert_eq!(rec.history[1].role, "assistant");
        // The self-introduction heuristic captured a fact.
        assert_eq!(rec.facts.len(), 1);
        assert!(rec.facts[0].contains("Kim"));
    }

    #[tokio::test]
    async fn test_stray_fencing_stripped_from_final_text() {
        // A response whose only block is malformed parses as zero tool calls
        // but still needs its fencing removed.
        let response = "Answer.\n```tool\n{broken\n```";
        let provider = Arc::new(MockProvider::new(vec![response]));
        let outcome = make_loop(provider).run("hi", "").await;
        assert_eq!(outcome.final_text, "Answer.");
    }

    #[test]
    fn test_render_result_shapes() {
        let call = ToolCall::new("shell", Default::default());
        let ok = ToolResult::ok(serde_json::json!({"stdout": "hi"}));
        assert!(render_result(&call, &ok).starts_with("[shell] {"));
        let failed = ToolResult::fail("nope");
        assert_eq!(render_result(&call, &failed), "[shell] error: nope");
    }
}
