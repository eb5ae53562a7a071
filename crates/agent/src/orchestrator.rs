//! The bounded tool loop.
//!
//! Each round sends the prompt, history, generation options, tool
//! definitions and all tool results gathered so far. A response without
//! tool requests is the final answer. Otherwise every request is resolved
//! in order and the loop goes around again, at most [`MAX_TOOL_ROUNDS`]
//! times.

use std::sync::Arc;
use std::time::Instant;

use parley_core::error::{Error, ErrorCategory, ProviderError};
use parley_core::message::ChatMessage;
use parley_core::provider::{GenerationOptions, PromptTurn, Provider};
use parley_core::tool::{ToolContext, ToolRegistry, ToolRequest, ToolResult};
use parley_memory::{estimate_messages_tokens, estimate_tokens};
use parley_security::{ToolAuditLog, ToolCallStatus};
use parley_telemetry::{TraceEvent, TraceEventType, TraceRecorder};
use thiserror::Error;
use tracing::{debug, warn};

/// Model rounds per invocation.
pub const MAX_TOOL_ROUNDS: u32 = 3;

/// Everything one orchestration needs.
#[derive(Debug, Clone)]
pub struct OrchestrationRequest {
    pub trace_id: String,
    /// Active mode label for trace events
    pub mode: String,
    pub prompt: String,
    pub history: Vec<ChatMessage>,
    pub options: GenerationOptions,
    /// Read-only channel snapshot handed to tools
    pub context: ToolContext,
    /// Whether the channel/guild may run tools at all
    pub tools_authorized: bool,
}

/// Estimated token usage accumulated over all rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// Result of a finished orchestration.
#[derive(Debug, Clone, Default)]
pub struct Orchestration {
    /// Final answer; empty when the round budget ran out
    pub content: String,
    pub model: Option<String>,
    pub rounds: u32,
    /// Results in call order
    pub tool_results: Vec<ToolResult>,
    pub usage: TokenUsage,
}

/// A failed orchestration, with the usage measured up to the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct OrchestrationError {
    #[source]
    pub error: Error,
    pub usage: TokenUsage,
    pub rounds: u32,
}

impl OrchestrationError {
    pub fn category(&self) -> ErrorCategory {
        self.error.category()
    }
}

/// Drives the provider through the tool loop.
pub struct ToolOrchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    audit: Arc<ToolAuditLog>,
    traces: Arc<TraceRecorder>,
}

impl ToolOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        audit: Arc<ToolAuditLog>,
        traces: Arc<TraceRecorder>,
    ) -> Self {
        Self {
            provider,
            tools,
            audit,
            traces,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run the loop to a final answer, an exhausted budget or a failure.
    pub async fn run(&self, request: &OrchestrationRequest) -> Result<Orchestration, OrchestrationError> {
        let definitions = self.tools.definitions();
        let mut tool_results: Vec<ToolResult> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut model = None;

        for round in 1..=MAX_TOOL_ROUNDS {
            let turn = PromptTurn {
                prompt: request.prompt.clone(),
                history: request.history.clone(),
                options: request.options.clone(),
                tools: definitions.clone(),
                tool_results: tool_results.clone(),
            };
            let prompt_tokens = turn_tokens(&turn);
            usage.prompt += prompt_tokens;

            self.traces.record(
                self.event(request, TraceEventType::ModelRequestStart)
                    .with_retry_count(round - 1)
                    .with_tokens(prompt_tokens, 0)
                    .with_details(format!("round {round}")),
            );
            debug!(trace_id = %request.trace_id, round, results = tool_results.len(), "Model request");

            let started = Instant::now();
            let response = match self.provider.send(turn).await {
                Ok(response) => response,
                Err(e) => {
                    return Err(OrchestrationError {
                        error: e.into(),
                        usage,
                        rounds: round,
                    });
                }
            };

            let completion_tokens = response_tokens(&response.content, &response.tool_requests);
            usage.completion += completion_tokens;
            if response.model.is_some() {
                model = response.model.clone();
            }

            self.traces.record(
                self.event(request, TraceEventType::ModelRequestEnd)
                    .with_retry_count(round - 1)
                    .with_latency(elapsed_ms(started))
                    .with_tokens(prompt_tokens, completion_tokens)
                    .with_details(format!("tool_requests={}", response.tool_requests.len())),
            );

            if !response.has_tool_requests() {
                if response.content.trim().is_empty() {
                    return Err(OrchestrationError {
                        error: ProviderError::MalformedResponse("empty content and no tool requests".into()).into(),
                        usage,
                        rounds: round,
                    });
                }
                return Ok(Orchestration {
                    content: response.content,
                    model,
                    rounds: round,
                    tool_results,
                    usage,
                });
            }

            for call in &response.tool_requests {
                if let Some(result) = self.resolve(request, call).await {
                    tool_results.push(result);
                }
            }
        }

        warn!(
            trace_id = %request.trace_id,
            rounds = MAX_TOOL_ROUNDS,
            "Tool round budget exhausted without a final answer"
        );

        Ok(Orchestration {
            content: String::new(),
            model,
            rounds: MAX_TOOL_ROUNDS,
            tool_results,
            usage,
        })
    }

    /// Resolve one tool request. `None` when the tool is unknown.
    async fn resolve(&self, request: &OrchestrationRequest, call: &ToolRequest) -> Option<ToolResult> {
        let Some(tool) = self.tools.get(&call.name) else {
            debug!(tool = %call.name, "Skipping unknown tool");
            return None;
        };

        let channel_id = request.context.channel_id.as_str();
        let guild_id = request.context.guild_id.as_deref();

        if !request.tools_authorized {
            self.audit.log(
                channel_id,
                guild_id,
                &call.name,
                ToolCallStatus::Blocked,
                "tool use is not enabled here",
            );
            self.traces.record(
                self.event(request, TraceEventType::ToolCallEnd)
                    .with_error(ErrorCategory::PolicyBlocked)
                    .with_details(format!("{}: blocked", call.name)),
            );
            return Some(ToolResult::error(call, "Tool use is not enabled for this channel."));
        }

        self.traces
            .record(self.event(request, TraceEventType::ToolCallStart).with_details(call.name.clone()));

        let started = Instant::now();
        let (result, status) = match tool.execute(call.arguments.clone(), &request.context).await {
            Ok(output) if !output.is_error => (ToolResult::ok(call, output.content), ToolCallStatus::Ok),
            Ok(output) => (ToolResult::error(call, output.content), ToolCallStatus::Error),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (ToolResult::error(call, format!("Error: {e}")), ToolCallStatus::Error)
            }
        };
        let latency = elapsed_ms(started);

        let summary = match status {
            ToolCallStatus::Ok => format!("returned {} chars", result.content.chars().count()),
            _ => result.content.clone(),
        };
        self.audit.log(channel_id, guild_id, &call.name, status, summary);

        let mut end = self
            .event(request, TraceEventType::ToolCallEnd)
            .with_latency(latency)
            .with_details(format!("{}: {}", call.name, if result.is_error { "error" } else { "ok" }));
        if result.is_error {
            end = end.with_error(ErrorCategory::ToolExecution);
        }
        self.traces.record(end);

        Some(result)
    }

    fn event(&self, request: &OrchestrationRequest, event_type: TraceEventType) -> TraceEvent {
        TraceEvent::new(&request.trace_id, event_type, self.provider.name(), &request.mode)
    }
}

fn turn_tokens(turn: &PromptTurn) -> u64 {
    let results: usize = turn.tool_results.iter().map(|r| estimate_tokens(&r.content)).sum();
    (estimate_tokens(&turn.prompt) + estimate_messages_tokens(&turn.history) + results) as u64
}

fn response_tokens(content: &str, requests: &[ToolRequest]) -> u64 {
    let calls: usize = requests
        .iter()
        .map(|r| estimate_tokens(&r.name) + estimate_tokens(&r.arguments.to_string()))
        .sum();
    (estimate_tokens(content) + calls) as u64
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::error::ToolError;
    use parley_core::provider::ProviderResponse;
    use parley_core::tool::{Tool, ToolOutput};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses and records every turn it was sent.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        turns: Mutex<Vec<PromptTurn>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                turns: Mutex::new(Vec::new()),
            }
        }

        fn turns(&self) -> Vec<PromptTurn> {
            self.turns.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, turn: PromptTurn) -> Result<ProviderResponse, ProviderError> {
            self.turns.lock().unwrap().push(turn);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ProviderResponse::text("fallback")))
        }
    }

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "count"
        }
        fn description(&self) -> &str {
            "Counts invocations"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: serde_json::Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ToolOutput::success(format!("call {n} in {}", context.channel_id)))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value, _context: &ToolContext) -> Result<ToolOutput, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    fn call(id: &str, name: &str) -> ToolRequest {
        ToolRequest {
            id: id.into(),
            name: name.into(),
            arguments: serde_json::json!({}),
        }
    }

    fn request(tools_authorized: bool) -> OrchestrationRequest {
        OrchestrationRequest {
            trace_id: "trace-1".into(),
            mode: "local".into(),
            prompt: "User invocation: @agent hi".into(),
            history: vec![ChatMessage::user("alice", "@agent hi")],
            options: GenerationOptions::default(),
            context: ToolContext {
                channel_id: "C1".into(),
                guild_id: Some("G1".into()),
                messages: vec!["alice: @agent hi".into()],
                participants: vec!["alice".into()],
            },
            tools_authorized,
        }
    }

    struct Fixture {
        provider: Arc<ScriptedProvider>,
        calls: Arc<AtomicUsize>,
        audit: Arc<ToolAuditLog>,
        traces: Arc<TraceRecorder>,
        orchestrator: ToolOrchestrator,
    }

    fn fixture(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Fixture {
        let provider = Arc::new(ScriptedProvider::new(responses));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool { calls: calls.clone() }));
        registry.register(Box::new(FailingTool));
        let audit = Arc::new(ToolAuditLog::new());
        let traces = Arc::new(TraceRecorder::new());
        let orchestrator = ToolOrchestrator::new(provider.clone(), Arc::new(registry), audit.clone(), traces.clone());
        Fixture {
            provider,
            calls,
            audit,
            traces,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn plain_answer_takes_one_round() {
        let f = fixture(vec![Ok(ProviderResponse::text("hello"))]);
        let out = f.orchestrator.run(&request(true)).await.unwrap();

        assert_eq!(out.content, "hello");
        assert_eq!(out.rounds, 1);
        assert!(out.tool_results.is_empty());
        assert!(out.usage.prompt > 0);

        let turns = f.provider.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].tools.len(), 2);
        assert_eq!(f.traces.by_type(TraceEventType::ModelRequestStart).len(), 1);
        assert_eq!(f.traces.by_type(TraceEventType::ModelRequestEnd).len(), 1);
    }

    #[tokio::test]
    async fn one_tool_round_then_final_answer() {
        let f = fixture(vec![
            Ok(ProviderResponse::with_tool_requests(vec![call("r1", "count")])),
            Ok(ProviderResponse::text("done")),
        ]);
        let out = f.orchestrator.run(&request(true)).await.unwrap();

        assert_eq!(out.content, "done");
        assert_eq!(out.rounds, 2);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);

        let turns = f.provider.turns();
        assert!(turns[0].tool_results.is_empty());
        assert_eq!(turns[1].tool_results.len(), 1);
        assert_eq!(turns[1].tool_results[0].request_id, "r1");
        assert_eq!(turns[1].tool_results[0].content, "call 1 in C1");
        assert!(!turns[1].tool_results[0].is_error);

        let audit = f.audit.entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, ToolCallStatus::Ok);
        assert_eq!(audit[0].guild_id.as_deref(), Some("G1"));
        assert_eq!(f.traces.by_type(TraceEventType::ToolCallStart).len(), 1);
        assert_eq!(f.traces.by_type(TraceEventType::ToolCallEnd).len(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_yields_empty_content() {
        let f = fixture(vec![
            Ok(ProviderResponse::with_tool_requests(vec![call("r1", "count")])),
            Ok(ProviderResponse::with_tool_requests(vec![call("r2", "count")])),
            Ok(ProviderResponse::with_tool_requests(vec![call("r3", "count")])),
            Ok(ProviderResponse::text("never sent")),
        ]);
        let out = f.orchestrator.run(&request(true)).await.unwrap();

        assert!(out.content.is_empty());
        assert_eq!(out.rounds, MAX_TOOL_ROUNDS);
        assert_eq!(f.provider.turns().len(), 3);
        assert_eq!(out.tool_results.len(), 3);
    }

    #[tokio::test]
    async fn unknown_tools_are_skipped() {
        let f = fixture(vec![
            Ok(ProviderResponse::with_tool_requests(vec![
                call("r1", "rm_rf"),
                call("r2", "count"),
            ])),
            Ok(ProviderResponse::text("ok")),
        ]);
        let out = f.orchestrator.run(&request(true)).await.unwrap();

        assert_eq!(out.tool_results.len(), 1);
        assert_eq!(out.tool_results[0].request_id, "r2");
        assert_eq!(f.audit.count(), 1);
    }

    #[tokio::test]
    async fn unauthorized_tools_are_blocked_not_run() {
        let f = fixture(vec![
            Ok(ProviderResponse::with_tool_requests(vec![call("r1", "count")])),
            Ok(ProviderResponse::text("no tools for me")),
        ]);
        let out = f.orchestrator.run(&request(false)).await.unwrap();

        assert_eq!(out.content, "no tools for me");
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert!(out.tool_results[0].is_error);
        assert_eq!(f.audit.entries_by_status(ToolCallStatus::Blocked).len(), 1);
        assert!(f.traces.by_type(TraceEventType::ToolCallStart).is_empty());
    }

    #[tokio::test]
    async fn failing_tool_becomes_error_result() {
        let f = fixture(vec![
            Ok(ProviderResponse::with_tool_requests(vec![
                call("r1", "broken"),
                call("r2", "count"),
            ])),
            Ok(ProviderResponse::text("recovered")),
        ]);
        let out = f.orchestrator.run(&request(true)).await.unwrap();

        assert_eq!(out.content, "recovered");
        assert_eq!(out.tool_results.len(), 2);
        assert!(out.tool_results[0].is_error);
        assert!(out.tool_results[0].content.contains("disk on fire"));
        assert!(!out.tool_results[1].is_error);
        assert_eq!(f.audit.entries_by_status(ToolCallStatus::Error).len(), 1);

        let ends = f.traces.by_type(TraceEventType::ToolCallEnd);
        assert!(ends.iter().any(|e| e.error_category == Some(ErrorCategory::ToolExecution)));
    }

    #[tokio::test]
    async fn provider_failure_carries_usage() {
        let f = fixture(vec![
            Ok(ProviderResponse::with_tool_requests(vec![call("r1", "count")])),
            Err(ProviderError::Network("connection reset".into())),
        ]);
        let err = f.orchestrator.run(&request(true)).await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.rounds, 2);
        assert!(err.usage.prompt > 0);
        assert!(err.usage.completion > 0);
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn blank_answer_without_tool_requests_is_malformed() {
        let f = fixture(vec![
            Ok(ProviderResponse::with_tool_requests(vec![call("r1", "count")])),
            Ok(ProviderResponse::text("   ")),
        ]);
        let err = f.orchestrator.run(&request(true)).await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::MalformedResponse);
        assert_eq!(err.rounds, 2);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        assert!(err.usage.prompt > 0);
    }

    #[tokio::test]
    async fn events_share_the_trace_id() {
        let f = fixture(vec![
            Ok(ProviderResponse::with_tool_requests(vec![call("r1", "count")])),
            Ok(ProviderResponse::text("done")),
        ]);
        f.orchestrator.run(&request(true)).await.unwrap();

        let events = f.traces.by_trace("trace-1");
        assert_eq!(events.len(), f.traces.len());
        assert!(events.iter().all(|e| e.provider == "scripted" && e.mode == "local"));
    }
}
