//! The invocation pipeline.
//!
//! Every canonical message is remembered in the channel history. Messages
//! that pass the gate (enabled, not self-authored, non-empty, invoked,
//! dedup, allowed content, policy, in-flight, rate window) get a prompt
//! built from channel memory, go through the tool loop, and the answer is
//! delivered to the reply sink. The assistant turn is recorded only after
//! the sink accepts it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use chrono::Utc;
use parley_config::AgentSettings;
use parley_core::channel::{ChannelMessage, MessageSource, ReplySink};
use parley_core::error::{Error, ErrorCategory};
use parley_core::message::ChatMessage;
use parley_core::provider::Provider;
use parley_core::tool::{ToolContext, ToolRegistry};
use parley_memory::Invocation;
use parley_security::{
    PolicyBlockReason, PolicyContext, PolicyDecision, PolicyEngine, ToolAuditLog, TracingSink, find_blocked_marker,
    is_invocation, tool_access,
};
use parley_telemetry::{TraceEvent, TraceEventType, TraceRecorder, new_trace_id};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{OrchestrationRequest, TokenUsage, ToolOrchestrator, elapsed_ms};
use crate::registry::ChannelRegistry;

/// Why a message was ignored without a trace outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    SelfAuthored,
    EmptyContent,
    NotInvoked,
    /// Contains a sensitive-data marker
    BlockedContent,
    /// Already answered
    Duplicate,
    /// Another invocation is running in the channel
    InFlight,
}

/// What happened to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Replied { content: String, trace_id: String },
    /// The model produced no usable answer
    NoReply { trace_id: String },
    Skipped(SkipReason),
    PolicyBlocked { reason: PolicyBlockReason, trace_id: String },
    RateLimited { trace_id: String },
}

impl InvocationOutcome {
    pub fn trace_id(&self) -> Option<&str> {
        match self {
            Self::Replied { trace_id, .. }
            | Self::NoReply { trace_id }
            | Self::PolicyBlocked { trace_id, .. }
            | Self::RateLimited { trace_id } => Some(trace_id),
            Self::Skipped(_) => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Replied { .. })
    }
}

/// Per-attempt trace labels.
struct TraceScope {
    trace_id: String,
    provider: String,
    mode: String,
}

impl TraceScope {
    fn event(&self, event_type: TraceEventType) -> TraceEvent {
        TraceEvent::new(&self.trace_id, event_type, &self.provider, &self.mode)
    }
}

/// Releases a channel's in-flight slot on every exit path.
struct InFlightGuard {
    registry: Arc<Mutex<ChannelRegistry>>,
    channel_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish(&self.channel_id);
    }
}

/// An invocation that passed every check and holds its channel's slot.
struct Admission {
    scope: TraceScope,
    started: Instant,
    settings: AgentSettings,
    message_id: String,
    request: OrchestrationRequest,
    slot: InFlightGuard,
}

/// Result of the synchronous checks for one message.
enum Admit {
    Decided(InvocationOutcome),
    Claimed(Box<Admission>),
}

/// Mediates between chat channels and the model.
pub struct AgentMediator {
    settings: RwLock<AgentSettings>,
    orchestrator: ToolOrchestrator,
    sink: Arc<dyn ReplySink>,
    traces: Arc<TraceRecorder>,
    audit: Arc<ToolAuditLog>,
    registry: Arc<Mutex<ChannelRegistry>>,
}

impl AgentMediator {
    /// Create a mediator with its own trace recorder and tool audit log.
    pub fn new(
        mut settings: AgentSettings,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        settings.migrate();
        let traces = Arc::new(TraceRecorder::new());
        let audit = Arc::new(ToolAuditLog::with_sinks(vec![Box::new(TracingSink)]));
        let orchestrator = ToolOrchestrator::new(provider, tools, audit.clone(), traces.clone());

        Self {
            settings: RwLock::new(settings),
            orchestrator,
            sink,
            traces,
            audit,
            registry: Arc::new(Mutex::new(ChannelRegistry::new())),
        }
    }

    pub fn traces(&self) -> &Arc<TraceRecorder> {
        &self.traces
    }

    pub fn audit(&self) -> &Arc<ToolAuditLog> {
        &self.audit
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.orchestrator.tools()
    }

    /// A copy of the current settings.
    pub fn settings(&self) -> AgentSettings {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap settings at runtime. The provider stays the one built at startup.
    pub fn replace_settings(&self, mut settings: AgentSettings) {
        settings.migrate();
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        info!("Agent settings replaced");
    }

    /// Run `f` against the channel registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&ChannelRegistry) -> R) -> R {
        f(&self.lock_registry())
    }

    fn lock_registry(&self) -> MutexGuard<'_, ChannelRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Process one canonical message through the whole pipeline.
    pub async fn handle(&self, message: ChannelMessage) -> parley_core::Result<InvocationOutcome> {
        match self.admit(&message) {
            Admit::Decided(outcome) => Ok(outcome),
            Admit::Claimed(admission) => self.complete(*admission).await,
        }
    }

    /// Remember the message and run every check up to claiming the
    /// channel's in-flight slot. Never awaits.
    fn admit(&self, message: &ChannelMessage) -> Admit {
        self.lock_registry().remember(message);

        let settings = self.settings();
        let channel_id = message.channel_id.as_str();
        let guild_id = message.guild_id.as_deref();

        if !settings.enabled {
            return Admit::Decided(InvocationOutcome::Skipped(SkipReason::Disabled));
        }

        let own_id = settings.self_user_id.as_deref();
        if own_id.is_some() && message.author_id.as_deref() == own_id {
            return Admit::Decided(InvocationOutcome::Skipped(SkipReason::SelfAuthored));
        }

        let content = message.content.trim();
        if content.is_empty() {
            return Admit::Decided(InvocationOutcome::Skipped(SkipReason::EmptyContent));
        }

        if !is_invocation(content, &settings.mention_name, &settings.invocation_prefix) {
            return Admit::Decided(InvocationOutcome::Skipped(SkipReason::NotInvoked));
        }

        if self.lock_registry().was_handled(channel_id, &message.id) {
            debug!(channel = %channel_id, message = %message.id, "Already answered");
            return Admit::Decided(InvocationOutcome::Skipped(SkipReason::Duplicate));
        }

        let started = Instant::now();
        let scope = TraceScope {
            trace_id: new_trace_id(),
            provider: self.orchestrator.provider_name().to_string(),
            mode: settings.active_mode().as_str().to_string(),
        };
        self.traces
            .record(scope.event(TraceEventType::InvocationReceived).with_details(message.id.clone()));
        info!(trace_id = %scope.trace_id, channel = %channel_id, author = %message.author, "Invocation received");

        if let Some(marker) = find_blocked_marker(content) {
            warn!(trace_id = %scope.trace_id, channel = %channel_id, marker = marker.pattern(), "Blocked content");
            self.traces.record(
                scope
                    .event(TraceEventType::PolicyBlocked)
                    .with_error(ErrorCategory::PolicyBlocked)
                    .with_details("content"),
            );
            return Admit::Decided(InvocationOutcome::Skipped(SkipReason::BlockedContent));
        }

        let policy_context = PolicyContext {
            guild_id,
            channel_id: Some(channel_id),
            invoker_role_ids: &message.author_role_ids,
        };
        if let PolicyDecision::Denied { reason } = PolicyEngine::check(&settings.policy, &policy_context) {
            warn!(trace_id = %scope.trace_id, channel = %channel_id, %reason, "Invocation blocked by policy");
            self.traces.record(
                scope
                    .event(TraceEventType::PolicyBlocked)
                    .with_error(ErrorCategory::PolicyBlocked)
                    .with_details(reason.to_string()),
            );
            return Admit::Decided(InvocationOutcome::PolicyBlocked {
                reason,
                trace_id: scope.trace_id,
            });
        }

        let (payload, snapshot, participants) = {
            let mut registry = self.lock_registry();

            if registry.is_in_flight(channel_id) {
                debug!(trace_id = %scope.trace_id, channel = %channel_id, "Invocation already in flight");
                return Admit::Decided(InvocationOutcome::Skipped(SkipReason::InFlight));
            }
            let now_ms = Utc::now().timestamp_millis();
            if !registry.try_acquire_rate(channel_id, settings.rate_limit_per_minute, now_ms) {
                warn!(trace_id = %scope.trace_id, channel = %channel_id, "Rate limit reached");
                self.traces.record(
                    scope
                        .event(TraceEventType::Error)
                        .with_error(ErrorCategory::RateLimited)
                        .with_details("rate_limited"),
                );
                return Admit::Decided(InvocationOutcome::RateLimited {
                    trace_id: scope.trace_id,
                });
            }

            registry.begin(channel_id);
            let participants = registry.participants(channel_id);
            let snapshot = registry.snapshot(channel_id);

            let memory = registry.memory_mut();
            let user_turn = ChatMessage::user(message.author.clone(), content).with_timestamp(message.timestamp);
            memory.append_message(channel_id, user_turn, &settings, Some(participants.as_slice()));
            memory.maybe_summarize(channel_id, &settings);
            let invocation = Invocation::new(content).with_attachments(message.attachments.len());
            let payload = memory.build_prompt_payload(channel_id, invocation, &settings);

            (payload, snapshot, participants)
        };
        let slot = InFlightGuard {
            registry: Arc::clone(&self.registry),
            channel_id: channel_id.to_string(),
        };

        let request = OrchestrationRequest {
            trace_id: scope.trace_id.clone(),
            mode: scope.mode.clone(),
            prompt: payload.prompt,
            history: payload.history,
            options: settings.generation_options(),
            context: ToolContext {
                channel_id: channel_id.to_string(),
                guild_id: guild_id.map(str::to_string),
                messages: snapshot,
                participants,
            },
            tools_authorized: tool_access(&settings, channel_id, guild_id),
        };

        Admit::Claimed(Box::new(Admission {
            scope,
            started,
            settings,
            message_id: message.id.clone(),
            request,
            slot,
        }))
    }

    /// Orchestrate and deliver an admitted invocation. The slot is
    /// released when this returns.
    async fn complete(&self, admission: Admission) -> parley_core::Result<InvocationOutcome> {
        let Admission {
            scope,
            started,
            settings,
            message_id,
            request,
            slot: _slot,
        } = admission;
        let channel_id = request.context.channel_id.as_str();

        let orchestration = match self.orchestrator.run(&request).await {
            Ok(orchestration) => orchestration,
            Err(failure) => {
                self.record_failure(&scope, started, failure.usage, &failure.error);
                return Err(failure.error);
            }
        };

        let reply = orchestration.content.trim();
        if reply.is_empty() {
            info!(trace_id = %scope.trace_id, rounds = orchestration.rounds, "No reply produced");
            return Ok(InvocationOutcome::NoReply {
                trace_id: scope.trace_id,
            });
        }

        if let Err(e) = self.sink.send(channel_id, reply).await {
            let error = Error::from(e);
            self.record_failure(&scope, started, orchestration.usage, &error);
            return Err(error);
        }

        {
            let mut registry = self.lock_registry();
            let speaker = settings.mention_name.trim().trim_start_matches('@').to_string();
            let memory = registry.memory_mut();
            memory.append_message(channel_id, ChatMessage::assistant(speaker, reply), &settings, None);
            memory.maybe_summarize(channel_id, &settings);
            registry.mark_handled(channel_id, &message_id);
        }

        info!(
            trace_id = %scope.trace_id,
            channel = %channel_id,
            rounds = orchestration.rounds,
            tools = orchestration.tool_results.len(),
            latency_ms = elapsed_ms(started),
            "Reply delivered"
        );

        Ok(InvocationOutcome::Replied {
            content: reply.to_string(),
            trace_id: scope.trace_id,
        })
    }

    fn record_failure(&self, scope: &TraceScope, started: Instant, usage: TokenUsage, error: &Error) {
        let category = error.category();
        error!(trace_id = %scope.trace_id, %category, error = %error, "Agent reply failed");
        self.traces.record(
            scope
                .event(TraceEventType::Error)
                .with_latency(elapsed_ms(started))
                .with_tokens(usage.prompt, usage.completion)
                .with_error(category)
                .with_details(error.to_string()),
        );
    }

    /// Consume a message source until it closes.
    ///
    /// Checks run on the receive loop in arrival order, so within a channel
    /// the earlier invocation always claims the slot. Only admitted
    /// invocations are spawned, and different channels proceed in parallel.
    /// Invalid events are logged and dropped.
    pub async fn run(self: Arc<Self>, source: &dyn MessageSource) -> parley_core::Result<()> {
        let mut rx = source.start().await?;
        info!(source = source.name(), "Mediator listening");

        let mut tasks = JoinSet::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(message) => match self.admit(&message) {
                    Admit::Decided(outcome) => log_outcome(&Ok(outcome)),
                    Admit::Claimed(admission) => {
                        let mediator = Arc::clone(&self);
                        tasks.spawn(async move { log_outcome(&mediator.complete(*admission).await) });
                    }
                },
                Err(e) => warn!(source = source.name(), error = %e, "Dropping invalid message"),
            }
            while tasks.try_join_next().is_some() {}
        }

        while tasks.join_next().await.is_some() {}
        source.stop().await?;
        info!(source = source.name(), "Mediator stopped");
        Ok(())
    }
}

fn log_outcome(outcome: &parley_core::Result<InvocationOutcome>) {
    match outcome {
        Ok(InvocationOutcome::Skipped(reason)) => debug!(?reason, "Message skipped"),
        Ok(outcome) => debug!(?outcome, "Invocation finished"),
        Err(e) => debug!(error = %e, "Invocation failed"),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::channel::Attachment;
    use parley_core::error::{ChannelError, ProviderError};
    use parley_core::provider::{PromptTurn, ProviderResponse};
    use parley_core::tool::ToolRequest;
    use parley_security::ToolCallStatus;
    use std::collections::{BTreeSet, VecDeque};

    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        turns: Mutex<Vec<PromptTurn>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                turns: Mutex::new(Vec::new()),
            })
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
                .unwrap_or_else(|| Ok(ProviderResponse::text("default reply")))
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ReplySink for CollectingSink {
        async fn send(&self, channel_id: &str, content: &str) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::DeliveryFailed {
                    channel: channel_id.into(),
                    reason: "sink closed".into(),
                });
            }
            self.sent.lock().unwrap().push((channel_id.into(), content.into()));
            Ok(())
        }
    }

    fn message(id: &str, channel: &str, content: &str) -> ChannelMessage {
        ChannelMessage {
            id: id.into(),
            channel_id: channel.into(),
            guild_id: Some("G1".into()),
            author: "alice".into(),
            author_id: Some("U1".into()),
            author_role_ids: vec![],
            content: content.into(),
            timestamp: Utc::now(),
            attachments: vec![],
        }
    }

    fn mediator_with(
        settings: AgentSettings,
        provider: Arc<ScriptedProvider>,
        sink: Arc<CollectingSink>,
    ) -> AgentMediator {
        AgentMediator::new(settings, provider, Arc::new(parley_tools::default_registry()), sink)
    }

    #[tokio::test]
    async fn replies_to_mention_and_records_memory() {
        let provider = ScriptedProvider::new(vec![Ok(ProviderResponse::text("  hi alice  "))]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider.clone(), sink.clone());

        let outcome = mediator.handle(message("m1", "C1", "@agent what's new")).await.unwrap();
        let InvocationOutcome::Replied { content, trace_id } = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(content, "hi alice");
        assert_eq!(sink.sent.lock().unwrap().as_slice(), &[("C1".to_string(), "hi alice".to_string())]);

        let turns = provider.turns();
        assert!(turns[0].prompt.contains("Channel ID: C1"));
        assert!(turns[0].prompt.contains("User invocation: @agent what's new"));

        mediator.with_registry(|r| {
            let state = r.memory().state("C1").unwrap();
            assert_eq!(state.recent_turns.len(), 2);
            assert_eq!(state.recent_turns[1].content, "hi alice");
            assert!(r.was_handled("C1", "m1"));
            assert!(!r.is_in_flight("C1"));
        });

        let events = mediator.traces().by_trace(&trace_id);
        assert!(events.iter().any(|e| e.event_type == TraceEventType::InvocationReceived));
        assert!(events.iter().any(|e| e.event_type == TraceEventType::ModelRequestEnd));
    }

    #[tokio::test]
    async fn non_invocations_are_skipped() {
        let provider = ScriptedProvider::new(vec![]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider.clone(), sink);

        let outcome = mediator.handle(message("m1", "C1", "just chatting")).await.unwrap();
        assert_eq!(outcome, InvocationOutcome::Skipped(SkipReason::NotInvoked));

        let outcome = mediator.handle(message("m2", "C1", "   ")).await.unwrap();
        assert_eq!(outcome, InvocationOutcome::Skipped(SkipReason::EmptyContent));

        assert!(provider.turns().is_empty());
        assert!(mediator.traces().is_empty());
        mediator.with_registry(|r| assert_eq!(r.history_len("C1"), 2));
    }

    #[tokio::test]
    async fn disabled_and_self_authored_are_skipped() {
        let provider = ScriptedProvider::new(vec![]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider, sink);

        mediator.replace_settings(AgentSettings {
            self_user_id: Some("U1".into()),
            ..AgentSettings::default()
        });
        let outcome = mediator.handle(message("m1", "C1", "@agent hi")).await.unwrap();
        assert_eq!(outcome, InvocationOutcome::Skipped(SkipReason::SelfAuthored));

        mediator.replace_settings(AgentSettings {
            enabled: false,
            ..AgentSettings::default()
        });
        let outcome = mediator.handle(message("m2", "C1", "@agent hi")).await.unwrap();
        assert_eq!(outcome, InvocationOutcome::Skipped(SkipReason::Disabled));
    }

    #[tokio::test]
    async fn sensitive_content_is_blocked_and_traced() {
        let provider = ScriptedProvider::new(vec![]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider.clone(), sink);

        let outcome = mediator.handle(message("m1", "C1", "@agent my password is hunter2")).await.unwrap();
        assert_eq!(outcome, InvocationOutcome::Skipped(SkipReason::BlockedContent));
        assert!(provider.turns().is_empty());

        let blocked = mediator.traces().by_type(TraceEventType::PolicyBlocked);
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].details.as_deref(), Some("content"));
    }

    #[tokio::test]
    async fn policy_denial_is_an_outcome() {
        let provider = ScriptedProvider::new(vec![]);
        let sink = Arc::new(CollectingSink::default());
        let mut settings = AgentSettings::default();
        settings.policy.allowed_channel_ids = BTreeSet::from(["C1".to_string()]);
        let mediator = mediator_with(settings, provider.clone(), sink);

        let outcome = mediator.handle(message("m1", "C2", "@agent hi")).await.unwrap();
        let InvocationOutcome::PolicyBlocked { reason, trace_id } = outcome else {
            panic!("expected policy block");
        };
        assert_eq!(reason, PolicyBlockReason::Channel);
        assert!(provider.turns().is_empty());

        let events = mediator.traces().by_trace(&trace_id);
        assert!(events.iter().any(|e| e.details.as_deref() == Some("channel")));
    }

    #[tokio::test]
    async fn rate_limit_drops_extra_invocations() {
        let provider = ScriptedProvider::new(vec![]);
        let sink = Arc::new(CollectingSink::default());
        let settings = AgentSettings {
            rate_limit_per_minute: 1,
            ..AgentSettings::default()
        };
        let mediator = mediator_with(settings, provider.clone(), sink.clone());

        assert!(mediator.handle(message("m1", "C1", "@agent one")).await.unwrap().is_reply());
        let outcome = mediator.handle(message("m2", "C1", "@agent two")).await.unwrap();
        assert!(matches!(outcome, InvocationOutcome::RateLimited { .. }));

        // other channels keep their own window
        assert!(mediator.handle(message("m3", "C2", "@agent three")).await.unwrap().is_reply());
        assert_eq!(provider.turns().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_message_is_answered_once() {
        let provider = ScriptedProvider::new(vec![]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider, sink.clone());

        let first = mediator.handle(message("m1", "C1", "@agent hi")).await.unwrap();
        let trace_id = first.trace_id().unwrap().to_string();
        assert!(first.is_reply());
        let outcome = mediator.handle(message("m1", "C1", "@agent hi")).await.unwrap();
        assert_eq!(outcome, InvocationOutcome::Skipped(SkipReason::Duplicate));
        assert_eq!(sink.sent.lock().unwrap().len(), 1);

        // the redelivery never opens a trace of its own
        assert_eq!(mediator.traces().by_type(TraceEventType::InvocationReceived).len(), 1);
        assert_eq!(mediator.traces().by_trace(&trace_id).len(), mediator.traces().len());
    }

    #[tokio::test]
    async fn provider_failure_is_traced_and_returned() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::NotConfigured("missing API key".into()))]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider, sink.clone());

        let err = mediator.handle(message("m1", "C1", "@agent hi")).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ProviderUnavailable);
        assert!(sink.sent.lock().unwrap().is_empty());

        let errors = mediator.traces().by_type(TraceEventType::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_category, Some(ErrorCategory::ProviderUnavailable));
        assert!(errors[0].token_estimate_prompt > 0);

        mediator.with_registry(|r| {
            assert!(!r.is_in_flight("C1"));
            assert!(!r.was_handled("C1", "m1"));
        });
    }

    #[tokio::test]
    async fn delivery_failure_skips_assistant_turn() {
        let provider = ScriptedProvider::new(vec![Ok(ProviderResponse::text("answer"))]);
        let sink = Arc::new(CollectingSink {
            fail: true,
            ..CollectingSink::default()
        });
        let mediator = mediator_with(AgentSettings::default(), provider, sink);

        let err = mediator.handle(message("m1", "C1", "@agent hi")).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Delivery);

        mediator.with_registry(|r| {
            let state = r.memory().state("C1").unwrap();
            assert_eq!(state.recent_turns.len(), 1);
            assert!(!r.is_in_flight("C1"));
        });
    }

    #[tokio::test]
    async fn exhausted_tool_budget_means_no_reply() {
        let call = ToolRequest {
            id: "r".into(),
            name: "list_participants".into(),
            arguments: serde_json::json!({}),
        };
        let provider = ScriptedProvider::new(vec![
            Ok(ProviderResponse::with_tool_requests(vec![call.clone()])),
            Ok(ProviderResponse::with_tool_requests(vec![call.clone()])),
            Ok(ProviderResponse::with_tool_requests(vec![call])),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let mut settings = AgentSettings::default();
        settings.tool_enabled_channels.insert("C1".into());
        let mediator = mediator_with(settings, provider, sink.clone());

        let outcome = mediator.handle(message("m1", "C1", "@agent who is here?")).await.unwrap();
        assert!(matches!(outcome, InvocationOutcome::NoReply { .. }));
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(mediator.audit().entries_by_status(ToolCallStatus::Ok).len(), 3);
    }

    #[tokio::test]
    async fn tools_are_blocked_outside_enabled_channels() {
        let provider = ScriptedProvider::new(vec![
            Ok(ProviderResponse::with_tool_requests(vec![ToolRequest {
                id: "r1".into(),
                name: "list_participants".into(),
                arguments: serde_json::json!({}),
            }])),
            Ok(ProviderResponse::text("fine")),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider.clone(), sink);

        assert!(mediator.handle(message("m1", "C1", "@agent hi")).await.unwrap().is_reply());
        assert_eq!(mediator.audit().entries_by_status(ToolCallStatus::Blocked).len(), 1);
        assert!(provider.turns()[1].tool_results[0].is_error);
    }

    #[tokio::test]
    async fn tool_context_sees_channel_history() {
        let provider = ScriptedProvider::new(vec![
            Ok(ProviderResponse::with_tool_requests(vec![ToolRequest {
                id: "r1".into(),
                name: "list_participants".into(),
                arguments: serde_json::json!({}),
            }])),
            Ok(ProviderResponse::text("done")),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let mut settings = AgentSettings::default();
        settings.tool_enabled_guilds.insert("G1".into());
        let mediator = mediator_with(settings, provider.clone(), sink);

        let mut bob = message("m0", "C1", "hello all");
        bob.author = "bob".into();
        mediator.handle(bob).await.unwrap();
        mediator.handle(message("m1", "C1", "@agent who's here")).await.unwrap();

        let result = &provider.turns()[1].tool_results[0];
        assert!(!result.is_error);
        assert_eq!(result.content, r#"{"participants":["bob","alice"]}"#);
    }

    #[tokio::test]
    async fn attachments_are_counted_in_prompt() {
        let provider = ScriptedProvider::new(vec![]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider.clone(), sink);

        let mut msg = message("m1", "C1", "!agent look at this");
        msg.attachments = vec![Attachment::default(), Attachment::default()];
        mediator.handle(msg).await.unwrap();

        assert!(provider.turns()[0].prompt.contains("Attachment count: 2"));
    }

    #[tokio::test]
    async fn in_flight_channel_drops_new_invocations() {
        let provider = ScriptedProvider::new(vec![]);
        let sink = Arc::new(CollectingSink::default());
        let mediator = mediator_with(AgentSettings::default(), provider, sink);

        mediator.registry.lock().unwrap().begin("C1");
        let outcome = mediator.handle(message("m1", "C1", "@agent hi")).await.unwrap();
        assert_eq!(outcome, InvocationOutcome::Skipped(SkipReason::InFlight));
    }
}
