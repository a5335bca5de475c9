//! Batch event pipeline: session identity, sub-agent discovery,
//! correlation, echo filtering, and canonical part emission.

use braid_core::events::{
    EnrichedEvent, EventPayload, RuntimeEvent, subagent_message_id,
};
use braid_core::ids::{AgentId, RunId, RuntimeSessionId, SessionId, ToolCallId};
use braid_correlation::{
    CorrelationService, EchoSuppressor, SessionIdentityResolver, SubagentIdentityTracker,
    SubagentInfo,
};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::emitter::PartEmitter;
use crate::parts::StreamPart;

/// Source key used for thinking fragments that belong to the main agent.
const MAIN_THINKING_SOURCE: &str = "main";

/// Mutable pipeline state, guarded by a single lock.
///
/// Batches are processed atomically: every event in a batch observes the
/// state left by the previous event, and no subscriber sees a half-processed
/// batch.
#[derive(Default)]
struct PipelineState {
    resolver: SessionIdentityResolver,
    subagents: SubagentIdentityTracker,
    correlation: CorrelationService,
    echo: EchoSuppressor,
    /// The logical session of the active run, once started.
    active_session: Option<SessionId>,
}

/// End-to-end event pipeline.
///
/// Feeds batches of raw runtime events through session identity
/// resolution, sub-agent runtime discovery, correlation enrichment, and
/// echo filtering, then broadcasts the resulting canonical stream parts
/// to subscribers.
#[derive(Default)]
pub struct EventPipeline {
    state: Mutex<PipelineState>,
    emitter: PartEmitter,
}

impl EventPipeline {
    /// Create a pipeline with empty state and the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipeline with a custom broadcast channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PipelineState::default()),
            emitter: PartEmitter::with_capacity(capacity),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Batch processing
    // ─────────────────────────────────────────────────────────────────────

    /// Process one batch of raw runtime events.
    ///
    /// Returns the enriched events in input order. Canonical stream parts
    /// derived from the batch are broadcast to subscribers; an empty part
    /// batch is not emitted.
    pub fn process_batch(&self, events: &[RuntimeEvent]) -> Vec<EnrichedEvent> {
        let mut state = self.state.lock();
        let mut enriched_batch = Vec::with_capacity(events.len());
        let mut parts = Vec::new();

        for raw in events {
            let event = resolve_session(&mut state, raw);
            discover_subagent(&mut state, raw, &event);

            let enriched = state.correlation.enrich(&event);
            if let Some(part) = part_for(&mut state, &enriched) {
                parts.push(part);
            }
            enriched_batch.push(enriched);
        }
        drop(state);

        counter!("events_processed_total").increment(events.len() as u64);
        if !parts.is_empty() {
            counter!("parts_emitted_total").increment(parts.len() as u64);
            let receivers = self.emitter.emit(parts);
            trace!(receivers, "emitted part batch");
        }
        enriched_batch
    }

    /// Subscribe to canonical part batches. Drop the receiver to
    /// unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<StreamPart>> {
        self.emitter.subscribe()
    }

    /// Number of active part subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.emitter.subscriber_count()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Run lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Begin a new run on a logical session.
    ///
    /// Clears correlation state, registers the session (idempotently) with
    /// the identity resolver, marks it as having started work so it is
    /// eligible for runtime binding, and claims it for the run.
    pub fn start_run(&self, run_id: RunId, session_id: SessionId) {
        let mut state = self.state.lock();
        state.correlation.start_run(run_id, session_id.clone());
        state.resolver.create(session_id.clone());
        state.resolver.mark_started(&session_id);
        state.active_session = Some(session_id);
    }

    /// Clear run-scoped state: correlation, echo targets, and sub-agent
    /// bindings. Session identity registrations survive; logical sessions
    /// outlive individual runs.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.correlation.reset();
        state.echo.reset();
        state.subagents.reset();
        state.active_session = None;
        debug!("pipeline state reset");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session registry
    // ─────────────────────────────────────────────────────────────────────

    /// Register a logical session ahead of its first runtime event.
    pub fn create_session(&self, session_id: SessionId) {
        self.state.lock().resolver.create(session_id);
    }

    /// Mark a logical session as having started work.
    pub fn mark_session_started(&self, session_id: &SessionId) {
        self.state.lock().resolver.mark_started(session_id);
    }

    /// Close a logical session; it keeps resolving but stops binding.
    pub fn close_session(&self, session_id: &SessionId) {
        self.state.lock().resolver.close(session_id);
    }

    /// Remove a logical session and its runtime binding entirely.
    pub fn destroy_session(&self, session_id: &SessionId) {
        self.state.lock().resolver.destroy(session_id);
    }

    /// The runtime session bound to a logical session, if any.
    #[must_use]
    pub fn session_binding(&self, session_id: &SessionId) -> Option<RuntimeSessionId> {
        self.state.lock().resolver.binding(session_id).cloned()
    }

    /// Claim an additional session for the active run.
    pub fn add_owned_session(&self, session_id: SessionId) {
        self.state.lock().correlation.add_owned_session(session_id);
    }

    /// Whether an event belongs to the active run or an owned session.
    #[must_use]
    pub fn is_owned_event(&self, event: &RuntimeEvent) -> bool {
        self.state.lock().correlation.is_owned_event(event)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sub-agent lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Record a sub-agent spawn: the agent awaits runtime discovery and is
    /// registered with the correlation layer.
    pub fn on_subagent_spawn(
        &self,
        tool_use_id: ToolCallId,
        agent_id: AgentId,
        info: SubagentInfo,
    ) {
        let mut state = self.state.lock();
        state.subagents.on_spawn_start(tool_use_id, agent_id.clone());
        state.correlation.register_subagent(agent_id, info);
    }

    /// Tear down a sub-agent spawn and its registration. Idempotent.
    pub fn on_subagent_stop(&self, tool_use_id: &ToolCallId) {
        let mut state = self.state.lock();
        if let Some(agent_id) = state.subagents.agent_for_spawn(tool_use_id).cloned() {
            state.correlation.unregister_subagent(&agent_id);
        }
        state.subagents.on_spawn_stop(tool_use_id);
    }

    /// Record an explicit tool → agent ownership.
    pub fn register_tool(&self, tool_id: ToolCallId, agent_id: AgentId, is_subagent: bool) {
        self.state
            .lock()
            .correlation
            .register_tool(tool_id, agent_id, is_subagent);
    }

    /// Register a sub-agent directly, without a spawn record.
    pub fn register_subagent(&self, agent_id: AgentId, info: SubagentInfo) {
        self.state.lock().correlation.register_subagent(agent_id, info);
    }

    /// Remove a sub-agent registration.
    pub fn unregister_subagent(&self, agent_id: &AgentId) {
        self.state.lock().correlation.unregister_subagent(agent_id);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Echo suppression
    // ─────────────────────────────────────────────────────────────────────

    /// Queue text expected to be echoed back by the runtime.
    pub fn expect_echo(&self, text: &str) {
        self.state.lock().echo.expect_echo(text);
    }

    /// Whether any echo targets are still pending.
    #[must_use]
    pub fn has_pending_echo(&self) -> bool {
        self.state.lock().echo.has_pending_targets()
    }
}

/// Resolve an event's raw session id to a logical one, rewriting the
/// envelope when they differ.
fn resolve_session(state: &mut PipelineState, raw: &RuntimeEvent) -> RuntimeEvent {
    let runtime_id = RuntimeSessionId::from(raw.session_id.as_str());
    let logical = state.resolver.resolve(&runtime_id);
    if !state.resolver.is_registered(&logical) {
        counter!("sessions_unresolved_total").increment(1);
    }
    let mut event = raw.clone();
    if logical != event.session_id {
        trace!(
            runtime_session_id = %runtime_id,
            session_id = %logical,
            "rewrote event session identity"
        );
        event.session_id = logical;
    }
    event
}

/// Run the FIFO sub-agent runtime discovery heuristic on tool-start
/// events, registering discovered ownership before enrichment.
fn discover_subagent(state: &mut PipelineState, raw: &RuntimeEvent, event: &RuntimeEvent) {
    let Ok(EventPayload::ToolStart(payload)) = event.typed_payload() else {
        return;
    };
    let Some(parent_runtime) = state
        .active_session
        .as_ref()
        .and_then(|session| state.resolver.binding(session))
        .cloned()
    else {
        return;
    };
    let runtime_id = RuntimeSessionId::from(raw.session_id.as_str());
    if let Some(agent_id) = state.subagents.on_tool_event(&runtime_id, &parent_runtime) {
        state
            .correlation
            .register_tool(payload.tool_id, agent_id, true);
    }
}

/// Map an enriched event to its canonical stream part, if it has one.
///
/// Text deltas pass through the echo filter and are dropped when fully
/// consumed. Unknown event types produce no part.
fn part_for(state: &mut PipelineState, enriched: &EnrichedEvent) -> Option<StreamPart> {
    let payload = enriched.event.typed_payload().ok()?;
    let agent_id = enriched.resolved_agent_id.clone();

    match payload {
        EventPayload::AgentStart(p) => Some(StreamPart::AgentStart {
            agent_id: agent_id.unwrap_or(p.agent_id),
            parent_agent_id: enriched.parent_agent_id.clone(),
        }),
        EventPayload::AgentUpdate(p) => Some(StreamPart::AgentUpdate {
            agent_id: agent_id.unwrap_or(p.agent_id),
            status: p.status,
        }),
        EventPayload::AgentComplete(p) => Some(StreamPart::AgentComplete {
            agent_id: agent_id.unwrap_or(p.agent_id),
            parent_agent_id: enriched.parent_agent_id.clone(),
        }),
        EventPayload::ToolStart(p) => Some(StreamPart::ToolStart {
            tool_id: enriched.resolved_tool_id.clone().unwrap_or(p.tool_id),
            tool_name: p.tool_name,
            input: p.input,
            agent_id,
            is_subagent_tool: enriched.is_subagent_tool,
        }),
        EventPayload::ToolComplete(p) => Some(StreamPart::ToolComplete {
            tool_id: enriched.resolved_tool_id.clone().unwrap_or(p.tool_id),
            output: p.output,
            success: p.success,
            error: p.error,
            agent_id,
        }),
        EventPayload::TextDelta(p) => {
            let visible = state.echo.filter_delta(&p.delta);
            if visible.is_empty() {
                return None;
            }
            Some(StreamPart::TextDelta {
                delta: visible,
                agent_id,
            })
        }
        EventPayload::ThinkingDelta(p) => {
            let source_key = agent_id
                .as_ref()
                .map_or_else(|| MAIN_THINKING_SOURCE.to_owned(), |id| id.to_string());
            let target_message_id = p.message_id.unwrap_or_else(|| {
                agent_id.as_ref().map_or_else(
                    || MAIN_THINKING_SOURCE.to_owned(),
                    subagent_message_id,
                )
            });
            Some(StreamPart::ThinkingMeta {
                thinking_source_key: source_key,
                target_message_id,
                thinking_text: p.delta,
            })
        }
        EventPayload::Usage(p) => Some(StreamPart::Usage {
            agent_id,
            input_tokens: p.input_tokens,
            output_tokens: p.output_tokens,
        }),
        EventPayload::TextComplete(p) => Some(StreamPart::TextComplete {
            message_id: p.message_id,
            text: p.text,
            agent_id,
            suppress_from_main_chat: enriched.suppress_from_main_chat,
        }),
        EventPayload::Unknown => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use braid_core::events::{
        EventType, agent_start_event, text_complete_event, text_delta_event, tool_start_event,
    };
    use serde_json::json;

    fn started_pipeline() -> EventPipeline {
        let pipeline = EventPipeline::new();
        pipeline.start_run(RunId(1), "logical-1".into());
        pipeline
    }

    #[test]
    fn first_event_binds_runtime_session() {
        let pipeline = started_pipeline();
        let batch = vec![agent_start_event("rt-abc", RunId(1), "main-agent")];

        let enriched = pipeline.process_batch(&batch);

        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].event.session_id.as_str(), "logical-1");
        assert_eq!(
            pipeline.session_binding(&"logical-1".into()),
            Some("rt-abc".into())
        );
    }

    #[test]
    fn unknown_runtime_session_passes_through() {
        let pipeline = EventPipeline::new();
        let batch = vec![agent_start_event("rt-orphan", RunId(9), "someone")];

        let enriched = pipeline.process_batch(&batch);

        assert_eq!(enriched[0].event.session_id.as_str(), "rt-orphan");
    }

    #[test]
    fn subagent_tool_discovered_and_attributed() {
        let pipeline = started_pipeline();
        // Bind the main session first.
        let _ = pipeline.process_batch(&[agent_start_event("rt-main", RunId(1), "main-agent")]);

        pipeline.on_subagent_spawn(
            "spawn-1".into(),
            "worker-1".into(),
            SubagentInfo {
                parent_agent_id: "main-agent".into(),
                run_id: RunId(1),
                node_id: None,
            },
        );

        // Tool from a foreign runtime session claims the unmapped spawn.
        let batch = vec![tool_start_event("rt-sub", RunId(1), "tc-1", "bash")];
        let enriched = pipeline.process_batch(&batch);

        assert_eq!(enriched[0].resolved_agent_id, Some("worker-1".into()));
        assert!(enriched[0].is_subagent_tool);
        assert_eq!(enriched[0].parent_agent_id, Some("main-agent".into()));
    }

    #[test]
    fn main_session_tool_is_not_claimed_as_subagent() {
        let pipeline = started_pipeline();
        let _ = pipeline.process_batch(&[agent_start_event("rt-main", RunId(1), "main-agent")]);
        pipeline.on_subagent_spawn(
            "spawn-1".into(),
            "worker-1".into(),
            SubagentInfo {
                parent_agent_id: "main-agent".into(),
                run_id: RunId(1),
                node_id: None,
            },
        );

        let batch = vec![tool_start_event("rt-main", RunId(1), "tc-2", "read")];
        let enriched = pipeline.process_batch(&batch);

        assert!(!enriched[0].is_subagent_tool);
        assert_eq!(enriched[0].resolved_agent_id, Some("main-agent".into()));
    }

    #[test]
    fn echoed_deltas_are_withheld_from_parts() {
        let pipeline = started_pipeline();
        pipeline.expect_echo("Tool failed");

        let batch = vec![
            text_delta_event("rt-a", RunId(1), "Tool "),
            text_delta_event("rt-a", RunId(1), "failed"),
            text_delta_event("rt-a", RunId(1), " but recovered"),
        ];
        let mut rx = pipeline.subscribe();
        let _ = pipeline.process_batch(&batch);

        let parts = rx.try_recv().unwrap();
        assert_eq!(parts.len(), 1);
        assert_matches!(
            &parts[0],
            StreamPart::TextDelta { delta, .. } if delta == " but recovered"
        );
        assert!(!pipeline.has_pending_echo());
    }

    #[test]
    fn subagent_text_complete_is_suppressed() {
        let pipeline = started_pipeline();
        pipeline.on_subagent_spawn(
            "spawn-1".into(),
            "worker-1".into(),
            SubagentInfo {
                parent_agent_id: "main-agent".into(),
                run_id: RunId(1),
                node_id: None,
            },
        );

        let message_id = subagent_message_id(&"worker-1".into());
        let batch = vec![text_complete_event("rt-a", RunId(1), &message_id, "done")];
        let enriched = pipeline.process_batch(&batch);

        assert!(enriched[0].suppress_from_main_chat);
        assert_eq!(enriched[0].resolved_agent_id, Some("worker-1".into()));
    }

    #[test]
    fn unknown_events_produce_no_parts() {
        let pipeline = started_pipeline();
        let mut rx = pipeline.subscribe();

        let event = RuntimeEvent::new(EventType::Unknown, "rt-a", RunId(1), json!({}));
        let enriched = pipeline.process_batch(&[event]);

        assert_eq!(enriched.len(), 1);
        // Empty part batches are not emitted at all.
        assert_matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        );
    }

    #[test]
    fn reset_preserves_session_registry() {
        let pipeline = started_pipeline();
        let _ = pipeline.process_batch(&[agent_start_event("rt-main", RunId(1), "main-agent")]);

        pipeline.reset();

        // The logical session still resolves after a reset.
        let enriched =
            pipeline.process_batch(&[agent_start_event("rt-main", RunId(2), "main-agent")]);
        assert_eq!(enriched[0].event.session_id.as_str(), "logical-1");
    }

    #[test]
    fn spawn_stop_unregisters_subagent() {
        let pipeline = started_pipeline();
        let _ = pipeline.process_batch(&[agent_start_event("rt-main", RunId(1), "main-agent")]);
        pipeline.on_subagent_spawn(
            "spawn-1".into(),
            "worker-1".into(),
            SubagentInfo {
                parent_agent_id: "main-agent".into(),
                run_id: RunId(1),
                node_id: None,
            },
        );
        pipeline.on_subagent_stop(&"spawn-1".into());

        // With the spawn gone, a foreign tool has nothing to claim.
        let batch = vec![tool_start_event("rt-sub", RunId(1), "tc-1", "bash")];
        let enriched = pipeline.process_batch(&batch);
        assert!(!enriched[0].is_subagent_tool);
    }

    #[test]
    fn owned_event_checks_run_and_session() {
        let pipeline = started_pipeline();
        let owned = agent_start_event("rt-x", RunId(1), "a");
        let foreign = agent_start_event("rt-x", RunId(7), "a");

        assert!(pipeline.is_owned_event(&owned));
        assert!(!pipeline.is_owned_event(&foreign));
    }

    #[tokio::test]
    async fn subscribers_receive_part_batches() {
        let pipeline = started_pipeline();
        let mut rx = pipeline.subscribe();
        assert_eq!(pipeline.subscriber_count(), 1);

        let _ = pipeline.process_batch(&[agent_start_event("rt-main", RunId(1), "main-agent")]);

        let parts = rx.recv().await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_matches!(
            &parts[0],
            StreamPart::AgentStart { agent_id, .. } if agent_id.as_str() == "main-agent"
        );
    }

    #[test]
    fn thinking_delta_maps_to_thinking_meta() {
        let pipeline = started_pipeline();
        let mut rx = pipeline.subscribe();

        let event = RuntimeEvent::new(
            EventType::ThinkingDelta,
            "rt-a",
            RunId(1),
            json!({ "delta": "pondering" }),
        );
        let _ = pipeline.process_batch(&[event]);

        let parts = rx.try_recv().unwrap();
        assert_matches!(
            &parts[0],
            StreamPart::ThinkingMeta { thinking_source_key, thinking_text, .. }
                if thinking_source_key == "main" && thinking_text == "pondering"
        );
    }
}
