//! Stateful per-run event enrichment.
//!
//! One [`CorrelationService`] instance deliberately multiplexes every logical
//! session of a run so cross-session correlation (main vs. sub-agent
//! ownership) is possible at all. All long-lived mutable state lives in an
//! explicit `CorrelationState` value; the only state transitions are the
//! documented operations and the single wholesale replacement in
//! [`CorrelationService::reset`], so no caller ever observes a partially
//! cleared service.

use std::collections::{HashMap, HashSet};

use braid_core::events::{
    EnrichedEvent, EventPayload, RuntimeEvent, ToolCompletePayload, ToolStartPayload,
    subagent_message_agent,
};
use braid_core::ids::{AgentId, RunId, SessionId, ToolCallId};
use tracing::debug;

/// Registry entry for a spawned sub-agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubagentInfo {
    /// The agent that spawned this sub-agent.
    pub parent_agent_id: AgentId,
    /// Run the sub-agent belongs to.
    pub run_id: RunId,
    /// Optional workflow node the sub-agent executes.
    pub node_id: Option<String>,
}

/// All mutable correlation state, cleared atomically by reset.
#[derive(Debug, Default)]
struct CorrelationState {
    /// Tool invocation → owning agent.
    tool_owners: HashMap<ToolCallId, AgentId>,
    /// Tool invocations known to belong to sub-agents.
    subagent_tools: HashSet<ToolCallId>,
    /// First agent to start since the last reset. Never overwritten.
    main_agent_id: Option<AgentId>,
    /// Run currently being correlated.
    active_run_id: Option<RunId>,
    /// Sessions whose events this service owns.
    owned_sessions: HashSet<SessionId>,
    /// Registered sub-agents.
    subagents: HashMap<AgentId, SubagentInfo>,
    /// Tool invocation → run it started in.
    tool_runs: HashMap<ToolCallId, RunId>,
}

/// Enriches raw events with resolved ownership and UI-routing flags.
///
/// Best-effort by contract: unresolved lookups degrade to defaults, malformed
/// payloads enrich to pass-through, and no operation ever fails. Events must
/// arrive in production order within one logical session: main-agent
/// selection and tool ownership are order-sensitive.
#[derive(Debug, Default)]
pub struct CorrelationService {
    state: CorrelationState,
}

impl CorrelationService {
    /// Create a service with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enrich one event. Pure given current state; the input is never
    /// mutated. The only state transition is recording the first
    /// `agent_start` as the main agent and tool-start bookkeeping.
    pub fn enrich(&mut self, event: &RuntimeEvent) -> EnrichedEvent {
        let mut enriched = EnrichedEvent::passthrough(event.clone());
        let payload = match event.typed_payload() {
            Ok(payload) => payload,
            Err(error) => {
                debug!(event_type = %event.event_type, %error, "undecodable payload, passing through");
                return enriched;
            }
        };
        match payload {
            EventPayload::AgentStart(p) => {
                if self.state.main_agent_id.is_none() {
                    self.state.main_agent_id = Some(p.agent_id.clone());
                }
                self.enrich_agent_lifecycle(&mut enriched, &p.agent_id);
            }
            EventPayload::AgentUpdate(p) | EventPayload::AgentComplete(p) => {
                self.enrich_agent_lifecycle(&mut enriched, &p.agent_id);
            }
            EventPayload::ToolStart(p) => self.enrich_tool_start(&mut enriched, p, event.run_id),
            EventPayload::ToolComplete(p) => self.enrich_tool_complete(&mut enriched, &p),
            EventPayload::TextDelta(p) => self.enrich_stream(&mut enriched, p.agent_id.as_ref()),
            EventPayload::ThinkingDelta(p) => {
                self.enrich_stream(&mut enriched, p.agent_id.as_ref());
            }
            EventPayload::Usage(p) => self.enrich_stream(&mut enriched, p.agent_id.as_ref()),
            EventPayload::TextComplete(p) => {
                let subagent = subagent_message_agent(&p.message_id)
                    .and_then(|agent| {
                        let parent = self.state.subagents.get(&agent)?.parent_agent_id.clone();
                        Some((agent, parent))
                    });
                match subagent {
                    Some((agent, parent)) => {
                        enriched.resolved_agent_id = Some(agent);
                        enriched.parent_agent_id = Some(parent);
                        enriched.suppress_from_main_chat = true;
                    }
                    None => enriched.resolved_agent_id = self.state.main_agent_id.clone(),
                }
            }
            EventPayload::Unknown => {}
        }
        enriched
    }

    /// Record a tool → agent ownership. Idempotent upsert.
    pub fn register_tool(&mut self, tool_id: ToolCallId, agent_id: AgentId, is_subagent: bool) {
        let _ = self.state.tool_owners.insert(tool_id.clone(), agent_id);
        if is_subagent {
            let _ = self.state.subagent_tools.insert(tool_id);
        }
    }

    /// Register a sub-agent. Idempotent upsert.
    pub fn register_subagent(&mut self, agent_id: AgentId, info: SubagentInfo) {
        let _ = self.state.subagents.insert(agent_id, info);
    }

    /// Remove a sub-agent registration. No-op for unknown ids.
    pub fn unregister_subagent(&mut self, agent_id: &AgentId) {
        let _ = self.state.subagents.remove(agent_id);
    }

    /// Begin correlating a new run: clears all state, then records the run
    /// id and claims the session.
    pub fn start_run(&mut self, run_id: RunId, session_id: SessionId) {
        self.reset();
        self.state.active_run_id = Some(run_id);
        let _ = self.state.owned_sessions.insert(session_id);
    }

    /// Claim an additional session without resetting.
    pub fn add_owned_session(&mut self, session_id: SessionId) {
        let _ = self.state.owned_sessions.insert(session_id);
    }

    /// Whether an event belongs to the active run or an owned session.
    #[must_use]
    pub fn is_owned_event(&self, event: &RuntimeEvent) -> bool {
        self.state.active_run_id == Some(event.run_id)
            || self.state.owned_sessions.contains(&event.session_id)
    }

    /// The main agent of the current run, once seen.
    #[must_use]
    pub fn main_agent_id(&self) -> Option<&AgentId> {
        self.state.main_agent_id.as_ref()
    }

    /// Whether an agent is registered as a sub-agent.
    #[must_use]
    pub fn is_registered_subagent(&self, agent_id: &AgentId) -> bool {
        self.state.subagents.contains_key(agent_id)
    }

    /// The run a tool invocation started in, if seen.
    #[must_use]
    pub fn run_for_tool(&self, tool_id: &ToolCallId) -> Option<RunId> {
        self.state.tool_runs.get(tool_id).copied()
    }

    /// Clear all seven state collections atomically.
    pub fn reset(&mut self) {
        self.state = CorrelationState::default();
    }

    fn enrich_agent_lifecycle(&self, enriched: &mut EnrichedEvent, agent_id: &AgentId) {
        enriched.resolved_agent_id = Some(agent_id.clone());
        if let Some(info) = self.state.subagents.get(agent_id) {
            enriched.parent_agent_id = Some(info.parent_agent_id.clone());
        }
        // Agent lifecycle events always render (in the sub-agent pane when
        // parented); suppression applies only to echoed main-chat text.
        enriched.suppress_from_main_chat = false;
    }

    fn enrich_tool_start(
        &mut self,
        enriched: &mut EnrichedEvent,
        payload: ToolStartPayload,
        run_id: RunId,
    ) {
        enriched.resolved_tool_id = Some(payload.tool_id.clone());
        let _ = self.state.tool_runs.insert(payload.tool_id.clone(), run_id);

        // An explicit parent in the payload wins; otherwise fall back to a
        // prior registration (e.g. from runtime discovery).
        let owner = payload
            .parent_agent_id
            .as_ref()
            .or_else(|| self.state.tool_owners.get(&payload.tool_id));
        let subagent_owner = owner.and_then(|agent| {
            let parent = self.state.subagents.get(agent)?.parent_agent_id.clone();
            Some((agent.clone(), parent))
        });
        match subagent_owner {
            Some((owner, parent)) => {
                enriched.resolved_agent_id = Some(owner.clone());
                enriched.parent_agent_id = Some(parent);
                enriched.is_subagent_tool = true;
                // Register for the later tool_complete lookup.
                let _ = self.state.tool_owners.insert(payload.tool_id.clone(), owner);
                let _ = self.state.subagent_tools.insert(payload.tool_id);
            }
            None => enriched.resolved_agent_id = self.state.main_agent_id.clone(),
        }
    }

    fn enrich_tool_complete(&self, enriched: &mut EnrichedEvent, payload: &ToolCompletePayload) {
        enriched.resolved_tool_id = Some(payload.tool_id.clone());
        enriched.is_subagent_tool = self.state.subagent_tools.contains(&payload.tool_id);
        if let Some(owner) = self.state.tool_owners.get(&payload.tool_id) {
            if let Some(info) = self.state.subagents.get(owner) {
                enriched.is_subagent_tool = true;
                enriched.parent_agent_id = Some(info.parent_agent_id.clone());
            }
            enriched.resolved_agent_id = Some(owner.clone());
        }
    }

    fn enrich_stream(&self, enriched: &mut EnrichedEvent, agent_id: Option<&AgentId>) {
        let subagent = agent_id.and_then(|agent| {
            let parent = self.state.subagents.get(agent)?.parent_agent_id.clone();
            Some((agent.clone(), parent))
        });
        match subagent {
            Some((agent, parent)) => {
                enriched.resolved_agent_id = Some(agent);
                enriched.parent_agent_id = Some(parent);
            }
            None => enriched.resolved_agent_id = self.state.main_agent_id.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
