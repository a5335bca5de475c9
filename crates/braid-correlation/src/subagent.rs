//! Sub-agent runtime identity discovery.
//!
//! The runtime exposes no stable foreign key linking a sub-agent's own events
//! back to the spawn record created by its parent. The only available signal
//! is order: sub-agents are assumed to emit their first tool call in roughly
//! spawn order, so the tracker pops the oldest unmapped spawn when a tool
//! event arrives from a runtime session that is not the parent's. This is a
//! documented heuristic, not a guarantee.

use std::collections::{HashMap, VecDeque};

use braid_core::ids::{AgentId, RuntimeSessionId, ToolCallId};
use tracing::{debug, trace};

/// Binds sub-agent spawn records to runtime ids discovered via tool events.
#[derive(Debug, Default)]
pub struct SubagentIdentityTracker {
    /// Spawn records: the spawning tool-use id → spawned agent.
    spawned: HashMap<ToolCallId, AgentId>,
    /// Spawned agents not yet bound to a runtime session, in spawn order.
    unmapped: VecDeque<AgentId>,
    /// Discovered bindings, both directions.
    by_runtime: HashMap<RuntimeSessionId, AgentId>,
    by_agent: HashMap<AgentId, RuntimeSessionId>,
}

impl SubagentIdentityTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sub-agent spawn. The agent joins the unmapped FIFO until its
    /// runtime identity is discovered.
    pub fn on_spawn_start(&mut self, tool_use_id: ToolCallId, agent_id: AgentId) {
        trace!(tool_use_id = %tool_use_id, agent_id = %agent_id, "subagent spawn recorded");
        let _ = self.spawned.insert(tool_use_id, agent_id.clone());
        self.unmapped.push_back(agent_id);
    }

    /// Observe a tool event and bind or look up its sub-agent.
    ///
    /// Events from the parent's own runtime session return `None`. A foreign
    /// runtime session id either already maps to a discovered sub-agent, or
    /// claims the oldest unmapped spawn record (FIFO heuristic).
    pub fn on_tool_event(
        &mut self,
        runtime_session_id: &RuntimeSessionId,
        parent_runtime_id: &RuntimeSessionId,
    ) -> Option<AgentId> {
        if runtime_session_id == parent_runtime_id {
            return None;
        }
        if let Some(agent_id) = self.by_runtime.get(runtime_session_id) {
            return Some(agent_id.clone());
        }
        let Some(agent_id) = self.unmapped.pop_front() else {
            debug!(
                runtime_session_id = %runtime_session_id,
                "foreign tool event with no unmapped subagent"
            );
            return None;
        };
        trace!(
            runtime_session_id = %runtime_session_id,
            agent_id = %agent_id,
            "subagent runtime identity discovered"
        );
        let _ = self
            .by_runtime
            .insert(runtime_session_id.clone(), agent_id.clone());
        let _ = self
            .by_agent
            .insert(agent_id.clone(), runtime_session_id.clone());
        Some(agent_id)
    }

    /// Remove a spawn record and any runtime binding for its agent.
    /// Idempotent regardless of bound state.
    pub fn on_spawn_stop(&mut self, tool_use_id: &ToolCallId) {
        let Some(agent_id) = self.spawned.remove(tool_use_id) else {
            return;
        };
        self.unmapped.retain(|id| id != &agent_id);
        if let Some(runtime_id) = self.by_agent.remove(&agent_id) {
            let _ = self.by_runtime.remove(&runtime_id);
        }
    }

    /// The sub-agent bound to a runtime session, if discovered.
    #[must_use]
    pub fn agent_for_runtime(&self, runtime_session_id: &RuntimeSessionId) -> Option<&AgentId> {
        self.by_runtime.get(runtime_session_id)
    }

    /// The agent recorded for a spawn, if the spawn is still live.
    #[must_use]
    pub fn agent_for_spawn(&self, tool_use_id: &ToolCallId) -> Option<&AgentId> {
        self.spawned.get(tool_use_id)
    }

    /// Number of spawned agents awaiting runtime discovery.
    #[must_use]
    pub fn unmapped_count(&self) -> usize {
        self.unmapped.len()
    }

    /// Drop all spawn records and bindings (session abort/cleanup).
    pub fn reset(&mut self) {
        self.spawned.clear();
        self.unmapped.clear();
        self.by_runtime.clear();
        self.by_agent.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
