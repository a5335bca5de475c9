//! Raw runtime events and their enriched form.
//!
//! The external agent runtime emits a flat envelope: base fields (`type`,
//! `sessionId`, `runId`, `timestamp`) at the top level and an opaque `data`
//! payload. [`RuntimeEvent`] stores the payload as raw [`serde_json::Value`]
//! for exact wire compatibility; typed access is opt-in via
//! [`RuntimeEvent::typed_payload()`], which dispatches on [`EventType`] and
//! deserializes into the appropriate payload struct.
//!
//! [`EnrichedEvent`] is the output of correlation: the original envelope,
//! untouched, plus resolved tool/agent ownership and UI-routing flags.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::EventDecodeError;
use crate::ids::{AgentId, RunId, SessionId, ToolCallId};

/// Reserved message-id prefix marking a sub-agent's text completion.
///
/// A message id of the form `"subagent-" + agentId` is the sole mechanism
/// distinguishing a sub-agent's text-complete from the main turn's. Adapters
/// generating sub-agent message ids must honor it.
pub const SUBAGENT_MESSAGE_PREFIX: &str = "subagent-";

/// Build the reserved message id for a sub-agent's text completion.
#[must_use]
pub fn subagent_message_id(agent_id: &AgentId) -> String {
    format!("{SUBAGENT_MESSAGE_PREFIX}{agent_id}")
}

/// Extract the agent id from a reserved sub-agent message id, if present.
#[must_use]
pub fn subagent_message_agent(message_id: &str) -> Option<AgentId> {
    message_id
        .strip_prefix(SUBAGENT_MESSAGE_PREFIX)
        .filter(|rest| !rest.is_empty())
        .map(AgentId::from)
}

// ─────────────────────────────────────────────────────────────────────────────
// EventType — wire discriminator
// ─────────────────────────────────────────────────────────────────────────────

/// Event type discriminator.
///
/// Unrecognized wire values deserialize to [`EventType::Unknown`]. Such
/// events still flow through enrichment bookkeeping but are dropped from the
/// canonical UI output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Agent started (main or sub-agent).
    AgentStart,
    /// Agent progress/status update.
    AgentUpdate,
    /// Agent finished.
    AgentComplete,
    /// Tool invocation started.
    ToolStart,
    /// Tool invocation finished.
    ToolComplete,
    /// Incremental assistant text.
    TextDelta,
    /// Incremental thinking text.
    ThinkingDelta,
    /// Token usage report.
    Usage,
    /// Assistant text block completed.
    TextComplete,
    /// Any unrecognized event type.
    #[serde(other)]
    Unknown,
}

/// All known event types (for exhaustiveness checks in tests).
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::AgentStart,
    EventType::AgentUpdate,
    EventType::AgentComplete,
    EventType::ToolStart,
    EventType::ToolComplete,
    EventType::TextDelta,
    EventType::ThinkingDelta,
    EventType::Usage,
    EventType::TextComplete,
];

impl EventType {
    /// Wire string for this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentStart => "agent_start",
            Self::AgentUpdate => "agent_update",
            Self::AgentComplete => "agent_complete",
            Self::ToolStart => "tool_start",
            Self::ToolComplete => "tool_complete",
            Self::TextDelta => "text_delta",
            Self::ThinkingDelta => "thinking_delta",
            Self::Usage => "usage",
            Self::TextComplete => "text_complete",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RuntimeEvent — the raw envelope
// ─────────────────────────────────────────────────────────────────────────────

/// A raw event from the external agent runtime.
///
/// `session_id` holds whatever the runtime put there, possibly an opaque
/// runtime session id the resolver has not yet bound. The payload is kept as
/// opaque JSON; use [`typed_payload()`](Self::typed_payload) for
/// compile-time-safe access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEvent {
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Session this event belongs to (logical or still-opaque runtime id).
    pub session_id: SessionId,
    /// Run this event belongs to.
    pub run_id: RunId,
    /// ISO 8601 timestamp.
    pub timestamp: String,
    /// Event-specific data (opaque JSON).
    #[serde(rename = "data", default)]
    pub payload: Value,
}

impl RuntimeEvent {
    /// Create an event with the current UTC timestamp.
    #[must_use]
    pub fn new(
        event_type: EventType,
        session_id: impl Into<SessionId>,
        run_id: RunId,
        payload: Value,
    ) -> Self {
        Self {
            event_type,
            session_id: session_id.into(),
            run_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload,
        }
    }

    /// Decode the opaque payload into its typed form.
    ///
    /// Dispatches on [`EventType`]; [`EventType::Unknown`] decodes to
    /// [`EventPayload::Unknown`] without touching the payload.
    pub fn typed_payload(&self) -> Result<EventPayload, EventDecodeError> {
        let decode = |source| EventDecodeError {
            event_type: self.event_type,
            source,
        };
        let payload = self.payload.clone();
        let typed = match self.event_type {
            EventType::AgentStart => {
                EventPayload::AgentStart(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::AgentUpdate => {
                EventPayload::AgentUpdate(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::AgentComplete => {
                EventPayload::AgentComplete(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::ToolStart => {
                EventPayload::ToolStart(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::ToolComplete => {
                EventPayload::ToolComplete(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::TextDelta => {
                EventPayload::TextDelta(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::ThinkingDelta => {
                EventPayload::ThinkingDelta(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::Usage => {
                EventPayload::Usage(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::TextComplete => {
                EventPayload::TextComplete(serde_json::from_value(payload).map_err(decode)?)
            }
            EventType::Unknown => EventPayload::Unknown,
        };
        Ok(typed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Payload for `agent_start` / `agent_update` / `agent_complete` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLifecyclePayload {
    /// Agent this lifecycle event is about.
    pub agent_id: AgentId,
    /// Optional status string (for `agent_update`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Payload for `tool_start` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStartPayload {
    /// Tool invocation id.
    pub tool_id: ToolCallId,
    /// Tool name.
    pub tool_name: String,
    /// Tool input arguments.
    #[serde(default)]
    pub input: Value,
    /// Explicit owning agent, when the runtime attributes the call itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<AgentId>,
}

/// Payload for `tool_complete` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCompletePayload {
    /// Tool invocation id.
    pub tool_id: ToolCallId,
    /// Tool output.
    #[serde(default)]
    pub output: Value,
    /// Whether the tool succeeded.
    #[serde(default)]
    pub success: bool,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload for `text_delta` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDeltaPayload {
    /// Text fragment.
    pub delta: String,
    /// Emitting agent, when the runtime attributes the delta itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

/// Payload for `thinking_delta` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingDeltaPayload {
    /// Thinking text fragment.
    pub delta: String,
    /// Emitting agent, when the runtime attributes the delta itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Message the thinking belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Payload for `usage` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePayload {
    /// Agent the usage belongs to, when attributed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Input tokens consumed.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens produced.
    #[serde(default)]
    pub output_tokens: u64,
}

/// Payload for `text_complete` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextCompletePayload {
    /// Message id; may carry the reserved [`SUBAGENT_MESSAGE_PREFIX`].
    pub message_id: String,
    /// Full accumulated text.
    #[serde(default)]
    pub text: String,
}

/// Typed view of a [`RuntimeEvent`] payload.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// `agent_start` payload.
    AgentStart(AgentLifecyclePayload),
    /// `agent_update` payload.
    AgentUpdate(AgentLifecyclePayload),
    /// `agent_complete` payload.
    AgentComplete(AgentLifecyclePayload),
    /// `tool_start` payload.
    ToolStart(ToolStartPayload),
    /// `tool_complete` payload.
    ToolComplete(ToolCompletePayload),
    /// `text_delta` payload.
    TextDelta(TextDeltaPayload),
    /// `thinking_delta` payload.
    ThinkingDelta(ThinkingDeltaPayload),
    /// `usage` payload.
    Usage(UsagePayload),
    /// `text_complete` payload.
    TextComplete(TextCompletePayload),
    /// Unrecognized event type (payload left opaque).
    Unknown,
}

// ─────────────────────────────────────────────────────────────────────────────
// EnrichedEvent — correlation output
// ─────────────────────────────────────────────────────────────────────────────

/// A raw event plus resolved ownership and UI-routing flags.
///
/// The original envelope is embedded untouched and flattened on the wire;
/// enrichment only ever adds fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEvent {
    /// The original event, unmodified.
    #[serde(flatten)]
    pub event: RuntimeEvent,
    /// Tool invocation this event resolves to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_tool_id: Option<ToolCallId>,
    /// Agent this event resolves to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_agent_id: Option<AgentId>,
    /// Parent of the resolved agent, when it is a registered sub-agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<AgentId>,
    /// Whether the resolved tool belongs to a sub-agent.
    pub is_subagent_tool: bool,
    /// Whether the UI should keep this event out of the main chat transcript.
    pub suppress_from_main_chat: bool,
}

impl EnrichedEvent {
    /// Wrap an event with all enrichment fields at their defaults.
    #[must_use]
    pub fn passthrough(event: RuntimeEvent) -> Self {
        Self {
            event,
            resolved_tool_id: None,
            resolved_agent_id: None,
            parent_agent_id: None,
            is_subagent_tool: false,
            suppress_from_main_chat: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Create an `agent_start` event.
#[must_use]
pub fn agent_start_event(
    session_id: impl Into<SessionId>,
    run_id: RunId,
    agent_id: impl Into<AgentId>,
) -> RuntimeEvent {
    let agent_id: AgentId = agent_id.into();
    RuntimeEvent::new(
        EventType::AgentStart,
        session_id,
        run_id,
        json!({ "agentId": agent_id }),
    )
}

/// Create a `tool_start` event with no explicit owner.
#[must_use]
pub fn tool_start_event(
    session_id: impl Into<SessionId>,
    run_id: RunId,
    tool_id: impl Into<ToolCallId>,
    tool_name: &str,
) -> RuntimeEvent {
    let tool_id: ToolCallId = tool_id.into();
    RuntimeEvent::new(
        EventType::ToolStart,
        session_id,
        run_id,
        json!({ "toolId": tool_id, "toolName": tool_name }),
    )
}

/// Create a `tool_complete` event.
#[must_use]
pub fn tool_complete_event(
    session_id: impl Into<SessionId>,
    run_id: RunId,
    tool_id: impl Into<ToolCallId>,
    output: Value,
    success: bool,
) -> RuntimeEvent {
    let tool_id: ToolCallId = tool_id.into();
    RuntimeEvent::new(
        EventType::ToolComplete,
        session_id,
        run_id,
        json!({ "toolId": tool_id, "output": output, "success": success }),
    )
}

/// Create a `text_delta` event with no explicit agent attribution.
#[must_use]
pub fn text_delta_event(
    session_id: impl Into<SessionId>,
    run_id: RunId,
    delta: &str,
) -> RuntimeEvent {
    RuntimeEvent::new(
        EventType::TextDelta,
        session_id,
        run_id,
        json!({ "delta": delta }),
    )
}

/// Create a `text_complete` event.
#[must_use]
pub fn text_complete_event(
    session_id: impl Into<SessionId>,
    run_id: RunId,
    message_id: &str,
    text: &str,
) -> RuntimeEvent {
    RuntimeEvent::new(
        EventType::TextComplete,
        session_id,
        run_id,
        json!({ "messageId": message_id, "text": text }),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
