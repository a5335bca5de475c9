//! Canonical UI stream parts.
//!
//! The closed vocabulary the UI consumes. Raw event types that have no
//! mapping here are dropped from the canonical output (their bookkeeping
//! side effects still happen upstream).

use braid_core::ids::{AgentId, ToolCallId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One canonical UI stream operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamPart {
    /// An agent began processing.
    AgentStart {
        /// Agent that started.
        agent_id: AgentId,
        /// Parent, when the agent is a registered sub-agent.
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_agent_id: Option<AgentId>,
    },

    /// Agent progress/status update.
    AgentUpdate {
        /// Agent being updated.
        agent_id: AgentId,
        /// Status string, when the runtime provided one.
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    /// An agent finished.
    AgentComplete {
        /// Agent that finished.
        agent_id: AgentId,
        /// Parent, when the agent is a registered sub-agent.
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_agent_id: Option<AgentId>,
    },

    /// Incremental assistant text, post echo filtering.
    TextDelta {
        /// Visible text fragment.
        delta: String,
        /// Owning agent, when resolved.
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
    },

    /// Thinking metadata for a message.
    ThinkingMeta {
        /// Source key grouping thinking fragments (agent-scoped).
        thinking_source_key: String,
        /// Message the thinking attaches to.
        target_message_id: String,
        /// Thinking text fragment.
        thinking_text: String,
    },

    /// Tool invocation started.
    ToolStart {
        /// Tool invocation id.
        tool_id: ToolCallId,
        /// Tool name.
        tool_name: String,
        /// Tool input arguments.
        input: Value,
        /// Owning agent, when resolved.
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        /// Whether the tool belongs to a sub-agent.
        is_subagent_tool: bool,
    },

    /// Tool invocation finished.
    ToolComplete {
        /// Tool invocation id.
        tool_id: ToolCallId,
        /// Tool output.
        output: Value,
        /// Whether the tool succeeded.
        success: bool,
        /// Error message on failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Owning agent, when resolved.
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
    },

    /// Assistant text block completed.
    TextComplete {
        /// Message id.
        message_id: String,
        /// Full accumulated text.
        text: String,
        /// Owning agent, when resolved.
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        /// Routing flag: keep out of the main chat transcript.
        suppress_from_main_chat: bool,
    },

    /// Token usage report.
    Usage {
        /// Owning agent, when resolved.
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        /// Input tokens consumed.
        input_tokens: u64,
        /// Output tokens produced.
        output_tokens: u64,
    },
}

impl StreamPart {
    /// Get the part type string (for type discrimination).
    #[must_use]
    pub fn part_type(&self) -> &'static str {
        match self {
            Self::AgentStart { .. } => "agent-start",
            Self::AgentUpdate { .. } => "agent-update",
            Self::AgentComplete { .. } => "agent-complete",
            Self::TextDelta { .. } => "text-delta",
            Self::ThinkingMeta { .. } => "thinking-meta",
            Self::ToolStart { .. } => "tool-start",
            Self::ToolComplete { .. } => "tool-complete",
            Self::TextComplete { .. } => "text-complete",
            Self::Usage { .. } => "usage",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_delta_wire_format() {
        let part = StreamPart::TextDelta {
            delta: "hello".into(),
            agent_id: None,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json, json!({ "type": "text-delta", "delta": "hello" }));
    }

    #[test]
    fn thinking_meta_wire_format() {
        let part = StreamPart::ThinkingMeta {
            thinking_source_key: "worker-1".into(),
            target_message_id: "msg-1".into(),
            thinking_text: "hmm".into(),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "thinking-meta");
        assert_eq!(json["thinkingSourceKey"], "worker-1");
        assert_eq!(json["targetMessageId"], "msg-1");
        assert_eq!(json["thinkingText"], "hmm");
    }

    #[test]
    fn tool_complete_wire_format() {
        let part = StreamPart::ToolComplete {
            tool_id: "tc-1".into(),
            output: json!({ "stdout": "ok" }),
            success: true,
            error: None,
            agent_id: Some("worker-1".into()),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool-complete");
        assert_eq!(json["toolId"], "tc-1");
        assert_eq!(json["success"], true);
        assert_eq!(json["agentId"], "worker-1");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn part_type_matches_wire_tag() {
        let parts = vec![
            StreamPart::AgentStart {
                agent_id: "a".into(),
                parent_agent_id: None,
            },
            StreamPart::AgentUpdate {
                agent_id: "a".into(),
                status: None,
            },
            StreamPart::AgentComplete {
                agent_id: "a".into(),
                parent_agent_id: None,
            },
            StreamPart::TextDelta {
                delta: "d".into(),
                agent_id: None,
            },
            StreamPart::ThinkingMeta {
                thinking_source_key: "k".into(),
                target_message_id: "m".into(),
                thinking_text: "t".into(),
            },
            StreamPart::ToolStart {
                tool_id: "tc".into(),
                tool_name: "bash".into(),
                input: json!({}),
                agent_id: None,
                is_subagent_tool: false,
            },
            StreamPart::ToolComplete {
                tool_id: "tc".into(),
                output: json!(null),
                success: false,
                error: Some("boom".into()),
                agent_id: None,
            },
            StreamPart::TextComplete {
                message_id: "m".into(),
                text: "t".into(),
                agent_id: None,
                suppress_from_main_chat: false,
            },
            StreamPart::Usage {
                agent_id: None,
                input_tokens: 1,
                output_tokens: 2,
            },
        ];
        for part in parts {
            let json = serde_json::to_value(&part).unwrap();
            assert_eq!(json["type"], part.part_type());
            let back: StreamPart = serde_json::from_value(json).unwrap();
            assert_eq!(back, part);
        }
    }
}
