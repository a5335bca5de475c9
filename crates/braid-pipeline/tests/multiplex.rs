#![allow(missing_docs)]

//! End-to-end pipeline scenario: one run multiplexing a main agent and a
//! spawned sub-agent over a shared raw event stream.

use braid_core::events::{
    EventType, RuntimeEvent, agent_start_event, subagent_message_id, text_complete_event,
    text_delta_event, tool_complete_event, tool_start_event,
};
use braid_core::ids::RunId;
use braid_correlation::SubagentInfo;
use braid_pipeline::{EventPipeline, StreamPart};
use serde_json::json;

const RUN: RunId = RunId(42);

fn spawn_worker(pipeline: &EventPipeline, spawn_id: &str, agent_id: &str) {
    pipeline.on_subagent_spawn(
        spawn_id.into(),
        agent_id.into(),
        SubagentInfo {
            parent_agent_id: "main-agent".into(),
            run_id: RUN,
            node_id: None,
        },
    );
}

#[tokio::test]
async fn full_run_with_subagent_multiplexing() {
    let pipeline = EventPipeline::new();
    let mut rx = pipeline.subscribe();
    pipeline.start_run(RUN, "session-1".into());

    // Main agent comes up on a raw runtime session; identity is rewritten.
    let batch = vec![agent_start_event("rt-main", RUN, "main-agent")];
    let enriched = pipeline.process_batch(&batch);
    assert_eq!(enriched[0].event.session_id.as_str(), "session-1");

    let parts = rx.recv().await.unwrap();
    assert!(matches!(
        &parts[0],
        StreamPart::AgentStart { agent_id, parent_agent_id: None } if agent_id.as_str() == "main-agent"
    ));

    // Main agent spawns a worker via a task tool. The worker's own tool
    // traffic arrives on a foreign runtime session and is claimed FIFO.
    spawn_worker(&pipeline, "spawn-1", "worker-1");
    let batch = vec![
        tool_start_event("rt-worker", RUN, "tc-1", "bash"),
        tool_complete_event("rt-worker", RUN, "tc-1", json!({ "stdout": "ok" }), true),
    ];
    let enriched = pipeline.process_batch(&batch);
    assert_eq!(enriched[0].resolved_agent_id, Some("worker-1".into()));
    assert!(enriched[0].is_subagent_tool);
    assert_eq!(enriched[1].resolved_agent_id, Some("worker-1".into()));
    assert!(enriched[1].is_subagent_tool);

    let parts = rx.recv().await.unwrap();
    assert_eq!(parts.len(), 2);
    assert!(matches!(
        &parts[0],
        StreamPart::ToolStart { is_subagent_tool: true, .. }
    ));
    assert!(matches!(
        &parts[1],
        StreamPart::ToolComplete { success: true, .. }
    ));

    // The worker's transcript uses the sub-agent message id convention and
    // stays out of the main chat.
    let message_id = subagent_message_id(&"worker-1".into());
    let batch = vec![text_complete_event("rt-worker", RUN, &message_id, "worker done")];
    let enriched = pipeline.process_batch(&batch);
    assert!(enriched[0].suppress_from_main_chat);

    let parts = rx.recv().await.unwrap();
    assert!(matches!(
        &parts[0],
        StreamPart::TextComplete { suppress_from_main_chat: true, .. }
    ));
}

#[tokio::test]
async fn echoed_tool_result_text_never_reaches_subscribers() {
    let pipeline = EventPipeline::new();
    let mut rx = pipeline.subscribe();
    pipeline.start_run(RUN, "session-1".into());
    let _ = pipeline.process_batch(&[agent_start_event("rt-main", RUN, "main-agent")]);
    let _ = rx.recv().await.unwrap();

    pipeline.expect_echo("Error: command not found");

    // The runtime echoes the injected text split across deltas, then the
    // model continues with its own words.
    let batch = vec![
        text_delta_event("rt-main", RUN, "Error: "),
        text_delta_event("rt-main", RUN, "command not found"),
        text_delta_event("rt-main", RUN, "Let me try another approach."),
    ];
    let _ = pipeline.process_batch(&batch);

    let parts = rx.recv().await.unwrap();
    let deltas: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            StreamPart::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Let me try another approach."]);
    assert!(!pipeline.has_pending_echo());
}

#[tokio::test]
async fn reset_between_runs_keeps_session_identity() {
    let pipeline = EventPipeline::new();
    pipeline.start_run(RUN, "session-1".into());
    let _ = pipeline.process_batch(&[agent_start_event("rt-main", RUN, "main-agent")]);
    spawn_worker(&pipeline, "spawn-1", "worker-1");

    pipeline.reset();

    // Run-scoped state is gone: a foreign tool has no spawn to claim.
    let enriched =
        pipeline.process_batch(&[tool_start_event("rt-worker", RunId(43), "tc-9", "bash")]);
    assert!(!enriched[0].is_subagent_tool);

    // But the runtime binding from the previous run still resolves.
    let enriched =
        pipeline.process_batch(&[agent_start_event("rt-main", RunId(43), "main-agent")]);
    assert_eq!(enriched[0].event.session_id.as_str(), "session-1");
}

#[test]
fn unknown_event_types_are_carried_but_not_rendered() {
    let pipeline = EventPipeline::new();
    pipeline.start_run(RUN, "session-1".into());
    let mut rx = pipeline.subscribe();

    let mut event = RuntimeEvent::new(EventType::Unknown, "rt-main", RUN, json!({}));
    event.payload = json!({ "someFutureField": 1 });
    let enriched = pipeline.process_batch(&[event.clone()]);

    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0].event.payload, event.payload);
    assert!(rx.try_recv().is_err());
}
