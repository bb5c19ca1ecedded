//! End-to-end reply turns through the real HTTP provider against a scripted
//! endpoint double: the model asks for a tool, the registry answers, the
//! model wraps up.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pulse::agent::{Agent, AgentEvent, TurnOutcome};
use pulse::analytics::{self, AnalyticsSnapshot};
use pulse::models::message::Role;
use pulse::providers::configs::OpenAiProviderConfig;
use pulse::providers::openai::OpenAiProvider;

fn snapshot() -> Arc<AnalyticsSnapshot> {
    serde_json::from_value::<AnalyticsSnapshot>(json!({
        "project_id": "demo",
        "events": {
            "signup_start": {"2026-01-01": 120, "2026-01-02": 80},
            "signup_completed": {"2026-01-01": 30, "2026-01-02": 20}
        }
    }))
    .map(Arc::new)
    .unwrap()
}

fn completion(message: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20}
    }))
}

fn agent_for(server: &MockServer) -> Agent {
    let provider = OpenAiProvider::new(OpenAiProviderConfig::new(
        server.uri(),
        "test_api_key",
        "gpt-4o",
    ))
    .unwrap();

    Agent::new(Box::new(provider))
        .with_system_prompt(analytics::SYSTEM_PROMPT)
        .with_tools(analytics::registry(snapshot()))
}

#[tokio::test]
async fn tool_round_trip_produces_final_answer() {
    let server = MockServer::start().await;

    // First call: the model wants the conversion tool.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"tool_choice": "auto"})))
        .respond_with(completion(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {
                    "name": "calculate_conversion",
                    "arguments": "{\"start_event\":\"signup_start\",\"end_event\":\"signup_completed\"}"
                }
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // Second call: the model answers in plain text.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(json!({
            "role": "assistant",
            "content": "Signup conversion is 25.00%."
        })))
        .mount(&server)
        .await;

    let agent = agent_for(&server);
    let mut reply = agent.reply(Vec::new(), "What is our signup conversion?");

    let mut events = Vec::new();
    while let Some(event) = reply.next_event().await {
        events.push(event);
    }

    // thinking, tool_call, tool_result, thinking, response
    assert_eq!(events.len(), 5);
    match &events[1] {
        AgentEvent::ToolCall { name, arguments } => {
            assert_eq!(name, "calculate_conversion");
            assert_eq!(arguments["start_event"], "signup_start");
        }
        other => panic!("expected tool call, got {other:?}"),
    }
    match &events[2] {
        AgentEvent::ToolResult { output, .. } => {
            let payload: Value = serde_json::from_str(output).unwrap();
            assert_eq!(payload["conversion_rate"], "25.00%");
            assert_eq!(payload["drop_off"], "75.00%");
        }
        other => panic!("expected tool result, got {other:?}"),
    }
    assert_eq!(
        events[4],
        AgentEvent::Response {
            text: "Signup conversion is 25.00%.".to_string()
        }
    );

    assert_eq!(reply.outcome(), Some(TurnOutcome::Answered));

    let history = reply.into_history();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[2].tool_calls().len(), 1);
    assert_eq!(history[3].role, Role::Tool);
    assert_eq!(history[3].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(
        history[4].content.as_deref(),
        Some("Signup conversion is 25.00%.")
    );
}

#[tokio::test]
async fn endpoint_failure_surfaces_as_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let agent = agent_for(&server);
    let mut reply = agent.reply(Vec::new(), "Anything?");

    let mut saw_error = false;
    while let Some(event) = reply.next_event().await {
        if matches!(event, AgentEvent::Error { .. }) {
            saw_error = true;
        }
    }

    assert!(saw_error);
    assert_eq!(reply.outcome(), Some(TurnOutcome::Failed));
    // The caller still gets the history back to resume from.
    assert_eq!(reply.into_history().len(), 2);
}
