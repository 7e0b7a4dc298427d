//! Integration tests for the gateway.
//!
//! Each test serves the real router on a random port, backed by a scripted
//! agent platform and the default tool registry.

use std::sync::Arc;
use std::time::Duration;

use council_core::config::ToolSettings;
use council_core::testing::{ScriptedPlatform, ScriptedRun};
use council_core::{AgentIds, QueryRouter, Route, RunState, Runtime, ToolCallRequest};
use council_gateway::api::{ChatResponse, ErrorResponse};
use council_gateway::{create_router, AppState};
use council_tools::build_registry;
use serde_json::{json, Value};

fn agents() -> AgentIds {
    AgentIds {
        classifier: "asst_classifier".to_string(),
        information: "asst_info".to_string(),
        eligibility: "asst_eligibility".to_string(),
        postcode: None,
    }
}

fn app_state(platform: Arc<ScriptedPlatform>, run_timeout: Duration) -> AppState {
    let registry = build_registry(&ToolSettings::default()).unwrap();
    let runtime = Runtime::new(platform, Arc::new(registry))
        .with_poll_interval(Duration::from_millis(5))
        .with_run_timeout(run_timeout);
    AppState::new(Arc::new(QueryRouter::new(runtime, agents())))
}

/// Spin up a test server on a random port and return the base URL.
async fn start_test_server(platform: Arc<ScriptedPlatform>, run_timeout: Duration) -> String {
    serve_state(app_state(platform, run_timeout)).await
}

async fn serve_state(state: AppState) -> String {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn server(platform: &Arc<ScriptedPlatform>) -> String {
    start_test_server(platform.clone(), Duration::from_secs(2)).await
}

/// POST JSON and return (status, parsed body).
async fn post_json(base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

/// POST a raw body with the given content type and return (status, parsed body).
async fn post_raw(base: &str, path: &str, content_type: &str, body: &'static str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .header("content-type", content_type)
        .body(body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

fn speech_event(call: &str, speech: &str) -> Value {
    json!({
        "type": "Microsoft.Communication.RecognizeCompleted",
        "data": {
            "callConnectionId": call,
            "recognitionResult": { "recognitionType": "speech", "speech": speech }
        }
    })
}

// ============================================================================
// Health and tools
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let base = server(&Arc::new(ScriptedPlatform::new())).await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.text().await.unwrap().contains("Operational"));
}

#[tokio::test]
async fn test_tools_endpoint_lists_registry() {
    let base = server(&Arc::new(ScriptedPlatform::new())).await;
    let tools: Vec<Value> = reqwest::get(format!("{}/tools", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "get_school_distances");
    assert_eq!(tools[0]["parameters"]["required"][0], "postcode");
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_chat_session_is_reused() {
    let platform = Arc::new(ScriptedPlatform::new());
    platform.script("asst_classifier", ScriptedRun::replying("General_Greeting"));
    platform.script("asst_info", ScriptedRun::replying("Hello, how can I help?"));
    platform.script("asst_classifier", ScriptedRun::replying("Eligibility_Check"));
    platform.script(
        "asst_eligibility",
        ScriptedRun::new()
            .then(RunState::Running)
            .then_tool_calls(vec![ToolCallRequest::new("call_1", "get_school_distances", [("postcode", "E2")])])
            .then(RunState::Running)
            .then(RunState::Completed)
            .reply("You are eligible for East London High School."),
    );
    let base = server(&platform).await;

    let (status, body) = post_json(&base, "/chat", json!({ "message": "Hi there" })).await;
    assert_eq!(status, 200);
    let first: ChatResponse = serde_json::from_value(body).unwrap();
    assert_eq!(first.route, Route::Information);
    assert_eq!(first.reply, "Hello, how can I help?");

    let (status, body) = post_json(
        &base,
        "/chat",
        json!({ "message": "We live in E2, can we get transport?", "session_id": &first.session_id }),
    )
    .await;
    assert_eq!(status, 200);
    let second: ChatResponse = serde_json::from_value(body).unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.route, Route::Eligibility);
    assert_eq!(second.label, "Eligibility_Check");
    assert_eq!(second.reply, "You are eligible for East London High School.");

    assert_eq!(platform.thread_count(), 1);
    assert_eq!(platform.submissions().len(), 1);
}

#[tokio::test]
async fn test_unknown_label_falls_back_to_information() {
    let platform = Arc::new(ScriptedPlatform::new());
    platform.script("asst_classifier", ScriptedRun::replying("bogus_label"));
    platform.script("asst_info", ScriptedRun::replying("Here is some general information."));
    let base = server(&platform).await;

    let (status, body) = post_json(&base, "/chat", json!({ "message": "???" })).await;

    assert_eq!(status, 200);
    assert_eq!(body["route"], "information");
    assert_eq!(body["reply"], "Here is some general information.");
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let base = server(&Arc::new(ScriptedPlatform::new())).await;
    let (status, body) = post_json(&base, "/chat", json!({ "message": "   " })).await;
    assert_eq!(status, 400);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.code, "bad_request");
}

#[tokio::test]
async fn test_malformed_chat_bodies_get_json_errors() {
    let base = server(&Arc::new(ScriptedPlatform::new())).await;

    for (status, body) in [
        post_json(&base, "/chat", json!({})).await,
        post_raw(&base, "/chat", "application/json", "not json").await,
        post_raw(&base, "/chat", "text/plain", r#"{"message": "hi"}"#).await,
    ] {
        assert_eq!(status, 400);
        let error: ErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.code, "bad_request");
        assert!(!error.error.is_empty());
    }
}

#[tokio::test]
async fn test_unknown_session_id_gets_a_fresh_one() {
    let platform = Arc::new(ScriptedPlatform::new());
    let base = server(&platform).await;

    let (status, body) = post_json(&base, "/chat", json!({ "message": "hello", "session_id": "chosen-by-me" })).await;

    assert_eq!(status, 200);
    let response: ChatResponse = serde_json::from_value(body).unwrap();
    assert_ne!(response.session_id, "chosen-by-me");
    assert!(uuid::Uuid::parse_str(&response.session_id).is_ok());
}

#[tokio::test]
async fn test_platform_failure_maps_to_bad_gateway() {
    let platform = Arc::new(ScriptedPlatform::new());
    platform.script("asst_classifier", ScriptedRun::rejected("quota exceeded"));
    let base = server(&platform).await;

    let (status, body) = post_json(&base, "/chat", json!({ "message": "hello" })).await;

    assert_eq!(status, 502);
    assert_eq!(body["code"], "platform_error");
    assert!(body["error"].as_str().unwrap().contains("quota exceeded"));
}

#[tokio::test]
async fn test_stuck_run_maps_to_gateway_timeout() {
    let platform = Arc::new(ScriptedPlatform::new());
    platform.script("asst_classifier", ScriptedRun::new().then(RunState::Running));
    let base = start_test_server(platform.clone(), Duration::from_millis(50)).await;

    let (status, body) = post_json(&base, "/chat", json!({ "message": "hello" })).await;

    assert_eq!(status, 504);
    assert_eq!(body["code"], "timeout");
    assert_eq!(platform.cancelled().len(), 1);
}

#[tokio::test]
async fn test_end_chat_removes_session() {
    let platform = Arc::new(ScriptedPlatform::new());
    let base = server(&platform).await;
    let (_, body) = post_json(&base, "/chat", json!({ "message": "hello" })).await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let url = format!("{}/chat/{}", base, session_id);
    assert_eq!(client.delete(&url).send().await.unwrap().status().as_u16(), 204);
    assert_eq!(client.delete(&url).send().await.unwrap().status().as_u16(), 404);
}

// ============================================================================
// Telephony webhook
// ============================================================================

#[tokio::test]
async fn test_event_grid_validation_handshake() {
    let base = server(&Arc::new(ScriptedPlatform::new())).await;
    let (status, body) = post_json(
        &base,
        "/api/incoming-call",
        json!([{
            "eventType": "Microsoft.EventGrid.SubscriptionValidationEvent",
            "data": { "validationCode": "512d38b6-c7b8-40c8-89fe-f46f9e9622b6" }
        }]),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["validationResponse"], "512d38b6-c7b8-40c8-89fe-f46f9e9622b6");
}

#[tokio::test]
async fn test_recognized_speech_gets_a_reply() {
    let platform = Arc::new(ScriptedPlatform::new());
    platform.script("asst_classifier", ScriptedRun::replying("Information_Request"));
    platform.script("asst_info", ScriptedRun::replying("Your bins are collected on Monday."));
    let base = server(&platform).await;

    let (status, body) = post_json(
        &base,
        "/api/incoming-call",
        speech_event("call-123", "Hello, I need help with bin collection"),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["reply"], "Your bins are collected on Monday.");
    assert_eq!(platform.started_agents(), vec!["asst_classifier", "asst_info"]);
}

#[tokio::test]
async fn test_call_lifecycle_events_are_acknowledged() {
    let platform = Arc::new(ScriptedPlatform::new());
    let base = server(&platform).await;

    let (status, body) = post_json(
        &base,
        "/api/incoming-call",
        json!([
            { "eventType": "Microsoft.Communication.CallConnected", "data": { "callConnectionId": "call-1" } },
            { "eventType": "Microsoft.Communication.PlayCompleted", "data": { "callConnectionId": "call-1" } }
        ]),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "ok" }));
    assert!(platform.started_agents().is_empty());
}

#[tokio::test]
async fn test_call_disconnect_releases_the_session() {
    let platform = Arc::new(ScriptedPlatform::new());
    let state = app_state(platform.clone(), Duration::from_secs(2));
    let sessions = state.sessions.clone();
    let base = serve_state(state).await;

    for n in 0..5 {
        let call = format!("call-{}", n);
        let (status, _) = post_json(&base, "/api/incoming-call", speech_event(&call, "What day are my bins collected?")).await;
        assert_eq!(status, 200);
    }
    assert_eq!(sessions.len().await, 5);

    for n in 0..5 {
        let (status, body) = post_json(
            &base,
            "/api/incoming-call",
            json!([{ "eventType": "Microsoft.Communication.CallDisconnected", "data": { "callConnectionId": format!("call-{}", n) } }]),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "status": "ok" }));
    }
    assert!(sessions.is_empty().await);
}

#[tokio::test]
async fn test_malformed_call_events_get_json_errors() {
    let base = server(&Arc::new(ScriptedPlatform::new())).await;

    for (status, body) in [
        post_json(&base, "/api/incoming-call", json!({})).await,
        post_raw(&base, "/api/incoming-call", "application/json", "not json").await,
    ] {
        assert_eq!(status, 400);
        let error: ErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.code, "bad_request");
    }
}
