//! Call-automation webhook.
//!
//! Receives Event Grid deliveries (one event or a batch). Recognised speech is
//! routed like a chat turn, with the call connection id as the session id;
//! the session is released when the call disconnects. Answering and playing audio belong to the calling platform; those events
//! are only acknowledged here.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::{ApiError, JsonBody};
use crate::AppState;

const SUBSCRIPTION_VALIDATION: &str = "Microsoft.EventGrid.SubscriptionValidationEvent";
const INCOMING_CALL: &str = "Microsoft.Communication.IncomingCall";
const CALL_CONNECTED: &str = "Microsoft.Communication.CallConnected";
const RECOGNIZE_COMPLETED: &str = "Microsoft.Communication.RecognizeCompleted";
const PLAY_COMPLETED: &str = "Microsoft.Communication.PlayCompleted";
const CALL_DISCONNECTED: &str = "Microsoft.Communication.CallDisconnected";

#[derive(Debug, Deserialize)]
struct CallEvent {
    #[serde(rename = "eventType")]
    event_type: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

impl CallEvent {
    fn name(&self) -> Option<&str> {
        self.event_type.as_deref().or(self.kind.as_deref())
    }
}

pub async fn incoming_call(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<Value>,
) -> Result<Json<Value>, ApiError> {
    let events = match payload {
        Value::Array(events) => events,
        single => vec![single],
    };

    for raw in events {
        let event: CallEvent = serde_json::from_value(raw)
            .map_err(|e| ApiError::BadRequest(format!("malformed event: {}", e)))?;
        if let Some(response) = process_event(&state, &event).await? {
            return Ok(Json(response));
        }
    }

    Ok(Json(json!({ "status": "ok" })))
}

/// Returns a response body when the event needs one.
async fn process_event(state: &AppState, event: &CallEvent) -> Result<Option<Value>, ApiError> {
    let name = event
        .name()
        .ok_or_else(|| ApiError::BadRequest("event without eventType".to_string()))?;

    match name {
        SUBSCRIPTION_VALIDATION => {
            let code = event
                .data
                .get("validationCode")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::BadRequest("validation event without validationCode".to_string()))?;
            info!("Event Grid subscription validated");
            Ok(Some(json!({ "validationResponse": code })))
        }
        RECOGNIZE_COMPLETED => recognized_speech(state, &event.data).await,
        CALL_DISCONNECTED => {
            if let Some(call) = call_id(&event.data) {
                let released = state.sessions.remove(call).await;
                info!(call, released, "Call disconnected");
            }
            Ok(None)
        }
        INCOMING_CALL | CALL_CONNECTED | PLAY_COMPLETED => {
            info!(event = name, call = call_id(&event.data).unwrap_or("unknown"), "Call event acknowledged");
            Ok(None)
        }
        other => {
            warn!(event = other, "Ignoring unrecognised call event");
            Ok(None)
        }
    }
}

async fn recognized_speech(state: &AppState, data: &Value) -> Result<Option<Value>, ApiError> {
    let result = &data["recognitionResult"];
    if result["recognitionType"].as_str() != Some("speech") {
        return Ok(None);
    }
    let speech = match result["speech"].as_str().map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => return Ok(None),
    };
    let call = call_id(data)
        .ok_or_else(|| ApiError::BadRequest("speech event without callConnectionId".to_string()))?;

    let session = state.sessions.get_or_open(&state.router, call).await?;
    let mut session = session.lock().await;
    let outcome = state.router.route(&mut session, speech).await?;
    info!(call, route = %outcome.route, "Answered caller");

    Ok(Some(json!({ "status": "ok", "reply": outcome.reply })))
}

fn call_id(data: &Value) -> Option<&str> {
    data.get("callConnectionId").and_then(Value::as_str)
}
