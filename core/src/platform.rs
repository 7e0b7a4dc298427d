use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle of a remote agent run, as seen by the relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    AwaitingToolOutput,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// The only direct transitions a run may take.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, AwaitingToolOutput)
                | (AwaitingToolOutput, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::AwaitingToolOutput => "awaiting_tool_output",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A function call the remote run is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub function_name: String,
    pub arguments: HashMap<String, String>,
}

impl ToolCallRequest {
    pub fn new<I, K, V>(call_id: impl Into<String>, function_name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            call_id: call_id.into(),
            function_name: function_name.into(),
            arguments: arguments
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Flattens a remote JSON argument document into string pairs.
///
/// String values are kept as-is; any other JSON value keeps its JSON text.
pub fn parse_arguments(raw: &str) -> serde_json::Result<HashMap<String, String>> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
    Ok(object
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Error results are still answered to the run, as `{"error": message}`.
    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: serde_json::json!({ "error": message.into() }).to_string(),
            is_error: true,
        }
    }
}

/// Point-in-time view of a remote run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub run_id: String,
    pub state: RunState,
    pub tool_calls: Vec<ToolCallRequest>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    /// Text parts in the order the platform returned them. Non-text content is dropped.
    pub text: Vec<String>,
    pub run_id: Option<String>,
}

/// The hosted agent service: threads, messages and asynchronous runs.
///
/// Everything that understands language lives behind this trait. The
/// orchestration layer only creates runs, watches them and answers their
/// tool calls.
#[async_trait]
pub trait AgentPlatform: Send + Sync {
    async fn create_thread(&self) -> Result<String>;

    async fn post_user_message(&self, thread_id: &str, content: &str) -> Result<()>;

    async fn start_run(&self, thread_id: &str, agent_id: &str) -> Result<RunSnapshot>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot>;

    /// Answers every pending tool call of a run in a single submission.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolCallResult],
    ) -> Result<RunSnapshot>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    /// Thread history, oldest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<AgentMessage>>;
}
