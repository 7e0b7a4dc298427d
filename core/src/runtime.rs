use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{CouncilError, Result};
use crate::platform::{AgentMessage, AgentPlatform, MessageRole, RunSnapshot, RunState, ToolCallRequest, ToolCallResult};
use crate::registry::ToolRegistry;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(120);

// Cancellation is given this many poll intervals before it is abandoned
const CANCEL_GRACE_POLLS: u32 = 5;

// The Relay Loop
// Drives one remote run to a terminal state, answering its tool calls from the
// local registry on the way.
#[derive(Clone)]
pub struct Runtime {
    platform: Arc<dyn AgentPlatform>,
    registry: Arc<ToolRegistry>,
    poll_interval: Duration,
    run_timeout: Duration,
}

impl Runtime {
    pub fn new(platform: Arc<dyn AgentPlatform>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            platform,
            registry,
            poll_interval: DEFAULT_POLL_INTERVAL,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn platform(&self) -> &Arc<dyn AgentPlatform> {
        &self.platform
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Starts `agent_id` on the thread and waits for its reply.
    pub async fn start_and_complete(&self, thread_id: &str, agent_id: &str, fallback: &str) -> Result<String> {
        let run = self.platform.start_run(thread_id, agent_id).await?;
        info!(thread_id, agent_id, run_id = %run.run_id, "Run started");
        self.run_to_completion(thread_id, run, fallback).await
    }

    /// Waits for `run` to finish and returns the agent's reply, or `fallback`
    /// when the run left no text behind.
    pub async fn run_to_completion(&self, thread_id: &str, run: RunSnapshot, fallback: &str) -> Result<String> {
        let run_id = run.run_id.clone();

        let finished = match tokio::time::timeout(self.run_timeout, self.drive(thread_id, run)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(thread_id, run_id = %run_id, timeout = ?self.run_timeout, "Run exceeded deadline, cancelling");
                self.cancel(thread_id, &run_id).await;
                return Err(CouncilError::Timeout {
                    run_id,
                    waited: self.run_timeout,
                });
            }
        };

        if finished.state == RunState::Failed {
            warn!(
                thread_id,
                run_id = %run_id,
                error = finished.last_error.as_deref().unwrap_or("unknown"),
                "Run failed"
            );
        }

        let messages = self.platform.list_messages(thread_id).await?;
        match latest_reply(&messages, &run_id) {
            Some(reply) => Ok(reply),
            None => {
                debug!(run_id = %run_id, "Run produced no text reply, using fallback");
                Ok(fallback.to_string())
            }
        }
    }

    async fn drive(&self, thread_id: &str, mut run: RunSnapshot) -> Result<RunSnapshot> {
        loop {
            let next = match run.state {
                RunState::Completed | RunState::Failed => return Ok(run),
                RunState::AwaitingToolOutput if !run.tool_calls.is_empty() => {
                    let outputs = self.dispatch(&run.tool_calls).await;
                    info!(run_id = %run.run_id, count = outputs.len(), "Submitting tool outputs");
                    self.platform
                        .submit_tool_outputs(thread_id, &run.run_id, &outputs)
                        .await?
                }
                RunState::AwaitingToolOutput => {
                    warn!(run_id = %run.run_id, "Run awaits tool output but listed no calls");
                    self.poll(thread_id, &run.run_id).await?
                }
                RunState::Pending | RunState::Running => self.poll(thread_id, &run.run_id).await?,
            };

            if next.state != run.state && !run.state.can_transition_to(next.state) {
                debug!(run_id = %run.run_id, from = %run.state, to = %next.state, "Observed a jump between polls");
            }
            run = next;
        }
    }

    /// Best-effort cancel, bounded so an unresponsive platform cannot hold the turn.
    async fn cancel(&self, thread_id: &str, run_id: &str) {
        let grace = self.poll_interval * CANCEL_GRACE_POLLS;
        match tokio::time::timeout(grace, self.platform.cancel_run(thread_id, run_id)).await {
            Ok(Ok(())) => debug!(run_id, "Cancel requested"),
            Ok(Err(e)) => warn!(run_id, "Cancel request failed: {}", e),
            Err(_) => warn!(run_id, grace = ?grace, "Cancel request unanswered, giving up"),
        }
    }

    async fn poll(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        tokio::time::sleep(self.poll_interval).await;
        let snapshot = self.platform.get_run(thread_id, run_id).await?;
        debug!(run_id, state = %snapshot.state, "Polled run");
        Ok(snapshot)
    }

    /// Answers every call in the batch, one result per call, in order.
    async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        let mut outputs = Vec::with_capacity(calls.len());

        for call in calls {
            let result = match self.registry.get(&call.function_name) {
                Some(tool) => match tool.execute(&call.arguments).await {
                    Ok(output) => {
                        info!(function = %call.function_name, call_id = %call.call_id, bytes = output.len(), "Tool call answered");
                        ToolCallResult::success(&call.call_id, output)
                    }
                    Err(e) => {
                        warn!(function = %call.function_name, call_id = %call.call_id, "Tool call failed: {:#}", e);
                        ToolCallResult::error(&call.call_id, format!("{:#}", e))
                    }
                },
                None => {
                    error!(function = %call.function_name, call_id = %call.call_id, "Run asked for a function that is not registered");
                    ToolCallResult::error(&call.call_id, format!("unknown function '{}'", call.function_name))
                }
            };
            outputs.push(result);
        }

        outputs
    }
}

/// Last text part of the newest assistant message belonging to `run_id`.
fn latest_reply(messages: &[AgentMessage], run_id: &str) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == MessageRole::Assistant)
        .filter(|m| m.run_id.as_deref().map_or(true, |id| id == run_id))
        .find_map(|m| m.text.last().cloned())
}
