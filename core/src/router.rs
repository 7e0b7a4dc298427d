use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::runtime::Runtime;

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const INFORMATION_FALLBACK: &str = "Sorry, I couldn't provide information at this time.";
pub const ELIGIBILITY_FALLBACK: &str = "Sorry, I couldn't generate an eligibility response.";
pub const POSTCODE_FALLBACK: &str = "Sorry, I couldn't check that postcode.";

/// Hosted agent ids, one per role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIds {
    pub classifier: String,
    pub information: String,
    pub eligibility: String,
    pub postcode: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Information,
    Eligibility,
    PostcodeValidation,
}

impl Route {
    /// Exact-match dispatch on the classifier label.
    ///
    /// Unknown labels, and `Postcode_Check` without a postcode agent, go to
    /// the information handler so a turn always gets an answer.
    pub fn from_label(label: &str, postcode_agent_available: bool) -> Self {
        match label {
            "Eligibility_Check" => Route::Eligibility,
            "Postcode_Check" if postcode_agent_available => Route::PostcodeValidation,
            _ => Route::Information,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Route::Information => "information",
            Route::Eligibility => "eligibility",
            Route::PostcodeValidation => "postcode_validation",
        };
        f.write_str(name)
    }
}

/// One conversation, bound to one remote thread.
///
/// Routing needs `&mut ChatSession`, so turns on the same conversation
/// cannot run at the same time.
#[derive(Debug)]
pub struct ChatSession {
    thread_id: String,
    turns: u64,
}

impl ChatSession {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteOutcome {
    pub route: Route,
    pub label: String,
    pub reply: String,
}

pub struct QueryRouter {
    runtime: Runtime,
    agents: AgentIds,
}

impl QueryRouter {
    pub fn new(runtime: Runtime, agents: AgentIds) -> Self {
        Self { runtime, agents }
    }

    pub fn agents(&self) -> &AgentIds {
        &self.agents
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub async fn open_session(&self) -> Result<ChatSession> {
        let thread_id = self.runtime.platform().create_thread().await?;
        info!(thread_id = %thread_id, "Opened conversation thread");
        Ok(ChatSession { thread_id, turns: 0 })
    }

    /// Handles one user turn: classify, then hand the thread to the chosen agent.
    pub async fn route(&self, session: &mut ChatSession, input: &str) -> Result<RouteOutcome> {
        self.runtime
            .platform()
            .post_user_message(&session.thread_id, input)
            .await?;
        session.turns += 1;

        let label = self.classify(session).await?;
        let route = Route::from_label(&label, self.agents.postcode.is_some());
        info!(thread_id = %session.thread_id, label = %label, route = %route, "Classified query");

        let (agent_id, fallback) = match route {
            Route::Information => (self.agents.information.as_str(), INFORMATION_FALLBACK),
            Route::Eligibility => (self.agents.eligibility.as_str(), ELIGIBILITY_FALLBACK),
            Route::PostcodeValidation => match &self.agents.postcode {
                Some(id) => (id.as_str(), POSTCODE_FALLBACK),
                None => (self.agents.information.as_str(), INFORMATION_FALLBACK),
            },
        };

        let reply = self
            .runtime
            .start_and_complete(&session.thread_id, agent_id, fallback)
            .await?;

        Ok(RouteOutcome { route, label, reply })
    }

    async fn classify(&self, session: &ChatSession) -> Result<String> {
        let raw = self
            .runtime
            .start_and_complete(&session.thread_id, &self.agents.classifier, UNKNOWN_LABEL)
            .await?;
        Ok(raw.trim().to_string())
    }
}
