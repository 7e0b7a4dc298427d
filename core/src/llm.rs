use async_openai::{
    config::OpenAIConfig,
    types::{
        CreateMessageRequestArgs, CreateRunRequestArgs, CreateThreadRequestArgs, MessageContent,
        MessageObject, MessageRole as OpenAiRole, RunObject, RunStatus, SubmitToolOutputsRunRequest,
        ToolsOutputs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::OpenAiSettings;
use crate::error::Result;
use crate::platform::{
    parse_arguments, AgentMessage, AgentPlatform, MessageRole, RunSnapshot, RunState, ToolCallRequest,
    ToolCallResult,
};

// Upper bound the Assistants API accepts for one page of messages
const MESSAGE_PAGE_LIMIT: &str = "100";

/// Hosted agents reached through the OpenAI Assistants API.
pub struct Brain {
    client: Client<OpenAIConfig>,
}

impl Brain {
    pub fn new(settings: &OpenAiSettings) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(settings.api_key.clone());
        if let Some(base) = &settings.api_base {
            config = config.with_api_base(base.clone());
        }
        let client = Client::with_config(config);

        info!(
            "Brain connected. API base: {}",
            settings.api_base.as_deref().unwrap_or("default")
        );
        Self { client }
    }

    /// Quick connectivity check: confirms an agent exists and returns its display name.
    pub async fn describe_agent(&self, agent_id: &str) -> Result<String> {
        let assistant = self.client.assistants().retrieve(agent_id).await?;
        Ok(assistant
            .name
            .unwrap_or_else(|| format!("{} ({})", assistant.id, assistant.model)))
    }
}

#[async_trait]
impl AgentPlatform for Brain {
    async fn create_thread(&self) -> Result<String> {
        let request = CreateThreadRequestArgs::default().build()?;
        let thread = self.client.threads().create(request).await?;
        Ok(thread.id)
    }

    async fn post_user_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let request = CreateMessageRequestArgs::default()
            .role(OpenAiRole::User)
            .content(content.to_string())
            .build()?;
        self.client.threads().messages(thread_id).create(request).await?;
        Ok(())
    }

    async fn start_run(&self, thread_id: &str, agent_id: &str) -> Result<RunSnapshot> {
        let request = CreateRunRequestArgs::default()
            .assistant_id(agent_id)
            .build()?;
        let run = self.client.threads().runs(thread_id).create(request).await?;
        Ok(snapshot(run))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        let run = self.client.threads().runs(thread_id).retrieve(run_id).await?;
        Ok(snapshot(run))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolCallResult],
    ) -> Result<RunSnapshot> {
        let request = SubmitToolOutputsRunRequest {
            tool_outputs: outputs
                .iter()
                .map(|o| ToolsOutputs {
                    tool_call_id: Some(o.call_id.clone()),
                    output: Some(o.output.clone()),
                })
                .collect(),
            stream: None,
        };
        let run = self
            .client
            .threads()
            .runs(thread_id)
            .submit_tool_outputs(run_id, request)
            .await?;
        Ok(snapshot(run))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        self.client.threads().runs(thread_id).cancel(run_id).await?;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<AgentMessage>> {
        let page = self
            .client
            .threads()
            .messages(thread_id)
            .list(&[("order", "desc"), ("limit", MESSAGE_PAGE_LIMIT)])
            .await?;

        // Newest page first from the API; history is handed out oldest first.
        Ok(page.data.into_iter().rev().map(agent_message).collect())
    }
}

fn run_state(status: &RunStatus) -> RunState {
    match status {
        RunStatus::Queued => RunState::Pending,
        RunStatus::InProgress | RunStatus::Cancelling => RunState::Running,
        RunStatus::RequiresAction => RunState::AwaitingToolOutput,
        RunStatus::Completed => RunState::Completed,
        RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired | RunStatus::Incomplete => {
            RunState::Failed
        }
    }
}

fn snapshot(run: RunObject) -> RunSnapshot {
    let state = run_state(&run.status);

    let tool_calls = run
        .required_action
        .map(|action| action.submit_tool_outputs.tool_calls)
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = parse_arguments(&call.function.arguments).unwrap_or_else(|e| {
                warn!(call_id = %call.id, "Malformed arguments for '{}': {}", call.function.name, e);
                Default::default()
            });
            ToolCallRequest {
                call_id: call.id,
                function_name: call.function.name,
                arguments,
            }
        })
        .collect();

    RunSnapshot {
        run_id: run.id,
        state,
        tool_calls,
        last_error: run.last_error.map(|e| e.message),
    }
}

fn agent_message(message: MessageObject) -> AgentMessage {
    let role = match message.role {
        OpenAiRole::User => MessageRole::User,
        OpenAiRole::Assistant => MessageRole::Assistant,
    };
    let text = message
        .content
        .into_iter()
        .filter_map(|content| match content {
            MessageContent::Text(text) => Some(text.text.value),
            _ => None,
        })
        .collect();

    AgentMessage {
        role,
        text,
        run_id: message.run_id,
    }
}
