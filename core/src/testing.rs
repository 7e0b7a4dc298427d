//! In-memory agent platform that replays scripted runs.
//!
//! Each agent id owns a queue of [`ScriptedRun`]s; starting a run on that
//! agent consumes the next one (or an immediately completed, silent run when
//! the queue is empty). Every poll or tool submission advances the run by one
//! step, and the last step repeats forever. When a run reaches `Completed`,
//! its scripted reply is appended to the thread as an assistant message.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CouncilError, Result};
use crate::platform::{AgentMessage, AgentPlatform, MessageRole, RunSnapshot, RunState, ToolCallRequest, ToolCallResult};

#[derive(Debug, Clone)]
enum Step {
    State(RunState),
    ToolCalls(Vec<ToolCallRequest>),
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    steps: Vec<Step>,
    reply: Option<String>,
    rejection: Option<String>,
}

impl ScriptedRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// A run that completes straight away with `text` as its reply.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::new().then(RunState::Completed).reply(text)
    }

    /// Starting this run fails with a platform error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            rejection: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn then(mut self, state: RunState) -> Self {
        self.steps.push(Step::State(state));
        self
    }

    pub fn then_tool_calls(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.steps.push(Step::ToolCalls(calls));
        self
    }

    pub fn reply(mut self, text: impl Into<String>) -> Self {
        self.reply = Some(text.into());
        self
    }
}

struct ActiveRun {
    thread_id: String,
    steps: Vec<Step>,
    cursor: usize,
    reply: Option<String>,
    replied: bool,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<String, VecDeque<ScriptedRun>>,
    threads: HashMap<String, Vec<AgentMessage>>,
    runs: HashMap<String, ActiveRun>,
    started: Vec<String>,
    submissions: Vec<Vec<ToolCallResult>>,
    cancelled: Vec<String>,
    stall_cancels: bool,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }

    fn snapshot(&mut self, run_id: &str) -> Result<RunSnapshot> {
        let run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| CouncilError::Platform(format!("no run '{}'", run_id)))?;

        let (state, tool_calls) = match &run.steps[run.cursor] {
            Step::State(state) => (*state, Vec::new()),
            Step::ToolCalls(calls) => (RunState::AwaitingToolOutput, calls.clone()),
        };

        if state == RunState::Completed && !run.replied {
            run.replied = true;
            if let Some(text) = run.reply.clone() {
                let thread_id = run.thread_id.clone();
                self.threads.entry(thread_id).or_default().push(AgentMessage {
                    role: MessageRole::Assistant,
                    text: vec![text],
                    run_id: Some(run_id.to_string()),
                });
            }
        }

        Ok(RunSnapshot {
            run_id: run_id.to_string(),
            state,
            tool_calls,
            last_error: (state == RunState::Failed).then(|| "scripted failure".to_string()),
        })
    }

    fn advance(&mut self, run_id: &str) -> Result<()> {
        let run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| CouncilError::Platform(format!("no run '{}'", run_id)))?;
        if run.cursor + 1 < run.steps.len() {
            run.cursor += 1;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedPlatform {
    inner: Mutex<Inner>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `run` for the next start of `agent_id`.
    pub fn script(&self, agent_id: &str, run: ScriptedRun) {
        self.lock()
            .scripts
            .entry(agent_id.to_string())
            .or_default()
            .push_back(run);
    }

    /// Agent ids in the order their runs were started.
    pub fn started_agents(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    /// Every tool output batch, in submission order.
    pub fn submissions(&self) -> Vec<Vec<ToolCallResult>> {
        self.lock().submissions.clone()
    }

    /// Cancel requests are recorded but never answered.
    pub fn stall_cancels(&self) {
        self.lock().stall_cancels = true;
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.lock().cancelled.clone()
    }

    pub fn thread_count(&self) -> usize {
        self.lock().threads.len()
    }

    pub fn messages(&self, thread_id: &str) -> Vec<AgentMessage> {
        self.lock().threads.get(thread_id).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AgentPlatform for ScriptedPlatform {
    async fn create_thread(&self) -> Result<String> {
        let mut inner = self.lock();
        let id = inner.next_id("thread");
        inner.threads.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn post_user_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let mut inner = self.lock();
        let thread = inner
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| CouncilError::Platform(format!("no thread '{}'", thread_id)))?;
        thread.push(AgentMessage {
            role: MessageRole::User,
            text: vec![content.to_string()],
            run_id: None,
        });
        Ok(())
    }

    async fn start_run(&self, thread_id: &str, agent_id: &str) -> Result<RunSnapshot> {
        let mut inner = self.lock();
        if !inner.threads.contains_key(thread_id) {
            return Err(CouncilError::Platform(format!("no thread '{}'", thread_id)));
        }

        let script = inner
            .scripts
            .get_mut(agent_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ScriptedRun::new().then(RunState::Completed));
        inner.started.push(agent_id.to_string());

        if let Some(message) = script.rejection {
            return Err(CouncilError::Platform(message));
        }

        let steps = if script.steps.is_empty() {
            vec![Step::State(RunState::Completed)]
        } else {
            script.steps
        };
        let run_id = inner.next_id("run");
        inner.runs.insert(
            run_id.clone(),
            ActiveRun {
                thread_id: thread_id.to_string(),
                steps,
                cursor: 0,
                reply: script.reply,
                replied: false,
            },
        );
        inner.snapshot(&run_id)
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        let mut inner = self.lock();
        inner.advance(run_id)?;
        inner.snapshot(run_id)
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolCallResult],
    ) -> Result<RunSnapshot> {
        let mut inner = self.lock();
        let current = inner.snapshot(run_id)?;
        if current.state != RunState::AwaitingToolOutput {
            return Err(CouncilError::Platform(format!(
                "run '{}' is {} and takes no tool outputs",
                run_id, current.state
            )));
        }
        inner.submissions.push(outputs.to_vec());
        inner.advance(run_id)?;
        inner.snapshot(run_id)
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<()> {
        let stalled = {
            let mut inner = self.lock();
            inner.cancelled.push(run_id.to_string());
            if let Some(run) = inner.runs.get_mut(run_id) {
                run.steps = vec![Step::State(RunState::Failed)];
                run.cursor = 0;
            }
            inner.stall_cancels
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<AgentMessage>> {
        self.lock()
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| CouncilError::Platform(format!("no thread '{}'", thread_id)))
    }
}
