//! Orchestration core: routes chat turns to hosted agents and relays local
//! tool calls back into their runs.

pub mod config;
pub mod error;
pub mod llm;
pub mod platform;
pub mod registry;
pub mod router;
pub mod runtime;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{CouncilError, Result};
pub use platform::{AgentMessage, AgentPlatform, MessageRole, RunSnapshot, RunState, ToolCallRequest, ToolCallResult};
pub use registry::{Tool, ToolArguments, ToolDefinition, ToolRegistry};
pub use router::{AgentIds, ChatSession, QueryRouter, Route, RouteOutcome};
pub use runtime::Runtime;
