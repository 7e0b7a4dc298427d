//! Environment-driven settings.
//!
//! A `.env` file in the working directory is honoured. Required:
//! `OPENAI_API_KEY`, `CLASSIFIER_AGENT_ID`, `INFORMATION_AGENT_ID`,
//! `ELIGIBILITY_AGENT_ID`. Optional: `OPENAI_BASE_URL`, `POSTCODE_AGENT_ID`,
//! `RUN_POLL_INTERVAL_MS` (1000), `RUN_TIMEOUT_SECS` (120),
//! `POSTCODE_LOOKUP_URL`, `DISTANCE_API_URL` + `DISTANCE_API_KEY`,
//! `GATEWAY_ADDR` (`0.0.0.0:3000`).

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::router::AgentIds;
use crate::runtime::{DEFAULT_POLL_INTERVAL, DEFAULT_RUN_TIMEOUT};

pub const DEFAULT_GATEWAY_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub poll_interval: Duration,
    pub run_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistanceApiSettings {
    pub url: String,
    pub api_key: String,
}

/// Which optional tool backends are switched on.
#[derive(Debug, Clone, Default)]
pub struct ToolSettings {
    pub postcode_lookup_url: Option<String>,
    pub distance_api: Option<DistanceApiSettings>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub openai: OpenAiSettings,
    pub agents: AgentIds,
    pub relay: RelaySettings,
    pub tools: ToolSettings,
    pub gateway_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{} must be set in .env", key));

        let openai = OpenAiSettings {
            api_key: require("OPENAI_API_KEY")?,
            api_base: get("OPENAI_BASE_URL"),
        };

        let agents = AgentIds {
            classifier: require("CLASSIFIER_AGENT_ID")?,
            information: require("INFORMATION_AGENT_ID")?,
            eligibility: require("ELIGIBILITY_AGENT_ID")?,
            postcode: get("POSTCODE_AGENT_ID"),
        };

        let mut relay = RelaySettings::default();
        if let Some(ms) = parse_opt::<u64>(get("RUN_POLL_INTERVAL_MS"), "RUN_POLL_INTERVAL_MS")? {
            relay.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_opt::<u64>(get("RUN_TIMEOUT_SECS"), "RUN_TIMEOUT_SECS")? {
            anyhow::ensure!(secs > 0, "RUN_TIMEOUT_SECS must be greater than zero");
            relay.run_timeout = Duration::from_secs(secs);
        }

        let distance_api = match (get("DISTANCE_API_URL"), get("DISTANCE_API_KEY")) {
            (Some(url), Some(api_key)) => Some(DistanceApiSettings { url, api_key }),
            (Some(_), None) => anyhow::bail!("DISTANCE_API_KEY must be set when DISTANCE_API_URL is"),
            (None, _) => None,
        };
        let tools = ToolSettings {
            postcode_lookup_url: get("POSTCODE_LOOKUP_URL"),
            distance_api,
        };

        Ok(Self {
            openai,
            agents,
            relay,
            tools,
            gateway_addr: get("GATEWAY_ADDR").unwrap_or_else(|| DEFAULT_GATEWAY_ADDR.to_string()),
        })
    }
}

fn parse_opt<T>(value: Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.trim().parse::<T>().with_context(|| format!("Invalid value for {}: '{}'", key, v)))
        .transpose()
}
