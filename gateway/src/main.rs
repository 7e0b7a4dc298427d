use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use council_core::config::Settings;
use council_core::llm::Brain;
use council_core::{QueryRouter, Runtime};
use council_gateway::{create_router, AppState};
use council_tools::build_registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging Setup
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    info!("Council Gateway Initializing...");
    let settings = Settings::from_env().context("Failed to load settings")?;

    // 2. Initialize The Brain (the hosted agents)
    info!("Connecting to OpenAI Brain...");
    let brain = Brain::new(&settings.openai);
    let agents = &settings.agents;
    let mut roles = vec![
        ("classifier", agents.classifier.as_str()),
        ("information", agents.information.as_str()),
        ("eligibility", agents.eligibility.as_str()),
    ];
    if let Some(postcode) = &agents.postcode {
        roles.push(("postcode", postcode.as_str()));
    }
    for (role, agent_id) in roles {
        // Quick connectivity check; a missing agent only fails the turns that need it
        match brain.describe_agent(agent_id).await {
            Ok(name) => info!("Agent '{}' online: {}", role, name),
            Err(e) => error!("Agent '{}' ({}) is unreachable: {}", role, agent_id, e),
        }
    }

    // 3. Load The Registry (the local tools)
    info!("Loading Tool Registry...");
    let registry = build_registry(&settings.tools).context("Failed to build tool registry")?;
    info!("Loaded {} tools available for the agents.", registry.len());

    // 4. Initialize The Runtime (the relay loop) and the Router
    let runtime = Runtime::new(Arc::new(brain), Arc::new(registry))
        .with_poll_interval(settings.relay.poll_interval)
        .with_run_timeout(settings.relay.run_timeout);
    let router = QueryRouter::new(runtime, settings.agents.clone());

    // 5. Routes and Server
    let app = create_router(AppState::new(Arc::new(router)));
    let listener = TcpListener::bind(&settings.gateway_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.gateway_addr))?;
    info!("Gateway listening on {}...", settings.gateway_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
