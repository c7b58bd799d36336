//! Server binary: load config, bootstrap the catalog, serve.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use toolgate::config::{cleanup_work_dir, Config};
use toolgate::remote::{AgentHub, PageFacade};
use toolgate::server::{router, AppState, ToolRegistry};
use toolgate::tools::{self, ToolContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolgate=info")),
        )
        .init();

    let config = Arc::new(Config::from_env().context("loading configuration")?);
    cleanup_work_dir(&config.work_dir);

    let hub = Arc::new(AgentHub::new(config.agent_secret.clone()));
    if config.agent_enabled {
        hub.start(&config.host, config.agent_port)
            .await
            .context("starting agent bridge")?;
    } else {
        info!("agent bridge disabled");
    }

    let ctx = ToolContext {
        config: config.clone(),
        page: PageFacade::new(hub.call_site()),
    };
    let mut registry = ToolRegistry::new();
    tools::bootstrap(&mut registry, &ctx).context("registering tools")?;
    info!(tools = registry.len(), "tool catalog ready");

    let state = AppState {
        registry: Arc::new(registry),
        config: config.clone(),
    };

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    info!(addr = %listener.local_addr()?, "serving /mcp");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    hub.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
