//! Procurement Agent: commodity analytics with a tool-calling assistant
//!
//! Entry point. Loads configuration, initialises structured logging,
//! validates and preloads the datasets, and serves the HTTP boundary
//! until Ctrl+C.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use procurement_agent::agent::Agent;
use procurement_agent::config::{self, AppConfig};
use procurement_agent::data::DataLoader;
use procurement_agent::llm::ollama::OllamaClient;
use procurement_agent::llm::ChatModel;
use procurement_agent::query::QueryEngine;
use procurement_agent::server::{self, routes, AppState};

const BANNER: &str = r#"
 ____                                                       _
|  _ \ _ __ ___   ___ _   _ _ __ ___ _ __ ___   ___ _ __ | |_
| |_) | '__/ _ \ / __| | | | '__/ _ \ '_ ` _ \ / _ \ '_ \| __|
|  __/| | | (_) | (__| |_| | | |  __/ | | | | |  __/ | | | |_
|_|   |_|  \___/ \___|\__,_|_|  \___|_| |_| |_|\___|_| |_|\__|

  Procurement Agent v0.1.0 · energy & cotton sourcing analytics
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // config.toml is optional; env vars override it
    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");

    for (setting, value) in cfg.summary() {
        info!(setting, %value, "Configuration");
    }
    cfg.validate()?;

    // -- Data --------------------------------------------------------------

    let engine = Arc::new(QueryEngine::new(DataLoader::new(&cfg.data.path)));

    // Corrupt files fail here, before any query runs.
    let overview = routes::dataset_overview(&engine).context("Dataset files failed to load")?;
    for ds in &overview {
        if ds.observations == 0 {
            warn!(dataset = ds.name, folder = ds.folder, "No historical data found");
        } else {
            info!(
                dataset = ds.name,
                observations = ds.observations,
                forecast_horizon = ds.forecast_horizon,
                drivers = ds.drivers,
                "Dataset loaded"
            );
        }
    }

    // -- LLM + agent -------------------------------------------------------

    let mut client = OllamaClient::new(
        &cfg.llm.base_url,
        Some(cfg.llm.model.clone()),
        Some(cfg.llm.temperature),
    )?;
    if let Some(env) = &cfg.llm.api_key_env {
        match AppConfig::resolve_env(env) {
            Ok(key) => client = client.with_api_key(SecretString::new(key)),
            Err(e) => warn!(error = %e, "API key variable configured but unset; sending no key"),
        }
    }
    let model_name = client.model_name().to_string();
    info!(model = %model_name, endpoint = client.endpoint(), "Using OpenAI-compatible chat endpoint");

    let agent = Agent::new(Arc::new(client), Arc::clone(&engine), cfg.llm.max_tool_rounds);
    let state = Arc::new(AppState::new(engine, agent, model_name));

    // -- Serve -------------------------------------------------------------

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("Invalid server address {}:{}", cfg.server.host, cfg.server.port))?;

    info!("Serving. Press Ctrl+C to stop.");
    server::serve(state, addr, shutdown_signal()).await?;

    info!("Procurement agent shut down cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received."),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("procurement_agent=info"));

    let json_logging = std::env::var("PROCUREMENT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
