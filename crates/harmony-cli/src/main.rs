use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harmony_core::{
    BedrockHttpClient, EnvelopeBuilder, FallbackRouter, InboundPayload, PromptTemplate,
    ProviderAdapter, RequestHandler, ResponseEnvelope,
};
use harmony_gateway::GatewayServer;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::HarmonyConfig;

#[derive(Parser)]
#[command(name = "harmony")]
#[command(version)]
#[command(about = "Harmony — prompt facade with multi-provider model fallback")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP gateway until interrupted
    Serve,

    /// Send a one-shot task through the fallback chain
    Ask {
        /// The task text
        input: String,
    },

    /// List the provider chain in priority order
    Providers,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins unless --debug is given
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Providers => cmd_providers(&cli.config),
        Commands::Serve => cmd_serve(&cli.config).await,
        Commands::Ask { input } => cmd_ask(&cli.config, &input).await,
    }
}

/// Wire config into the process-wide handler. The HTTP client is built once here.
fn build_handler(config: &HarmonyConfig) -> Result<RequestHandler> {
    let registry = config.registry()?;
    let adapter = ProviderAdapter::new(config.generation.to_params(), config.extraction.to_plan());

    let api_key = Some(config.invocation.api_key.clone()).filter(|k| !k.is_empty());
    if api_key.is_none() {
        warn!("No invocation API key configured; requests will be sent unauthenticated");
    }
    let client = BedrockHttpClient::new(
        &config.invocation.resolved_endpoint(),
        api_key,
        Duration::from_secs(config.invocation.timeout_secs),
    )?;

    let mut router = FallbackRouter::new(registry, adapter, Arc::new(client));
    if let Some(secs) = config.invocation.request_timeout_secs {
        router = router.with_deadline(Duration::from_secs(secs));
    }

    let envelope = EnvelopeBuilder::new(PromptTemplate::new(config.prompt.preamble.clone()))
        .with_cors_allow_origin(config.gateway.cors_allow_origin.clone());

    info!(
        "Loaded {} providers (primary: {})",
        router.registry().len(),
        router.registry().primary().identifier
    );
    Ok(RequestHandler::new(envelope, router))
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Harmony initialized at {}", config_dir.display());
    println!(
        "Edit {} to configure the provider chain, or export AWS_BEARER_TOKEN_BEDROCK.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let config = HarmonyConfig::load(config_path)?;
    println!("{}", config.to_display_toml()?);
    Ok(())
}

fn cmd_providers(config_path: &Option<PathBuf>) -> Result<()> {
    let config = HarmonyConfig::load(config_path)?;
    let registry = config.registry()?;
    for (idx, spec) in registry.iter().enumerate() {
        let note = if spec.family.is_supported() {
            ""
        } else {
            "  (skipped)"
        };
        println!("{:>2}. [{}] {}{}", idx + 1, spec.family, spec.identifier, note);
    }
    Ok(())
}

async fn cmd_serve(config_path: &Option<PathBuf>) -> Result<()> {
    let config = HarmonyConfig::load(config_path)?;
    let handler = Arc::new(build_handler(&config)?);
    let bind = config.gateway.bind_addr()?;

    let shutdown = CancellationToken::new();
    let server = GatewayServer::new(bind, handler).spawn(shutdown.clone());

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    shutdown.cancel();

    server.await.context("Gateway task failed")?
}

async fn cmd_ask(config_path: &Option<PathBuf>, input: &str) -> Result<()> {
    let config = HarmonyConfig::load(config_path)?;
    let handler = build_handler(&config)?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let payload = InboundPayload::Object(serde_json::json!({ "input": input }));
    let envelope = handler.handle_with_cancel(payload, &cancel).await;
    watcher.abort();

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    ensure_success(&envelope)
}

/// Non-200 envelopes make the command fail after the envelope is printed
fn ensure_success(envelope: &ResponseEnvelope) -> Result<()> {
    if envelope.status_code != 200 {
        anyhow::bail!("Request failed with status {}", envelope.status_code);
    }
    Ok(())
}
