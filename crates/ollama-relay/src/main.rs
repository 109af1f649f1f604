//! Ollama Relay daemon - pass-through HTTP relay for a local inference server

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ollama_relay::config::Config;
use ollama_relay::error::Result;
use ollama_relay::relay::RelayServer;

/// Ollama Relay - forwards generation requests to Ollama and streams the answer back
#[derive(Parser)]
#[command(name = "ollama-relay")]
#[command(about = "Forwards generation requests to Ollama and streams the answer back")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(long, global = true)]
    pub listen: Option<String>,

    /// Upstream Ollama base URL, overriding the config file
    #[arg(long, global = true)]
    pub upstream: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the relay server (default command)
    #[command(name = "serve")]
    Serve,

    /// Load and validate the configuration, then print it
    #[command(name = "check-config")]
    CheckConfig,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::CheckConfig) => {
            config.validate()?;
            println!("{config:#?}");
            Ok(())
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ollama_relay=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen.clone();
    }
    if let Some(upstream) = &cli.upstream {
        config.upstream.base_url = upstream.clone();
    }

    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting Ollama relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Config loaded: {:?}", config);

    RelayServer::new(config).serve().await?;

    tracing::info!("Ollama relay stopped");
    Ok(())
}
