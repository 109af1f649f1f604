use std::time::Duration;

use clap::{Parser, Subcommand};
use ollama_relay::client::GenerationClient;
use ollama_relay_cli::commands::{GenerateCommand, StatusCommand};
use ollama_relay_cli::error::CliResult;
use ollama_relay_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Relay CLI - talk to an Ollama relay from the terminal")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(
        long,
        global = true,
        default_value = "http://127.0.0.1:3210",
        help = "Base URL of the relay"
    )]
    pub relay_url: String,

    #[clap(
        long,
        global = true,
        default_value_t = 300,
        help = "Timeout in seconds for non-streaming calls"
    )]
    pub timeout_secs: u64,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Show upstream availability and models")]
    Status(StatusCommand),

    #[clap(about = "Generate text through the relay")]
    Generate(GenerateCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let client = GenerationClient::new(&cli.relay_url, Duration::from_secs(cli.timeout_secs))?;

    match &cli.command {
        Command::Status(cmd) => cmd.execute(&client, format).await,
        Command::Generate(cmd) => cmd.execute(&client, format).await,
    }
}
