mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use relay_config::{parse_config, validate_config, RelayConfig};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Request-routing orchestrator for LLM backends", long_about = None)]
struct Cli {
    /// Path to relay.yaml config
    #[arg(short, long, global = true, default_value = "relay.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a task with intelligent routing
    Run {
        /// Task prompt
        prompt: String,

        /// File to include as context (repeatable)
        #[arg(short, long)]
        file: Vec<String>,

        /// Backend to try before the routed candidates
        #[arg(short, long)]
        backend: Option<String>,

        /// Model override for HTTP backends
        #[arg(short, long)]
        model: Option<String>,

        /// Fan the task out to every enabled backend
        #[arg(long)]
        broadcast: bool,
    },

    /// List configured backends with health state
    Backends,

    /// Probe a single backend with a test prompt
    Test {
        /// Backend name
        name: String,

        /// Test prompt to send
        #[arg(short, long, default_value = "Hello")]
        prompt: String,
    },

    /// Dump the routing rule table
    Rules,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config);

    match cli.command {
        Commands::Run {
            prompt,
            file,
            backend,
            model,
            broadcast,
        } => {
            commands::run::execute(config, &prompt, &file, backend, model, broadcast).await?;
        }
        Commands::Backends => {
            commands::backends::execute(config).await?;
        }
        Commands::Test { name, prompt } => {
            commands::test::execute(config, &name, &prompt).await?;
        }
        Commands::Rules => {
            commands::rules::execute(config)?;
        }
    }

    Ok(())
}

/// Loads and validates the config, exiting with code 2 when it is invalid.
fn load_config(path: &str) -> RelayConfig {
    let config = match parse_config(Path::new(path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = validate_config(&config) {
        eprintln!("Configuration invalid: {e}");
        std::process::exit(2);
    }

    config
}
