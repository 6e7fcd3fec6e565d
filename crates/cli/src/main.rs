//! tracefold CLI: the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP gateway
//! - `chat`    Interactive or single-message run of one surface
//! - `replay`  Rebuild a view model from a saved log
//! - `init`    Write the default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracefold::replay::parse_status;
use tracefold_agent::Surface;
use tracefold_config::AppConfig;
use tracefold_core::StreamStatus;

mod commands;

#[derive(Parser)]
#[command(
    name = "tracefold",
    about = "tracefold: streaming agent surfaces with progress and concept-tree views",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a surface in the terminal
    Chat {
        /// chat, dev or research
        #[arg(short, long, default_value = "chat")]
        surface: Surface,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print the view model of a saved log as JSON
    Replay {
        /// JSON array of turns, or JSON lines of turns and stream events
        file: PathBuf,

        /// chat, dev or research
        #[arg(short, long, default_value = "chat")]
        surface: Surface,

        /// Override the stream status (idle, submitted, streaming, error)
        #[arg(long, value_parser = parse_status)]
        status: Option<StreamStatus>,
    },

    /// Write the default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize tracing
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    let level = if cli.verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("info")
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Init { force } => commands::init::run(force)?,
        Commands::Replay {
            file,
            surface,
            status,
        } => commands::replay::run(&file, surface, status)?,
        Commands::Serve { port } => {
            let config = config.map_err(|e| format!("Failed to load config: {e}"))?;
            commands::serve::run(config, port).await?
        }
        Commands::Chat { surface, message } => {
            let config = config.map_err(|e| format!("Failed to load config: {e}"))?;
            commands::chat::run(config, surface, message).await?
        }
    }

    Ok(())
}
