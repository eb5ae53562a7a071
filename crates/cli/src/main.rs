//! Parley CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write the default config file
//! - `chat`    — Talk to the agent from the terminal as one chat channel
//! - `config`  — Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use parley_config::AgentMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley — an AI participant for shared chat channels",
    version,
    author
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
    /// Initialize configuration
    Onboard,

    /// Chat with the agent from the terminal
    Chat {
        /// Channel id the terminal acts as
        #[arg(short, long, default_value = "cli")]
        channel: String,

        /// Guild id for policy and tool access checks
        #[arg(short, long)]
        guild: Option<String>,

        /// Author name for typed messages
        #[arg(short, long, default_value = "User")]
        author: String,

        /// Backend mode for this session (overrides the config file)
        #[arg(short, long)]
        mode: Option<AgentMode>,

        /// Read raw JSON message events instead of text lines
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Print the config file path
    Path,
    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            channel,
            guild,
            author,
            mode,
            json,
        } => {
            commands::chat::run(commands::chat::ChatOptions {
                channel,
                guild,
                author,
                mode,
                json,
            })
            .await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
