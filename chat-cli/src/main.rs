//! # parlor
//!
//! Terminal client for parlor one-to-one chat.
//!
//! ## Commands
//!
//! - `login`: Sign in and remember the identity
//! - `logout`: Forget the identity
//! - `status`: Show sign-in, endpoints and read cursors
//! - `conversations`: List conversations, newest first
//! - `open`: Show a conversation and mark it read
//! - `send`: Send a message
//! - `watch`: Follow new messages live
//!
//! ## Example
//!
//! ```bash
//! # Sign in
//! parlor login alice
//!
//! # See who wrote
//! parlor conversations
//!
//! # Reply
//! parlor send bob "on my way"
//!
//! # Keep the list open
//! parlor watch
//! ```

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

use commands::{conversations, login, logout, open, send, status, watch, Context};
use config::Config;

/// Terminal client for parlor one-to-one chat.
#[derive(Parser, Debug)]
#[command(name = "parlor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the identity, config and read cursors
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: parlor.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "chat_client=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Use an in-memory server instead of the configured one (for testing/demo)
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and remember the identity
    Login {
        /// User name
        name: String,

        /// Email address; when given, the server's login endpoint is asked
        #[arg(long, short)]
        email: Option<String>,
    },

    /// Forget the signed-in identity
    Logout,

    /// Show sign-in, endpoints and read cursors
    Status,

    /// List conversations, newest first
    Conversations,

    /// Show a conversation and mark it read
    Open {
        /// The other participant
        peer: String,
    },

    /// Send a message
    Send {
        /// Recipient
        peer: String,

        /// Message text
        message: String,
    },

    /// Follow new messages until Ctrl-C
    Watch {
        /// Conversation to open first
        peer: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let config = Config::load(&data_dir, cli.config.as_deref())?;
    let ctx = Context {
        data_dir,
        config,
        mock: cli.mock,
    };

    match cli.command {
        Commands::Login { name, email } => login::run(&ctx, &name, email.as_deref()).await?,
        Commands::Logout => logout::run(&ctx).await?,
        Commands::Status => status::run(&ctx).await?,
        Commands::Conversations => conversations::run(&ctx).await?,
        Commands::Open { peer } => open::run(&ctx, &peer).await?,
        Commands::Send { peer, message } => send::run(&ctx, &peer, &message).await?,
        Commands::Watch { peer } => watch::run(&ctx, peer.as_deref()).await?,
    }

    Ok(())
}

/// Log to stderr; `--log-level` wins over `RUST_LOG`, default `info`.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Get the default data directory for parlor.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("chat", "parlor", "parlor")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
