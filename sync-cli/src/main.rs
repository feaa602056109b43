//! # codesync
//!
//! CLI tool for Code Sync.
//!
//! ## Commands
//!
//! - `preview`: Render the live-preview document of an HTML file
//! - `validate`: Check join-form input without contacting a server
//! - `new-room`: Generate a fresh room id
//! - `demo`: Run two clients against an in-memory hub
//!
//! ## Example
//!
//! ```bash
//! # Render a fragment the way peers would see it
//! codesync preview index.html > preview.html
//!
//! # Check join input
//! codesync validate --username alice --room room-42 --json
//!
//! # Watch two peers collaborate
//! codesync demo --room room-42
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use codesync_core::PreviewMode;

mod commands;
mod config;

use commands::{demo, preview, room, validate};

/// Default configuration file, read when present.
const DEFAULT_CONFIG: &str = "codesync.toml";

/// CLI tool for Code Sync.
#[derive(Parser, Debug)]
#[command(name = "codesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML). Missing default file means built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the live-preview document of an HTML file
    Preview {
        /// Source file
        file: PathBuf,

        /// Preview presentation (panel or inline)
        #[arg(long, short)]
        mode: Option<PreviewMode>,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Check join-form input
    Validate {
        /// Display name
        #[arg(long, short)]
        username: String,

        /// Room to join
        #[arg(long, short)]
        room: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a fresh room id
    NewRoom,

    /// Run two clients against an in-memory hub
    Demo {
        /// Room both clients join
        #[arg(long, short, default_value = "demo-room")]
        room: String,

        /// Document the clients edit
        #[arg(long, short, default_value = "index.html")]
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = config::load(cli.config.as_deref(), DEFAULT_CONFIG)?;

    match cli.command {
        Commands::Preview { file, mode, output } => {
            let mode = mode.unwrap_or(config.preview_mode);
            preview::run(&file, mode, output.as_deref(), &config).await?;
        }
        Commands::Validate {
            username,
            room,
            json,
        } => {
            validate::run(&username, &room, json)?;
        }
        Commands::NewRoom => {
            room::run();
        }
        Commands::Demo { room, file } => {
            demo::run(&room, &file, config).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so stdout stays clean for artifacts and JSON
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}
