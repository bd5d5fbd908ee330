//! PingCord CLI — entry point.
//!
//! # Commands
//!
//! - `pingcord send --template KEY --data JSON` — deliver one item right away
//! - `pingcord run [--input FILE] [--buffered]` — deliver JSON-lines items
//! - `pingcord status` — show configuration and registered templates

mod deliver;
mod helpers;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use pingcord_core::config::load_config;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// PingCord — rate-limited Discord notifications from templates
#[derive(Parser)]
#[command(name = "pingcord", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.pingcord/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one template and post it immediately
    Send {
        /// Template key from the config's `templates` section
        #[arg(short, long)]
        template: String,

        /// Template data: a JSON object (named) or array (positional)
        #[arg(short, long)]
        data: String,
    },

    /// Deliver items read as JSON lines from a file or stdin
    Run {
        /// Input file. Omit to read stdin.
        #[arg(short, long)]
        input: Option<String>,

        /// Aggregate per recipient and post once at the end
        #[arg(long, default_value_t = false)]
        buffered: bool,
    },

    /// Show configuration and template status
    Status,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path: Option<PathBuf> = cli.config.as_deref().map(helpers::expand_tilde);
    let config = load_config(config_path.as_deref());

    match cli.command {
        Commands::Send { template, data } => deliver::send(&config, &template, &data).await,
        Commands::Run { input, buffered } => {
            let input = input.as_deref().map(helpers::expand_tilde);
            deliver::run(&config, input, buffered).await
        }
        Commands::Status => status::run(&config, config_path),
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("pingcord=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
