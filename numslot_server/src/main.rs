//! # numslot server
//!
//! Consumer side of the slot exchange. Creates the shared memory object,
//! prints every number the client publishes and removes the object on exit.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: /posix-shar-object, 100 ms poll
//! numslot_server
//!
//! # Custom object and config file
//! numslot_server --config numslot.toml --name demo-slot -v
//! ```
//!
//! Ctrl-C stops both the server and the attached client. SIGTERM stops only
//! the server; the client notices the finished slot by itself.
//!
//! Exit codes: `0` clean shutdown, `1` setup failure, `2` cleanup failure.

use clap::Parser;
use numslot_common::config::{ConfigLoader, NumslotConfig};
use numslot_shm::{Role, TracingSink, init_tracing};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};

/// numslot server - drains numbers from the shared slot
#[derive(Parser, Debug)]
#[command(name = "numslot_server")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Consumer host for the single-slot shared memory exchange")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Shared memory object name (leading `/` optional).
    #[arg(long)]
    name: Option<String>,

    /// Poll interval in milliseconds.
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let config = load_config(&args);
    let level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    init_tracing(level, args.verbose, args.json);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {e}");
            process::exit(1);
        }
    };

    info!(
        "numslot server v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let mut sink = TracingSink::new(Role::Consumer);
    match numslot_shm::run(Role::Consumer, &config.exchange, &mut sink) {
        Ok(summary) if summary.is_clean() => {
            info!("numslot server shutdown complete, {} values received", summary.values);
        }
        Ok(summary) => {
            warn!(
                "numslot server stopped with {} cleanup error(s)",
                summary.teardown_errors.len()
            );
            process::exit(2);
        }
        Err(e) => {
            error!("FATAL: {e}");
            process::exit(1);
        }
    }
}

/// Load the file (or defaults), apply CLI overrides and validate.
fn load_config(args: &Args) -> Result<NumslotConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => NumslotConfig::load(path)
            .map_err(|e| format!("loading {}: {e}", path.display()))?,
        None => NumslotConfig::default(),
    };

    if let Some(name) = &args.name {
        config.exchange.shm_name = name.clone();
    }
    if let Some(ms) = args.interval_ms {
        config.exchange.consumer_interval_ms = ms;
    }

    config.validate()?;
    Ok(config)
}
