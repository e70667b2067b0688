//! # numslot client
//!
//! Producer side of the slot exchange. Attaches to the object the server
//! created and publishes a random number whenever the slot is free.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: /posix-shar-object, numbers 0..=999 every 500 ms
//! numslot_client
//!
//! # Reproducible run over a custom range
//! numslot_client --min -50 --max 50 --seed 7 -v
//! ```
//!
//! Start the server first; the client waits up to `attach_timeout_ms` for
//! it to size the object. Ctrl-C stops both sides.
//!
//! Exit codes: `0` clean shutdown, `1` setup failure, `2` cleanup failure.

use clap::Parser;
use numslot_common::config::{ConfigLoader, NumslotConfig};
use numslot_shm::{Role, TracingSink, init_tracing};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};

/// numslot client - publishes random numbers into the shared slot
#[derive(Parser, Debug)]
#[command(name = "numslot_client")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Producer host for the single-slot shared memory exchange")]
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

    /// Smallest generated value.
    #[arg(long, allow_negative_numbers = true)]
    min: Option<i64>,

    /// Largest generated value.
    #[arg(long, allow_negative_numbers = true)]
    max: Option<i64>,

    /// Fixed RNG seed for a reproducible sequence.
    #[arg(long)]
    seed: Option<u64>,

    /// How long to wait for the server to size the object (0 = no retry).
    #[arg(long, value_name = "MS")]
    attach_timeout_ms: Option<u64>,

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
        "numslot client v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let mut sink = TracingSink::new(Role::Producer);
    match numslot_shm::run(Role::Producer, &config.exchange, &mut sink) {
        Ok(summary) if summary.is_clean() => {
            info!("numslot client shutdown complete, {} values sent", summary.values);
        }
        Ok(summary) => {
            warn!(
                "numslot client stopped with {} cleanup error(s)",
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

    let exchange = &mut config.exchange;
    if let Some(name) = &args.name {
        exchange.shm_name = name.clone();
    }
    if let Some(ms) = args.interval_ms {
        exchange.producer_interval_ms = ms;
    }
    if let Some(min) = args.min {
        exchange.value_min = min;
    }
    if let Some(max) = args.max {
        exchange.value_max = max;
    }
    if let Some(seed) = args.seed {
        exchange.seed = Some(seed);
    }
    if let Some(ms) = args.attach_timeout_ms {
        exchange.attach_timeout_ms = ms;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_without_arguments() {
        let args = Args::parse_from(["numslot_client"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.exchange.shm_name, "posix-shar-object");
        assert_eq!(config.exchange.producer_interval_ms, 500);
        assert_eq!((config.exchange.value_min, config.exchange.value_max), (0, 999));
        assert_eq!(config.exchange.seed, None);
    }

    #[test]
    fn cli_overrides_are_applied() {
        let args = Args::parse_from([
            "numslot_client",
            "--name",
            "/demo",
            "--interval-ms",
            "20",
            "--min",
            "-5",
            "--max",
            "5",
            "--seed",
            "9",
            "--attach-timeout-ms",
            "0",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.exchange.shm_name, "/demo");
        assert_eq!(config.exchange.producer_interval_ms, 20);
        assert_eq!((config.exchange.value_min, config.exchange.value_max), (-5, 5));
        assert_eq!(config.exchange.seed, Some(9));
        assert_eq!(config.exchange.attach_timeout_ms, 0);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let args = Args::parse_from(["numslot_client", "--min", "10", "--max", "1"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = Args::parse_from(["numslot_client", "--config", "/nonexistent/numslot.toml"]);
        assert!(load_config(&args).is_err());
    }
}
