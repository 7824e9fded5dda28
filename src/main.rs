//! # Cockpit Bridge
//!
//! Mirrors the F-16 DED onto a serial-attached display and routes panel
//! input back into the simulator.
//!
//! ```text
//! cockpit-bridge <CONFIG> <DCS|BMS>
//! ```
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging (`RUST_LOG` overrides the default `info` level)
//!    - Load and validate the JSON configuration
//!    - Open the serial endpoints and build the mode's telemetry source
//!
//! 2. **Main Loop**
//!    - Refresh telemetry, update the display if it changed, handle one
//!      inbound panel event
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C stops the loop and joins the ingestion task

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cockpit_bridge::bridge::{Bridge, Mode};
use cockpit_bridge::config::Config;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the JSON configuration file
    config: PathBuf,

    /// Simulator to attach to (DCS or BMS)
    #[arg(value_parser = str::parse::<Mode>)]
    mode: Mode,
}

/// Log filter from `RUST_LOG`, or `info` when it is unset or invalid
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so buffered log lines are flushed on exit
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(writer)
        .init();

    info!("Cockpit Bridge v{} starting in {} mode", env!("CARGO_PKG_VERSION"), args.mode);

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let bridge = Bridge::build(&config, args.mode)
        .await
        .context("Failed to start bridge")?;
    bridge.run().await?;

    info!("Cockpit Bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["cockpit-bridge", "config.json", "BMS"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert_eq!(args.mode, Mode::Bms);
    }

    #[test]
    fn test_args_reject_unknown_mode() {
        let err = Args::try_parse_from(["cockpit-bridge", "config.json", "XPLANE"]).unwrap_err();
        assert!(err.to_string().contains("Invalid mode 'XPLANE': expected DCS or BMS"));
    }

    #[test]
    fn test_args_require_both_positionals() {
        assert!(Args::try_parse_from(["cockpit-bridge", "config.json"]).is_err());
        assert!(Args::try_parse_from(["cockpit-bridge"]).is_err());
    }

    #[test]
    fn test_log_filter_follows_rust_log() {
        use tracing::level_filters::LevelFilter;

        std::env::set_var("RUST_LOG", "debug");
        let filter = log_filter();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(tracing::Level::DEBUG));
        });

        std::env::remove_var("RUST_LOG");
        assert_eq!(log_filter().max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
