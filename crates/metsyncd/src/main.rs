//! metsyncd — the metsync daemon.
//!
//! Scrapes Ceph RBD volume metrics, reads VM samples as JSON lines on
//! stdin, and writes one composite per correlated VM as JSON lines on
//! stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! metsyncd run --config /etc/metsync/metsync.toml
//! metsyncd replay --config metsync.toml --input samples.jsonl
//! metsyncd check-config --config metsync.toml
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use metsync_core::MetsyncConfig;

mod daemon;
mod replay;

#[derive(Parser)]
#[command(
    name = "metsyncd",
    about = "metsync — joins Ceph volume metrics into per-VM samples",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape Ceph and join against VM samples read from stdin.
    Run {
        /// Path to metsync.toml (defaults apply when omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Do not read VM samples from stdin.
        #[arg(long)]
        no_stdin: bool,
    },
    /// Feed a JSON-lines sample file through the engine once.
    Replay {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input file, `-` for stdin.
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a config file and print the effective settings.
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, no_stdin } => {
            let config = load_config(config.as_deref())?;
            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(daemon::run(config, !no_stdin));
            runtime.shutdown_timeout(Duration::from_secs(5));
            result
        }
        Command::Replay {
            config,
            input,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            replay::replay_file(&config, &input, output.as_deref())
        }
        Command::CheckConfig { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// Used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,metsyncd=debug,metsync_engine=debug,metsync_collector=debug";

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MetsyncConfig> {
    match path {
        Some(path) => {
            let config = MetsyncConfig::from_file(path)?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => {
            info!("no config file given, using defaults");
            Ok(MetsyncConfig::default())
        }
    }
}
