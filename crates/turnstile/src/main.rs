// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turnstile - single-writer queue for SQLite.
//!
//! This is the binary entry point: a load generator that checks the queue
//! loses no updates, a diagnostics command, and a config dump.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod bench;
mod doctor;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use turnstile_config::model::TurnstileConfig;
use turnstile_core::TurnstileError;

/// Turnstile - single-writer queue for SQLite.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default search path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Hammer one counter from many concurrent writers and verify the result.
    Bench {
        /// Number of concurrent writers.
        #[arg(long, default_value_t = 100)]
        writers: usize,
        /// Override the configured admission queue capacity.
        #[arg(long)]
        capacity: Option<usize>,
        /// Print Prometheus metrics after the run.
        #[arg(long)]
        metrics: bool,
    },
    /// Run diagnostic checks against the configured database.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => turnstile_config::load_and_validate_path(path),
        None => turnstile_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            turnstile_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log.level);

    let result = match cli.command {
        Some(Commands::Bench {
            writers,
            capacity,
            metrics,
        }) => bench::run_bench(&config, writers, capacity, metrics).await,
        Some(Commands::Doctor { plain }) => {
            doctor::run_doctor(&config, cli.config.as_deref(), plain).await
        }
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("turnstile: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("turnstile: {e}");
        std::process::exit(1);
    }
}

fn print_config(config: &TurnstileConfig) -> Result<(), TurnstileError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| TurnstileError::Config(format!("failed to render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("turnstile={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}
