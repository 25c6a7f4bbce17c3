//! # dfe CLI entry point
//!
//! Parses command-line arguments, sets up logging, and dispatches to the
//! subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dfe_cli::inspect::{run_inspect, InspectArgs};
use dfe_cli::sync::{run_sync, SyncArgs};
use dfe_cli::vault::{run_vault, VaultArgs};

/// DF-e distribution client.
///
/// Fetches tax documents addressed to a taxpayer from the national
/// distribution service, one NSU batch at a time.
#[derive(Parser, Debug)]
#[command(name = "dfe", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one sync for a certificate and print the report.
    Sync(SyncArgs),

    /// Import and list certificates in a vault file.
    Vault(VaultArgs),

    /// Parse a request or response envelope from disk.
    Inspect(InspectArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let result = match &cli.command {
        Commands::Sync(args) => run_sync(args),
        Commands::Vault(args) => run_vault(args),
        Commands::Inspect(args) => run_inspect(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

/// `RUST_LOG` wins over the verbosity flag when set.
fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
