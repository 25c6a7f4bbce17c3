//! # Sync Subcommand
//!
//! Runs one sync for one certificate from a JSON vault file and prints the
//! [`SyncReport`] as JSON. Summaries go to a JSON Lines file when `--out`
//! is given. Without it they appear only in the printed report, yet the
//! cursor still advances past them: capture stdout, or rerun with
//! `--from-nsu` to fetch the range again.
//!
//! Endpoint settings come from `DFE_*` environment variables
//! ([`DistributionConfig::from_env`]); flags override them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use url::Url;

use dfe_client::config::{DEFAULT_ENDPOINT, HOMOLOGATION_ENDPOINT};
use dfe_client::{DistributionConfig, MutualTlsTransport};
use dfe_core::{CertificateId, Environment, Nsu};
use dfe_sync::{
    CursorTracker, DocumentSink, JsonFileVault, JsonLinesSink, MemorySink, SyncError, SyncReport,
};

use crate::{print_json, EXIT_TEMPFAIL};

/// Arguments for the `dfe sync` subcommand.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Path to the certificate vault file.
    #[arg(long, env = "DFE_VAULT")]
    pub vault: PathBuf,

    /// Certificate identifier (`certificate:<uuid>` or a bare UUID).
    #[arg(long)]
    pub certificate: CertificateId,

    /// Request documents after this NSU instead of the stored cursor.
    #[arg(long)]
    pub from_nsu: Option<Nsu>,

    /// Append decoded summaries to this JSON Lines file. Without it they
    /// are only printed in the report, and the cursor still advances.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Service endpoint (overrides `DFE_ENDPOINT`).
    #[arg(long)]
    pub endpoint: Option<Url>,

    /// Service environment: `production` or `homologation`.
    #[arg(long)]
    pub environment: Option<Environment>,

    /// Request timeout in seconds (overrides `DFE_TIMEOUT_SECS`).
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Execute the sync subcommand.
pub fn run_sync(args: &SyncArgs) -> Result<u8> {
    let config = resolve_config(args)?;
    let vault = Arc::new(
        JsonFileVault::open(&args.vault)
            .with_context(|| format!("failed to open vault {}", args.vault.display()))?,
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let outcome = match &args.out {
        Some(path) => {
            let sink = JsonLinesSink::open(path)
                .with_context(|| format!("failed to open output {}", path.display()))?;
            runtime.block_on(execute(vault, Arc::new(sink), config, args))
        }
        None => {
            tracing::warn!(
                certificate = %args.certificate,
                "no --out file; summaries are only printed and the cursor still advances"
            );
            runtime.block_on(execute(vault, Arc::new(MemorySink::new()), config, args))
        }
    };

    match outcome {
        Ok(report) => {
            print_json(&report)?;
            Ok(0)
        }
        Err(err) if err.is_retryable() => {
            tracing::error!(certificate = %args.certificate, "{err}; retry later");
            Ok(EXIT_TEMPFAIL)
        }
        Err(err) => Err(err).with_context(|| format!("sync failed for {}", args.certificate)),
    }
}

async fn execute<S: DocumentSink>(
    vault: Arc<JsonFileVault>,
    sink: Arc<S>,
    config: DistributionConfig,
    args: &SyncArgs,
) -> Result<SyncReport, SyncError> {
    let transport = MutualTlsTransport::new(config.clone());
    let tracker = CursorTracker::new(vault, transport, sink, config);
    match args.from_nsu {
        Some(from) => tracker.run_sync_from(args.certificate, from).await,
        None => tracker.run_sync(args.certificate).await,
    }
}

/// Environment configuration with flag overrides applied. Choosing an
/// environment without an explicit endpoint selects that environment's
/// default endpoint.
pub fn resolve_config(args: &SyncArgs) -> Result<DistributionConfig> {
    let mut config = DistributionConfig::from_env().context("invalid DFE_* environment")?;

    if let Some(environment) = args.environment {
        config.environment = environment;
        if args.endpoint.is_none() {
            let default = match environment {
                Environment::Production => DEFAULT_ENDPOINT,
                Environment::Homologation => HOMOLOGATION_ENDPOINT,
            };
            config.endpoint = Url::parse(default).context("invalid built-in endpoint")?;
        }
    }
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }
    Ok(config)
}
