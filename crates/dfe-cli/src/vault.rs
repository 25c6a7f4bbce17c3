//! # Vault Subcommand
//!
//! Administration of the JSON certificate vault. The sync engine never
//! creates records; they are imported here.
//!
//! - `import`: Validate a PKCS#12 file against its passphrase and add it.
//! - `list`: Print every certificate with its cursor. Bundles and
//!   passphrases are never printed.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use zeroize::Zeroizing;

use dfe_core::{AuthorityCode, CertificateId, Cnpj};
use dfe_sync::{Certificate, CertificateVault, Cursor, JsonFileVault};

use crate::print_json;

/// Arguments for the `dfe vault` subcommand.
#[derive(Args, Debug)]
pub struct VaultArgs {
    #[command(subcommand)]
    pub command: VaultCommand,
}

/// Vault subcommands.
#[derive(Subcommand, Debug)]
pub enum VaultCommand {
    /// Add a certificate record from a PKCS#12 file.
    Import {
        /// Path to the certificate vault file.
        #[arg(long, env = "DFE_VAULT")]
        vault: PathBuf,
        /// PKCS#12 (.pfx / .p12) file.
        #[arg(long)]
        pkcs12: PathBuf,
        /// Name of the environment variable holding the passphrase.
        #[arg(long, default_value = "DFE_PKCS12_PASSPHRASE")]
        passphrase_env: String,
        /// Taxpayer CNPJ, with or without punctuation.
        #[arg(long)]
        cnpj: String,
        /// Authority code (`cUFAutor`); the configured default when absent.
        #[arg(long)]
        uf: Option<AuthorityCode>,
        /// End of the certificate's validity (RFC 3339).
        #[arg(long)]
        expires_at: DateTime<Utc>,
        /// Per-certificate override of server certificate verification.
        #[arg(long)]
        accept_invalid_server_certs: Option<bool>,
    },

    /// List certificates and their cursors.
    List {
        /// Path to the certificate vault file.
        #[arg(long, env = "DFE_VAULT")]
        vault: PathBuf,
    },
}

/// Public view of a vault record.
#[derive(Debug, Serialize)]
pub struct CertificateView {
    pub id: CertificateId,
    pub cnpj: Cnpj,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<AuthorityCode>,
    pub active: bool,
    pub expires_at: DateTime<Utc>,
    pub cursor: Cursor,
}

impl From<&Certificate> for CertificateView {
    fn from(cert: &Certificate) -> Self {
        Self {
            id: cert.id,
            cnpj: cert.cnpj.clone(),
            authority: cert.authority,
            active: cert.active,
            expires_at: cert.expires_at,
            cursor: cert.cursor,
        }
    }
}

/// What `import` needs besides the vault and the bundle file.
#[derive(Debug)]
pub struct ImportRequest<'a> {
    pub cnpj: &'a str,
    pub authority: Option<AuthorityCode>,
    pub expires_at: DateTime<Utc>,
    pub accept_invalid_server_certs: Option<bool>,
}

/// Execute the vault subcommand.
pub fn run_vault(args: &VaultArgs) -> Result<u8> {
    match &args.command {
        VaultCommand::Import {
            vault,
            pkcs12,
            passphrase_env,
            cnpj,
            uf,
            expires_at,
            accept_invalid_server_certs,
        } => {
            let passphrase = Zeroizing::new(
                std::env::var(passphrase_env)
                    .with_context(|| format!("passphrase variable {passphrase_env} is not set"))?,
            );
            let request = ImportRequest {
                cnpj,
                authority: *uf,
                expires_at: *expires_at,
                accept_invalid_server_certs: *accept_invalid_server_certs,
            };
            let id = cmd_import(vault, pkcs12, &passphrase, &request)?;
            println!("{id}");
            Ok(0)
        }
        VaultCommand::List { vault } => {
            print_json(&cmd_list(vault)?)?;
            Ok(0)
        }
    }
}

/// Validate the bundle and store it as a new active record with a zero
/// cursor.
pub fn cmd_import(
    vault_path: &Path,
    pkcs12: &Path,
    passphrase: &str,
    request: &ImportRequest<'_>,
) -> Result<CertificateId> {
    let cnpj = Cnpj::new(request.cnpj).context("invalid CNPJ")?;
    let bundle =
        std::fs::read(pkcs12).with_context(|| format!("failed to read {}", pkcs12.display()))?;
    dfe_crypto::extract(&bundle, passphrase)
        .with_context(|| format!("{} cannot be used as a client identity", pkcs12.display()))?;

    if request.expires_at <= Utc::now() {
        bail!("certificate already expired at {}", request.expires_at);
    }

    let mut cert = Certificate::new(cnpj, STANDARD.encode(&bundle), passphrase, request.expires_at);
    cert.authority = request.authority;
    cert.accept_invalid_server_certs = request.accept_invalid_server_certs;
    let id = cert.id;

    let vault = JsonFileVault::open(vault_path)
        .with_context(|| format!("failed to open vault {}", vault_path.display()))?;
    vault.insert(cert)?;
    tracing::info!(certificate = %id, vault = %vault_path.display(), "certificate imported");
    Ok(id)
}

/// Every record in the vault, without secrets.
pub fn cmd_list(vault_path: &Path) -> Result<Vec<CertificateView>> {
    let vault = JsonFileVault::open(vault_path)
        .with_context(|| format!("failed to open vault {}", vault_path.display()))?;
    Ok(vault.list()?.iter().map(CertificateView::from).collect())
}
