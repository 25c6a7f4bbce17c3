//! # dfe-cli: Operator CLI for the DF-e Distribution Client
//!
//! Provides the `dfe` command-line interface.
//!
//! ## Subcommands
//!
//! - `dfe sync`: Run one incremental (or overridden) sync for a certificate.
//! - `dfe vault`: Import certificates into a vault file and list them.
//! - `dfe inspect`: Parse a request or response envelope from disk.
//!
//! ```bash
//! dfe vault import --vault vault.json --pkcs12 empresa.pfx \
//!     --passphrase-env DFE_PKCS12_PASSPHRASE --cnpj 11222333000181 \
//!     --expires-at 2026-12-31T23:59:59Z
//! dfe sync --vault vault.json --certificate <id> --out documents.jsonl
//! dfe inspect response captured.xml --decode
//! ```

pub mod inspect;
pub mod sync;
pub mod vault;

use serde::Serialize;

/// Exit code for failures worth retrying later (sysexits `EX_TEMPFAIL`).
pub const EXIT_TEMPFAIL: u8 = 75;

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
