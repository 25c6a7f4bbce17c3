//! # Inspect Subcommand
//!
//! Parses a SOAP envelope captured on disk and prints its normalized
//! structure as JSON. Useful for checking what was sent, or replaying a
//! response through the decoder without touching the vault.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::{json, Value};

use dfe_client::{decode, parse_request, parse_response};

use crate::print_json;

/// Arguments for the `dfe inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub command: InspectCommand,
}

/// Inspect subcommands.
#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// Parse a `nfeDistDFeInteresse` request envelope.
    Request {
        /// Envelope file.
        file: PathBuf,
    },

    /// Parse a `retDistDFeInt` response envelope.
    Response {
        /// Envelope file.
        file: PathBuf,
        /// Also decode the documents of the batch.
        #[arg(long)]
        decode: bool,
    },
}

/// Execute the inspect subcommand.
pub fn run_inspect(args: &InspectArgs) -> Result<u8> {
    let value = match &args.command {
        InspectCommand::Request { file } => inspect_request(&read(file)?)?,
        InspectCommand::Response { file, decode } => inspect_response(&read(file)?, *decode)?,
    };
    print_json(&value)?;
    Ok(0)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn inspect_request(raw: &[u8]) -> Result<Value> {
    let request = parse_request(raw).context("not a distribution request")?;
    Ok(serde_json::to_value(request)?)
}

pub fn inspect_response(raw: &[u8], decode_documents: bool) -> Result<Value> {
    let response = parse_response(raw).context("not a distribution response")?;
    if !decode_documents {
        return Ok(serde_json::to_value(response)?);
    }
    let batch = decode(&response.documents);
    Ok(json!({
        "response": serde_json::to_value(response)?,
        "summaries": serde_json::to_value(batch.summaries)?,
        "failures": serde_json::to_value(batch.failures)?,
    }))
}
