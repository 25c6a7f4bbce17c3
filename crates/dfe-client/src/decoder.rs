//! # Batch Decoder
//!
//! Expands each `docZip` entry of a batch: base64 text, then a gzip stream,
//! then an XML document mapped to a [`DocumentSummary`] according to its
//! schema tag.
//!
//! Two schema families are understood:
//!
//! - `resNFe_*`: the compact summary the authority sends to interested
//!   parties who did not issue the note. Fields are flat children of
//!   `resNFe`.
//! - `procNFe_*`: the full authorized note (`nfeProc`) with its
//!   authorization protocol.
//!
//! A bad document never aborts the batch. Each failure is collected as a
//! [`DecodingError`] carrying the document's NSU, and decoding moves on.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate};
use dfe_core::{AccessKey, Nsu};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::DocumentEnvelope;
use crate::xml::{self, Element};

/// Upper bound on one inflated document.
pub const MAX_INFLATED_BYTES: usize = 16 * 1024 * 1024;

/// Offset used for the date-only `dEmi` field of older layouts (UTC-3).
const LEGACY_DATE_OFFSET_SECS: i32 = 3 * 3600;

/// Schema family of a distributed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// `resNFe`: summary of a note issued against the taxpayer.
    Resumo,
    /// `procNFe`: full authorized note.
    Processo,
}

impl SchemaKind {
    /// Classify a raw `schema` attribute such as `resNFe_v1.01`.
    pub fn classify(tag: &str) -> Option<Self> {
        if tag.starts_with("resNFe") {
            Some(Self::Resumo)
        } else if tag.starts_with("procNFe") {
            Some(Self::Processo)
        } else {
            None
        }
    }
}

/// The unit handed to the document sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// 44-digit access key; the idempotency key downstream.
    pub access_key: AccessKey,
    /// Issuer's legal name.
    pub issuer_name: String,
    /// Issuer's CNPJ or CPF, digits only.
    pub issuer_id: Option<String>,
    /// Total value as decimal text, e.g. `1500.00`.
    pub value: String,
    /// Emission timestamp with the issuer's offset.
    pub emitted_at: DateTime<FixedOffset>,
    /// `cSitNFe` for summaries, `infProt/cStat` for full notes.
    pub situation: Option<String>,
    /// Schema family.
    pub schema: SchemaKind,
    /// NSU the document arrived under.
    pub nsu: Nsu,
}

/// Why a single document could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DecodeFailure {
    #[error("invalid base64 payload: {0}")]
    Base64(String),
    #[error("invalid gzip stream: {0}")]
    Gzip(String),
    #[error("inflated document exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("malformed document XML: {0}")]
    Xml(String),
    #[error("unsupported schema {0:?}")]
    UnsupportedSchema(String),
    #[error("missing field <{0}>")]
    MissingField(&'static str),
    #[error("invalid value {value:?} for <{field}>")]
    InvalidField { field: &'static str, value: String },
}

/// A failure scoped to one document of a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("document NSU {nsu} (schema {schema}): {kind}")]
pub struct DecodingError {
    /// NSU of the failed document.
    pub nsu: Nsu,
    /// Raw schema attribute.
    pub schema: String,
    /// Cause.
    pub kind: DecodeFailure,
}

/// Result of decoding one batch. Both lists are in ascending NSU order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodedBatch {
    pub summaries: Vec<DocumentSummary>,
    pub failures: Vec<DecodingError>,
}

impl DecodedBatch {
    /// NSUs of the documents that failed.
    pub fn failed_nsus(&self) -> Vec<Nsu> {
        self.failures.iter().map(|f| f.nsu).collect()
    }
}

/// Decode every envelope of a batch.
pub fn decode(envelopes: &[DocumentEnvelope]) -> DecodedBatch {
    let mut ordered: Vec<&DocumentEnvelope> = envelopes.iter().collect();
    ordered.sort_by_key(|e| e.nsu);

    let mut batch = DecodedBatch::default();
    for envelope in ordered {
        match decode_one(envelope) {
            Ok(summary) => batch.summaries.push(summary),
            Err(kind) => {
                tracing::debug!(
                    nsu = envelope.nsu.value(),
                    schema = %envelope.schema,
                    error = %kind,
                    "document failed to decode"
                );
                batch.failures.push(DecodingError {
                    nsu: envelope.nsu,
                    schema: envelope.schema.clone(),
                    kind,
                });
            }
        }
    }
    batch
}

fn decode_one(envelope: &DocumentEnvelope) -> Result<DocumentSummary, DecodeFailure> {
    let schema = SchemaKind::classify(&envelope.schema)
        .ok_or_else(|| DecodeFailure::UnsupportedSchema(envelope.schema.clone()))?;
    let compressed = decode_base64(&envelope.payload)?;
    let inflated = inflate(&compressed)?;
    let root = xml::parse_document(&inflated).map_err(|e| DecodeFailure::Xml(e.to_string()))?;

    match schema {
        SchemaKind::Resumo => summarize_resumo(&root, envelope.nsu),
        SchemaKind::Processo => summarize_processo(&root, envelope.nsu),
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeFailure> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(DecodeFailure::Base64("empty payload".to_string()));
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecodeFailure::Base64(e.to_string()))
}

fn inflate(compressed: &[u8]) -> Result<Vec<u8>, DecodeFailure> {
    let mut out = Vec::new();
    GzDecoder::new(compressed)
        .take(MAX_INFLATED_BYTES as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| DecodeFailure::Gzip(e.to_string()))?;
    if out.len() > MAX_INFLATED_BYTES {
        return Err(DecodeFailure::TooLarge {
            limit: MAX_INFLATED_BYTES,
        });
    }
    Ok(out)
}

fn summarize_resumo(root: &Element, nsu: Nsu) -> Result<DocumentSummary, DecodeFailure> {
    let res = if root.name == "resNFe" {
        root
    } else {
        root.find("resNFe").ok_or(DecodeFailure::MissingField("resNFe"))?
    };

    Ok(DocumentSummary {
        access_key: access_key(required(res, "chNFe")?)?,
        issuer_name: required(res, "xNome")?.to_string(),
        issuer_id: tax_id(res),
        value: decimal(required(res, "vNF")?, "vNF")?,
        emitted_at: timestamp(required(res, "dhEmi")?, "dhEmi")?,
        situation: Some(required(res, "cSitNFe")?.to_string()),
        schema: SchemaKind::Resumo,
        nsu,
    })
}

fn summarize_processo(root: &Element, nsu: Nsu) -> Result<DocumentSummary, DecodeFailure> {
    let inf = root.find("infNFe").ok_or(DecodeFailure::MissingField("infNFe"))?;
    let id = inf.attribute("Id").ok_or(DecodeFailure::MissingField("infNFe@Id"))?;
    let key = id.strip_prefix("NFe").unwrap_or(id);

    let ide = inf.child("ide").ok_or(DecodeFailure::MissingField("ide"))?;
    let emitted_at = match (ide.child_text("dhEmi"), ide.child_text("dEmi")) {
        (Some(dh), _) => timestamp(dh, "dhEmi")?,
        (None, Some(d)) => legacy_date(d)?,
        (None, None) => return Err(DecodeFailure::MissingField("dhEmi")),
    };

    let emit = inf.child("emit").ok_or(DecodeFailure::MissingField("emit"))?;
    let value = inf
        .path(&["total", "ICMSTot"])
        .and_then(|t| t.child_text("vNF"))
        .ok_or(DecodeFailure::MissingField("vNF"))?;

    let situation = root
        .find("infProt")
        .and_then(|p| p.child_text("cStat"))
        .map(str::to_string);

    Ok(DocumentSummary {
        access_key: access_key(key)?,
        issuer_name: required(emit, "xNome")?.to_string(),
        issuer_id: tax_id(emit),
        value: decimal(value, "vNF")?,
        emitted_at,
        situation,
        schema: SchemaKind::Processo,
        nsu,
    })
}

fn required<'a>(el: &'a Element, name: &'static str) -> Result<&'a str, DecodeFailure> {
    el.child_text(name).ok_or(DecodeFailure::MissingField(name))
}

fn tax_id(el: &Element) -> Option<String> {
    el.child_text("CNPJ")
        .or_else(|| el.child_text("CPF"))
        .map(str::to_string)
}

fn access_key(raw: &str) -> Result<AccessKey, DecodeFailure> {
    AccessKey::new(raw).map_err(|_| DecodeFailure::InvalidField {
        field: "chNFe",
        value: raw.to_string(),
    })
}

fn timestamp(raw: &str, field: &'static str) -> Result<DateTime<FixedOffset>, DecodeFailure> {
    DateTime::parse_from_rfc3339(raw).map_err(|_| DecodeFailure::InvalidField {
        field,
        value: raw.to_string(),
    })
}

fn legacy_date(raw: &str) -> Result<DateTime<FixedOffset>, DecodeFailure> {
    let invalid = || DecodeFailure::InvalidField {
        field: "dEmi",
        value: raw.to_string(),
    };
    let offset = FixedOffset::west_opt(LEGACY_DATE_OFFSET_SECS).ok_or_else(invalid)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| dt.and_local_timezone(offset).single())
        .ok_or_else(invalid)
}

/// Amounts travel as decimal text with a `.` separator and stay that way.
fn decimal(raw: &str, field: &'static str) -> Result<String, DecodeFailure> {
    let valid = match raw.split_once('.') {
        Some((int, frac)) => is_digits(int) && is_digits(frac),
        None => is_digits(raw),
    };
    if valid {
        Ok(raw.to_string())
    } else {
        Err(DecodeFailure::InvalidField {
            field,
            value: raw.to_string(),
        })
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
