//! # Envelope Codec
//!
//! Builds the outbound `nfeDistDFeInteresse` SOAP 1.2 request and parses the
//! `retDistDFeInt` result out of the response envelope.
//!
//! ## Request Layout
//!
//! Three fragments nest inside each other:
//!
//! 1. `nfeCabecMsg` header: authority code and protocol version.
//! 2. `distDFeInt` business payload: environment, authority code, CNPJ, and
//!    one query element (`distNSU`, `consNSU` or `consChNFe`).
//! 3. The SOAP 1.2 envelope wrapping header and body.
//!
//! Each fragment is a template with `{{placeholder}}` substitution. All
//! whitespace between tags is removed from the final bytes: the service
//! compares requests byte-for-byte and rejects pretty-printed ones.
//!
//! NSUs are always rendered as 15 zero-padded digits. The service rejects
//! unpadded values.

use chrono::{DateTime, FixedOffset};
use dfe_core::{AccessKey, AuthorityCode, Cnpj, Environment, Nsu};
use quick_xml::escape::escape;
use serde::Serialize;

use crate::error::ProtocolError;
use crate::xml::{self, Element};

/// SOAP 1.2 envelope namespace.
pub const SOAP12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
/// WSDL namespace of the distribution service.
pub const WSDL_NS: &str = "http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe";
/// Namespace of the NF-e business payloads.
pub const NFE_NS: &str = "http://www.portalfiscal.inf.br/nfe";
/// `versaoDados` / `versao` sent with every request.
pub const PROTOCOL_VERSION: &str = "1.01";

/// `cStat`: no documents located for the requested range.
pub const STATUS_NO_DOCUMENTS: u16 = 137;
/// `cStat`: documents located, batch attached.
pub const STATUS_DOCUMENTS_FOUND: u16 = 138;

const ENVELOPE_TEMPLATE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap12:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:soap12="{{soap_ns}}">
  <soap12:Header>
    {{header}}
  </soap12:Header>
  <soap12:Body>
    {{body}}
  </soap12:Body>
</soap12:Envelope>"#;

const HEADER_TEMPLATE: &str = r#"
<nfeCabecMsg xmlns="{{wsdl_ns}}">
  <cUF>{{authority}}</cUF>
  <versaoDados>{{version}}</versaoDados>
</nfeCabecMsg>"#;

const BODY_TEMPLATE: &str = r#"
<nfeDistDFeInteresse xmlns="{{wsdl_ns}}">
  <nfeDadosMsg>
    <distDFeInt xmlns="{{nfe_ns}}" versao="{{version}}">
      <tpAmb>{{environment}}</tpAmb>
      <cUFAutor>{{authority}}</cUFAutor>
      <CNPJ>{{cnpj}}</CNPJ>
      {{query}}
    </distDFeInt>
  </nfeDadosMsg>
</nfeDistDFeInteresse>"#;

/// A request that can be rendered into a SOAP 1.2 envelope.
pub trait SoapRequest {
    /// Content of `<soap12:Header>`.
    fn header_fragment(&self) -> String;

    /// Content of `<soap12:Body>`.
    fn body_fragment(&self) -> String;

    /// The complete, whitespace-minimized envelope.
    fn to_envelope(&self) -> Vec<u8> {
        let header = self.header_fragment();
        let body = self.body_fragment();
        let filled = fill(
            ENVELOPE_TEMPLATE,
            &[
                ("soap_ns", SOAP12_NS),
                ("header", header.as_str()),
                ("body", body.as_str()),
            ],
        );
        strip_inter_tag_whitespace(&filled).into_bytes()
    }
}

/// What the request asks the service for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DistributionQuery {
    /// Everything after the given NSU (`distNSU/ultNSU`). The incremental
    /// sync mode.
    LastNsu(Nsu),
    /// Exactly one document by NSU (`consNSU/NSU`).
    SingleNsu(Nsu),
    /// One document by access key (`consChNFe/chNFe`).
    AccessKey(AccessKey),
}

impl DistributionQuery {
    fn fragment(&self) -> String {
        match self {
            Self::LastNsu(nsu) => format!("<distNSU><ultNSU>{}</ultNSU></distNSU>", nsu.to_wire()),
            Self::SingleNsu(nsu) => format!("<consNSU><NSU>{}</NSU></consNSU>", nsu.to_wire()),
            Self::AccessKey(key) => {
                format!("<consChNFe><chNFe>{}</chNFe></consChNFe>", escape(key.as_str()))
            }
        }
    }
}

/// One `nfeDistDFeInteresse` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionRequest {
    /// Interested taxpayer.
    pub cnpj: Cnpj,
    /// Authority code sent as `cUF` and `cUFAutor`.
    pub authority: AuthorityCode,
    /// `tpAmb`.
    pub environment: Environment,
    /// Query element.
    pub query: DistributionQuery,
}

impl DistributionRequest {
    /// Incremental request for everything after `last_seen`.
    pub fn incremental(
        cnpj: Cnpj,
        authority: AuthorityCode,
        environment: Environment,
        last_seen: Nsu,
    ) -> Self {
        Self {
            cnpj,
            authority,
            environment,
            query: DistributionQuery::LastNsu(last_seen),
        }
    }
}

impl SoapRequest for DistributionRequest {
    fn header_fragment(&self) -> String {
        let authority = self.authority.to_string();
        fill(
            HEADER_TEMPLATE,
            &[
                ("wsdl_ns", WSDL_NS),
                ("authority", authority.as_str()),
                ("version", PROTOCOL_VERSION),
            ],
        )
    }

    fn body_fragment(&self) -> String {
        let environment = self.environment.code().to_string();
        let authority = self.authority.to_string();
        let cnpj = escape(self.cnpj.as_str());
        let query = self.query.fragment();
        fill(
            BODY_TEMPLATE,
            &[
                ("wsdl_ns", WSDL_NS),
                ("nfe_ns", NFE_NS),
                ("version", PROTOCOL_VERSION),
                ("environment", environment.as_str()),
                ("authority", authority.as_str()),
                ("cnpj", &*cnpj),
                ("query", query.as_str()),
            ],
        )
    }
}

/// Render `request` as the bytes to POST.
pub fn build_request(request: &DistributionRequest) -> Vec<u8> {
    request.to_envelope()
}

/// Parse a request envelope back into its typed form.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the envelope is malformed or any field fails
/// validation.
pub fn parse_request(raw: &[u8]) -> Result<DistributionRequest, ProtocolError> {
    let root = parse_envelope(raw)?;
    let body = root.child("Body").ok_or(ProtocolError::MissingElement("Body"))?;
    let dist = body
        .find("distDFeInt")
        .ok_or(ProtocolError::MissingElement("distDFeInt"))?;

    let environment = required_text(dist, "tpAmb")?;
    let environment = environment
        .parse::<Environment>()
        .map_err(|_| invalid("tpAmb", environment))?;
    let authority = required_text(dist, "cUFAutor")?;
    let authority = authority
        .parse::<AuthorityCode>()
        .map_err(|_| invalid("cUFAutor", authority))?;
    let cnpj = required_text(dist, "CNPJ")?;
    let cnpj = Cnpj::new(cnpj).map_err(|_| invalid("CNPJ", cnpj))?;

    let query = if let Some(q) = dist.child("distNSU") {
        DistributionQuery::LastNsu(parse_nsu(required_text(q, "ultNSU")?, "ultNSU")?)
    } else if let Some(q) = dist.child("consNSU") {
        DistributionQuery::SingleNsu(parse_nsu(required_text(q, "NSU")?, "NSU")?)
    } else if let Some(q) = dist.child("consChNFe") {
        let key = required_text(q, "chNFe")?;
        DistributionQuery::AccessKey(AccessKey::new(key).map_err(|_| invalid("chNFe", key))?)
    } else {
        return Err(ProtocolError::MissingElement("distNSU"));
    };

    Ok(DistributionRequest {
        cnpj,
        authority,
        environment,
        query,
    })
}

/// Normalized outcome of classifying a response's `cStat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// `138`: a batch is attached.
    DocumentsFound,
    /// `137`: caught up; the cursor still advances.
    NoDocuments,
    /// Any other code: a business-level rejection.
    Rejected(u16),
}

/// One `docZip` entry, still compressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEnvelope {
    /// NSU of this document.
    pub nsu: Nsu,
    /// Raw `schema` attribute, e.g. `resNFe_v1.01`.
    pub schema: String,
    /// Base64 text of the gzip payload.
    pub payload: String,
}

/// Parsed `retDistDFeInt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionResponse {
    /// `tpAmb` echoed by the service.
    pub environment: Option<Environment>,
    /// `cStat`.
    pub c_stat: u16,
    /// `xMotivo`.
    pub reason: String,
    /// `dhResp`.
    pub responded_at: Option<DateTime<FixedOffset>>,
    /// `ultNSU`: the last NSU covered by this response.
    pub last_nsu: Option<Nsu>,
    /// `maxNSU`: the highest NSU the service currently holds.
    pub max_nsu: Option<Nsu>,
    /// `loteDistDFeInt` entries in document order.
    pub documents: Vec<DocumentEnvelope>,
}

impl DistributionResponse {
    /// Classify `cStat`.
    pub fn status(&self) -> ResponseStatus {
        match self.c_stat {
            STATUS_DOCUMENTS_FOUND => ResponseStatus::DocumentsFound,
            STATUS_NO_DOCUMENTS => ResponseStatus::NoDocuments,
            other => ResponseStatus::Rejected(other),
        }
    }
}

/// Parse a response envelope.
///
/// # Errors
///
/// A missing `Envelope`, `Body`, `retDistDFeInt` or `cStat`, a malformed
/// numeric field, a `docZip` without its attributes, or a SOAP Fault are
/// all [`ProtocolError`]. None of them is ever read as "no documents".
pub fn parse_response(raw: &[u8]) -> Result<DistributionResponse, ProtocolError> {
    let root = parse_envelope(raw)?;
    let body = root.child("Body").ok_or(ProtocolError::MissingElement("Body"))?;

    if let Some(fault) = body.child("Fault") {
        return Err(ProtocolError::Fault(fault_reason(fault)));
    }

    let ret = body
        .find("retDistDFeInt")
        .ok_or(ProtocolError::MissingElement("retDistDFeInt"))?;

    let c_stat = required_text(ret, "cStat")?;
    let c_stat: u16 = c_stat.parse().map_err(|_| invalid("cStat", c_stat))?;

    let environment = ret
        .child_text("tpAmb")
        .map(|v| v.parse::<Environment>().map_err(|_| invalid("tpAmb", v)))
        .transpose()?;
    let responded_at = ret
        .child_text("dhResp")
        .map(|v| DateTime::parse_from_rfc3339(v).map_err(|_| invalid("dhResp", v)))
        .transpose()?;
    let last_nsu = ret
        .child_text("ultNSU")
        .map(|v| parse_nsu(v, "ultNSU"))
        .transpose()?;
    let max_nsu = ret
        .child_text("maxNSU")
        .map(|v| parse_nsu(v, "maxNSU"))
        .transpose()?;

    let mut documents = Vec::new();
    if let Some(lote) = ret.child("loteDistDFeInt") {
        for doc in lote.children_named("docZip") {
            let nsu = doc.attribute("NSU").ok_or(ProtocolError::MissingAttribute {
                element: "docZip",
                attribute: "NSU",
            })?;
            let schema = doc.attribute("schema").ok_or(ProtocolError::MissingAttribute {
                element: "docZip",
                attribute: "schema",
            })?;
            documents.push(DocumentEnvelope {
                nsu: parse_nsu(nsu, "NSU")?,
                schema: schema.to_string(),
                payload: doc.text.clone(),
            });
        }
    }

    tracing::debug!(
        c_stat,
        last_nsu = last_nsu.map(|n| n.value()),
        max_nsu = max_nsu.map(|n| n.value()),
        documents = documents.len(),
        "parsed distribution response"
    );

    Ok(DistributionResponse {
        environment,
        c_stat,
        reason: ret.child_text("xMotivo").unwrap_or_default().to_string(),
        responded_at,
        last_nsu,
        max_nsu,
        documents,
    })
}

fn parse_envelope(raw: &[u8]) -> Result<Element, ProtocolError> {
    let root = xml::parse_document(raw).map_err(|e| ProtocolError::MalformedXml(e.to_string()))?;
    if root.name != "Envelope" {
        return Err(ProtocolError::MissingElement("Envelope"));
    }
    Ok(root)
}

/// SOAP 1.2 puts the reason in `Reason/Text`, SOAP 1.1 in `faultstring`.
fn fault_reason(fault: &Element) -> String {
    fault
        .find("Text")
        .or_else(|| fault.find("faultstring"))
        .map(|e| e.text.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "unspecified fault".to_string())
}

fn required_text<'a>(el: &'a Element, name: &'static str) -> Result<&'a str, ProtocolError> {
    el.child_text(name).ok_or(ProtocolError::MissingElement(name))
}

fn parse_nsu(value: &str, field: &'static str) -> Result<Nsu, ProtocolError> {
    value.parse().map_err(|_| invalid(field, value))
}

fn invalid(field: &'static str, value: &str) -> ProtocolError {
    ProtocolError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

/// Remove whitespace runs that sit between a `>` and a `<`, plus leading
/// and trailing whitespace. Text content inside elements is untouched.
pub fn strip_inter_tag_whitespace(input: &str) -> String {
    let trimmed = input.trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut pending = String::new();

    for ch in trimmed.chars() {
        if ch.is_whitespace() {
            pending.push(ch);
            continue;
        }
        if !pending.is_empty() {
            if !(out.ends_with('>') && ch == '<') {
                out.push_str(&pending);
            }
            pending.clear();
        }
        out.push(ch);
    }
    out
}
