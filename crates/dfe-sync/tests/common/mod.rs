//! Shared fixtures for the sync engine tests: PKCS#12 bundles, response
//! envelopes, gzip payloads, and a scripted transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, Utc};
use dfe_client::{DistributionConfig, DistributionTransport, NetworkError};
use dfe_core::{Cnpj, Nsu};
use dfe_crypto::ClientCredentials;
use dfe_sync::{Certificate, Cursor};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use tokio::sync::Notify;

pub const PASSPHRASE: &str = "s3cret";
pub const CNPJ: &str = "11222333000181";

pub const KEY_A: &str = "35240111222333000181550010000001231000001234";
pub const KEY_B: &str = "35240111222333000181550010000001241000001235";
pub const KEY_C: &str = "35240111222333000181550010000001251000001236";

pub fn config() -> DistributionConfig {
    DistributionConfig::local_mock("http://127.0.0.1:1/").expect("config")
}

/// A PKCS#12 bundle with a fresh self-signed identity, base64-encoded.
pub fn pkcs12_base64(passphrase: &str) -> String {
    let leaf = rcgen::generate_simple_self_signed(vec!["taxpayer.example".to_string()])
        .expect("leaf certificate");
    let der = p12::PFX::new(
        &leaf.cert.der()[..],
        &leaf.key_pair.serialize_der(),
        None,
        passphrase,
        "taxpayer",
    )
    .expect("build pfx")
    .to_der();
    STANDARD.encode(der)
}

pub fn certificate(last_seen: u64, max_known: u64) -> Certificate {
    let mut cert = Certificate::new(
        Cnpj::new(CNPJ).expect("cnpj"),
        pkcs12_base64(PASSPHRASE),
        PASSPHRASE,
        Utc::now() + Duration::days(365),
    );
    cert.cursor = Cursor {
        last_seen: Nsu::new(last_seen).expect("nsu"),
        max_known: Nsu::new(max_known).expect("nsu"),
        updated_at: None,
    };
    cert
}

pub fn gzip_base64(xml: &str) -> String {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(xml.as_bytes()).expect("gzip write");
    STANDARD.encode(enc.finish().expect("gzip finish"))
}

pub fn resumo_xml(key: &str) -> String {
    format!(
        r#"<resNFe xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01"><chNFe>{key}</chNFe><CNPJ>11222333000181</CNPJ><xNome>Fornecedor Exemplo Ltda</xNome><IE>123456789</IE><dhEmi>2024-01-10T09:15:00-03:00</dhEmi><tpNF>1</tpNF><vNF>1500.00</vNF><digVal>abc=</digVal><dhRecbto>2024-01-10T09:16:00-03:00</dhRecbto><nProt>135240000000001</nProt><cSitNFe>1</cSitNFe></resNFe>"#
    )
}

/// A `docZip` entry: NSU, schema tag, base64 payload.
pub struct Doc {
    pub nsu: u64,
    pub schema: &'static str,
    pub payload: String,
}

pub fn resumo_doc(nsu: u64, key: &str) -> Doc {
    Doc {
        nsu,
        schema: "resNFe_v1.01",
        payload: gzip_base64(&resumo_xml(key)),
    }
}

pub fn response_xml(c_stat: u16, reason: &str, ult: Option<u64>, max: Option<u64>, docs: &[Doc]) -> Vec<u8> {
    let ult = ult
        .map(|n| format!("<ultNSU>{n:015}</ultNSU>"))
        .unwrap_or_default();
    let max = max
        .map(|n| format!("<maxNSU>{n:015}</maxNSU>"))
        .unwrap_or_default();
    let lote = if docs.is_empty() {
        String::new()
    } else {
        let entries: String = docs
            .iter()
            .map(|d| format!(r#"<docZip NSU="{:015}" schema="{}">{}</docZip>"#, d.nsu, d.schema, d.payload))
            .collect();
        format!("<loteDistDFeInt>{entries}</loteDistDFeInt>")
    };
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body><nfeDistDFeInteresseResponse xmlns="http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe"><nfeDistDFeInteresseResult><retDistDFeInt xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01"><tpAmb>2</tpAmb><verAplic>1.4.0</verAplic><cStat>{c_stat}</cStat><xMotivo>{reason}</xMotivo><dhResp>2024-01-15T10:30:00-03:00</dhResp>{ult}{max}{lote}</retDistDFeInt></nfeDistDFeInteresseResult></nfeDistDFeInteresseResponse></soap:Body></soap:Envelope>"#
    )
    .into_bytes()
}

#[derive(Default)]
struct Script {
    responses: Mutex<VecDeque<Result<Vec<u8>, NetworkError>>>,
    requests: Mutex<Vec<Vec<u8>>>,
    accept_invalid: Mutex<Vec<bool>>,
    calls: AtomicUsize,
    entered: Notify,
    gate: Option<Notify>,
}

/// Transport that answers from a queue of canned results and records what
/// it was sent. Clones share the same script.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script::default()),
        }
    }

    /// Like `new`, but every exchange parks until [`release`] is called.
    ///
    /// [`release`]: ScriptedTransport::release
    pub fn gated() -> Self {
        Self {
            script: Arc::new(Script {
                gate: Some(Notify::new()),
                ..Script::default()
            }),
        }
    }

    pub fn respond(&self, body: Vec<u8>) -> &Self {
        self.script.responses.lock().push_back(Ok(body));
        self
    }

    pub fn fail(&self, err: NetworkError) -> &Self {
        self.script.responses.lock().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> String {
        self.script
            .requests
            .lock()
            .last()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .unwrap_or_default()
    }

    pub fn accept_invalid_flags(&self) -> Vec<bool> {
        self.script.accept_invalid.lock().clone()
    }

    /// Resolves once an exchange has started.
    pub async fn entered(&self) {
        self.script.entered.notified().await;
    }

    pub fn release(&self) {
        if let Some(gate) = &self.script.gate {
            gate.notify_one();
        }
    }
}

impl DistributionTransport for ScriptedTransport {
    async fn exchange(
        &self,
        envelope: Vec<u8>,
        _credentials: &ClientCredentials,
        accept_invalid_certs: bool,
    ) -> Result<Vec<u8>, NetworkError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        self.script.requests.lock().push(envelope);
        self.script.accept_invalid.lock().push(accept_invalid_certs);
        self.script.entered.notify_one();

        if let Some(gate) = &self.script.gate {
            gate.notified().await;
        }

        let next = self.script.responses.lock().pop_front();
        next.unwrap_or_else(|| {
            Err(NetworkError::Transport {
                endpoint: "scripted".into(),
                reason: "no scripted response left".into(),
            })
        })
    }
}
