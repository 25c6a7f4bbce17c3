//! # Protocol Client
//!
//! HTTPS POST of a SOAP envelope with client-certificate authentication.
//!
//! [`ProtocolClient`] owns the request policy (content type, timeout
//! reporting, retry, response validation) over an injected
//! `reqwest::Client`. [`mutual_tls_client`] builds that client from
//! extracted [`ClientCredentials`]. [`DistributionTransport`] is the seam the
//! sync engine calls; [`MutualTlsTransport`] is its production
//! implementation and builds a fresh client per exchange, so each call
//! presents the certificate it was given.
//!
//! ## Response Validation
//!
//! - 2xx with `application/soap+xml` or `text/xml`: the body is returned.
//! - 500 with a SOAP content type: the body is returned too. The SOAP 1.2
//!   HTTP binding carries faults on 500, and the envelope parser turns them
//!   into a protocol error with the fault reason.
//! - Any other status: [`NetworkError::Status`].
//! - 2xx with another content type (an HTML error page from a proxy, say):
//!   [`NetworkError::ContentType`].

use std::future::Future;

use dfe_crypto::ClientCredentials;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use url::Url;

use crate::config::{DistributionConfig, DEFAULT_TIMEOUT_SECS};
use crate::error::NetworkError;
use crate::retry::retry_send;

/// `Content-Type` of every request.
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["application/soap+xml", "text/xml"];

/// Longest response body excerpt kept in a [`NetworkError::Status`].
const BODY_EXCERPT_CHARS: usize = 512;

/// Sends envelopes to one endpoint over an injected HTTP client.
#[derive(Debug, Clone)]
pub struct ProtocolClient {
    http: reqwest::Client,
    endpoint: Url,
    max_retries: u32,
    timeout_secs: u64,
}

impl ProtocolClient {
    /// Create a client for `endpoint`. `http` carries TLS identity and
    /// timeout; `max_retries` bounds retries of connection failures.
    /// Timeouts are final.
    pub fn new(http: reqwest::Client, endpoint: Url, max_retries: u32) -> Self {
        Self {
            http,
            endpoint,
            max_retries,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Timeout reported in [`NetworkError::Timeout`]. Should match the
    /// timeout configured on the injected client.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Target endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST `envelope` and return the raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] on transport failure after retries, on an
    /// unexpected HTTP status, or on a non-SOAP response.
    pub async fn send(&self, envelope: &[u8]) -> Result<Vec<u8>, NetworkError> {
        let endpoint = self.endpoint.as_str();
        tracing::debug!(endpoint, bytes = envelope.len(), "sending distribution request");

        let resp = retry_send(self.max_retries, endpoint, || {
            self.http
                .post(self.endpoint.clone())
                .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
                .body(envelope.to_vec())
                .send()
        })
        .await
        .map_err(|e| NetworkError::from_reqwest(endpoint, self.timeout_secs, e))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let soap = is_soap_content_type(&content_type);

        if !status.is_success() && !(status == StatusCode::INTERNAL_SERVER_ERROR && soap) {
            let body = resp.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }
        if !soap {
            return Err(NetworkError::ContentType {
                endpoint: endpoint.to_string(),
                content_type,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| NetworkError::from_reqwest(endpoint, self.timeout_secs, e))?;
        tracing::debug!(
            endpoint,
            status = status.as_u16(),
            bytes = body.len(),
            "received distribution response"
        );
        Ok(body.to_vec())
    }
}

/// Build an HTTP client presenting `credentials` as its TLS identity, with
/// the bundle's CA chain added as trust roots.
///
/// With `accept_invalid_certs` the server certificate is not verified. That
/// is logged at `warn` every time; see the config module docs.
///
/// # Errors
///
/// Returns [`NetworkError::ClientSetup`] if the identity or a CA
/// certificate is rejected by the TLS layer.
pub fn mutual_tls_client(
    config: &DistributionConfig,
    credentials: &ClientCredentials,
    accept_invalid_certs: bool,
) -> Result<reqwest::Client, NetworkError> {
    let identity = reqwest::Identity::from_pem(&credentials.identity_pem())
        .map_err(|e| NetworkError::ClientSetup(format!("client identity: {e}")))?;

    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .identity(identity)
        .timeout(config.timeout())
        .danger_accept_invalid_certs(accept_invalid_certs);

    for der in credentials.ca_chain() {
        let ca = reqwest::Certificate::from_der(der)
            .map_err(|e| NetworkError::ClientSetup(format!("CA certificate: {e}")))?;
        builder = builder.add_root_certificate(ca);
    }

    if accept_invalid_certs {
        tracing::warn!(
            endpoint = %config.endpoint,
            "server certificate verification is disabled for this exchange"
        );
    }

    builder
        .build()
        .map_err(|e| NetworkError::ClientSetup(e.to_string()))
}

/// One request/response exchange with the distribution service.
pub trait DistributionTransport: Send + Sync {
    /// POST `envelope` authenticated as `credentials` and return the raw
    /// response body.
    fn exchange(
        &self,
        envelope: Vec<u8>,
        credentials: &ClientCredentials,
        accept_invalid_certs: bool,
    ) -> impl Future<Output = Result<Vec<u8>, NetworkError>> + Send;
}

/// Production transport: mutual TLS over HTTPS to the configured endpoint.
#[derive(Debug, Clone)]
pub struct MutualTlsTransport {
    config: DistributionConfig,
}

impl MutualTlsTransport {
    pub fn new(config: DistributionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }
}

impl DistributionTransport for MutualTlsTransport {
    async fn exchange(
        &self,
        envelope: Vec<u8>,
        credentials: &ClientCredentials,
        accept_invalid_certs: bool,
    ) -> Result<Vec<u8>, NetworkError> {
        let http = mutual_tls_client(&self.config, credentials, accept_invalid_certs)?;
        ProtocolClient::new(http, self.config.endpoint.clone(), self.config.max_retries)
            .with_timeout_secs(self.config.timeout_secs)
            .send(&envelope)
            .await
    }
}

fn is_soap_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ACCEPTED_CONTENT_TYPES.contains(&mime.as_str())
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> ClientCredentials {
        let leaf = rcgen::generate_simple_self_signed(vec!["taxpayer.example".to_string()])
            .expect("leaf certificate");
        let ca = rcgen::generate_simple_self_signed(vec!["ca.example".to_string()])
            .expect("ca certificate");
        let der = p12::PFX::new(
            &leaf.cert.der()[..],
            &leaf.key_pair.serialize_der(),
            Some(&ca.cert.der()[..]),
            "pw",
            "taxpayer",
        )
        .expect("build pfx")
        .to_der();
        dfe_crypto::extract(&der, "pw").expect("extract")
    }

    #[test]
    fn accepts_soap_content_types() {
        assert!(is_soap_content_type("application/soap+xml; charset=utf-8"));
        assert!(is_soap_content_type("Application/SOAP+XML"));
        assert!(is_soap_content_type("text/xml;charset=UTF-8"));
        assert!(!is_soap_content_type("text/html; charset=utf-8"));
        assert!(!is_soap_content_type("application/json"));
        assert!(!is_soap_content_type(""));
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(BODY_EXCERPT_CHARS * 2);
        assert_eq!(excerpt(&long).chars().count(), BODY_EXCERPT_CHARS);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn builds_client_from_extracted_credentials() {
        let cfg = DistributionConfig::local_mock("https://127.0.0.1:9443/ws").unwrap();
        assert!(mutual_tls_client(&cfg, &credentials(), false).is_ok());
        assert!(mutual_tls_client(&cfg, &credentials(), true).is_ok());
    }

    #[test]
    fn protocol_client_defaults() {
        let url = Url::parse("https://example.invalid/ws").unwrap();
        let client = ProtocolClient::new(reqwest::Client::new(), url.clone(), 2);
        assert_eq!(client.endpoint(), &url);
        assert_eq!(client.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(client.with_timeout_secs(5).timeout_secs, 5);
    }
}
