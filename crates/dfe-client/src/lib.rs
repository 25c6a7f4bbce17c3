//! # dfe-client: NFeDistribuicaoDFe Protocol Client
//!
//! Everything between a cursor value and a list of decoded document
//! summaries:
//!
//! - [`envelope`] builds the SOAP 1.2 request and parses the response into a
//!   [`envelope::DistributionResponse`].
//! - [`protocol`] performs the mutual-TLS HTTPS exchange and owns the
//!   timeout and retry policy. The [`protocol::DistributionTransport`] trait
//!   is the seam the sync engine depends on.
//! - [`decoder`] expands each `docZip` entry (base64 → gzip → XML) and maps
//!   it to a [`decoder::DocumentSummary`] by schema variant.
//!
//! ## Crate Policy
//!
//! - No global HTTP clients. A `reqwest::Client` is always passed in.
//! - This crate never touches stored state; cursor handling lives in
//!   `dfe-sync`.

pub mod config;
pub mod decoder;
pub mod envelope;
pub mod error;
pub mod protocol;
pub(crate) mod retry;
pub mod xml;

pub use config::{ConfigError, DistributionConfig};
pub use decoder::{decode, DecodeFailure, DecodedBatch, DecodingError, DocumentSummary, SchemaKind};
pub use envelope::{
    build_request, parse_request, parse_response, DistributionQuery, DistributionRequest,
    DistributionResponse, DocumentEnvelope, ResponseStatus, SoapRequest, STATUS_DOCUMENTS_FOUND,
    STATUS_NO_DOCUMENTS,
};
pub use error::{NetworkError, ProtocolError};
pub use protocol::{mutual_tls_client, DistributionTransport, MutualTlsTransport, ProtocolClient};
