//! # Protocol and Network Errors
//!
//! [`ProtocolError`] means the service answered with something that is not
//! the expected SOAP contract: a transport or contract-version mismatch,
//! never a business-level "no documents". [`NetworkError`] covers everything
//! that went wrong getting bytes to and from the endpoint.

use thiserror::Error;

/// The response does not match the expected SOAP/XML contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The payload is not well-formed XML.
    #[error("malformed XML: {0}")]
    MalformedXml(String),

    /// A structural element of the envelope is absent.
    #[error("missing element <{0}> in response")]
    MissingElement(&'static str),

    /// A required attribute is absent.
    #[error("missing attribute {attribute} on <{element}>")]
    MissingAttribute {
        /// Element local name.
        element: &'static str,
        /// Attribute local name.
        attribute: &'static str,
    },

    /// A field is present but its value does not parse.
    #[error("invalid value {value:?} for <{field}>")]
    InvalidField {
        /// Field local name.
        field: &'static str,
        /// Raw value as received.
        value: String,
    },

    /// The service answered with a SOAP Fault instead of a result.
    #[error("SOAP fault: {0}")]
    Fault(String),
}

/// The HTTPS exchange with the authority failed.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The HTTP client could not be built from the supplied credentials.
    #[error("cannot build HTTP client: {0}")]
    ClientSetup(String),

    /// The request exceeded the configured timeout.
    #[error("request to {endpoint} timed out after {timeout_secs}s")]
    Timeout {
        /// Target endpoint.
        endpoint: String,
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// Connection could not be established (DNS, TCP, TLS handshake).
    #[error("cannot connect to {endpoint}: {reason}")]
    Connect {
        /// Target endpoint.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },

    /// Any other transport failure, including reading the response body.
    #[error("transport error calling {endpoint}: {reason}")]
    Transport {
        /// Target endpoint.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },

    /// The endpoint returned a non-2xx status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        /// Target endpoint.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },

    /// The endpoint returned something other than a SOAP document.
    #[error("{endpoint} returned non-SOAP content type {content_type:?}")]
    ContentType {
        /// Target endpoint.
        endpoint: String,
        /// The `Content-Type` header as received (empty if absent).
        content_type: String,
    },
}

impl NetworkError {
    /// Whether the caller may retry the same request with backoff. The
    /// stored cursor is untouched on any network failure, so a retry
    /// re-requests the same range.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ClientSetup(_))
    }

    pub(crate) fn from_reqwest(endpoint: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
                timeout_secs,
            }
        } else if err.is_connect() {
            Self::Connect {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }
}
