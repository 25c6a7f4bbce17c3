//! # Authentication Error Types
//!
//! Structured errors for credential handling. A sync that hits any of these
//! is fatal and leaves the stored cursor untouched.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The stored credential cannot be used to authenticate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The bundle is empty.
    #[error("certificate bundle is empty")]
    EmptyBundle,

    /// The at-rest base64 encoding is corrupt.
    #[error("certificate bundle is not valid base64: {0}")]
    InvalidEncoding(String),

    /// The PKCS#12 ASN.1 structure could not be decoded.
    #[error("malformed PKCS#12 bundle: {0}")]
    MalformedBundle(String),

    /// The bundle's integrity MAC or encryption uses an algorithm outside
    /// PKCS#12 v1 (SHA-2 MAC, PBES2).
    #[error("unsupported PKCS#12 protection: {0}; re-export the bundle with legacy algorithms")]
    UnsupportedAlgorithm(String),

    /// The passphrase does not match the bundle's integrity MAC or does not
    /// decrypt its bags.
    #[error("wrong passphrase for certificate bundle")]
    WrongPassphrase,

    /// No private-key bag in the bundle.
    #[error("certificate bundle contains no private key")]
    MissingKey,

    /// More than one private-key bag; the client identity is ambiguous.
    #[error("certificate bundle contains {0} private keys, expected exactly one")]
    MultipleKeys(usize),

    /// No certificate bag in the bundle.
    #[error("certificate bundle contains no certificate")]
    MissingCertificate,

    /// The certificate record is deactivated.
    #[error("certificate {certificate} is not active")]
    Inactive {
        /// Display form of the certificate identifier.
        certificate: String,
    },

    /// The certificate's validity window has ended.
    #[error("certificate {certificate} expired at {expired_at}")]
    Expired {
        /// Display form of the certificate identifier.
        certificate: String,
        /// End of the validity window.
        expired_at: DateTime<Utc>,
    },
}
