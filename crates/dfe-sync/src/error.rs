//! # Sync Error Types
//!
//! [`SyncError`] is what a sync call returns. Every variant leaves the
//! stored cursor exactly as it was before the call.

use dfe_client::{NetworkError, ProtocolError};
use dfe_core::CertificateId;
use dfe_crypto::AuthenticationError;
use thiserror::Error;

/// Certificate storage failure.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("certificate {0} not found")]
    NotFound(CertificateId),

    #[error("certificate {0} already exists")]
    Duplicate(CertificateId),

    #[error("vault I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("vault serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Document sink failure.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The service answered well-formed, but with a rejection status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("distribution service rejected the request: cStat {c_stat} ({reason})")]
pub struct RemoteError {
    /// `cStat`.
    pub c_stat: u16,
    /// `xMotivo`.
    pub reason: String,
}

/// A sync for this certificate is already in flight.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("a sync for certificate {certificate} is already in flight")]
pub struct ConcurrencyError {
    pub certificate: CertificateId,
}

/// Why a sync did not commit.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl SyncError {
    /// Whether running the same sync again later may succeed without any
    /// operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Concurrency(_) => true,
            Self::Authentication(_)
            | Self::Protocol(_)
            | Self::Remote(_)
            | Self::Vault(_)
            | Self::Sink(_) => false,
        }
    }
}
