//! # Validation Errors
//!
//! Raised by the validating constructors in [`crate::identity`]. Each variant
//! carries the rejected input so the caller can report it verbatim.

use thiserror::Error;

/// A value failed format validation for a domain newtype.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// CNPJ is not 14 digits or its check digits do not match.
    #[error("invalid CNPJ: {0:?}")]
    InvalidCnpj(String),

    /// Not one of the IBGE state codes accepted by the authority.
    #[error("invalid authority code: {0:?}")]
    InvalidAuthorityCode(String),

    /// NSU is not a decimal number of at most 15 digits.
    #[error("invalid NSU: {0:?}")]
    InvalidNsu(String),

    /// Access key is not exactly 44 digits.
    #[error("invalid access key: {0:?}")]
    InvalidAccessKey(String),

    /// Unknown environment name or code.
    #[error("invalid environment: {0:?} (expected production, homologation, 1 or 2)")]
    InvalidEnvironment(String),
}
