//! # dfe-crypto: Client Credential Extraction
//!
//! Decomposes a taxpayer's PKCS#12 bundle into the material the TLS layer
//! needs for mutual authentication: a PKCS#8 private key and the leaf
//! certificate in PEM form, plus the CA chain in bundle order.
//!
//! ## Crate Policy
//!
//! - Extraction is a pure transformation: no I/O, no global state.
//! - Private key material lives in [`zeroize::Zeroizing`] buffers and is
//!   never printed by `Debug`.
//! - Every failure surfaces as [`AuthenticationError`]; none are retryable
//!   without fixing the stored credential.

pub mod error;
pub mod pkcs12;

pub use error::AuthenticationError;
pub use pkcs12::{extract, extract_base64, ClientCredentials};
