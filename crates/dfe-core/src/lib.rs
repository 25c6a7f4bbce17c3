//! # dfe-core: Foundational Types for the DF-e Distribution Client
//!
//! Defines the domain primitives shared by every other crate in the
//! workspace. It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for wire identifiers.** `Cnpj`, `AuthorityCode`,
//!    `Nsu`, `AccessKey` are all validated at construction and at
//!    deserialization. No bare strings or integers cross crate boundaries.
//!
//! 2. **One NSU rendering.** `Nsu::to_wire()` is the only way an NSU becomes
//!    text; it always yields the 15-digit zero-padded form the authority
//!    requires.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `dfe-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;

pub use error::ValidationError;
pub use identity::{AccessKey, AuthorityCode, CertificateId, Cnpj, Environment, Nsu};
