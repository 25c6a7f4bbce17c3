//! # dfe-sync: Incremental NSU Sync Engine
//!
//! Owns the stateful half of the distribution client:
//!
//! - [`vault`]: certificate records and their NSU cursors.
//! - [`state`]: the per-certificate `Idle → InFlight → Committed | Failed`
//!   state machine.
//! - [`sink`]: where decoded document summaries are upserted.
//! - [`tracker`]: [`CursorTracker`], which ties a vault, a transport and a
//!   sink together and runs one sync at a time per certificate.
//!
//! The network exchange itself lives behind
//! [`dfe_client::DistributionTransport`], so tests drive the tracker with
//! scripted responses.

pub mod error;
pub mod sink;
pub mod state;
pub mod tracker;
pub mod vault;

pub use error::{ConcurrencyError, RemoteError, SinkError, SyncError, VaultError};
pub use sink::{DocumentSink, JsonLinesSink, MemorySink};
pub use state::{StateError, SyncState};
pub use tracker::{CursorTracker, SyncMode, SyncReport};
pub use vault::{Certificate, CertificateVault, Cursor, JsonFileVault, MemoryVault};
