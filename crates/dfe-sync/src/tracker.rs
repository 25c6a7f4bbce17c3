//! # Cursor Tracker
//!
//! Runs one sync for one certificate: read the cursor, build and send the
//! request, parse and decode the response, hand summaries to the sink, and
//! commit the cursor the service reported.
//!
//! ## Cursor Rules
//!
//! - `138` (documents found) and `137` (no documents) both commit the
//!   reported `ultNSU`/`maxNSU`. The service's cursor is authoritative even
//!   when some documents in the batch failed to decode; such batches are
//!   logged at `warn` with the failed NSUs, since those documents will not
//!   be offered again by an incremental sync.
//! - Any other status, and every error, leaves the cursor untouched.
//! - An incremental sync never lowers `last_seen`: a reported `ultNSU`
//!   behind the stored one is logged and the stored value kept.
//! - A manual override commits the reported `ultNSU` as-is, even when it is
//!   lower than the stored cursor. That is how an operator rewinds a
//!   certificate for backfill; the override is logged at `warn`.
//! - The cursor is written once per sync, after the sink accepted every
//!   summary.
//!
//! ## Concurrency
//!
//! At most one sync per certificate is in flight. A second call while one
//! is running fails immediately with [`ConcurrencyError`]. Syncs for
//! different certificates proceed independently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dfe_client::{
    build_request, decode, parse_response, DecodedBatch, DecodingError, DistributionConfig,
    DistributionRequest, DistributionTransport, DocumentSummary, ProtocolError, ResponseStatus,
};
use dfe_core::{CertificateId, Nsu};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{ConcurrencyError, RemoteError, SyncError};
use crate::sink::DocumentSink;
use crate::state::SyncState;
use crate::vault::{CertificateVault, Cursor};

/// How the starting NSU of a sync was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SyncMode {
    /// From the stored `last_seen`.
    Incremental,
    /// From an operator-supplied NSU.
    Override { from: Nsu },
}

/// Outcome of a committed sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub certificate_id: CertificateId,
    pub mode: SyncMode,
    /// NSU sent as `ultNSU`.
    pub requested_from: Nsu,
    pub c_stat: u16,
    pub reason: String,
    pub cursor_before: Cursor,
    pub cursor_after: Cursor,
    /// Summaries handed to the sink, one per access key, in NSU order.
    pub summaries: Vec<DocumentSummary>,
    /// Documents of the batch that could not be decoded.
    pub failures: Vec<DecodingError>,
}

/// Drives syncs for the certificates in a vault.
pub struct CursorTracker<V, T, S> {
    vault: Arc<V>,
    transport: T,
    sink: Arc<S>,
    config: DistributionConfig,
    states: Mutex<HashMap<CertificateId, SyncState>>,
}

impl<V, T, S> CursorTracker<V, T, S>
where
    V: CertificateVault,
    T: DistributionTransport,
    S: DocumentSink,
{
    pub fn new(vault: Arc<V>, transport: T, sink: Arc<S>, config: DistributionConfig) -> Self {
        Self {
            vault,
            transport,
            sink,
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// Current state of `id`; `Idle` if it never synced.
    pub fn state(&self, id: &CertificateId) -> SyncState {
        self.states.lock().get(id).copied().unwrap_or_default()
    }

    /// Incremental sync from the stored cursor.
    pub async fn run_sync(&self, id: CertificateId) -> Result<SyncReport, SyncError> {
        self.sync(id, SyncMode::Incremental).await
    }

    /// Sync starting from `from` instead of the stored cursor, typically to
    /// re-fetch a range already committed.
    pub async fn run_sync_from(&self, id: CertificateId, from: Nsu) -> Result<SyncReport, SyncError> {
        self.sync(id, SyncMode::Override { from }).await
    }

    async fn sync(&self, id: CertificateId, mode: SyncMode) -> Result<SyncReport, SyncError> {
        let mut guard = self.begin(id)?;
        let result = self.execute(id, mode).await;

        match &result {
            Ok(_) => guard.settle(SyncState::Committed),
            Err(err) => {
                match err {
                    SyncError::Protocol(_) => {
                        tracing::error!(certificate = %id, error = %err, "sync failed")
                    }
                    _ => tracing::warn!(
                        certificate = %id,
                        retryable = err.is_retryable(),
                        error = %err,
                        "sync failed"
                    ),
                }
                guard.settle(SyncState::Failed);
            }
        }
        result
    }

    fn begin(&self, id: CertificateId) -> Result<InFlightGuard<'_>, ConcurrencyError> {
        let mut states = self.states.lock();
        let current = states.get(&id).copied().unwrap_or_default();
        let idle = if current.is_terminal() {
            current.transition(SyncState::Idle)
        } else {
            Ok(current)
        };
        let next = idle
            .and_then(|s| s.transition(SyncState::InFlight))
            .map_err(|_| ConcurrencyError { certificate: id })?;
        states.insert(id, next);

        Ok(InFlightGuard {
            states: &self.states,
            id,
            settled: false,
        })
    }

    async fn execute(&self, id: CertificateId, mode: SyncMode) -> Result<SyncReport, SyncError> {
        let certificate = self.vault.get(&id)?;
        certificate.ensure_usable(Utc::now())?;
        let credentials = certificate.credentials()?;

        let before = certificate.cursor;
        let requested_from = match mode {
            SyncMode::Incremental => {
                tracing::info!(
                    certificate = %id,
                    mode = "incremental",
                    from = before.last_seen.value(),
                    "starting sync"
                );
                before.last_seen
            }
            SyncMode::Override { from } => {
                tracing::warn!(
                    certificate = %id,
                    mode = "override",
                    from = from.value(),
                    last_seen = before.last_seen.value(),
                    "starting sync from operator-supplied NSU"
                );
                from
            }
        };

        let request = DistributionRequest::incremental(
            certificate.cnpj.clone(),
            certificate.authority.unwrap_or(self.config.default_authority),
            self.config.environment,
            requested_from,
        );
        let accept_invalid = certificate
            .accept_invalid_server_certs
            .unwrap_or(self.config.accept_invalid_certs);

        let raw = self
            .transport
            .exchange(build_request(&request), &credentials, accept_invalid)
            .await?;
        let response = parse_response(&raw)?;

        let batch = match response.status() {
            ResponseStatus::DocumentsFound => decode(&response.documents),
            ResponseStatus::NoDocuments => DecodedBatch::default(),
            ResponseStatus::Rejected(c_stat) => {
                return Err(RemoteError {
                    c_stat,
                    reason: response.reason,
                }
                .into())
            }
        };

        let reported_last = response
            .last_nsu
            .ok_or(ProtocolError::MissingElement("ultNSU"))?;
        let reported_max = response
            .max_nsu
            .ok_or(ProtocolError::MissingElement("maxNSU"))?;

        if !batch.failures.is_empty() {
            tracing::warn!(
                certificate = %id,
                failed = batch.failures.len(),
                decoded = batch.summaries.len(),
                failed_nsus = ?batch.failed_nsus(),
                "batch has undecodable documents; advancing cursor to the reported NSU"
            );
        }
        if mode == SyncMode::Incremental && reported_last < before.last_seen {
            tracing::warn!(
                certificate = %id,
                stored = before.last_seen.value(),
                reported = reported_last.value(),
                "service reported an NSU behind the stored cursor; keeping the stored value"
            );
        }

        let summaries = unique_by_access_key(batch.summaries);
        for summary in &summaries {
            self.sink.upsert(summary)?;
        }

        let last_seen = match mode {
            SyncMode::Incremental => before.last_seen.max(reported_last),
            SyncMode::Override { .. } => reported_last,
        };
        if matches!(mode, SyncMode::Override { .. }) && last_seen < before.last_seen {
            tracing::warn!(
                certificate = %id,
                mode = "override",
                stored = before.last_seen.value(),
                committed = last_seen.value(),
                "override rewinds the stored cursor"
            );
        }
        let after = Cursor {
            last_seen,
            max_known: reported_max,
            updated_at: Some(Utc::now()),
        };
        self.vault.commit_cursor(&id, after)?;

        tracing::info!(
            certificate = %id,
            c_stat = response.c_stat,
            last_seen = after.last_seen.value(),
            max_known = after.max_known.value(),
            documents = summaries.len(),
            "sync committed"
        );

        Ok(SyncReport {
            certificate_id: id,
            mode,
            requested_from,
            c_stat: response.c_stat,
            reason: response.reason,
            cursor_before: before,
            cursor_after: after,
            summaries,
            failures: batch.failures,
        })
    }
}

/// Keep one summary per access key, the one with the highest NSU, in NSU
/// order.
fn unique_by_access_key(summaries: Vec<DocumentSummary>) -> Vec<DocumentSummary> {
    let mut seen = HashSet::new();
    let mut unique: Vec<DocumentSummary> = summaries
        .into_iter()
        .rev()
        .filter(|s| seen.insert(s.access_key.clone()))
        .collect();
    unique.reverse();
    unique
}

/// Holds a certificate's in-flight slot. Dropping it unsettled (the sync
/// future was cancelled) records `Failed`.
struct InFlightGuard<'a> {
    states: &'a Mutex<HashMap<CertificateId, SyncState>>,
    id: CertificateId,
    settled: bool,
}

impl InFlightGuard<'_> {
    fn settle(&mut self, outcome: SyncState) {
        let mut states = self.states.lock();
        let current = states.get(&self.id).copied().unwrap_or_default();
        match current.transition(outcome) {
            Ok(next) => {
                states.insert(self.id, next);
            }
            Err(e) => tracing::error!(certificate = %self.id, error = %e, "sync state out of step"),
        }
        self.settled = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(certificate = %self.id, "sync abandoned before completion");
            self.settle(SyncState::Failed);
        }
    }
}
