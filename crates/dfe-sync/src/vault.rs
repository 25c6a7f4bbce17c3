//! # Certificate Vault
//!
//! Long-lived certificate records: the taxpayer's PKCS#12 bundle and
//! passphrase, validity, and the NSU cursor the sync engine advances.
//!
//! The sync engine only reads credentials and writes cursor fields.
//! Creating records is an administrative concern (`insert`), used by the CLI
//! and by tests.
//!
//! Two backends:
//!
//! - [`MemoryVault`]: process-local, for tests and embedding.
//! - [`JsonFileVault`]: one JSON document on disk, rewritten atomically
//!   (temp file + rename) on every mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dfe_core::{AuthorityCode, CertificateId, Cnpj, Nsu};
use dfe_crypto::{AuthenticationError, ClientCredentials};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::VaultError;

/// Position of a certificate in the authority's NSU sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cursor {
    /// Last NSU reported as covered. Never decreases across commits.
    pub last_seen: Nsu,
    /// Highest NSU the authority reported holding.
    pub max_known: Nsu,
    /// When the cursor was last committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cursor {
    /// Whether the last response said there is nothing beyond `last_seen`.
    pub fn is_caught_up(&self) -> bool {
        self.last_seen >= self.max_known
    }
}

/// One taxpayer certificate with its sync cursor.
#[derive(Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub cnpj: Cnpj,
    /// Falls back to the configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<AuthorityCode>,
    /// PKCS#12 bundle, base64.
    pub bundle_base64: String,
    pub passphrase: Zeroizing<String>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    /// Overrides the endpoint-level `accept_invalid_certs` setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_invalid_server_certs: Option<bool>,
    #[serde(default)]
    pub cursor: Cursor,
}

impl Certificate {
    /// A new active record with a zero cursor.
    pub fn new(
        cnpj: Cnpj,
        bundle_base64: impl Into<String>,
        passphrase: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CertificateId::new(),
            cnpj,
            authority: None,
            bundle_base64: bundle_base64.into(),
            passphrase: Zeroizing::new(passphrase.into()),
            expires_at,
            active: true,
            accept_invalid_server_certs: None,
            cursor: Cursor::default(),
        }
    }

    /// Fail if the record is deactivated or past its validity window.
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<(), AuthenticationError> {
        if !self.active {
            return Err(AuthenticationError::Inactive {
                certificate: self.id.to_string(),
            });
        }
        if self.expires_at <= now {
            return Err(AuthenticationError::Expired {
                certificate: self.id.to_string(),
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// Decompose the stored bundle into TLS credentials.
    pub fn credentials(&self) -> Result<ClientCredentials, AuthenticationError> {
        dfe_crypto::extract_base64(&self.bundle_base64, &self.passphrase)
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("id", &self.id)
            .field("cnpj", &self.cnpj)
            .field("authority", &self.authority)
            .field("bundle_base64", &format_args!("[{} chars]", self.bundle_base64.len()))
            .field("passphrase", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("active", &self.active)
            .field("accept_invalid_server_certs", &self.accept_invalid_server_certs)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Storage for certificate records.
pub trait CertificateVault: Send + Sync {
    /// Fetch one record.
    fn get(&self, id: &CertificateId) -> Result<Certificate, VaultError>;

    /// All records, ordered by id.
    fn list(&self) -> Result<Vec<Certificate>, VaultError>;

    /// Add a record. Fails if the id is taken.
    fn insert(&self, certificate: Certificate) -> Result<(), VaultError>;

    /// Replace the cursor of an existing record.
    fn commit_cursor(&self, id: &CertificateId, cursor: Cursor) -> Result<(), VaultError>;
}

// ─── In-memory ───────────────────────────────────────────────────────

/// Process-local vault.
#[derive(Debug, Default)]
pub struct MemoryVault {
    records: RwLock<HashMap<CertificateId, Certificate>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CertificateVault for MemoryVault {
    fn get(&self, id: &CertificateId) -> Result<Certificate, VaultError> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or(VaultError::NotFound(*id))
    }

    fn list(&self) -> Result<Vec<Certificate>, VaultError> {
        let mut all: Vec<Certificate> = self.records.read().values().cloned().collect();
        all.sort_by_key(|c| c.id);
        Ok(all)
    }

    fn insert(&self, certificate: Certificate) -> Result<(), VaultError> {
        let mut records = self.records.write();
        if records.contains_key(&certificate.id) {
            return Err(VaultError::Duplicate(certificate.id));
        }
        records.insert(certificate.id, certificate);
        Ok(())
    }

    fn commit_cursor(&self, id: &CertificateId, cursor: Cursor) -> Result<(), VaultError> {
        let mut records = self.records.write();
        let record = records.get_mut(id).ok_or(VaultError::NotFound(*id))?;
        record.cursor = cursor;
        Ok(())
    }
}

// ─── JSON file ───────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultFile {
    certificates: Vec<Certificate>,
}

/// Vault persisted as a single JSON document.
///
/// Every operation re-reads the file under a process-wide lock, so the file
/// stays the source of truth. Writes go to `<path>.tmp` and are renamed over
/// the original.
#[derive(Debug)]
pub struct JsonFileVault {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileVault {
    /// Open the vault at `path`. A missing file is an empty vault; an
    /// existing one must parse.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let vault = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };
        vault.load()?;
        Ok(vault)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<VaultFile, VaultError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VaultFile::default()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn store(&self, file: &VaultFile) -> Result<(), VaultError> {
        let bytes = serde_json::to_vec_pretty(file)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, bytes).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> VaultError {
        VaultError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CertificateVault for JsonFileVault {
    fn get(&self, id: &CertificateId) -> Result<Certificate, VaultError> {
        let _guard = self.lock.lock();
        self.load()?
            .certificates
            .into_iter()
            .find(|c| c.id == *id)
            .ok_or(VaultError::NotFound(*id))
    }

    fn list(&self) -> Result<Vec<Certificate>, VaultError> {
        let _guard = self.lock.lock();
        let mut all = self.load()?.certificates;
        all.sort_by_key(|c| c.id);
        Ok(all)
    }

    fn insert(&self, certificate: Certificate) -> Result<(), VaultError> {
        let _guard = self.lock.lock();
        let mut file = self.load()?;
        if file.certificates.iter().any(|c| c.id == certificate.id) {
            return Err(VaultError::Duplicate(certificate.id));
        }
        file.certificates.push(certificate);
        self.store(&file)
    }

    fn commit_cursor(&self, id: &CertificateId, cursor: Cursor) -> Result<(), VaultError> {
        let _guard = self.lock.lock();
        let mut file = self.load()?;
        let record = file
            .certificates
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or(VaultError::NotFound(*id))?;
        record.cursor = cursor;
        self.store(&file)
    }
}
