//! Distribution client configuration.
//!
//! Defaults point to the national production endpoint. Override via
//! environment variables or explicit construction for homologation/testing.
//!
//! ## Server certificate verification
//!
//! `accept_invalid_certs` defaults to `true`. Authority endpoints have
//! historically served incomplete certificate chains, so strict verification
//! breaks the exchange for some of them. This weakens server authentication
//! and is a compatibility setting: turn it off wherever the endpoint's chain
//! validates, and prefer the per-certificate override on the vault record
//! over flipping the global default.

use std::time::Duration;

use dfe_core::{AuthorityCode, Environment};
use url::Url;

/// National endpoint of the NFeDistribuicaoDFe service.
pub const DEFAULT_ENDPOINT: &str =
    "https://www1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx";

/// Homologation endpoint of the NFeDistribuicaoDFe service.
pub const HOMOLOGATION_ENDPOINT: &str =
    "https://hom1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx";

/// Fixed request timeout mandated for the exchange.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Transport-level retries after the first attempt. Timeouts are not retried.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Configuration for the distribution exchange.
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    /// Authority endpoint URL.
    pub endpoint: Url,
    /// Request timeout in seconds (default: 30).
    pub timeout_secs: u64,
    /// Authority code used when a certificate record carries none.
    pub default_authority: AuthorityCode,
    /// `tpAmb` sent in every request.
    pub environment: Environment,
    /// Skip server certificate verification (see module docs).
    pub accept_invalid_certs: bool,
    /// Retries on transport failure, with exponential backoff.
    pub max_retries: u32,
}

impl DistributionConfig {
    /// Create a configuration for `endpoint` with all other settings at
    /// their defaults.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_authority: AuthorityCode::NATIONAL,
            environment: Environment::Production,
            accept_invalid_certs: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DFE_ENDPOINT` (default: national production endpoint, or the
    ///   homologation endpoint when `DFE_ENVIRONMENT=homologation`)
    /// - `DFE_TIMEOUT_SECS` (default: 30)
    /// - `DFE_AUTHORITY_CODE` (default: 91)
    /// - `DFE_ENVIRONMENT` (`production` | `homologation`, default: production)
    /// - `DFE_ACCEPT_INVALID_CERTS` (default: true)
    /// - `DFE_MAX_RETRIES` (default: 2)
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment: Environment = env_parse("DFE_ENVIRONMENT", Environment::Production)?;
        let default_endpoint = match environment {
            Environment::Production => DEFAULT_ENDPOINT,
            Environment::Homologation => HOMOLOGATION_ENDPOINT,
        };

        Ok(Self {
            endpoint: env_url("DFE_ENDPOINT", default_endpoint)?,
            timeout_secs: env_parse("DFE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            default_authority: env_parse("DFE_AUTHORITY_CODE", AuthorityCode::NATIONAL)?,
            environment,
            accept_invalid_certs: env_parse("DFE_ACCEPT_INVALID_CERTS", true)?,
            max_retries: env_parse("DFE_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
        })
    }

    /// Configuration pointing at a local mock server (for testing): short
    /// timeout, no retries, homologation environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `uri` cannot be parsed.
    pub fn local_mock(uri: &str) -> Result<Self, ConfigError> {
        let endpoint =
            Url::parse(uri).map_err(|e| ConfigError::InvalidUrl(uri.to_string(), e.to_string()))?;
        Ok(Self {
            timeout_secs: 5,
            environment: Environment::Homologation,
            max_retries: 0,
            ..Self::new(endpoint)
        })
    }

    /// The request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn env_parse<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = DistributionConfig::new(Url::parse(DEFAULT_ENDPOINT).unwrap());
        assert_eq!(cfg.endpoint.as_str(), DEFAULT_ENDPOINT);
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.default_authority, AuthorityCode::NATIONAL);
        assert_eq!(cfg.environment, Environment::Production);
        assert!(cfg.accept_invalid_certs);
        assert_eq!(cfg.max_retries, 2);
    }

    #[test]
    fn local_mock_builds_valid_config() {
        let cfg = DistributionConfig::local_mock("http://127.0.0.1:9000").unwrap();
        assert_eq!(cfg.endpoint.as_str(), "http://127.0.0.1:9000/");
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.environment, Environment::Homologation);
    }

    #[test]
    fn local_mock_rejects_invalid_url() {
        assert!(DistributionConfig::local_mock("not a url").is_err());
    }

    #[test]
    fn env_url_uses_default_when_var_absent() {
        let url = env_url("DFE_NONEXISTENT_VAR_12345", "https://example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn env_parse_rejects_bad_values() {
        std::env::set_var("DFE_TEST_BAD_TIMEOUT", "thirty");
        let result: Result<u64, _> = env_parse("DFE_TEST_BAD_TIMEOUT", 30);
        std::env::remove_var("DFE_TEST_BAD_TIMEOUT");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn env_parse_reads_authority_code() {
        std::env::set_var("DFE_TEST_AUTHORITY", "35");
        let result: Result<AuthorityCode, _> = env_parse("DFE_TEST_AUTHORITY", AuthorityCode::NATIONAL);
        std::env::remove_var("DFE_TEST_AUTHORITY");
        assert_eq!(result.unwrap().code(), 35);
    }
}
