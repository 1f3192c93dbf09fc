use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub retry: RetryConfig,
    pub provisioning: ProvisioningConfig,
    pub bulk: BulkConfig,
}

impl LedgerConfig {
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("Failed to parse ledger configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read `{}`", path.display()))?;
        Self::from_toml_str(&source)
    }
}

/// Bounds for replaying a unit of work on transient store errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Attempts for a commit whose outcome is unknown; the unit of work is not replayed.
    pub commit_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
            commit_attempts: 3,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for a 0-indexed retry, capped at `max_backoff_ms`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let backoff = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(backoff.min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub bank_codes: Vec<String>,
    /// Stored as the account number when the gateway could not provision one.
    pub placeholder: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            bank_codes: ["MANDIRI", "BNI", "BRI", "PERMATA"]
                .into_iter()
                .map(String::from)
                .collect(),
            placeholder: "Call administrator for fix this".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub inquiry_concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            inquiry_concurrency: 8,
        }
    }
}
