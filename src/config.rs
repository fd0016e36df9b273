//! Service configuration loaded from TOML
use super::error::ValidationError;
use super::hierarchy::DEFAULT_PAYMENT_THRESHOLD;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    /// Payments below this amount use the deputy-first approval order.
    pub payment_threshold: u64,
    /// Days between an advance payment's approval and its reclaim deadline,
    /// also the step of each manual extension.
    pub reclaim_period_days: u64,
    pub log_level: String,
    pub file_root: PathBuf,
    pub public_base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("approvals.db"),
            payment_threshold: DEFAULT_PAYMENT_THRESHOLD,
            reclaim_period_days: 30,
            log_level: "info".to_string(),
            file_root: PathBuf::from("files"),
            public_base_url: "http://localhost:8080/files".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: ServiceConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.payment_threshold == 0 {
            return Err(ValidationError::Config(
                "payment_threshold must be positive".into(),
            ));
        }
        if self.reclaim_period_days == 0 {
            return Err(ValidationError::Config(
                "reclaim_period_days must be positive".into(),
            ));
        }
        Ok(())
    }
}
