//! Engine configuration loaded from `docid.toml` with environment overrides.
//!
//! ```toml
//! database_path = "/var/lib/docid/docid.db"
//! busy_timeout_ms = 5000
//!
//! [defaults]
//! company_code = "GTPL"
//! branch_code = "AHM"
//! department_code = "GEN"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DocIdError;
use crate::settings::SettingsDefaults;

pub const ENV_DATABASE_PATH: &str = "DOCID_DB";
pub const ENV_BUSY_TIMEOUT_MS: &str = "DOCID_BUSY_TIMEOUT_MS";

const DEFAULT_DATABASE_PATH: &str = "docid.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file holding counters, registry and settings.
    pub database_path: PathBuf,
    /// How long a writer waits on a locked database before the store
    /// reports itself unavailable.
    pub busy_timeout_ms: u64,
    /// Codes used when a tenant's settings are first created.
    pub defaults: SettingsDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            defaults: SettingsDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::Config`] if the document is not valid TOML or
    /// has fields of the wrong type.
    pub fn from_toml(source: &str) -> Result<Self, DocIdError> {
        toml::from_str(source).map_err(|e| DocIdError::Config(e.to_string()))
    }

    /// Load configuration from `path` if given (the file must exist), then
    /// apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::Io`] if the file cannot be read and
    /// [`DocIdError::Config`] if it or an override cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, DocIdError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::Config`] if the busy timeout is not an integer.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DocIdError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|p| !p.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = raw.trim().parse().map_err(|_| {
                DocIdError::Config(format!("{ENV_BUSY_TIMEOUT_MS}='{raw}' is not an integer"))
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
