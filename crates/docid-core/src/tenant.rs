//! Tenant identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DocIdError;

const MAX_TENANT_LEN: usize = 64;

/// A validated tenant identifier. Every counter, registry entry and
/// settings record is scoped by one of these.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate and wrap a raw tenant identifier.
    ///
    /// Accepts 1-64 ASCII letters, digits, `-`, `_` or `.`.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::InvalidTenant`] otherwise.
    pub fn new(raw: impl Into<String>) -> Result<Self, DocIdError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DocIdError::InvalidTenant("tenant id is empty".to_string()));
        }
        if trimmed.len() > MAX_TENANT_LEN {
            return Err(DocIdError::InvalidTenant(format!(
                "tenant id longer than {MAX_TENANT_LEN} characters"
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(DocIdError::InvalidTenant(format!(
                "tenant id '{trimmed}' contains '{bad}'"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = DocIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}
