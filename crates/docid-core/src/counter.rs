//! Counter addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// Address of one counter: a (tenant, document type, bucket) triple.
/// Counters with different keys never influence each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub tenant: TenantId,
    pub doc_type: String,
    pub bucket: String,
}

impl CounterKey {
    #[must_use]
    pub fn new(tenant: &TenantId, doc_type: &str, bucket: &str) -> Self {
        Self {
            tenant: tenant.clone(),
            doc_type: doc_type.to_string(),
            bucket: bucket.to_string(),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.doc_type, self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_all_three_parts() {
        let tenant = TenantId::new("acme").unwrap();
        let key = CounterKey::new(&tenant, "JOB", "25-26");
        assert_eq!(key.to_string(), "acme/JOB/25-26");
    }
}
