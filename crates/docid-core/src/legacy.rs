//! Legacy single-table ID configuration, read only by the migrator.

use serde::{Deserialize, Serialize};

use crate::document_type::ResetPolicy;

/// One record of the pre-registry configuration. Every field except the
/// entity name is optional because older records were sparsely filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyIdConfig {
    /// Legacy entity name, e.g. `EMPLOYEE`, `OFFER`, `JOB`.
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_from: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_policy: Option<ResetPolicy>,
    /// Last sequence number issued under the legacy scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_seq: Option<u64>,
}

impl LegacyIdConfig {
    /// Non-empty, trimmed, uppercased value of an optional code field.
    fn code(value: Option<&String>) -> Option<String> {
        value
            .map(|v| v.trim().to_ascii_uppercase())
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn company(&self) -> Option<String> {
        Self::code(self.company_code.as_ref())
    }

    #[must_use]
    pub fn branch(&self) -> Option<String> {
        Self::code(self.branch_code.as_ref())
    }

    #[must_use]
    pub fn department(&self) -> Option<String> {
        Self::code(self.department_code.as_ref())
    }

    #[must_use]
    pub fn prefix(&self) -> Option<String> {
        Self::code(self.prefix.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_codes_count_as_missing() {
        let legacy = LegacyIdConfig {
            entity_type: "EMPLOYEE".to_string(),
            company_code: Some("  ".to_string()),
            branch_code: Some(" blr ".to_string()),
            ..LegacyIdConfig::default()
        };
        assert_eq!(legacy.company(), None);
        assert_eq!(legacy.branch(), Some("BLR".to_string()));
        assert_eq!(legacy.department(), None);
    }

    #[test]
    fn json_omits_missing_fields() {
        let legacy = LegacyIdConfig {
            entity_type: "OFFER".to_string(),
            current_seq: Some(41),
            ..LegacyIdConfig::default()
        };
        let json = serde_json::to_string(&legacy).unwrap();
        assert_eq!(json, r#"{"entity_type":"OFFER","current_seq":41}"#);
    }
}
