//! Document type configuration: the per-tenant contract for one kind of
//! identifier (employee codes, job requisitions, offer letters, ...).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DocIdError;
use crate::template;

/// Separator used when a configuration does not name one.
pub const DEFAULT_SEPARATOR: &str = "/";

/// Padding used when a configuration does not name one.
pub const DEFAULT_PADDING: usize = 4;

/// Largest zero-padding width accepted.
pub const MAX_PADDING: usize = 10;

/// How often a document type's counter restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResetPolicy {
    Never,
    #[default]
    Yearly,
    Monthly,
}

impl ResetPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Never => "NEVER",
            Self::Yearly => "YEARLY",
            Self::Monthly => "MONTHLY",
        }
    }
}

impl fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetPolicy {
    type Err = DocIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEVER" => Ok(Self::Never),
            "YEARLY" => Ok(Self::Yearly),
            "MONTHLY" => Ok(Self::Monthly),
            other => Err(DocIdError::InvalidConfig(format!(
                "unknown reset policy '{other}' (expected NEVER, YEARLY or MONTHLY)"
            ))),
        }
    }
}

/// Which calendar a yearly counter follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodBasis {
    /// April-to-March financial year from the tenant settings.
    #[default]
    FinancialYear,
    /// January-to-December, regardless of the tenant's financial year.
    CalendarYear,
}

impl PeriodBasis {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FinancialYear => "FINANCIAL_YEAR",
            Self::CalendarYear => "CALENDAR_YEAR",
        }
    }
}

impl FromStr for PeriodBasis {
    type Err = DocIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FINANCIAL_YEAR" => Ok(Self::FinancialYear),
            "CALENDAR_YEAR" => Ok(Self::CalendarYear),
            other => Err(DocIdError::InvalidConfig(format!(
                "unknown period basis '{other}'"
            ))),
        }
    }
}

/// Registry entry for one (tenant, document type key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTypeConfig {
    /// Stable short code, e.g. `EMP`, `JOB`.
    pub key: String,
    pub name: String,
    pub prefix: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    pub format_template: String,
    pub start_from: u64,
    #[serde(default = "default_padding")]
    pub padding: usize,
    #[serde(default)]
    pub reset_policy: ResetPolicy,
    #[serde(default)]
    pub period_basis: PeriodBasis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_number: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_tokens: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_padding() -> usize {
    DEFAULT_PADDING
}

impl DocumentTypeConfig {
    /// Check the invariants every stored configuration must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::InvalidConfig`] for an empty key, a start value
    /// below 1, padding outside `1..=10`, or an empty separator, and
    /// [`DocIdError::Template`] for a template without `{{COUNTER}}`.
    pub fn validate(&self) -> Result<(), DocIdError> {
        if self.key.trim().is_empty() {
            return Err(DocIdError::InvalidConfig(
                "document type key is empty".to_string(),
            ));
        }
        if self.start_from < 1 {
            return Err(DocIdError::InvalidConfig(format!(
                "{}: start value must be at least 1",
                self.key
            )));
        }
        if self.padding == 0 || self.padding > MAX_PADDING {
            return Err(DocIdError::InvalidConfig(format!(
                "{}: padding {} outside 1..={MAX_PADDING}",
                self.key, self.padding
            )));
        }
        if self.separator.is_empty() {
            return Err(DocIdError::InvalidConfig(format!(
                "{}: separator is empty",
                self.key
            )));
        }
        template::validate(&self.format_template)?;
        Ok(())
    }

    /// Build a configuration from a default-table row.
    #[must_use]
    pub fn from_default(default: &DocumentTypeDefault, now: DateTime<Utc>) -> Self {
        Self {
            key: default.key.to_string(),
            name: default.name.to_string(),
            prefix: default.prefix.to_string(),
            separator: default_separator(),
            format_template: default.format_template.to_string(),
            start_from: default.start_from,
            padding: DEFAULT_PADDING,
            reset_policy: default.reset_policy,
            period_basis: default.period_basis,
            ref_number: None,
            custom_tokens: BTreeMap::new(),
            updated_by: None,
            updated_at: now,
        }
    }
}

/// One row of the built-in document type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTypeDefault {
    pub key: &'static str,
    pub name: &'static str,
    pub prefix: &'static str,
    pub format_template: &'static str,
    pub start_from: u64,
    pub reset_policy: ResetPolicy,
    pub period_basis: PeriodBasis,
}

const ORG_TEMPLATE: &str = "{{COMPANY}}/{{DEPT}}/{{PREFIX}}/{{YEAR}}/{{COUNTER}}";
const SIMPLE_TEMPLATE: &str = "{{PREFIX}}/{{YEAR}}/{{COUNTER}}";
const LETTER_TEMPLATE: &str = "{{COMPANY}}/{{PREFIX}}/{{YEAR}}/{{COUNTER}}";

const fn yearly(
    key: &'static str,
    name: &'static str,
    format_template: &'static str,
    start_from: u64,
) -> DocumentTypeDefault {
    DocumentTypeDefault {
        key,
        name,
        prefix: key,
        format_template,
        start_from,
        reset_policy: ResetPolicy::Yearly,
        period_basis: PeriodBasis::FinancialYear,
    }
}

/// The standard document types every tenant is bootstrapped with.
pub const DEFAULT_DOCUMENT_TYPES: &[DocumentTypeDefault] = &[
    yearly("JOB", "Job Requisition", ORG_TEMPLATE, 10001),
    yearly("POS", "Position", ORG_TEMPLATE, 1),
    yearly("APP", "Job Application", SIMPLE_TEMPLATE, 1),
    yearly("CAN", "Candidate", SIMPLE_TEMPLATE, 1),
    yearly("OFF", "Offer Letter", ORG_TEMPLATE, 1),
    yearly("APPT", "Appointment Letter", ORG_TEMPLATE, 10001),
    DocumentTypeDefault {
        key: "EMP",
        name: "Employee ID",
        prefix: "EMP",
        format_template: "{{PREFIX}}{{COUNTER}}",
        start_from: 1000,
        reset_policy: ResetPolicy::Never,
        period_basis: PeriodBasis::CalendarYear,
    },
    yearly("INT", "Interview", LETTER_TEMPLATE, 1),
    yearly("EXP", "Experience Letter", LETTER_TEMPLATE, 1),
    yearly("REL", "Relieving Letter", LETTER_TEMPLATE, 1),
];

/// Legacy entity names and the registry keys they map to.
pub const LEGACY_KEY_ALIASES: &[(&str, &str)] = &[
    ("APPLICATION", "APP"),
    ("JOB_APPLICATION", "APP"),
    ("OFFER", "OFF"),
    ("APPOINTMENT", "APPT"),
    ("EMPLOYEE", "EMP"),
    ("CANDIDATE", "CAN"),
    ("JOB", "JOB"),
    ("INTERVIEW", "INT"),
];

/// Look up the default-table row for a registry key.
#[must_use]
pub fn default_for(key: &str) -> Option<&'static DocumentTypeDefault> {
    DEFAULT_DOCUMENT_TYPES.iter().find(|d| d.key == key)
}

/// Normalize a requested document type key: uppercase it and map legacy
/// entity names through the alias table.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    LEGACY_KEY_ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == upper)
        .map_or(upper, |(_, key)| (*key).to_string())
}

/// Legacy entity names that feed a registry key, in alias-table order,
/// followed by the key itself.
#[must_use]
pub fn legacy_names_for(key: &str) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = LEGACY_KEY_ALIASES
        .iter()
        .filter(|(_, k)| *k == key)
        .map(|(legacy, _)| *legacy)
        .collect();
    if let Some(d) = default_for(key) {
        if !names.contains(&d.key) {
            names.push(d.key);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emp(now: DateTime<Utc>) -> DocumentTypeConfig {
        DocumentTypeConfig::from_default(default_for("EMP").unwrap(), now)
    }

    #[test]
    fn default_table_matches_standard_types() {
        let keys: Vec<&str> = DEFAULT_DOCUMENT_TYPES.iter().map(|d| d.key).collect();
        assert_eq!(
            keys,
            ["JOB", "POS", "APP", "CAN", "OFF", "APPT", "EMP", "INT", "EXP", "REL"]
        );

        let job = default_for("JOB").unwrap();
        assert_eq!(job.start_from, 10001);
        assert_eq!(
            job.format_template,
            "{{COMPANY}}/{{DEPT}}/{{PREFIX}}/{{YEAR}}/{{COUNTER}}"
        );
        assert_eq!(job.reset_policy, ResetPolicy::Yearly);

        let emp = default_for("EMP").unwrap();
        assert_eq!(emp.format_template, "{{PREFIX}}{{COUNTER}}");
        assert_eq!(emp.start_from, 1000);
        assert_eq!(emp.reset_policy, ResetPolicy::Never);
        assert_eq!(emp.period_basis, PeriodBasis::CalendarYear);

        assert_eq!(default_for("APPT").unwrap().start_from, 10001);
        assert_eq!(
            default_for("INT").unwrap().format_template,
            "{{COMPANY}}/{{PREFIX}}/{{YEAR}}/{{COUNTER}}"
        );
    }

    #[test]
    fn every_default_is_valid() {
        let now = Utc::now();
        for d in DEFAULT_DOCUMENT_TYPES {
            DocumentTypeConfig::from_default(d, now)
                .validate()
                .unwrap_or_else(|e| panic!("{} invalid: {e}", d.key));
        }
    }

    #[test]
    fn legacy_keys_are_normalized() {
        assert_eq!(normalize_key("APPLICATION"), "APP");
        assert_eq!(normalize_key("offer"), "OFF");
        assert_eq!(normalize_key("APPOINTMENT"), "APPT");
        assert_eq!(normalize_key("EMPLOYEE"), "EMP");
        assert_eq!(normalize_key(" emp "), "EMP");
        assert_eq!(normalize_key("CUSTOM_BADGE"), "CUSTOM_BADGE");
    }

    #[test]
    fn legacy_names_include_aliases_and_key() {
        assert_eq!(legacy_names_for("APP"), ["APPLICATION", "JOB_APPLICATION", "APP"]);
        assert_eq!(legacy_names_for("JOB"), ["JOB"]);
        assert_eq!(legacy_names_for("REL"), ["REL"]);
        assert!(legacy_names_for("NOPE").is_empty());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let now = Utc::now();

        let mut cfg = emp(now);
        cfg.start_from = 0;
        assert!(matches!(cfg.validate(), Err(DocIdError::InvalidConfig(_))));

        let mut cfg = emp(now);
        cfg.padding = 11;
        assert!(cfg.validate().is_err());

        let mut cfg = emp(now);
        cfg.format_template = "{{PREFIX}}-X".to_string();
        assert!(matches!(cfg.validate(), Err(DocIdError::Template(_))));

        let mut cfg = emp(now);
        cfg.separator.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reset_policy_parses_case_insensitively() {
        assert_eq!("never".parse::<ResetPolicy>().unwrap(), ResetPolicy::Never);
        assert_eq!("Monthly".parse::<ResetPolicy>().unwrap(), ResetPolicy::Monthly);
        assert!("weekly".parse::<ResetPolicy>().is_err());
        let json = serde_json::to_string(&ResetPolicy::Yearly).unwrap();
        assert_eq!(json, "\"YEARLY\"");
    }
}
