//! One-time import of legacy single-table ID configuration.
//!
//! Legacy values only fill gaps: settings that already exist and registry
//! keys that are already present are left alone, and sequence numbers seed
//! a counter only when its bucket has none.

use std::collections::BTreeSet;

use serde::Serialize;

use docid_core::document_type::{legacy_names_for, normalize_key, DEFAULT_DOCUMENT_TYPES};
use docid_core::period::resolve_bucket;
use docid_core::{
    Clock, CompanySettings, CounterKey, DocumentTypeConfig, LegacyIdConfig, Result,
    SettingsDefaults, TenantId,
};
use docid_store::Store;

use crate::bootstrap::Bootstrapper;
use crate::counters::Counters;

/// A counter seeded from a legacy sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeededCounter {
    pub doc_type: String,
    pub bucket: String,
    pub last_number: u64,
}

/// What a migration run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub tenant: String,
    pub legacy_records: usize,
    pub settings_created: bool,
    pub document_types_created: Vec<String>,
    pub counters_seeded: Vec<SeededCounter>,
    /// Legacy entity names with no registry counterpart.
    pub unmatched_entities: Vec<String>,
}

pub struct LegacyMigrator<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
    defaults: &'a SettingsDefaults,
}

impl<'a, S: Store + ?Sized> LegacyMigrator<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, clock: &'a dyn Clock, defaults: &'a SettingsDefaults) -> Self {
        Self {
            store,
            clock,
            defaults,
        }
    }

    /// Import the tenant's legacy records. Re-running is harmless.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn migrate(&self, tenant: &TenantId) -> Result<MigrationReport> {
        let legacy = self.store.legacy_configs(tenant)?;
        let mut report = MigrationReport {
            tenant: tenant.to_string(),
            legacy_records: legacy.len(),
            ..MigrationReport::default()
        };

        let now = self.clock.now();
        let today = self.clock.today();

        if self.store.settings(tenant)?.is_none() {
            let settings = legacy_settings(&legacy, self.defaults, today, now);
            report.settings_created = self.store.insert_settings_if_absent(tenant, &settings)?;
            if report.settings_created {
                tracing::info!(
                    %tenant,
                    company = %settings.company_code,
                    branch = %settings.branch_code,
                    department = %settings.department_code,
                    "settings created from legacy configuration"
                );
            }
        }

        let existing: BTreeSet<String> = self
            .store
            .document_types(tenant)?
            .into_iter()
            .map(|c| c.key)
            .collect();

        for default in DEFAULT_DOCUMENT_TYPES
            .iter()
            .filter(|d| !existing.contains(d.key))
        {
            let mut config = DocumentTypeConfig::from_default(default, now);
            if let Some(record) = find_legacy(&legacy, default.key) {
                let merged = apply_legacy(config.clone(), record);
                match merged.validate() {
                    Ok(()) => config = merged,
                    Err(e) => tracing::warn!(
                        %tenant,
                        key = default.key,
                        entity = %record.entity_type,
                        error = %e,
                        "legacy values rejected, using defaults"
                    ),
                }
            }
            if self.store.insert_document_type_if_absent(tenant, &config)? {
                report.document_types_created.push(config.key);
            }
        }

        // Finish provisioning and pick up any financial year roll-over before
        // resolving buckets.
        let settings = Bootstrapper::new(self.store, self.clock, self.defaults)
            .ensure_configuration(tenant)?;
        let counters = Counters::new(self.store);

        for record in &legacy {
            let key = normalize_key(&record.entity_type);
            let Some(config) = self.store.document_type(tenant, &key)? else {
                report.unmatched_entities.push(record.entity_type.clone());
                continue;
            };
            let Some(seq) = record.current_seq else {
                continue;
            };
            // The first matching legacy record wins for each key.
            if !find_legacy(&legacy, &key).is_some_and(|r| std::ptr::eq(r, record)) {
                continue;
            }

            let bucket = resolve_bucket(&config, &settings, today);
            let counter = CounterKey::new(tenant, &key, &bucket);
            if counters.seed_if_absent(&counter, seq)? {
                report.counters_seeded.push(SeededCounter {
                    doc_type: key,
                    bucket,
                    last_number: seq,
                });
            }
        }

        tracing::info!(
            %tenant,
            records = report.legacy_records,
            types = report.document_types_created.len(),
            seeded = report.counters_seeded.len(),
            "legacy migration finished"
        );
        Ok(report)
    }
}

/// The legacy record feeding `key`, by alias-table order, then the key
/// itself (which also covers tenant-defined types).
fn find_legacy<'l>(legacy: &'l [LegacyIdConfig], key: &str) -> Option<&'l LegacyIdConfig> {
    let names: Vec<&str> = legacy_names_for(key);
    names.into_iter().chain(std::iter::once(key)).find_map(|name| {
        legacy
            .iter()
            .find(|r| r.entity_type.trim().eq_ignore_ascii_case(name))
    })
}

fn apply_legacy(mut config: DocumentTypeConfig, record: &LegacyIdConfig) -> DocumentTypeConfig {
    if let Some(prefix) = record.prefix() {
        config.prefix = prefix;
    }
    if let Some(template) = record
        .format_template
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        config.format_template = template.to_string();
    }
    if let Some(padding) = record.padding {
        config.padding = padding;
    }
    if let Some(start) = record.start_from {
        config.start_from = start;
    }
    if let Some(policy) = record.reset_policy {
        config.reset_policy = policy;
    }
    config
}

/// Settings using the first non-blank legacy code of each kind.
fn legacy_settings(
    legacy: &[LegacyIdConfig],
    defaults: &SettingsDefaults,
    today: chrono::NaiveDate,
    now: chrono::DateTime<chrono::Utc>,
) -> CompanySettings {
    let mut settings = defaults.settings_for(today, now);
    if let Some(company) = legacy.iter().find_map(LegacyIdConfig::company) {
        settings.company_code = company;
    }
    if let Some(branch) = legacy.iter().find_map(LegacyIdConfig::branch) {
        settings.branch_code = branch;
    }
    if let Some(department) = legacy.iter().find_map(LegacyIdConfig::department) {
        settings.department_code = department;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use docid_core::{FixedClock, ResetPolicy};
    use docid_store::{CounterStore, MemoryStore, RegistryStore};

    fn tenant() -> TenantId {
        TenantId::new("acme").unwrap()
    }

    fn seed(store: &MemoryStore, records: &[LegacyIdConfig]) {
        for r in records {
            store.save_legacy_config(&tenant(), r).unwrap();
        }
    }

    #[test]
    fn imports_codes_prefixes_and_sequences() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                LegacyIdConfig {
                    entity_type: "EMPLOYEE".to_string(),
                    company_code: Some("acme".to_string()),
                    prefix: Some("E".to_string()),
                    padding: Some(5),
                    current_seq: Some(1234),
                    ..LegacyIdConfig::default()
                },
                LegacyIdConfig {
                    entity_type: "OFFER".to_string(),
                    department_code: Some("HR".to_string()),
                    current_seq: Some(17),
                    ..LegacyIdConfig::default()
                },
            ],
        );
        let clock = FixedClock::on(2025, 8, 1).unwrap();
        let defaults = SettingsDefaults::default();

        let report = LegacyMigrator::new(&store, &clock, &defaults)
            .migrate(&tenant())
            .unwrap();

        assert!(report.settings_created);
        assert_eq!(report.document_types_created.len(), 10);
        let settings = store.settings(&tenant()).unwrap().unwrap();
        assert_eq!(settings.company_code, "ACME");
        assert_eq!(settings.branch_code, "AHM");
        assert_eq!(settings.department_code, "HR");

        let emp = store.document_type(&tenant(), "EMP").unwrap().unwrap();
        assert_eq!(emp.prefix, "E");
        assert_eq!(emp.padding, 5);
        assert_eq!(emp.reset_policy, ResetPolicy::Never);

        let emp_counter = CounterKey::new(&tenant(), "EMP", "GLOBAL");
        assert_eq!(store.last_number(&emp_counter).unwrap(), Some(1234));
        let off_counter = CounterKey::new(&tenant(), "OFF", "25-26");
        assert_eq!(store.last_number(&off_counter).unwrap(), Some(17));
        assert_eq!(report.counters_seeded.len(), 2);
    }

    #[test]
    fn never_overwrites_existing_configuration_or_counters() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(2025, 8, 1).unwrap();
        let defaults = SettingsDefaults::default();
        Bootstrapper::new(&store, &clock, &defaults)
            .ensure_configuration(&tenant())
            .unwrap();
        let emp_counter = CounterKey::new(&tenant(), "EMP", "GLOBAL");
        store.raise_to(&emp_counter, 1500).unwrap();

        seed(
            &store,
            &[LegacyIdConfig {
                entity_type: "employee".to_string(),
                company_code: Some("OLD".to_string()),
                prefix: Some("X".to_string()),
                current_seq: Some(10),
                ..LegacyIdConfig::default()
            }],
        );

        let report = LegacyMigrator::new(&store, &clock, &defaults)
            .migrate(&tenant())
            .unwrap();

        assert!(!report.settings_created);
        assert!(report.document_types_created.is_empty());
        assert!(report.counters_seeded.is_empty());
        assert_eq!(store.settings(&tenant()).unwrap().unwrap().company_code, "GTPL");
        assert_eq!(store.document_type(&tenant(), "EMP").unwrap().unwrap().prefix, "EMP");
        assert_eq!(store.last_number(&emp_counter).unwrap(), Some(1500));
    }

    #[test]
    fn invalid_legacy_template_falls_back_to_default() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[LegacyIdConfig {
                entity_type: "JOB".to_string(),
                format_template: Some("{{PREFIX}}-NO-COUNTER".to_string()),
                ..LegacyIdConfig::default()
            }],
        );
        let clock = FixedClock::on(2025, 8, 1).unwrap();
        let defaults = SettingsDefaults::default();
        LegacyMigrator::new(&store, &clock, &defaults)
            .migrate(&tenant())
            .unwrap();

        let job = store.document_type(&tenant(), "JOB").unwrap().unwrap();
        assert_eq!(
            job.format_template,
            "{{COMPANY}}/{{DEPT}}/{{PREFIX}}/{{YEAR}}/{{COUNTER}}"
        );
    }

    #[test]
    fn alias_order_decides_between_records() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                LegacyIdConfig {
                    entity_type: "APP".to_string(),
                    prefix: Some("LATE".to_string()),
                    ..LegacyIdConfig::default()
                },
                LegacyIdConfig {
                    entity_type: "APPLICATION".to_string(),
                    prefix: Some("APPL".to_string()),
                    ..LegacyIdConfig::default()
                },
                LegacyIdConfig {
                    entity_type: "BADGE".to_string(),
                    current_seq: Some(3),
                    ..LegacyIdConfig::default()
                },
            ],
        );
        let clock = FixedClock::on(2025, 8, 1).unwrap();
        let defaults = SettingsDefaults::default();
        let report = LegacyMigrator::new(&store, &clock, &defaults)
            .migrate(&tenant())
            .unwrap();

        assert_eq!(store.document_type(&tenant(), "APP").unwrap().unwrap().prefix, "APPL");
        assert_eq!(report.unmatched_entities, ["BADGE"]);
    }

    #[test]
    fn rerunning_is_a_no_op() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[LegacyIdConfig {
                entity_type: "CANDIDATE".to_string(),
                current_seq: Some(50),
                ..LegacyIdConfig::default()
            }],
        );
        let clock = FixedClock::on(2025, 8, 1).unwrap();
        let defaults = SettingsDefaults::default();
        let migrator = LegacyMigrator::new(&store, &clock, &defaults);
        migrator.migrate(&tenant()).unwrap();
        let second = migrator.migrate(&tenant()).unwrap();
        assert!(!second.settings_created);
        assert!(second.document_types_created.is_empty());
        assert!(second.counters_seeded.is_empty());
    }

    #[test]
    fn seeds_tenant_defined_types_by_key() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(2025, 8, 1).unwrap();
        let defaults = SettingsDefaults::default();
        let mut badge = DocumentTypeConfig::from_default(
            docid_core::document_type::default_for("EMP").unwrap(),
            clock.now(),
        );
        badge.key = "BADGE".to_string();
        badge.prefix = "BDG".to_string();
        store.insert_document_type_if_absent(&tenant(), &badge).unwrap();
        seed(
            &store,
            &[LegacyIdConfig {
                entity_type: "badge".to_string(),
                current_seq: Some(3000),
                ..LegacyIdConfig::default()
            }],
        );

        let report = LegacyMigrator::new(&store, &clock, &defaults)
            .migrate(&tenant())
            .unwrap();

        assert!(report.unmatched_entities.is_empty());
        let counter = CounterKey::new(&tenant(), "BADGE", "GLOBAL");
        assert_eq!(store.last_number(&counter).unwrap(), Some(3000));
    }
}
