//! Configuration bootstrapper: makes sure a tenant has settings and every
//! standard document type before anything is generated.
//!
//! All writes are insert-if-absent, so concurrent bootstraps converge.

use std::collections::BTreeSet;

use docid_core::document_type::{default_for, normalize_key, DEFAULT_DOCUMENT_TYPES};
use docid_core::{
    Clock, CompanySettings, DocIdError, DocumentTypeConfig, Result, SettingsDefaults, TenantId,
};
use docid_store::RegistryStore;

pub struct Bootstrapper<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
    defaults: &'a SettingsDefaults,
}

impl<'a, S: RegistryStore + ?Sized> Bootstrapper<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, clock: &'a dyn Clock, defaults: &'a SettingsDefaults) -> Self {
        Self {
            store,
            clock,
            defaults,
        }
    }

    /// Ensure settings and the default document types exist, rolling the
    /// financial year forward if the clock has passed April 1. Safe to call
    /// on every request.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn ensure_configuration(&self, tenant: &TenantId) -> Result<CompanySettings> {
        let settings = self.ensure_settings(tenant)?;
        self.ensure_document_types(tenant)?;
        Ok(settings)
    }

    /// Settings for `tenant`, created from defaults or rolled forward.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn ensure_settings(&self, tenant: &TenantId) -> Result<CompanySettings> {
        let today = self.clock.today();
        let now = self.clock.now();

        match self.store.settings(tenant)? {
            Some(mut settings) => {
                let previous = settings.financial_year;
                if settings.roll_forward(today, now) {
                    self.store.save_settings(tenant, &settings)?;
                    tracing::info!(
                        %tenant,
                        from = %previous,
                        to = %settings.financial_year,
                        "financial year rolled forward"
                    );
                }
                Ok(settings)
            }
            None => {
                let fresh = self.defaults.settings_for(today, now);
                if self.store.insert_settings_if_absent(tenant, &fresh)? {
                    tracing::info!(%tenant, financial_year = %fresh.financial_year, "created company settings");
                }
                Ok(self.store.settings(tenant)?.unwrap_or(fresh))
            }
        }
    }

    /// Insert every default document type the tenant lacks. Returns the keys
    /// this call created.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn ensure_document_types(&self, tenant: &TenantId) -> Result<Vec<String>> {
        let existing: BTreeSet<String> = self
            .store
            .document_types(tenant)?
            .into_iter()
            .map(|c| c.key)
            .collect();

        let now = self.clock.now();
        let mut created = Vec::new();
        for default in DEFAULT_DOCUMENT_TYPES
            .iter()
            .filter(|d| !existing.contains(d.key))
        {
            let config = DocumentTypeConfig::from_default(default, now);
            if self.store.insert_document_type_if_absent(tenant, &config)? {
                created.push(config.key);
            }
        }

        if !created.is_empty() {
            tracing::info!(%tenant, created = ?created, "provisioned default document types");
        }
        Ok(created)
    }

    /// Look up a document type by key (legacy names allowed), provisioning
    /// defaults first. Returns the tenant settings alongside.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::ConfigNotFound`] if the key is neither in the
    /// registry nor in the default table after provisioning.
    pub fn provision(
        &self,
        tenant: &TenantId,
        raw_key: &str,
    ) -> Result<(CompanySettings, DocumentTypeConfig)> {
        let key = normalize_key(raw_key);
        let settings = self.ensure_settings(tenant)?;

        if let Some(config) = self.store.document_type(tenant, &key)? {
            return Ok((settings, config));
        }
        if default_for(&key).is_some() {
            self.ensure_document_types(tenant)?;
            if let Some(config) = self.store.document_type(tenant, &key)? {
                return Ok((settings, config));
            }
        }
        Err(DocIdError::ConfigNotFound(format!("{tenant}/{key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docid_core::FixedClock;
    use docid_store::MemoryStore;

    fn tenant() -> TenantId {
        TenantId::new("acme").unwrap()
    }

    #[test]
    fn creates_settings_and_all_defaults() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(2025, 6, 15).unwrap();
        let defaults = SettingsDefaults::default();
        let boot = Bootstrapper::new(&store, &clock, &defaults);

        let settings = boot.ensure_configuration(&tenant()).unwrap();
        assert_eq!(settings.company_code, "GTPL");
        assert_eq!(settings.financial_year_label(), "25-26");
        assert_eq!(store.document_types(&tenant()).unwrap().len(), 10);
    }

    #[test]
    fn ensure_is_idempotent() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(2025, 6, 15).unwrap();
        let defaults = SettingsDefaults::default();
        let boot = Bootstrapper::new(&store, &clock, &defaults);

        boot.ensure_configuration(&tenant()).unwrap();
        let mut custom = store.document_type(&tenant(), "JOB").unwrap().unwrap();
        custom.prefix = "REQ".to_string();
        store.save_document_type(&tenant(), &custom).unwrap();

        assert!(boot.ensure_document_types(&tenant()).unwrap().is_empty());
        let again = boot.ensure_configuration(&tenant()).unwrap();
        assert_eq!(again.financial_year_label(), "25-26");
        assert_eq!(
            store.document_type(&tenant(), "JOB").unwrap().unwrap().prefix,
            "REQ"
        );
    }

    #[test]
    fn rolls_financial_year_forward_at_april() {
        let store = MemoryStore::new();
        let defaults = SettingsDefaults::default();

        let march = FixedClock::on(2026, 3, 31).unwrap();
        Bootstrapper::new(&store, &march, &defaults)
            .ensure_configuration(&tenant())
            .unwrap();

        let april = FixedClock::on(2026, 4, 1).unwrap();
        let settings = Bootstrapper::new(&store, &april, &defaults)
            .ensure_configuration(&tenant())
            .unwrap();
        assert_eq!(settings.financial_year_label(), "26-27");
        assert_eq!(
            store.settings(&tenant()).unwrap().unwrap().financial_year_label(),
            "26-27"
        );
    }

    #[test]
    fn provision_normalizes_legacy_keys() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(2025, 6, 15).unwrap();
        let defaults = SettingsDefaults::default();
        let boot = Bootstrapper::new(&store, &clock, &defaults);

        let (_, config) = boot.provision(&tenant(), "employee").unwrap();
        assert_eq!(config.key, "EMP");
        assert_eq!(config.start_from, 1000);
    }

    #[test]
    fn provision_rejects_unknown_keys() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(2025, 6, 15).unwrap();
        let defaults = SettingsDefaults::default();
        let err = Bootstrapper::new(&store, &clock, &defaults)
            .provision(&tenant(), "BADGE")
            .unwrap_err();
        assert!(matches!(err, DocIdError::ConfigNotFound(_)));
    }

    #[test]
    fn configured_defaults_seed_new_tenants() {
        let store = MemoryStore::new();
        let clock = FixedClock::on(2025, 6, 15).unwrap();
        let defaults = SettingsDefaults {
            company_code: "ACME".to_string(),
            ..SettingsDefaults::default()
        };
        let settings = Bootstrapper::new(&store, &clock, &defaults)
            .ensure_settings(&tenant())
            .unwrap();
        assert_eq!(settings.company_code, "ACME");
        assert_eq!(settings.branch_code, "AHM");
    }
}
