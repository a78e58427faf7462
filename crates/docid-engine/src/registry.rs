//! Configuration service: read the registry with next-ID previews, and apply
//! administrator updates to settings and document types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use docid_core::document_type::normalize_key;
use docid_core::period::resolve_bucket;
use docid_core::{
    Clock, CompanySettings, CounterKey, DocIdError, DocumentTypeConfig, FinancialYear,
    PeriodBasis, ResetPolicy, Result, SettingsDefaults, TenantId,
};
use docid_store::Store;

use crate::bootstrap::Bootstrapper;
use crate::counters::Counters;
use crate::tokens::{render_id, token_map, ExtraTokens};

/// One document type with its live counter state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentTypeView {
    #[serde(flatten)]
    pub config: DocumentTypeConfig,
    pub bucket: String,
    pub last_number: Option<u64>,
    pub next_number: u64,
    pub preview: String,
}

/// Everything an administrator sees for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationView {
    pub tenant: TenantId,
    pub settings: CompanySettings,
    pub financial_year: String,
    pub document_types: Vec<DocumentTypeView>,
}

/// Settings fields to change; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub company_code: Option<String>,
    pub branch_code: Option<String>,
    pub department_code: Option<String>,
    pub financial_year: Option<FinancialYear>,
}

/// Document type fields to change; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocumentTypeUpdate {
    pub name: Option<String>,
    pub prefix: Option<String>,
    pub separator: Option<String>,
    pub format_template: Option<String>,
    pub padding: Option<usize>,
    pub start_from: Option<u64>,
    pub reset_policy: Option<ResetPolicy>,
    pub period_basis: Option<PeriodBasis>,
    pub ref_number: Option<String>,
    pub custom_tokens: Option<BTreeMap<String, String>>,
    /// Manual correction of the current bucket's last issued number.
    pub last_number: Option<u64>,
    pub updated_by: Option<String>,
}

impl DocumentTypeUpdate {
    fn apply(&self, config: &mut DocumentTypeConfig) {
        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.trim().to_string();
        }
        if let Some(separator) = &self.separator {
            config.separator.clone_from(separator);
        }
        if let Some(template) = &self.format_template {
            config.format_template = template.trim().to_string();
        }
        if let Some(padding) = self.padding {
            config.padding = padding;
        }
        if let Some(start) = self.start_from {
            config.start_from = start;
        }
        if let Some(policy) = self.reset_policy {
            config.reset_policy = policy;
        }
        if let Some(basis) = self.period_basis {
            config.period_basis = basis;
        }
        if let Some(reference) = &self.ref_number {
            let reference = reference.trim();
            config.ref_number = (!reference.is_empty()).then(|| reference.to_string());
        }
        if let Some(tokens) = &self.custom_tokens {
            config.custom_tokens = tokens
                .iter()
                .map(|(k, v)| (docid_core::template::token_name(k), v.clone()))
                .collect();
        }
        if self.updated_by.is_some() {
            config.updated_by.clone_from(&self.updated_by);
        }
    }
}

pub struct ConfigService<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
    defaults: &'a SettingsDefaults,
}

impl<'a, S: Store + ?Sized> ConfigService<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, clock: &'a dyn Clock, defaults: &'a SettingsDefaults) -> Self {
        Self {
            store,
            clock,
            defaults,
        }
    }

    fn bootstrapper(&self) -> Bootstrapper<'a, S> {
        Bootstrapper::new(self.store, self.clock, self.defaults)
    }

    /// Settings and every document type, each with a preview of its next
    /// identifier. Provisions defaults if needed; never touches counters.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn view(&self, tenant: &TenantId) -> Result<ConfigurationView> {
        let settings = self.bootstrapper().ensure_configuration(tenant)?;
        let document_types = self
            .store
            .document_types(tenant)?
            .into_iter()
            .map(|config| self.describe(tenant, &settings, config))
            .collect::<Result<Vec<_>>>()?;

        Ok(ConfigurationView {
            tenant: tenant.clone(),
            financial_year: settings.financial_year_label(),
            settings,
            document_types,
        })
    }

    fn describe(
        &self,
        tenant: &TenantId,
        settings: &CompanySettings,
        config: DocumentTypeConfig,
    ) -> Result<DocumentTypeView> {
        let today = self.clock.today();
        let bucket = resolve_bucket(&config, settings, today);
        let key = CounterKey::new(tenant, &config.key, &bucket);
        let last_number = self.store.last_number(&key)?;
        let next_number = Counters::new(self.store).peek_next(&key, config.start_from)?;
        let tokens = token_map(&config, settings, today, &ExtraTokens::new());
        let preview = render_id(&config, &tokens, next_number);

        Ok(DocumentTypeView {
            config,
            bucket,
            last_number,
            next_number,
            preview,
        })
    }

    /// Apply a settings update.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::InvalidConfig`] for blank codes.
    pub fn update_settings(
        &self,
        tenant: &TenantId,
        update: &SettingsUpdate,
    ) -> Result<CompanySettings> {
        let mut settings = self.bootstrapper().ensure_settings(tenant)?;

        for (field, value, target) in [
            ("company_code", &update.company_code, &mut settings.company_code),
            ("branch_code", &update.branch_code, &mut settings.branch_code),
            (
                "department_code",
                &update.department_code,
                &mut settings.department_code,
            ),
        ] {
            if let Some(value) = value {
                let code = value.trim().to_ascii_uppercase();
                if code.is_empty() {
                    return Err(DocIdError::InvalidConfig(format!("{field} is blank")));
                }
                *target = code;
            }
        }
        if let Some(year) = update.financial_year {
            settings.financial_year = year;
        }
        settings.updated_at = self.clock.now();

        self.store.save_settings(tenant, &settings)?;
        tracing::info!(%tenant, financial_year = %settings.financial_year, "settings updated");
        Ok(settings)
    }

    /// Apply an update to an existing document type.
    ///
    /// A raised start value advances the current bucket's counter to
    /// `start_from - 1` if it lags; a lowered one leaves the counter alone.
    /// `last_number` overwrites the counter outright and is applied last.
    ///
    /// # Errors
    ///
    /// - [`DocIdError::ConfigNotFound`] if the type does not exist
    /// - [`DocIdError::InvalidConfig`] or [`DocIdError::Template`] if the
    ///   result fails validation (nothing is saved)
    pub fn update_document_type(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        update: &DocumentTypeUpdate,
    ) -> Result<DocumentTypeView> {
        let (settings, current) = self.bootstrapper().provision(tenant, doc_type)?;

        let mut updated = current.clone();
        update.apply(&mut updated);
        updated.updated_at = self.clock.now();
        updated.validate()?;
        self.store.save_document_type(tenant, &updated)?;
        tracing::info!(%tenant, doc_type = %updated.key, "document type updated");

        let bucket = resolve_bucket(&updated, &settings, self.clock.today());
        let key = CounterKey::new(tenant, &updated.key, &bucket);
        let counters = Counters::new(self.store);

        if updated.start_from > current.start_from {
            let value = counters.advance_to_at_least(&key, updated.start_from - 1)?;
            tracing::info!(counter = %key, start_from = updated.start_from, last_number = value, "start value raised");
        }
        if let Some(last) = update.last_number {
            counters.override_last_number(&key, last)?;
        }

        self.describe(tenant, &settings, updated)
    }

    /// Register a new document type. Returns `false` if the key exists.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::InvalidConfig`] or [`DocIdError::Template`] if
    /// the configuration is invalid.
    pub fn define_document_type(
        &self,
        tenant: &TenantId,
        mut config: DocumentTypeConfig,
    ) -> Result<bool> {
        config.key = normalize_key(&config.key);
        config.updated_at = self.clock.now();
        config.validate()?;
        let created = self.store.insert_document_type_if_absent(tenant, &config)?;
        if created {
            tracing::info!(%tenant, doc_type = %config.key, "document type defined");
        }
        Ok(created)
    }
}
