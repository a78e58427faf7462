//! In-process store. Each trait method takes the relevant lock exactly once,
//! so operations are atomic with respect to each other. Share it across
//! threads with `Arc<MemoryStore>`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use docid_core::error::DocIdError;
use docid_core::{
    CompanySettings, CounterKey, DocumentTypeConfig, LegacyIdConfig, Result, TenantId,
};

use crate::{CounterStore, IdentifierLedger, RegistryStore};

type LedgerKey = (TenantId, String);

#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<CounterKey, u64>>,
    settings: Mutex<HashMap<TenantId, CompanySettings>>,
    document_types: Mutex<HashMap<TenantId, BTreeMap<String, DocumentTypeConfig>>>,
    legacy: Mutex<HashMap<TenantId, Vec<LegacyIdConfig>>>,
    /// Lowercased identifier to the form first recorded.
    ledger: Mutex<HashMap<LedgerKey, BTreeMap<String, String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| DocIdError::StoreUnavailable("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryStore {
    fn last_number(&self, key: &CounterKey) -> Result<Option<u64>> {
        Ok(lock(&self.counters)?.get(key).copied())
    }

    fn increment(&self, key: &CounterKey) -> Result<u64> {
        let mut counters = lock(&self.counters)?;
        let value = counters.entry(key.clone()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    fn compare_and_set(&self, key: &CounterKey, expected: u64, target: u64) -> Result<bool> {
        let mut counters = lock(&self.counters)?;
        match counters.get_mut(key) {
            Some(value) if *value == expected => {
                *value = target;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn raise_to(&self, key: &CounterKey, value: u64) -> Result<u64> {
        let mut counters = lock(&self.counters)?;
        let current = counters.entry(key.clone()).or_insert(value);
        *current = (*current).max(value);
        Ok(*current)
    }

    fn create_if_absent(&self, key: &CounterKey, value: u64) -> Result<bool> {
        let mut counters = lock(&self.counters)?;
        if counters.contains_key(key) {
            return Ok(false);
        }
        counters.insert(key.clone(), value);
        Ok(true)
    }

    fn overwrite(&self, key: &CounterKey, value: u64) -> Result<()> {
        lock(&self.counters)?.insert(key.clone(), value);
        Ok(())
    }
}

impl RegistryStore for MemoryStore {
    fn settings(&self, tenant: &TenantId) -> Result<Option<CompanySettings>> {
        Ok(lock(&self.settings)?.get(tenant).cloned())
    }

    fn insert_settings_if_absent(
        &self,
        tenant: &TenantId,
        settings: &CompanySettings,
    ) -> Result<bool> {
        let mut all = lock(&self.settings)?;
        if all.contains_key(tenant) {
            return Ok(false);
        }
        all.insert(tenant.clone(), settings.clone());
        Ok(true)
    }

    fn save_settings(&self, tenant: &TenantId, settings: &CompanySettings) -> Result<()> {
        lock(&self.settings)?.insert(tenant.clone(), settings.clone());
        Ok(())
    }

    fn document_type(&self, tenant: &TenantId, key: &str) -> Result<Option<DocumentTypeConfig>> {
        Ok(lock(&self.document_types)?
            .get(tenant)
            .and_then(|types| types.get(key))
            .cloned())
    }

    fn document_types(&self, tenant: &TenantId) -> Result<Vec<DocumentTypeConfig>> {
        Ok(lock(&self.document_types)?
            .get(tenant)
            .map(|types| types.values().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_document_type_if_absent(
        &self,
        tenant: &TenantId,
        config: &DocumentTypeConfig,
    ) -> Result<bool> {
        let mut all = lock(&self.document_types)?;
        let types = all.entry(tenant.clone()).or_default();
        if types.contains_key(&config.key) {
            return Ok(false);
        }
        types.insert(config.key.clone(), config.clone());
        Ok(true)
    }

    fn save_document_type(&self, tenant: &TenantId, config: &DocumentTypeConfig) -> Result<()> {
        lock(&self.document_types)?
            .entry(tenant.clone())
            .or_default()
            .insert(config.key.clone(), config.clone());
        Ok(())
    }

    fn legacy_configs(&self, tenant: &TenantId) -> Result<Vec<LegacyIdConfig>> {
        Ok(lock(&self.legacy)?.get(tenant).cloned().unwrap_or_default())
    }

    fn save_legacy_config(&self, tenant: &TenantId, legacy: &LegacyIdConfig) -> Result<()> {
        let mut record = legacy.clone();
        record.entity_type = record.entity_type.trim().to_ascii_uppercase();

        let mut all = lock(&self.legacy)?;
        let records = all.entry(tenant.clone()).or_default();
        match records
            .iter_mut()
            .find(|r| r.entity_type == record.entity_type)
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }
}

impl IdentifierLedger for MemoryStore {
    fn record_identifiers(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        identifiers: &[String],
    ) -> Result<usize> {
        let mut ledger = lock(&self.ledger)?;
        let known = ledger
            .entry((tenant.clone(), doc_type.to_string()))
            .or_default();
        let mut added = 0;
        for identifier in identifiers {
            let folded = identifier.to_lowercase();
            if !known.contains_key(&folded) {
                known.insert(folded, identifier.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    fn identifiers(&self, tenant: &TenantId, doc_type: &str) -> Result<Vec<String>> {
        Ok(lock(&self.ledger)?
            .get(&(tenant.clone(), doc_type.to_string()))
            .map(|known| known.values().cloned().collect())
            .unwrap_or_default())
    }
}
