//! # docid-store
//!
//! Persistence for docid: counters, the document type registry, company
//! settings, legacy configuration, and the issued identifier ledger.
//!
//! The engine only talks to the traits below. Every counter mutation is a
//! single atomic statement against the backing store; the engine composes
//! them without holding locks of its own.
//!
//! Backends:
//! - [`SqliteStore`]: embedded SQLite database (WAL, busy timeout)
//! - [`MemoryStore`]: in-process maps, `Send + Sync`, for tests and embedding

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use docid_core::{
    CompanySettings, CounterKey, DocumentTypeConfig, LegacyIdConfig, Result, TenantId,
};

/// Atomic operations on (tenant, document type, bucket) counters.
///
/// Each method is one atomic read-modify-write against the store. Values
/// only move backwards through [`CounterStore::overwrite`].
pub trait CounterStore {
    /// Last issued value, or `None` if the bucket has never been used.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn last_number(&self, key: &CounterKey) -> Result<Option<u64>>;

    /// Add one to the counter, creating it at zero first if absent, and
    /// return the new value. Concurrent callers never observe the same value.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn increment(&self, key: &CounterKey) -> Result<u64>;

    /// Set the counter to `target` only if it currently equals `expected`.
    /// Returns whether the update applied.
    ///
    /// # Errors
    ///
    /// Propagates store failures. A predicate miss is not an error.
    fn compare_and_set(&self, key: &CounterKey, expected: u64, target: u64) -> Result<bool>;

    /// Raise the counter to at least `value`, creating it if absent, and
    /// return the resulting value. Never lowers the counter.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn raise_to(&self, key: &CounterKey, value: u64) -> Result<u64>;

    /// Create the counter at `value` unless it already exists. Returns
    /// whether this call created it.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn create_if_absent(&self, key: &CounterKey, value: u64) -> Result<bool>;

    /// Unconditionally set the counter. Reserved for explicit administrator
    /// corrections.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn overwrite(&self, key: &CounterKey, value: u64) -> Result<()>;
}

/// Per-tenant settings, document type registry and legacy records.
pub trait RegistryStore {
    /// # Errors
    ///
    /// Propagates store failures.
    fn settings(&self, tenant: &TenantId) -> Result<Option<CompanySettings>>;

    /// Insert settings unless the tenant already has some. Returns whether
    /// this call inserted them.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn insert_settings_if_absent(
        &self,
        tenant: &TenantId,
        settings: &CompanySettings,
    ) -> Result<bool>;

    /// Insert or replace the tenant's settings.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn save_settings(&self, tenant: &TenantId, settings: &CompanySettings) -> Result<()>;

    /// # Errors
    ///
    /// Propagates store failures.
    fn document_type(&self, tenant: &TenantId, key: &str) -> Result<Option<DocumentTypeConfig>>;

    /// All document types of a tenant, ordered by key.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn document_types(&self, tenant: &TenantId) -> Result<Vec<DocumentTypeConfig>>;

    /// Insert a document type unless (tenant, key) exists. Returns whether
    /// this call inserted it.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn insert_document_type_if_absent(
        &self,
        tenant: &TenantId,
        config: &DocumentTypeConfig,
    ) -> Result<bool>;

    /// Insert or replace a document type.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn save_document_type(&self, tenant: &TenantId, config: &DocumentTypeConfig) -> Result<()>;

    /// Legacy records of a tenant, in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn legacy_configs(&self, tenant: &TenantId) -> Result<Vec<LegacyIdConfig>>;

    /// Insert or replace the legacy record for `legacy.entity_type`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn save_legacy_config(&self, tenant: &TenantId, legacy: &LegacyIdConfig) -> Result<()>;
}

/// Identifiers already persisted for a tenant and document type.
/// Comparisons are case-insensitive.
pub trait IdentifierLedger {
    /// Record identifiers, ignoring ones already present. Returns how many
    /// were new.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn record_identifiers(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        identifiers: &[String],
    ) -> Result<usize>;

    /// Every recorded identifier for (tenant, document type).
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn identifiers(&self, tenant: &TenantId, doc_type: &str) -> Result<Vec<String>>;
}

/// Everything the engine needs from one backend.
pub trait Store: CounterStore + RegistryStore + IdentifierLedger {}

impl<T: CounterStore + RegistryStore + IdentifierLedger + ?Sized> Store for T {}
