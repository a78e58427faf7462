//! SQLite-backed store.
//!
//! Every counter mutation is a single statement (`INSERT ... ON CONFLICT DO
//! UPDATE ... RETURNING` or `UPDATE ... WHERE`), which SQLite executes
//! atomically. Several processes or threads may each open their own
//! [`SqliteStore`] on the same file; WAL mode plus a busy timeout serializes
//! their writers.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use docid_core::error::DocIdError;
use docid_core::{
    CompanySettings, CounterKey, DocumentTypeConfig, FinancialYear, LegacyIdConfig, Result,
    TenantId,
};

use crate::{CounterStore, IdentifierLedger, RegistryStore};

/// Busy timeout used by [`SqliteStore::open_default`].
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A handle on the docid SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

/// Map a rusqlite error onto the docid taxonomy: contention and I/O
/// failures mean the store is unavailable, everything else is a store error.
pub(crate) fn store_err(e: rusqlite::Error) -> DocIdError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e {
        if matches!(
            failure.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
        ) {
            return DocIdError::StoreUnavailable(e.to_string());
        }
    }
    DocIdError::Store(e.to_string())
}

fn to_sql_int(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| DocIdError::Store(format!("counter value {value} overflows")))
}

fn from_sql_int(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| DocIdError::Store(format!("negative stored value {value}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DocIdError::Store(format!("bad timestamp '{raw}': {e}")))
}

impl SqliteStore {
    /// Open or create a database at `path`, waiting up to `busy_timeout`
    /// for competing writers.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::StoreUnavailable`] if the file cannot be opened
    /// and [`DocIdError::Store`] if schema creation fails.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        conn.busy_timeout(busy_timeout).map_err(store_err)?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(store_err)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened sqlite store");
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    /// [`SqliteStore::open`] with [`DEFAULT_BUSY_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// See [`SqliteStore::open`].
    pub fn open_default(path: &Path) -> Result<Self> {
        Self::open(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::Store`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS company_settings (
                tenant_id TEXT PRIMARY KEY,
                company_code TEXT NOT NULL,
                branch_code TEXT NOT NULL,
                department_code TEXT NOT NULL,
                financial_year_start INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS document_types (
                tenant_id TEXT NOT NULL,
                key TEXT NOT NULL,
                name TEXT NOT NULL,
                prefix TEXT NOT NULL,
                separator TEXT NOT NULL,
                format_template TEXT NOT NULL,
                start_from INTEGER NOT NULL CHECK (start_from >= 1),
                padding INTEGER NOT NULL,
                reset_policy TEXT NOT NULL,
                period_basis TEXT NOT NULL,
                ref_number TEXT,
                custom_tokens TEXT NOT NULL DEFAULT '{}',
                updated_by TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, key)
            );

            CREATE TABLE IF NOT EXISTS document_counters (
                tenant_id TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                bucket TEXT NOT NULL,
                last_number INTEGER NOT NULL CHECK (last_number >= 0),
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, doc_type, bucket)
            );

            CREATE TABLE IF NOT EXISTS issued_identifiers (
                tenant_id TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                identifier TEXT NOT NULL COLLATE NOCASE,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, doc_type, identifier)
            );

            CREATE TABLE IF NOT EXISTS legacy_id_configs (
                tenant_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                company_code TEXT,
                branch_code TEXT,
                department_code TEXT,
                prefix TEXT,
                format_template TEXT,
                padding INTEGER,
                start_from INTEGER,
                reset_policy TEXT,
                current_seq INTEGER,
                UNIQUE (tenant_id, entity_type)
            );
            ",
            )
            .map_err(store_err)?;

        Ok(())
    }

    /// Number of counters across all tenants.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn counter_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM document_counters", [], |row| row.get(0))
            .map_err(store_err)?;
        from_sql_int(count)
    }
}

impl CounterStore for SqliteStore {
    fn last_number(&self, key: &CounterKey) -> Result<Option<u64>> {
        let value: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_number FROM document_counters
                 WHERE tenant_id = ?1 AND doc_type = ?2 AND bucket = ?3",
                params![key.tenant.as_str(), key.doc_type, key.bucket],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        value.map(from_sql_int).transpose()
    }

    fn increment(&self, key: &CounterKey) -> Result<u64> {
        let value: i64 = self
            .conn
            .query_row(
                "INSERT INTO document_counters (tenant_id, doc_type, bucket, last_number, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT (tenant_id, doc_type, bucket)
                 DO UPDATE SET last_number = last_number + 1, updated_at = excluded.updated_at
                 RETURNING last_number",
                params![
                    key.tenant.as_str(),
                    key.doc_type,
                    key.bucket,
                    Utc::now().to_rfc3339()
                ],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        from_sql_int(value)
    }

    fn compare_and_set(&self, key: &CounterKey, expected: u64, target: u64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE document_counters SET last_number = ?5, updated_at = ?6
                 WHERE tenant_id = ?1 AND doc_type = ?2 AND bucket = ?3 AND last_number = ?4",
                params![
                    key.tenant.as_str(),
                    key.doc_type,
                    key.bucket,
                    to_sql_int(expected)?,
                    to_sql_int(target)?,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(store_err)?;
        Ok(changed == 1)
    }

    fn raise_to(&self, key: &CounterKey, value: u64) -> Result<u64> {
        let result: i64 = self
            .conn
            .query_row(
                "INSERT INTO document_counters (tenant_id, doc_type, bucket, last_number, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (tenant_id, doc_type, bucket)
                 DO UPDATE SET last_number = max(last_number, excluded.last_number),
                               updated_at = excluded.updated_at
                 RETURNING last_number",
                params![
                    key.tenant.as_str(),
                    key.doc_type,
                    key.bucket,
                    to_sql_int(value)?,
                    Utc::now().to_rfc3339()
                ],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        from_sql_int(result)
    }

    fn create_if_absent(&self, key: &CounterKey, value: u64) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO document_counters (tenant_id, doc_type, bucket, last_number, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (tenant_id, doc_type, bucket) DO NOTHING",
                params![
                    key.tenant.as_str(),
                    key.doc_type,
                    key.bucket,
                    to_sql_int(value)?,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(store_err)?;
        Ok(inserted == 1)
    }

    fn overwrite(&self, key: &CounterKey, value: u64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO document_counters (tenant_id, doc_type, bucket, last_number, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (tenant_id, doc_type, bucket)
                 DO UPDATE SET last_number = excluded.last_number, updated_at = excluded.updated_at",
                params![
                    key.tenant.as_str(),
                    key.doc_type,
                    key.bucket,
                    to_sql_int(value)?,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

/// Raw `document_types` row before conversion.
struct DocumentTypeRow {
    key: String,
    name: String,
    prefix: String,
    separator: String,
    format_template: String,
    start_from: i64,
    padding: i64,
    reset_policy: String,
    period_basis: String,
    ref_number: Option<String>,
    custom_tokens: String,
    updated_by: Option<String>,
    updated_at: String,
}

const DOCUMENT_TYPE_COLUMNS: &str = "key, name, prefix, separator, format_template, start_from,
     padding, reset_policy, period_basis, ref_number, custom_tokens, updated_by, updated_at";

impl DocumentTypeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            name: row.get(1)?,
            prefix: row.get(2)?,
            separator: row.get(3)?,
            format_template: row.get(4)?,
            start_from: row.get(5)?,
            padding: row.get(6)?,
            reset_policy: row.get(7)?,
            period_basis: row.get(8)?,
            ref_number: row.get(9)?,
            custom_tokens: row.get(10)?,
            updated_by: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_config(self) -> Result<DocumentTypeConfig> {
        let custom_tokens: BTreeMap<String, String> = serde_json::from_str(&self.custom_tokens)
            .map_err(|e| DocIdError::Serialization(e.to_string()))?;
        Ok(DocumentTypeConfig {
            key: self.key,
            name: self.name,
            prefix: self.prefix,
            separator: self.separator,
            format_template: self.format_template,
            start_from: from_sql_int(self.start_from)?,
            padding: usize::try_from(self.padding)
                .map_err(|_| DocIdError::Store(format!("bad padding {}", self.padding)))?,
            reset_policy: self.reset_policy.parse()?,
            period_basis: self.period_basis.parse()?,
            ref_number: self.ref_number,
            custom_tokens,
            updated_by: self.updated_by,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl SqliteStore {
    fn write_document_type(
        &self,
        tenant: &TenantId,
        config: &DocumentTypeConfig,
        on_conflict: &str,
    ) -> Result<usize> {
        let custom_tokens = serde_json::to_string(&config.custom_tokens)
            .map_err(|e| DocIdError::Serialization(e.to_string()))?;
        let sql = format!(
            "INSERT INTO document_types (tenant_id, {DOCUMENT_TYPE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             {on_conflict}"
        );
        self.conn
            .execute(
                &sql,
                params![
                    tenant.as_str(),
                    config.key,
                    config.name,
                    config.prefix,
                    config.separator,
                    config.format_template,
                    to_sql_int(config.start_from)?,
                    to_sql_int(config.padding as u64)?,
                    config.reset_policy.as_str(),
                    config.period_basis.as_str(),
                    config.ref_number,
                    custom_tokens,
                    config.updated_by,
                    config.updated_at.to_rfc3339(),
                ],
            )
            .map_err(store_err)
    }
}

impl RegistryStore for SqliteStore {
    fn settings(&self, tenant: &TenantId) -> Result<Option<CompanySettings>> {
        let row: Option<(String, String, String, i64, String)> = self
            .conn
            .query_row(
                "SELECT company_code, branch_code, department_code, financial_year_start, updated_at
                 FROM company_settings WHERE tenant_id = ?1",
                params![tenant.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()
            .map_err(store_err)?;

        row.map(|(company, branch, department, fy_start, updated_at)| {
            let start_year = i32::try_from(fy_start)
                .map_err(|_| DocIdError::Store(format!("bad financial year {fy_start}")))?;
            Ok(CompanySettings {
                company_code: company,
                branch_code: branch,
                department_code: department,
                financial_year: FinancialYear::starting(start_year),
                updated_at: parse_timestamp(&updated_at)?,
            })
        })
        .transpose()
    }

    fn insert_settings_if_absent(
        &self,
        tenant: &TenantId,
        settings: &CompanySettings,
    ) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO company_settings
                 (tenant_id, company_code, branch_code, department_code, financial_year_start, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (tenant_id) DO NOTHING",
                params![
                    tenant.as_str(),
                    settings.company_code,
                    settings.branch_code,
                    settings.department_code,
                    settings.financial_year.start_year(),
                    settings.updated_at.to_rfc3339(),
                ],
            )
            .map_err(store_err)?;
        Ok(inserted == 1)
    }

    fn save_settings(&self, tenant: &TenantId, settings: &CompanySettings) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO company_settings
                 (tenant_id, company_code, branch_code, department_code, financial_year_start, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tenant.as_str(),
                    settings.company_code,
                    settings.branch_code,
                    settings.department_code,
                    settings.financial_year.start_year(),
                    settings.updated_at.to_rfc3339(),
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn document_type(&self, tenant: &TenantId, key: &str) -> Result<Option<DocumentTypeConfig>> {
        let sql = format!(
            "SELECT {DOCUMENT_TYPE_COLUMNS} FROM document_types WHERE tenant_id = ?1 AND key = ?2"
        );
        self.conn
            .query_row(&sql, params![tenant.as_str(), key], DocumentTypeRow::from_row)
            .optional()
            .map_err(store_err)?
            .map(DocumentTypeRow::into_config)
            .transpose()
    }

    fn document_types(&self, tenant: &TenantId) -> Result<Vec<DocumentTypeConfig>> {
        let sql = format!(
            "SELECT {DOCUMENT_TYPE_COLUMNS} FROM document_types WHERE tenant_id = ?1 ORDER BY key"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params![tenant.as_str()], DocumentTypeRow::from_row)
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        rows.into_iter().map(DocumentTypeRow::into_config).collect()
    }

    fn insert_document_type_if_absent(
        &self,
        tenant: &TenantId,
        config: &DocumentTypeConfig,
    ) -> Result<bool> {
        let inserted =
            self.write_document_type(tenant, config, "ON CONFLICT (tenant_id, key) DO NOTHING")?;
        Ok(inserted == 1)
    }

    fn save_document_type(&self, tenant: &TenantId, config: &DocumentTypeConfig) -> Result<()> {
        self.write_document_type(
            tenant,
            config,
            "ON CONFLICT (tenant_id, key) DO UPDATE SET
                name = excluded.name,
                prefix = excluded.prefix,
                separator = excluded.separator,
                format_template = excluded.format_template,
                start_from = excluded.start_from,
                padding = excluded.padding,
                reset_policy = excluded.reset_policy,
                period_basis = excluded.period_basis,
                ref_number = excluded.ref_number,
                custom_tokens = excluded.custom_tokens,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at",
        )?;
        Ok(())
    }

    fn legacy_configs(&self, tenant: &TenantId) -> Result<Vec<LegacyIdConfig>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT entity_type, company_code, branch_code, department_code, prefix,
                        format_template, padding, start_from, reset_policy, current_seq
                 FROM legacy_id_configs
                 WHERE tenant_id = ?1
                 ORDER BY rowid",
            )
            .map_err(store_err)?;

        type LegacyRow = (
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<i64>,
            Option<i64>,
            Option<String>,
            Option<i64>,
        );

        let rows: Vec<LegacyRow> = stmt
            .query_map(params![tenant.as_str()], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            })
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;

        rows.into_iter()
            .map(
                |(entity, company, branch, dept, prefix, template, padding, start, policy, seq)| {
                    Ok(LegacyIdConfig {
                        entity_type: entity,
                        company_code: company,
                        branch_code: branch,
                        department_code: dept,
                        prefix,
                        format_template: template,
                        padding: padding
                            .map(|p| {
                                usize::try_from(p)
                                    .map_err(|_| DocIdError::Store(format!("bad padding {p}")))
                            })
                            .transpose()?,
                        start_from: start.map(from_sql_int).transpose()?,
                        reset_policy: policy.map(|p| p.parse()).transpose()?,
                        current_seq: seq.map(from_sql_int).transpose()?,
                    })
                },
            )
            .collect()
    }

    fn save_legacy_config(&self, tenant: &TenantId, legacy: &LegacyIdConfig) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO legacy_id_configs
                 (tenant_id, entity_type, company_code, branch_code, department_code, prefix,
                  format_template, padding, start_from, reset_policy, current_seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (tenant_id, entity_type) DO UPDATE SET
                    company_code = excluded.company_code,
                    branch_code = excluded.branch_code,
                    department_code = excluded.department_code,
                    prefix = excluded.prefix,
                    format_template = excluded.format_template,
                    padding = excluded.padding,
                    start_from = excluded.start_from,
                    reset_policy = excluded.reset_policy,
                    current_seq = excluded.current_seq",
                params![
                    tenant.as_str(),
                    legacy.entity_type.trim().to_ascii_uppercase(),
                    legacy.company_code,
                    legacy.branch_code,
                    legacy.department_code,
                    legacy.prefix,
                    legacy.format_template,
                    legacy.padding.map(|p| to_sql_int(p as u64)).transpose()?,
                    legacy.start_from.map(to_sql_int).transpose()?,
                    legacy.reset_policy.map(|p| p.as_str()),
                    legacy.current_seq.map(to_sql_int).transpose()?,
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

impl IdentifierLedger for SqliteStore {
    fn record_identifiers(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        identifiers: &[String],
    ) -> Result<usize> {
        let recorded_at = Utc::now().to_rfc3339();
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT INTO issued_identifiers (tenant_id, doc_type, identifier, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (tenant_id, doc_type, identifier) DO NOTHING",
            )
            .map_err(store_err)?;

        let mut added = 0;
        for identifier in identifiers {
            added += stmt
                .execute(params![tenant.as_str(), doc_type, identifier, recorded_at])
                .map_err(store_err)?;
        }
        Ok(added)
    }

    fn identifiers(&self, tenant: &TenantId, doc_type: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT identifier FROM issued_identifiers
                 WHERE tenant_id = ?1 AND doc_type = ?2
                 ORDER BY identifier",
            )
            .map_err(store_err)?;

        let results = stmt
            .query_map(params![tenant.as_str(), doc_type], |row| row.get(0))
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(store_err)?;

        Ok(results)
    }
}
