//! # docid-core
//!
//! Core types for the docid sequential document ID engine.
//!
//! This crate defines the foundational types used across all other docid crates:
//! - [`TenantId`]: validated tenant scope
//! - [`DocumentTypeConfig`]: per-tenant document type contract, plus the
//!   default table and legacy key aliases
//! - [`CompanySettings`] and [`FinancialYear`]: April cut-over financial years
//! - [`CounterKey`]: (tenant, document type, bucket) counter address
//! - Period resolution ([`period::resolve_bucket`], [`Clock`])
//! - Template rendering ([`template::render`], [`TokenMap`])
//! - [`LegacyIdConfig`]: pre-registry configuration records
//! - [`EngineConfig`]: TOML engine configuration
//! - Error hierarchy ([`DocIdError`], [`TemplateError`])

pub mod config;
pub mod counter;
pub mod document_type;
pub mod error;
pub mod legacy;
pub mod period;
pub mod settings;
pub mod template;
pub mod tenant;

pub use config::EngineConfig;
pub use counter::CounterKey;
pub use document_type::{DocumentTypeConfig, DocumentTypeDefault, PeriodBasis, ResetPolicy};
pub use error::{DocIdError, Result, TemplateError};
pub use legacy::LegacyIdConfig;
pub use period::{Clock, FixedClock, SystemClock, GLOBAL_BUCKET};
pub use settings::{CompanySettings, FinancialYear, SettingsDefaults};
pub use template::TokenMap;
pub use tenant::TenantId;
