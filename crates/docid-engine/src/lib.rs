//! # docid-engine
//!
//! ID generation for docid. Every component borrows a store and a clock;
//! nothing here holds state of its own.
//!
//! Includes:
//! - Counter catch-up and administrator counter operations
//! - Configuration bootstrapper and legacy migrator
//! - `generate_id` with preview and degraded fallback
//! - Bulk range allocator for batch imports
//! - Configuration service and view formatter (JSON, Table, Markdown)

pub mod bootstrap;
pub mod bulk;
pub mod counters;
pub mod formatter;
pub mod generator;
pub mod migrate;
pub mod registry;
pub mod tokens;

pub use bootstrap::Bootstrapper;
pub use bulk::{BulkAllocator, CommitOutcome, IdPattern, Reservation};
pub use counters::Counters;
pub use formatter::{format_configuration, OutputFormat};
pub use generator::{GeneratedId, IdGenerator, IssuedId};
pub use migrate::{LegacyMigrator, MigrationReport};
pub use registry::{
    ConfigService, ConfigurationView, DocumentTypeUpdate, DocumentTypeView, SettingsUpdate,
};
pub use tokens::ExtraTokens;
