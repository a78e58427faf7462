//! The `generate_id` service: bootstrap, resolve the bucket, advance or peek
//! the counter, render.

use chrono::{DateTime, Utc};
use serde::Serialize;

use docid_core::document_type::{default_for, normalize_key};
use docid_core::period::resolve_bucket;
use docid_core::{Clock, CounterKey, DocIdError, Result, SettingsDefaults, TenantId};
use docid_store::Store;

use crate::bootstrap::Bootstrapper;
use crate::counters::Counters;
use crate::tokens::{render_id, token_map, ExtraTokens};

/// A rendered identifier and the counter value behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedId {
    pub id: String,
    pub sequence: u64,
    pub document_type: String,
    pub bucket: String,
    /// `true` when produced by a non-mutating preview.
    pub preview: bool,
}

/// Outcome of [`IdGenerator::generate_or_degraded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IssuedId {
    Issued(GeneratedId),
    /// Temporary identifier issued while the store was unreachable. Never
    /// drawn from a counter; callers must treat it as provisional.
    Degraded {
        id: String,
        document_type: String,
        reason: String,
    },
}

impl IssuedId {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Issued(generated) => &generated.id,
            Self::Degraded { id, .. } => id,
        }
    }

    /// Build a `{PREFIX}-TMP-{unix millis}` identifier for a request that
    /// failed with `reason`. The prefix comes from the default table, or the
    /// key itself for custom types, since the registry cannot be read.
    #[must_use]
    pub fn degraded(
        tenant: &TenantId,
        doc_type: &str,
        now: DateTime<Utc>,
        reason: &DocIdError,
    ) -> Self {
        let key = normalize_key(doc_type);
        let prefix = default_for(&key).map_or(key.as_str(), |d| d.prefix);
        let id = format!("{prefix}-TMP-{}", now.timestamp_millis());
        tracing::warn!(%tenant, doc_type = %key, %id, error = %reason, "issued degraded id");
        Self::Degraded {
            id,
            document_type: key,
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

pub struct IdGenerator<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
    defaults: &'a SettingsDefaults,
}

impl<'a, S: Store + ?Sized> IdGenerator<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, clock: &'a dyn Clock, defaults: &'a SettingsDefaults) -> Self {
        Self {
            store,
            clock,
            defaults,
        }
    }

    /// Produce the next identifier for (`tenant`, `doc_type`).
    ///
    /// With `increment == false` nothing is written beyond bootstrap
    /// provisioning and the returned value is a preview. With
    /// `increment == true` the counter is advanced atomically and the
    /// identifier is recorded in the ledger.
    ///
    /// # Errors
    ///
    /// - [`DocIdError::ConfigNotFound`] if the type is unknown and not a
    ///   standard one
    /// - [`DocIdError::StoreUnavailable`] if the store cannot be reached
    pub fn generate_id(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        increment: bool,
        extra_tokens: &ExtraTokens,
    ) -> Result<GeneratedId> {
        let (settings, config) =
            Bootstrapper::new(self.store, self.clock, self.defaults).provision(tenant, doc_type)?;
        let today = self.clock.today();
        let bucket = resolve_bucket(&config, &settings, today);
        let key = CounterKey::new(tenant, &config.key, &bucket);
        let counters = Counters::new(self.store);

        let sequence = if increment {
            counters.increment_and_catch_up(&key, config.start_from)?
        } else {
            counters.peek_next(&key, config.start_from)?
        };

        let tokens = token_map(&config, &settings, today, extra_tokens);
        let id = render_id(&config, &tokens, sequence);

        if increment {
            self.store
                .record_identifiers(tenant, &config.key, std::slice::from_ref(&id))?;
            tracing::debug!(%tenant, doc_type = %config.key, %bucket, sequence, %id, "issued id");
        }

        Ok(GeneratedId {
            id,
            sequence,
            document_type: config.key,
            bucket,
            preview: !increment,
        })
    }

    /// Like an incrementing [`IdGenerator::generate_id`], but falls back to a
    /// temporary `{PREFIX}-TMP-{unix millis}` identifier when the store is
    /// unavailable.
    ///
    /// # Errors
    ///
    /// Every error other than [`DocIdError::StoreUnavailable`] is returned
    /// unchanged.
    pub fn generate_or_degraded(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        extra_tokens: &ExtraTokens,
    ) -> Result<IssuedId> {
        match self.generate_id(tenant, doc_type, true, extra_tokens) {
            Ok(generated) => Ok(IssuedId::Issued(generated)),
            Err(err @ DocIdError::StoreUnavailable(_)) => {
                Ok(IssuedId::degraded(tenant, doc_type, self.clock.now(), &err))
            }
            Err(err) => Err(err),
        }
    }
}
