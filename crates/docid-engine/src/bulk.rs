//! Bulk range allocation for batch imports.
//!
//! [`BulkAllocator::reserve`] walks `count` free identifiers above everything
//! already issued and claims them on the bucket's counter with a
//! compare-and-set, retrying the walk if the counter moved underneath it.
//! Once a reservation is returned, a concurrent single generation lands
//! above the range. [`BulkAllocator::commit`] records the reserved and
//! supplied identifiers and raises the counter past any supplied ones.
//! [`BulkAllocator::plan`] runs the same walk without claiming anything.

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;

use docid_core::period::resolve_bucket;
use docid_core::template::{self, COUNTER_TOKEN};
use docid_core::{
    Clock, CounterKey, DocIdError, DocumentTypeConfig, Result, SettingsDefaults, TenantId,
    TokenMap,
};
use docid_store::Store;

use crate::bootstrap::Bootstrapper;
use crate::counters::Counters;
use crate::tokens::{render_id, token_map, ExtraTokens};

/// Candidates a walk may skip before giving up.
pub const MAX_SKIPPED_CANDIDATES: usize = 10_000;

/// Largest `count` a single reservation may ask for.
pub const MAX_RESERVATION_SIZE: usize = 100_000;

/// Upper bound on the walk's up-front allocation.
const PREALLOCATE_LIMIT: usize = 1024;

/// Stands in for the counter while deriving the identifier pattern.
const COUNTER_SENTINEL: &str = "\u{1f}";

/// Recognizes identifiers rendered from one template and extracts their
/// counter value. Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct IdPattern {
    regex: Regex,
}

impl IdPattern {
    /// Derive the pattern from a document type's template and token map.
    ///
    /// # Errors
    ///
    /// Returns [`DocIdError::Template`] if the template does not render the
    /// counter.
    pub fn new(config: &DocumentTypeConfig, tokens: &TokenMap) -> Result<Self> {
        template::validate(&config.format_template)?;
        let marked = tokens.clone().with(COUNTER_TOKEN, COUNTER_SENTINEL);
        let rendered = template::render(&config.format_template, &marked, &config.separator);
        if !rendered.contains(COUNTER_SENTINEL) {
            return Err(DocIdError::InvalidConfig(format!(
                "{}: counter not rendered",
                config.key
            )));
        }

        let body = rendered
            .split(COUNTER_SENTINEL)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"(\d+)");
        let regex = Regex::new(&format!("(?i)^{body}$"))
            .map_err(|e| DocIdError::InvalidConfig(format!("{}: {e}", config.key)))?;
        Ok(Self { regex })
    }

    /// Counter value of `id`, if it matches.
    #[must_use]
    pub fn number(&self, id: &str) -> Option<u64> {
        self.regex
            .captures(id.trim())
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// Identifiers handed out by [`BulkAllocator::reserve`] or
/// [`BulkAllocator::plan`], not yet recorded in the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub tenant: TenantId,
    pub document_type: String,
    pub bucket: String,
    /// Where the walk started: `max(highest issued + 1, counter + 1, start value)`.
    pub first_candidate: u64,
    pub ids: Vec<String>,
    pub numbers: Vec<u64>,
    pub skipped: usize,
    /// `true` once the counter has been moved to the top of the range.
    pub claimed: bool,
    #[serde(skip)]
    pattern: Option<IdPattern>,
}

impl Reservation {
    #[must_use]
    pub fn highest(&self) -> Option<u64> {
        self.numbers.iter().copied().max()
    }
}

/// Result of committing a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub last_number: u64,
    pub recorded: usize,
}

/// Everything a walk needs that does not change between retries.
struct WalkContext {
    config: DocumentTypeConfig,
    bucket: String,
    tokens: TokenMap,
    pattern: IdPattern,
}

pub struct BulkAllocator<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
    defaults: &'a SettingsDefaults,
}

impl<'a, S: Store + ?Sized> BulkAllocator<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, clock: &'a dyn Clock, defaults: &'a SettingsDefaults) -> Self {
        Self {
            store,
            clock,
            defaults,
        }
    }

    /// Reserve `count` identifiers that collide neither with `exclude` nor
    /// with anything in the ledger, and claim them on the counter.
    ///
    /// # Errors
    ///
    /// - [`DocIdError::ConfigNotFound`] for unknown document types
    /// - [`DocIdError::InvalidConfig`] when `count` exceeds
    ///   [`MAX_RESERVATION_SIZE`]
    /// - [`DocIdError::ReservationExhausted`] after
    ///   [`MAX_SKIPPED_CANDIDATES`] collisions
    pub fn reserve(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        count: usize,
        exclude: &[String],
        extra_tokens: &ExtraTokens,
    ) -> Result<Reservation> {
        let ctx = self.prepare(tenant, doc_type, count, extra_tokens)?;
        let key = CounterKey::new(tenant, &ctx.config.key, &ctx.bucket);

        loop {
            let counter_last = self.store.last_number(&key)?;
            let mut reservation = self.walk(tenant, &ctx, count, exclude, counter_last)?;

            let Some(highest) = reservation.highest() else {
                reservation.claimed = true;
                return Ok(reservation);
            };
            let won = match counter_last {
                Some(last) => self.store.compare_and_set(&key, last, highest)?,
                None => self.store.create_if_absent(&key, highest)?,
            };
            if won {
                reservation.claimed = true;
                tracing::debug!(
                    %tenant,
                    counter = %key,
                    first_candidate = reservation.first_candidate,
                    highest,
                    skipped = reservation.skipped,
                    "claimed id range"
                );
                return Ok(reservation);
            }
            tracing::debug!(counter = %key, "counter moved during reservation, walking again");
        }
    }

    /// The range [`BulkAllocator::reserve`] would hand out right now,
    /// without claiming it. The result cannot be committed.
    ///
    /// # Errors
    ///
    /// As for [`BulkAllocator::reserve`].
    pub fn plan(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        count: usize,
        exclude: &[String],
        extra_tokens: &ExtraTokens,
    ) -> Result<Reservation> {
        let ctx = self.prepare(tenant, doc_type, count, extra_tokens)?;
        let key = CounterKey::new(tenant, &ctx.config.key, &ctx.bucket);
        let counter_last = self.store.last_number(&key)?;
        self.walk(tenant, &ctx, count, exclude, counter_last)
    }

    fn prepare(
        &self,
        tenant: &TenantId,
        doc_type: &str,
        count: usize,
        extra_tokens: &ExtraTokens,
    ) -> Result<WalkContext> {
        let (settings, config) =
            Bootstrapper::new(self.store, self.clock, self.defaults).provision(tenant, doc_type)?;
        if count > MAX_RESERVATION_SIZE {
            return Err(DocIdError::InvalidConfig(format!(
                "{}: cannot reserve {count} ids at once (limit {MAX_RESERVATION_SIZE})",
                config.key
            )));
        }
        let today = self.clock.today();
        let bucket = resolve_bucket(&config, &settings, today);
        let tokens = token_map(&config, &settings, today, extra_tokens);
        let pattern = IdPattern::new(&config, &tokens)?;
        Ok(WalkContext {
            config,
            bucket,
            tokens,
            pattern,
        })
    }

    fn walk(
        &self,
        tenant: &TenantId,
        ctx: &WalkContext,
        count: usize,
        exclude: &[String],
        counter_last: Option<u64>,
    ) -> Result<Reservation> {
        let config = &ctx.config;
        let issued = self.store.identifiers(tenant, &config.key)?;
        let observed_max = issued.iter().filter_map(|id| ctx.pattern.number(id)).max();

        let first_candidate = [
            observed_max.map(|n| n + 1),
            counter_last.map(|n| n + 1),
            Some(config.start_from),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(config.start_from);

        let taken: HashSet<String> = issued
            .iter()
            .chain(exclude)
            .map(|id| id.trim().to_lowercase())
            .collect();

        let mut ids = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
        let mut numbers = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
        let mut skipped = 0;
        let mut candidate = first_candidate;

        while ids.len() < count {
            let id = render_id(config, &ctx.tokens, candidate);
            if taken.contains(&id.to_lowercase()) {
                skipped += 1;
                if skipped > MAX_SKIPPED_CANDIDATES {
                    return Err(DocIdError::ReservationExhausted {
                        doc_type: config.key.clone(),
                        requested: count,
                        skipped,
                    });
                }
            } else {
                ids.push(id);
                numbers.push(candidate);
            }
            candidate += 1;
        }

        tracing::trace!(
            %tenant,
            doc_type = %config.key,
            bucket = %ctx.bucket,
            first_candidate,
            count,
            skipped,
            "walked id range"
        );

        Ok(Reservation {
            tenant: tenant.clone(),
            document_type: config.key.clone(),
            bucket: ctx.bucket.clone(),
            first_candidate,
            ids,
            numbers,
            skipped,
            claimed: false,
            pattern: Some(ctx.pattern.clone()),
        })
    }

    /// Record the reserved and `supplied` identifiers in the ledger and
    /// raise the counter past any pattern-matching `supplied` ones.
    ///
    /// # Errors
    ///
    /// - [`DocIdError::InvalidConfig`] for a planned, unclaimed range
    /// - store failures
    pub fn commit(&self, reservation: &Reservation, supplied: &[String]) -> Result<CommitOutcome> {
        if !reservation.claimed {
            return Err(DocIdError::InvalidConfig(format!(
                "{}: range starting at {} was planned, not reserved",
                reservation.document_type, reservation.first_candidate
            )));
        }
        let key = CounterKey::new(
            &reservation.tenant,
            &reservation.document_type,
            &reservation.bucket,
        );
        let counters = Counters::new(self.store);

        let supplied_max = reservation
            .pattern
            .as_ref()
            .and_then(|p| supplied.iter().filter_map(|id| p.number(id)).max());
        let highest = reservation.highest().max(supplied_max);

        let last_number = match highest {
            Some(highest) => counters.advance_to_at_least(&key, highest)?,
            None => self.store.last_number(&key)?.unwrap_or(0),
        };

        let to_record: Vec<String> = reservation
            .ids
            .iter()
            .chain(supplied)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        let recorded = self.store.record_identifiers(
            &reservation.tenant,
            &reservation.document_type,
            &to_record,
        )?;

        tracing::info!(
            tenant = %reservation.tenant,
            doc_type = %reservation.document_type,
            bucket = %reservation.bucket,
            last_number,
            recorded,
            "committed reservation"
        );
        Ok(CommitOutcome {
            last_number,
            recorded,
        })
    }
}
