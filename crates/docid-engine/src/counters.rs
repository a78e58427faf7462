//! Counter operations composed from the store's atomic primitives.
//!
//! Core invariant: **no two callers ever receive the same value for one
//! counter key.** The engine holds no locks; every step is a single atomic
//! store operation and the catch-up jump is a compare-and-set on the exact
//! value this caller's increment produced.

use docid_core::{CounterKey, Result};
use docid_store::CounterStore;

/// Counter facade over a borrowed store.
pub struct Counters<'a, S: ?Sized> {
    store: &'a S,
}

impl<S: ?Sized> Clone for Counters<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for Counters<'_, S> {}

impl<'a, S: CounterStore + ?Sized> Counters<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// `(last ?? start_from - 1) + 1`, read without touching storage.
    ///
    /// Stale as soon as it is returned; only suitable for previews. A start
    /// value configured above an existing counter is not reflected here,
    /// since the start only matters while the counter is absent.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn peek_next(&self, key: &CounterKey, start_from: u64) -> Result<u64> {
        Ok(self
            .store
            .last_number(key)?
            .map_or(start_from, |last| last + 1))
    }

    /// Atomically take the next value, jumping to `start_from` if the
    /// counter is still below it.
    ///
    /// Each miss on the catch-up compare-and-set means another caller moved
    /// the counter first; the loop takes a fresh increment so the returned
    /// value is never shared.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn increment_and_catch_up(&self, key: &CounterKey, start_from: u64) -> Result<u64> {
        loop {
            let value = self.store.increment(key)?;
            if value >= start_from {
                return Ok(value);
            }
            if self.store.compare_and_set(key, value, start_from)? {
                tracing::debug!(counter = %key, from = value, to = start_from, "counter caught up to start value");
                return Ok(start_from);
            }
            tracing::debug!(counter = %key, observed = value, "catch-up race resolved, retrying");
        }
    }

    /// Raise the counter to at least `value`. Returns the resulting value.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn advance_to_at_least(&self, key: &CounterKey, value: u64) -> Result<u64> {
        let result = self.store.raise_to(key, value)?;
        tracing::debug!(counter = %key, requested = value, now = result, "counter advanced");
        Ok(result)
    }

    /// Create the counter at `value` unless one already exists.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn seed_if_absent(&self, key: &CounterKey, value: u64) -> Result<bool> {
        let created = self.store.create_if_absent(key, value)?;
        if created {
            tracing::debug!(counter = %key, value, "counter seeded");
        }
        Ok(created)
    }

    /// Administrator correction: set the last issued number outright.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn override_last_number(&self, key: &CounterKey, value: u64) -> Result<()> {
        let previous = self.store.last_number(key)?;
        self.store.overwrite(key, value)?;
        tracing::info!(counter = %key, ?previous, value, "last number overridden");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use docid_core::TenantId;
    use docid_store::{MemoryStore, SqliteStore};

    fn key(tenant: &str, bucket: &str) -> CounterKey {
        CounterKey::new(&TenantId::new(tenant).unwrap(), "JOB", bucket)
    }

    #[test]
    fn sequential_increments_are_monotonic() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let k = key("acme", "25-26");
        let values: Vec<u64> = (0..25)
            .map(|_| counters.increment_and_catch_up(&k, 1).unwrap())
            .collect();
        assert_eq!(values, (1..=25).collect::<Vec<_>>());
    }

    #[test]
    fn first_increment_catches_up_to_start() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let k = key("acme", "GLOBAL");
        assert_eq!(counters.increment_and_catch_up(&k, 1000).unwrap(), 1000);
        assert_eq!(counters.increment_and_catch_up(&k, 1000).unwrap(), 1001);
    }

    #[test]
    fn catch_up_never_moves_backwards() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let k = key("acme", "GLOBAL");
        counters.advance_to_at_least(&k, 2000).unwrap();
        assert_eq!(counters.increment_and_catch_up(&k, 1000).unwrap(), 2001);
    }

    #[test]
    fn peek_is_idempotent_and_read_only() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let k = key("acme", "25-26");

        assert_eq!(counters.peek_next(&k, 10001).unwrap(), 10001);
        assert_eq!(counters.peek_next(&k, 10001).unwrap(), 10001);
        assert_eq!(store.last_number(&k).unwrap(), None);

        counters.increment_and_catch_up(&k, 10001).unwrap();
        assert_eq!(counters.peek_next(&k, 10001).unwrap(), 10002);
        assert_eq!(counters.peek_next(&k, 10001).unwrap(), 10002);
    }

    #[test]
    fn peek_follows_existing_counter_over_start_value() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let k = key("acme", "25-26");
        counters.override_last_number(&k, 5).unwrap();
        assert_eq!(counters.peek_next(&k, 500).unwrap(), 6);
        assert_eq!(store.last_number(&k).unwrap(), Some(5));
    }

    #[test]
    fn peek_uses_start_value_only_for_absent_counter() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let k = key("acme", "25-26");
        assert_eq!(counters.peek_next(&k, 500).unwrap(), 500);
        assert_eq!(counters.increment_and_catch_up(&k, 500).unwrap(), 500);
        assert_eq!(counters.peek_next(&k, 500).unwrap(), 501);
    }

    #[test]
    fn buckets_are_isolated() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let a_now = key("tenant-a", "25-26");
        let b_now = key("tenant-b", "25-26");
        let a_prev = key("tenant-a", "24-25");

        for _ in 0..3 {
            counters.increment_and_catch_up(&a_now, 1).unwrap();
        }
        assert_eq!(counters.increment_and_catch_up(&b_now, 1).unwrap(), 1);
        assert_eq!(counters.increment_and_catch_up(&a_prev, 1).unwrap(), 1);
        assert_eq!(counters.increment_and_catch_up(&a_now, 1).unwrap(), 4);
    }

    #[test]
    fn seed_only_creates_missing_counters() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let k = key("acme", "25-26");
        assert!(counters.seed_if_absent(&k, 41).unwrap());
        assert!(!counters.seed_if_absent(&k, 3).unwrap());
        assert_eq!(counters.increment_and_catch_up(&k, 1).unwrap(), 42);
    }

    #[test]
    fn override_can_lower_the_counter() {
        let store = MemoryStore::new();
        let counters = Counters::new(&store);
        let k = key("acme", "25-26");
        counters.advance_to_at_least(&k, 90).unwrap();
        counters.override_last_number(&k, 10).unwrap();
        assert_eq!(counters.increment_and_catch_up(&k, 1).unwrap(), 11);
    }

    #[test]
    fn concurrent_increments_on_shared_memory_store_are_unique() {
        let store = Arc::new(MemoryStore::new());
        let threads = 8;
        let per_thread = 100;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let counters = Counters::new(store.as_ref());
                    let k = key("acme", "25-26");
                    barrier.wait();
                    (0..per_thread)
                        .map(|_| counters.increment_and_catch_up(&k, 1).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut values: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        values.sort_unstable();
        let expected: Vec<u64> = (1..=(threads * per_thread) as u64).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn concurrent_catch_up_never_duplicates_start() {
        for _ in 0..50 {
            let store = Arc::new(MemoryStore::new());
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        Counters::new(store.as_ref())
                            .increment_and_catch_up(&key("acme", "GLOBAL"), 1000)
                            .unwrap()
                    })
                })
                .collect();

            let values: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(values, HashSet::from([1000, 1001]));
        }
    }

    #[test]
    fn concurrent_sqlite_handles_on_one_file_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docid.db");
        // Create the schema before the writers race on it.
        drop(SqliteStore::open_default(&path).unwrap());

        let threads = 4;
        let per_thread = 25;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let store = SqliteStore::open_default(&path).unwrap();
                    let counters = Counters::new(&store);
                    let k = key("acme", "GLOBAL");
                    barrier.wait();
                    (0..per_thread)
                        .map(|_| counters.increment_and_catch_up(&k, 1000).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut values: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        values.sort_unstable();
        let expected: Vec<u64> = (1000..1000 + (threads * per_thread) as u64).collect();
        assert_eq!(values, expected);
    }
}
