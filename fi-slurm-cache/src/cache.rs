use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;

/// Source of time for cache expiry and reservation windows
pub trait Clock: Send + Sync {
    /// Monotonic time, used to age cache entries
    fn instant(&self) -> Instant;
    /// Wall-clock time, used to compare against reservation windows
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct MockClock {
    base_instant: Instant,
    base_time: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl MockClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        MockClock {
            base_instant: Instant::now(),
            base_time: start,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for MockClock {
    fn instant(&self) -> Instant {
        self.base_instant + *self.offset.lock()
    }

    fn now(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock();
        self.base_time + chrono::Duration::from_std(offset).unwrap_or(chrono::Duration::MAX)
    }
}

struct Entry<V> {
    value: V,
    inserted: Instant,
}

/// A bounded map whose entries expire a fixed time after insertion
///
/// When full, expired entries are dropped first, then the least recently used one. Lookups
/// through `get_or_try_insert_with` are single-flight per key: concurrent misses on the same key
/// wait for one computation instead of each running their own. Values are handed out by clone,
/// so `V` is expected to be cheap to clone (an `Arc`, usually)
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<LruCache<K, Entry<V>>>,
    // one guard per key currently being computed, removed once nobody is waiting on it
    in_flight: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(
        name: &'static str,
        capacity: NonZeroUsize,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        TtlCache {
            name,
            ttl,
            clock,
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn is_live(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted) < self.ttl
    }

    /// Returns the live value for `key`, marking it as recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.instant();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if self.is_live(entry, now) => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Stores `value` under `key`, evicting to make room if needed
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.instant();
        let mut entries = self.entries.lock();

        if !entries.contains(&key) && entries.len() >= entries.cap().get() {
            let expired: Vec<K> = entries
                .iter()
                .filter(|(_, entry)| !self.is_live(entry, now))
                .map(|(k, _)| k.clone())
                .collect();
            for k in &expired {
                entries.pop(k);
            }
        }

        // `push` drops the least recently used entry when still at capacity
        if entries.push(key, Entry { value, inserted: now }).is_some() {
            tracing::trace!(cache = self.name, "entry replaced or evicted");
        }
    }

    /// Returns the cached value for `key`, or computes, stores and returns it
    ///
    /// An `Err` from `compute` is passed through and nothing is stored, so the next call
    /// retries. `compute` runs without holding any lock shared with other keys
    pub fn get_or_try_insert_with<E, F>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            tracing::debug!(cache = self.name, "cache hit");
            return Ok(value);
        }

        let guard = self
            .in_flight
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _computing = guard.lock();
            // somebody may have filled the slot while we were waiting on the guard
            if let Some(value) = self.get(&key) {
                tracing::debug!(cache = self.name, "cache filled by concurrent caller");
                Ok(value)
            } else {
                tracing::debug!(cache = self.name, "cache miss, computing");
                compute().inspect(|value| self.insert(key.clone(), value.clone()))
            }
        };

        // guards are only cloned and dropped under this lock, so the count is exact here
        let mut in_flight = self.in_flight.lock();
        let last_waiter = Arc::strong_count(&guard) <= 2
            && in_flight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &guard));
        drop(guard);
        if last_waiter {
            in_flight.remove(&key);
        }

        result
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
