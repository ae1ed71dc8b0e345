//! Thread-Safe Store with LRU Eviction and Expiry Support
//!
//! This module implements the core storage engine for CinderKV: a bounded
//! key-value map where every key also lives in a recency index, so that the
//! store can evict the least recently used key once it reaches capacity.
//!
//! ## Design Decisions
//!
//! 1. **One lock over map + index**: a single `Mutex` guards the `HashMap`
//!    and the [`LruIndex`] together. The two structures must agree on the
//!    key set at every observable moment, and one coarse lock makes that
//!    invariant trivial to uphold. Critical sections are short and never
//!    perform I/O.
//! 2. **Lazy Expiry**: keys are checked for expiry on access, plus a
//!    background reaper cleans up keys nobody asks for again.
//! 3. **Expired-First Eviction**: when the store is full, expired entries
//!    are swept before any live key is sacrificed to the LRU policy.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Store                          │
//! │  ┌───────────────────────────────────────────────┐  │
//! │  │                 Mutex                         │  │
//! │  │  ┌──────────────────┐  ┌───────────────────┐  │  │
//! │  │  │ HashMap<K,Entry> │  │ LruIndex          │  │  │
//! │  │  │ value, expiry,   │  │ recency-ordered   │  │  │
//! │  │  │ lru handle       │  │ key list          │  │  │
//! │  │  └──────────────────┘  └───────────────────┘  │  │
//! │  └───────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Reads also update recency, so every operation takes the exclusive lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::lru::{Handle, LruIndex};

/// A stored value with optional expiry and its position in the LRU index.
#[derive(Debug)]
struct Entry {
    /// The actual value stored
    value: String,

    /// When this entry expires (None = never expires)
    expires_at: Option<Instant>,

    /// This key's node in the recency index
    handle: Handle,
}

impl Entry {
    #[inline]
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

/// Map and recency index, always mutated together under the store lock.
#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<String, Entry>,
    lru: LruIndex,
}

impl StoreInner {
    /// Removes every expired entry in one pass over the map.
    ///
    /// Returns how many entries were removed.
    fn sweep_expired(&mut self) -> u64 {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at.map(|exp| now >= exp).unwrap_or(false))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            let entry = self
                .entries
                .remove(key)
                .expect("store: swept key vanished from map");
            self.lru.remove(entry.handle);
        }

        expired.len() as u64
    }
}

/// The main storage engine for CinderKV.
///
/// Designed to be wrapped in an `Arc` and shared across all connection
/// tasks; every operation is atomic with respect to every other.
///
/// A `max_size` of 0 means unbounded: no eviction is ever attempted.
///
/// # Example
///
/// ```
/// use cinderkv::storage::Store;
/// use std::time::Duration;
///
/// let store = Store::new(100);
///
/// store.set("name", "cinder");
/// assert_eq!(store.get("name"), Some("cinder".to_string()));
///
/// // Set with expiry
/// store.set_with_ttl("session", "abc123", Duration::from_secs(60));
/// ```
#[derive(Debug)]
pub struct Store {
    inner: Mutex<StoreInner>,

    /// Maximum number of keys before eviction kicks in (0 = unbounded)
    max_size: usize,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired keys removed
    expired_count: AtomicU64,

    /// Statistics: number of keys evicted by the LRU policy
    evicted_count: AtomicU64,
}

impl Store {
    /// Creates a store holding at most `max_size` keys (0 = unbounded).
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            max_size,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            evicted_count: AtomicU64::new(0),
        }
    }

    /// Gets the value for a key, marking it most recently used.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// key is removed on the spot, so at most one "alive" view of any key
    /// is ever observable.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        let (handle, expired, value) = match inner.entries.get(key) {
            Some(entry) => (entry.handle, entry.is_expired(), entry.value.clone()),
            None => return None,
        };

        if expired {
            inner.entries.remove(key);
            inner.lru.remove(handle);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        inner.lru.move_to_front(handle);
        Some(value)
    }

    /// Sets a key-value pair without expiry.
    ///
    /// An existing key is overwritten and any TTL on it is cleared.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.set_with_ttl(key, value, Duration::ZERO);
    }

    /// Sets a key-value pair with a time-to-live.
    ///
    /// A zero `ttl` clears any expiry; otherwise the key expires `ttl` from
    /// now. Inserting a new key into a full store evicts: expired entries
    /// are swept first, and only if the store is still full does the least
    /// recently used key go.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let key = key.into();
        let value = value.into();
        let expires_at = if ttl > Duration::ZERO {
            Some(Instant::now() + ttl)
        } else {
            None
        };

        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        // Updating an existing key never evicts
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            let handle = entry.handle;
            inner.lru.move_to_front(handle);
            return;
        }

        if self.max_size > 0 && inner.entries.len() >= self.max_size {
            let swept = inner.sweep_expired();
            if swept > 0 {
                self.expired_count.fetch_add(swept, Ordering::Relaxed);
            }

            if inner.entries.len() >= self.max_size {
                // Map and index must agree here; a miss on either side is
                // an invariant violation, not a recoverable condition.
                let victim = inner
                    .lru
                    .pop_back()
                    .expect("store: lru index empty while map is full");
                if inner.entries.remove(&victim).is_none() {
                    panic!("store: lru victim '{victim}' missing from map");
                }
                self.evicted_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        let handle = inner.lru.push_front(key.clone());
        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                handle,
            },
        );
    }

    /// Deletes a key.
    ///
    /// Returns `true` if the key was present.
    pub fn delete(&self, key: &str) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        match inner.entries.remove(key) {
            Some(entry) => {
                inner.lru.remove(entry.handle);
                true
            }
            None => false,
        }
    }

    /// All keys that are currently alive, in unspecified order.
    ///
    /// Expired-but-unreaped entries are filtered out, not removed.
    pub fn keys(&self) -> Vec<String> {
        let guard = self.inner.lock().unwrap();
        guard
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Raw entry count, including expired entries the reaper hasn't
    /// visited yet.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Returns true if the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn flush(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.entries.clear();
        guard.lru = LruIndex::new();
    }

    /// Gets a value together with its remaining time-to-live.
    ///
    /// Used for the initial state transfer to a freshly attached replica.
    /// The duration is zero for keys without expiry; expired keys read as
    /// absent. The recency order is left untouched.
    pub fn get_with_ttl(&self, key: &str) -> Option<(String, Duration)> {
        let guard = self.inner.lock().unwrap();
        let entry = guard.entries.get(key)?;

        match entry.expires_at {
            Some(exp) => {
                let now = Instant::now();
                if now >= exp {
                    None
                } else {
                    Some((entry.value.clone(), exp - now))
                }
            }
            None => Some((entry.value.clone(), Duration::ZERO)),
        }
    }

    /// Removes every expired entry.
    ///
    /// Called by the background reaper; returns the number removed.
    pub fn cleanup_expired(&self) -> u64 {
        let swept = self.inner.lock().unwrap().sweep_expired();
        if swept > 0 {
            self.expired_count.fetch_add(swept, Ordering::Relaxed);
        }
        swept
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
            evicted: self.evicted_count.load(Ordering::Relaxed),
        }
    }

    /// Keys as the recency index sees them, most-recent first.
    #[cfg(test)]
    fn lru_keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().lru.keys()
    }

    /// Keys as the map sees them, including expired entries.
    #[cfg(test)]
    fn map_keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().entries.keys().cloned().collect()
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Total expired keys removed
    pub expired: u64,
    /// Total keys evicted by the LRU policy
    pub evicted: u64,
}
