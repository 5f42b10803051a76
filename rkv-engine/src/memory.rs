//! # In-Memory Store
//!
//! Provide an in-process backend for the store boundary with sharded locking,
//! TTL-aware lookups and cursor-based glob scans.
//!
//! ## Usage
//!
//! - Use `MemoryStore::new()` for a default sharded store.
//! - Use `MemoryStore::with_shard_count` to pin the shard count (tests).
//! - Use `set_offline(true)` to make every call fail as an unreachable node.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: Per-shard locks reduce contention under concurrency.
//! 2. **Arc-backed Buffers**: Values are `Arc<[u8]>` so reads copy once.
//! 3. **TTL Fast Path**: Expiration is checked on access; `purge_expired`
//!    reclaims the rest.
//! 4. **Snapshot Scans**: A scan walks the sorted keyspace captured on its first
//!    page, so no key is repeated and none present throughout is missed.
//! 5. **Strategy Pattern**: Implements `KvStore` to keep callers decoupled.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryStore
//!   └── shards: Vec<Shard>
//!         └── Shard
//!               └── inner: RwLock<HashMap<Arc<[u8]>, Entry>>
//!                     └── Entry { value, expires_at }
//!   └── scans: Mutex<HashMap<cursor, ScanState>>
//!         └── ScanState { keys (sorted snapshot), next }
//! ```

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use rkv_common::{glob, KvStore, RkvError, RkvResult, ScanPage};

/// Default shards = CPU count * multiplier to reduce lock contention.
const DEFAULT_SHARD_MULTIPLIER: usize = 4;

/// Unfinished scans kept before the oldest is dropped.
const MAX_OPEN_SCANS: usize = 1024;

/// A stored value and its optional deadline.
#[derive(Debug, Clone)]
struct Entry {
    value: Arc<[u8]>,
    expires_at: Option<Instant>,
}

impl Entry {
    /// Returns true when the entry has expired at `now`.
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

type ShardMap = HashMap<Arc<[u8]>, Entry, RandomState>;

/// Per-shard lock wrapper.
#[derive(Debug)]
struct Shard {
    inner: RwLock<ShardMap>,
}

/// Remaining work of an unfinished scan.
#[derive(Debug)]
struct ScanState {
    /// Live keys in byte order when the scan started.
    keys: Vec<Arc<[u8]>>,
    /// Index of the first key not yet examined.
    next: usize,
}

/// Sharded in-memory implementation of `KvStore`.
#[derive(Debug)]
pub struct MemoryStore {
    /// Label reported in connection errors.
    name: String,
    shards: Vec<Shard>,
    /// Bitmask for fast shard selection (power-of-two shard count).
    shard_mask: usize,
    hash_state: RandomState,
    /// When set, every call fails with a connection error.
    offline: AtomicBool,
    /// Unfinished scans keyed by the cursor handed back to the caller.
    scans: Mutex<HashMap<u64, ScanState, RandomState>>,
    /// Last cursor issued; cursors start at 1 since 0 ends a scan.
    last_cursor: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store with a default shard count based on CPU parallelism.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        Self::with_shard_count(threads.saturating_mul(DEFAULT_SHARD_MULTIPLIER))
    }

    /// Creates a store with a caller-provided shard count.
    ///
    /// The count is normalized to the next power of two to enable fast masking.
    pub fn with_shard_count(shards: usize) -> Self {
        let shard_count = normalize_shard_count(shards);
        let hash_state = RandomState::new();
        let shards = (0..shard_count)
            .map(|_| Shard {
                inner: RwLock::new(HashMap::with_hasher(hash_state.clone())),
            })
            .collect();

        MemoryStore {
            name: "memory".to_string(),
            shards,
            shard_mask: shard_count - 1,
            hash_state: hash_state.clone(),
            offline: AtomicBool::new(false),
            scans: Mutex::new(HashMap::with_hasher(hash_state)),
            last_cursor: AtomicU64::new(0),
        }
    }

    /// Sets the label used in error messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulates the node dropping off (or coming back onto) the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| shard.inner.read().values().filter(|e| !e.is_expired(now)).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries across all shards and returns how many were dropped.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut inner = shard.inner.write();
            let before = inner.len();
            inner.retain(|_, entry| !entry.is_expired(now));
            removed += before - inner.len();
        }
        removed
    }

    fn ensure_online(&self) -> RkvResult<()> {
        if self.is_offline() {
            return Err(RkvError::connection(&self.name, "node is offline"));
        }
        Ok(())
    }

    /// Hashes a key to its owning shard index.
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = self.hash_state.build_hasher();
        hasher.write(key);
        (hasher.finish() as usize) & self.shard_mask
    }

    fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    fn insert(&self, key: &[u8], value: &[u8], expires_at: Option<Instant>) {
        let entry = Entry {
            value: Arc::from(value),
            expires_at,
        };
        self.shard_for(key).inner.write().insert(Arc::from(key), entry);
    }

    /// Live keys across all shards in byte order.
    ///
    /// Sorting gives scans a stable order so an offset works as a cursor.
    fn sorted_live_keys(&self, now: Instant) -> Vec<Arc<[u8]>> {
        let mut keys: Vec<Arc<[u8]>> = Vec::new();
        for shard in &self.shards {
            let inner = shard.inner.read();
            keys.extend(
                inner
                    .iter()
                    .filter(|(_, entry)| !entry.is_expired(now))
                    .map(|(key, _)| Arc::clone(key)),
            );
        }
        keys.sort_unstable();
        keys
    }
}

impl KvStore for MemoryStore {
    fn ping(&self) -> RkvResult<()> {
        self.ensure_online()
    }

    /// Expired entries are removed on access.
    fn get(&self, key: &[u8]) -> RkvResult<Option<Vec<u8>>> {
        self.ensure_online()?;
        let shard = self.shard_for(key);
        let now = Instant::now();

        {
            let inner = shard.inner.read();
            match inner.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.to_vec())),
                Some(_) => {}
            }
        }

        let mut inner = shard.inner.write();
        if inner.get(key).map(|entry| entry.is_expired(now)).unwrap_or(false) {
            inner.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> RkvResult<()> {
        self.ensure_online()?;
        self.insert(key, value, None);
        Ok(())
    }

    fn set_ex(&self, key: &[u8], value: &[u8], ttl_seconds: u64) -> RkvResult<()> {
        self.ensure_online()?;
        if ttl_seconds == 0 {
            return Err(RkvError::Value("invalid expire time in 'setex' command".to_string()));
        }
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(ttl_seconds))
            .ok_or_else(|| RkvError::Value("invalid expire time in 'setex' command".to_string()))?;
        self.insert(key, value, Some(deadline));
        Ok(())
    }

    /// Examines `count` keys per page.
    ///
    /// Cursor 0 snapshots the sorted live keys; every later cursor resumes that
    /// snapshot. Keys written mid-scan are not returned, keys removed mid-scan
    /// may still be. Unknown cursors are rejected.
    fn scan_page(&self, cursor: u64, pattern: &[u8], count: usize) -> RkvResult<ScanPage> {
        self.ensure_online()?;
        let mut state = if cursor == 0 {
            ScanState {
                keys: self.sorted_live_keys(Instant::now()),
                next: 0,
            }
        } else {
            self.scans
                .lock()
                .remove(&cursor)
                .ok_or_else(|| RkvError::Value(format!("invalid cursor {}", cursor)))?
        };

        let start = state.next.min(state.keys.len());
        let end = start.saturating_add(count.max(1)).min(state.keys.len());
        let matched = state.keys[start..end]
            .iter()
            .filter(|key| glob::matches(pattern, key))
            .map(|key| key.to_vec())
            .collect();

        if end >= state.keys.len() {
            return Ok(ScanPage {
                cursor: 0,
                keys: matched,
            });
        }

        state.next = end;
        let next = self.last_cursor.fetch_add(1, Ordering::Relaxed) + 1;
        let mut scans = self.scans.lock();
        if scans.len() >= MAX_OPEN_SCANS {
            if let Some(oldest) = scans.keys().min().copied() {
                scans.remove(&oldest);
            }
        }
        scans.insert(next, state);
        Ok(ScanPage {
            cursor: next,
            keys: matched,
        })
    }
}

/// Normalizes shard counts to a power of two for fast masking.
fn normalize_shard_count(count: usize) -> usize {
    count.max(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkv_common::scan;

    #[test]
    fn set_get_roundtrip() {
        let store = MemoryStore::with_shard_count(4);
        store.set(b"alpha", b"value").unwrap();
        assert_eq!(store.get(b"alpha").unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
    }

    #[test]
    fn set_clears_previous_ttl() {
        let store = MemoryStore::with_shard_count(2);
        store.set_ex(b"alpha", b"v1", 60).unwrap();
        store.set(b"alpha", b"v2").unwrap();
        let shard = store.shard_for(b"alpha");
        assert!(shard.inner.read().get(&b"alpha"[..]).unwrap().expires_at.is_none());
    }

    #[test]
    fn set_ex_rejects_zero() {
        let store = MemoryStore::with_shard_count(2);
        assert!(matches!(store.set_ex(b"a", b"v", 0), Err(RkvError::Value(_))));
    }

    #[test]
    fn set_ex_rejects_unrepresentable_deadline() {
        let store = MemoryStore::with_shard_count(2);
        assert!(matches!(store.set_ex(b"a", b"v", u64::MAX), Err(RkvError::Value(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn expired_entries_are_hidden_and_purged() {
        let store = MemoryStore::with_shard_count(2);
        store.set(b"alpha", b"value").unwrap();
        store.set_ex(b"beta", b"value", 60).unwrap();

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(store.purge_expired(later), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(b"beta").unwrap().is_none());
    }

    #[test]
    fn scan_filters_by_pattern_across_pages() {
        let store = MemoryStore::with_shard_count(4);
        for idx in 0..25 {
            store.set(format!("users:{}:eu", idx).as_bytes(), b"{}").unwrap();
            store.set(format!("users:{}:us", idx).as_bytes(), b"{}").unwrap();
        }
        store.set(b"orders:1:eu", b"{}").unwrap();

        let mut keys: Vec<String> = scan(&store, "users:*:eu", 7)
            .map(|key| String::from_utf8(key.unwrap()).unwrap())
            .collect();
        keys.sort();
        assert_eq!(keys.len(), 25);
        assert!(keys.iter().all(|key| key.starts_with("users:") && key.ends_with(":eu")));
    }

    #[test]
    fn scan_page_cursor_terminates() {
        let store = MemoryStore::with_shard_count(1);
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();
        store.set(b"c", b"3").unwrap();

        let first = store.scan_page(0, b"*", 2).unwrap();
        assert_ne!(first.cursor, 0);
        assert_eq!(first.keys, vec![b"a".to_vec(), b"b".to_vec()]);
        let second = store.scan_page(first.cursor, b"*", 2).unwrap();
        assert_eq!(second.cursor, 0);
        assert_eq!(second.keys, vec![b"c".to_vec()]);

        // A finished cursor cannot be resumed.
        assert!(matches!(store.scan_page(first.cursor, b"*", 2), Err(RkvError::Value(_))));
    }

    fn scan_all(store: &MemoryStore, between_pages: impl Fn(usize)) -> Vec<Vec<u8>> {
        let mut seen = Vec::new();
        let mut cursor = 0;
        let mut page_no = 0;
        loop {
            let page = store.scan_page(cursor, b"*", 1).unwrap();
            seen.extend(page.keys);
            if page.cursor == 0 {
                return seen;
            }
            between_pages(page_no);
            page_no += 1;
            cursor = page.cursor;
        }
    }

    #[test]
    fn scan_ignores_keys_inserted_mid_scan() {
        let store = MemoryStore::with_shard_count(2);
        store.set(b"b", b"1").unwrap();
        store.set(b"c", b"2").unwrap();

        let seen = scan_all(&store, |page| {
            if page == 0 {
                store.set(b"a", b"0").unwrap();
            }
        });
        assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn scan_keeps_position_when_earlier_keys_expire() {
        let store = MemoryStore::with_shard_count(2);
        store.set_ex(b"a", b"0", 1).unwrap();
        store.set(b"b", b"1").unwrap();
        store.set(b"c", b"2").unwrap();

        let seen = scan_all(&store, |page| {
            if page == 0 {
                assert_eq!(store.purge_expired(Instant::now() + Duration::from_secs(2)), 1);
            }
        });
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn abandoned_scans_are_bounded() {
        let store = MemoryStore::with_shard_count(1);
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();

        let first = store.scan_page(0, b"*", 1).unwrap();
        for _ in 0..MAX_OPEN_SCANS {
            store.scan_page(0, b"*", 1).unwrap();
        }
        assert_eq!(store.scans.lock().len(), MAX_OPEN_SCANS);
        // The oldest scan was dropped to make room.
        assert!(store.scan_page(first.cursor, b"*", 1).is_err());
    }

    #[test]
    fn offline_store_fails_every_call() {
        let store = MemoryStore::with_shard_count(1).named("replica-1");
        store.set_offline(true);
        let err = store.ping().unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("replica-1"));
        assert!(store.get(b"a").is_err());

        store.set_offline(false);
        assert!(store.ping().is_ok());
    }
}
