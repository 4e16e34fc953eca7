//! Sharded Key-Value Store
//!
//! This module implements the core storage engine for SusyDB: a sharded,
//! thread-safe keyspace holding string and hash entries with optional TTL.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: The keyspace is split across 32 shards, each behind
//!    its own RwLock, so unrelated keys never contend.
//! 2. **Tagged Values**: An entry is either a string or a hash. The variant is
//!    fixed on first insert; operations that need the other variant fail with
//!    a wrong-type error instead of reinterpreting the data.
//! 3. **Lazy Expiry**: Readers detect expired entries and remove them with a
//!    drop-then-reacquire write upgrade. The background expirer handles keys
//!    that are never read again (see the `expiry` module).
//! 4. **Sampling Index**: Each shard keeps its live keys in a flat list plus a
//!    key-to-position table, so the expirer can draw random keys in O(1) and
//!    removal stays O(1) via swap-with-last.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                               │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐     ┌─────────┐        │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ ... │ Shard 31│        │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │     │ RwLock  │        │
//! │  │ data    │ │ data    │ │ data    │     │ data    │        │
//! │  │ keys    │ │ keys    │ │ keys    │     │ keys    │        │
//! │  └─────────┘ └─────────┘ └─────────┘     └─────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are routed to shards with FNV-1a. No operation ever holds more than
//! one shard lock, and the store-wide key counter is a lock-free atomic.

use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::storage::expiry::SAMPLE_SIZE;
use crate::storage::pubsub::Hub;

/// Number of shards in the keyspace.
pub(crate) const SHARD_COUNT: usize = 32;

/// Errors returned by store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The stored value is not the variant the operation requires.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// The stored value cannot be parsed as a signed 64-bit integer.
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// The increment would overflow a signed 64-bit integer.
    #[error("increment or decrement would overflow")]
    Overflow,

    /// The store is at its configured key limit.
    #[error("max number of keys exceeded")]
    MaxKeysExceeded,
}

/// A stored value: either a plain string or a field-addressed hash.
#[derive(Debug, Clone)]
pub enum Value {
    Str(Bytes),
    Hash(HashMap<Bytes, Bytes>),
}

/// A single record: the value plus its expiration, if any.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored value.
    pub value: Value,
    /// When this entry expires (`None` = never expires).
    pub expires_at: Option<Instant>,
}

impl Entry {
    fn string(value: Bytes, expires_at: Option<Instant>) -> Self {
        Self {
            value: Value::Str(value),
            expires_at,
        }
    }

    fn empty_hash() -> Self {
        Self {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        }
    }

    /// Checks whether this entry's expiration has passed.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// The mutable interior of a shard. All three collections describe the same
/// set of keys and must be updated together, which the single lock enforces.
#[derive(Debug, Default)]
struct ShardState {
    /// Key to entry mapping.
    data: HashMap<Bytes, Entry>,
    /// Every live key, in arbitrary order, for O(1) random sampling.
    keys: Vec<Bytes>,
    /// Key to its position in `keys`, for O(1) removal.
    key_index: HashMap<Bytes, usize>,
}

impl ShardState {
    /// Records a newly inserted key in the sampling index.
    fn add_key(&mut self, key: Bytes) {
        self.key_index.insert(key.clone(), self.keys.len());
        self.keys.push(key);
    }

    /// Drops a key from the sampling index by swapping it with the last slot.
    fn remove_key(&mut self, key: &Bytes) {
        let idx = match self.key_index.remove(key) {
            Some(idx) => idx,
            None => return,
        };
        self.keys.swap_remove(idx);
        if idx < self.keys.len() {
            // The former last key now lives at `idx`.
            let moved = self.keys[idx].clone();
            self.key_index.insert(moved, idx);
        }
    }

    /// Removes an entry and its index bookkeeping together.
    fn remove_entry(&mut self, key: &Bytes) {
        self.data.remove(key);
        self.remove_key(key);
    }
}

/// One lock-protected partition of the keyspace.
#[derive(Debug, Default)]
struct Shard {
    state: RwLock<ShardState>,
}

/// The SusyDB storage engine.
///
/// This is the heart of the database. It is designed to be wrapped in an
/// `Arc` and shared between all connection tasks and the background expirer;
/// every operation is thread-safe.
///
/// # Example
///
/// ```
/// use susydb::storage::Store;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let store = Store::new();
///
/// store.set(Bytes::from("name"), Bytes::from("Suhaan")).unwrap();
/// assert_eq!(
///     store.get(&Bytes::from("name")).unwrap(),
///     Some(Bytes::from("Suhaan"))
/// );
///
/// // Volatile key
/// store
///     .set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60))
///     .unwrap();
/// ```
pub struct Store {
    /// The sharded keyspace.
    shards: Vec<Shard>,

    /// Upper bound on the number of keys; 0 means unbounded.
    max_keys: usize,

    /// Total live keys across all shards. Updated inside shard locks but read
    /// lock-free, so it can run slightly ahead of per-shard truth.
    key_count: AtomicU64,

    /// The pub/sub hub. Lives on the store so embedded users get it too.
    pub hub: Hub,

    /// Construction time, reported by INFO.
    start_time: Instant,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("shards", &self.shards.len())
            .field("max_keys", &self.max_keys)
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::with_max_keys(0)
    }

    /// Creates a store that rejects new keys once `max_keys` are live.
    /// A limit of 0 means unbounded.
    pub fn with_max_keys(max_keys: usize) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Shard::default()).collect(),
            max_keys,
            key_count: AtomicU64::new(0),
            hub: Hub::new(),
            start_time: Instant::now(),
        }
    }

    /// Routes a key to its shard.
    #[inline]
    fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[fnv1a_32(key) as usize % SHARD_COUNT]
    }

    /// Gate for operations that would create a new key. The read happens
    /// before the increment, so concurrent inserts on different shards can
    /// overshoot the limit by a small amount (soft cap).
    fn check_capacity(&self) -> Result<(), StoreError> {
        if self.max_keys > 0 && self.key_count.load(Ordering::Relaxed) as usize >= self.max_keys {
            return Err(StoreError::MaxKeysExceeded);
        }
        Ok(())
    }

    /// Stores a key-value pair without expiry, overwriting any existing entry
    /// regardless of its variant.
    pub fn set(&self, key: Bytes, value: Bytes) -> Result<(), StoreError> {
        self.write_string(key, value, None)
    }

    /// Stores a key-value pair that expires after `ttl`.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.write_string(key, value, Some(Instant::now() + ttl))
    }

    fn write_string(
        &self,
        key: Bytes,
        value: Bytes,
        expires_at: Option<Instant>,
    ) -> Result<(), StoreError> {
        let shard = self.shard_for(&key);
        let mut state = shard.state.write().unwrap();

        if !state.data.contains_key(&key) {
            self.check_capacity()?;
            state.add_key(key.clone());
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }

        state.data.insert(key, Entry::string(value, expires_at));
        Ok(())
    }

    /// Retrieves the string value for a key.
    ///
    /// Returns `Ok(None)` if the key is absent or expired. An expired entry
    /// is removed on the spot: the read lock is dropped, the write lock taken,
    /// and the expiry re-checked before deletion, since another task may have
    /// written a fresh value in between.
    pub fn get(&self, key: &Bytes) -> Result<Option<Bytes>, StoreError> {
        let shard = self.shard_for(key);

        {
            let state = shard.state.read().unwrap();
            match state.data.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => {
                    return match &entry.value {
                        Value::Str(value) => Ok(Some(value.clone())),
                        Value::Hash(_) => Err(StoreError::WrongType),
                    };
                }
                Some(_) => {}
            }
        }

        let mut state = shard.state.write().unwrap();
        let still_expired = state
            .data
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if still_expired {
            state.remove_entry(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(None)
    }

    /// Adds `delta` to the integer stored at `key`, creating it at 0 if
    /// absent. The value is kept as decimal text, so a plain GET returns the
    /// counter unchanged.
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> Result<i64, StoreError> {
        let shard = self.shard_for(key);
        let mut state = shard.state.write().unwrap();

        // An expired counter restarts from scratch.
        let expired = state
            .data
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if expired {
            state.remove_entry(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }

        let existing = match state.data.get(key) {
            Some(entry) => {
                let raw = match &entry.value {
                    Value::Str(raw) => raw,
                    Value::Hash(_) => return Err(StoreError::WrongType),
                };
                let current: i64 = std::str::from_utf8(raw)
                    .map_err(|_| StoreError::NotAnInteger)?
                    .parse()
                    .map_err(|_| StoreError::NotAnInteger)?;
                Some((current, entry.expires_at))
            }
            None => None,
        };

        let (current, expires_at) = match existing {
            Some(found) => found,
            None => {
                self.check_capacity()?;
                state.add_key(key.clone());
                self.key_count.fetch_add(1, Ordering::Relaxed);
                (0, None)
            }
        };

        let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;
        state.data.insert(
            key.clone(),
            Entry::string(Bytes::from(next.to_string()), expires_at),
        );
        Ok(next)
    }

    /// Removes a key. Returns whether it was present.
    pub fn delete(&self, key: &Bytes) -> bool {
        let shard = self.shard_for(key);
        let mut state = shard.state.write().unwrap();

        if state.data.contains_key(key) {
            state.remove_entry(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    // ========================================================================
    // Hash operations
    // ========================================================================

    /// Sets a field inside the hash at `key`, creating the hash if the key is
    /// absent or expired. Fails with a wrong-type error if the key holds a
    /// string.
    pub fn hset(&self, key: Bytes, field: Bytes, value: Bytes) -> Result<(), StoreError> {
        let shard = self.shard_for(&key);
        let mut state = shard.state.write().unwrap();

        let expired = state
            .data
            .get(&key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if expired {
            state.remove_entry(&key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }

        if !state.data.contains_key(&key) {
            self.check_capacity()?;
            state.add_key(key.clone());
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }

        let entry = state.data.entry(key).or_insert_with(Entry::empty_hash);
        match &mut entry.value {
            Value::Hash(fields) => {
                fields.insert(field, value);
                Ok(())
            }
            Value::Str(_) => Err(StoreError::WrongType),
        }
    }

    /// Retrieves a single field from the hash at `key`.
    ///
    /// Returns `Ok(None)` when the key or the field is absent; expired keys
    /// are removed exactly as in [`Store::get`].
    pub fn hget(&self, key: &Bytes, field: &Bytes) -> Result<Option<Bytes>, StoreError> {
        let shard = self.shard_for(key);

        {
            let state = shard.state.read().unwrap();
            match state.data.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => {
                    return match &entry.value {
                        Value::Hash(fields) => Ok(fields.get(field).cloned()),
                        Value::Str(_) => Err(StoreError::WrongType),
                    };
                }
                Some(_) => {}
            }
        }

        let mut state = shard.state.write().unwrap();
        let still_expired = state
            .data
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if still_expired {
            state.remove_entry(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(None)
    }

    /// Returns an independent copy of the whole hash at `key`.
    ///
    /// `Ok(Some(map))` with an empty map means the key exists but holds no
    /// fields, which is distinct from `Ok(None)` for an absent key.
    pub fn hget_all(&self, key: &Bytes) -> Result<Option<HashMap<Bytes, Bytes>>, StoreError> {
        let shard = self.shard_for(key);

        {
            let state = shard.state.read().unwrap();
            match state.data.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => {
                    return match &entry.value {
                        Value::Hash(fields) => Ok(Some(fields.clone())),
                        Value::Str(_) => Err(StoreError::WrongType),
                    };
                }
                Some(_) => {}
            }
        }

        let mut state = shard.state.write().unwrap();
        let still_expired = state
            .data
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if still_expired {
            state.remove_entry(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(None)
    }

    /// Removes a field from the hash at `key`. Returns whether the field was
    /// present. The key itself is retained even if the hash becomes empty.
    pub fn hdel(&self, key: &Bytes, field: &Bytes) -> Result<bool, StoreError> {
        let shard = self.shard_for(key);
        let mut state = shard.state.write().unwrap();

        let expired = match state.data.get(key) {
            None => return Ok(false),
            Some(entry) => entry.is_expired(),
        };
        if expired {
            state.remove_entry(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            return Ok(false);
        }

        match state.data.get_mut(key) {
            Some(entry) => match &mut entry.value {
                Value::Hash(fields) => Ok(fields.remove(field).is_some()),
                Value::Str(_) => Err(StoreError::WrongType),
            },
            None => Ok(false),
        }
    }

    // ========================================================================
    // Stats and maintenance
    // ========================================================================

    /// Returns the number of live keys. Relaxed atomic load, so the value is
    /// approximate under concurrent writes.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seconds since the store was created.
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Renders the INFO payload.
    pub fn info(&self) -> String {
        format!(
            "# Server\r\nsusydb_version:{}\r\nuptime_in_seconds:{}\r\n\r\n# Stats\r\nkeys:{}\r\n",
            crate::VERSION,
            self.uptime(),
            self.len()
        )
    }

    /// One sample-and-evict cycle over a single shard, used by the background
    /// expirer. Draws up to `SAMPLE_SIZE` random keys (with replacement) under
    /// the shard write lock and removes the expired ones. Returns how many
    /// were evicted.
    pub(crate) fn sweep_shard(&self, index: usize) -> usize {
        let shard = &self.shards[index];
        let mut state = shard.state.write().unwrap();

        let mut live = state.keys.len();
        if live == 0 {
            return 0;
        }

        let sample = SAMPLE_SIZE.min(live);
        let mut rng = rand::thread_rng();
        let mut expired = 0;

        for _ in 0..sample {
            let key = state.keys[rng.gen_range(0..live)].clone();
            let is_expired = state
                .data
                .get(&key)
                .map(|entry| entry.is_expired())
                .unwrap_or(false);
            if is_expired {
                state.remove_entry(&key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                expired += 1;
                live = state.keys.len();
                if live == 0 {
                    break;
                }
            }
        }

        expired
    }
}

/// 32-bit FNV-1a over the key bytes.
#[inline]
fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
