//! Prepared statement cache for avoiding repeated parsing.
//!
//! Statements are keyed by an FNV-1a fingerprint of their source text. When
//! the same text is prepared again, the cached parse is reused; when the
//! cache is full, the least recently used entry is evicted.

use crate::engine::PreparedQuery;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::hash::Hasher;
use tracing::trace;

/// A simple hasher for computing statement fingerprints.
/// Uses FNV-1a algorithm which is fast and has good distribution.
#[derive(Default)]
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self {
            state: Self::FNV_OFFSET,
        }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= *byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}

/// Computes the fingerprint of a statement's source text.
pub fn fingerprint(sql: &str) -> u64 {
    let mut hasher = FnvHasher::new();
    hasher.write(sql.as_bytes());
    hasher.finish()
}

/// Cache entry with access tracking for LRU eviction.
struct CacheEntry {
    statement: Arc<PreparedQuery>,
    last_access: u64,
}

/// LRU cache of prepared statements.
pub struct StatementCache {
    cache: BTreeMap<u64, CacheEntry>,
    max_size: usize,
    /// Global access counter for LRU tracking.
    access_counter: u64,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    /// Creates a new cache holding at most `max_size` statements.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: BTreeMap::new(),
            max_size,
            access_counter: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Creates a cache with default size (64 entries).
    pub fn default_size() -> Self {
        Self::new(64)
    }

    /// Gets a cached statement for `sql`.
    ///
    /// A fingerprint collision with different text counts as a miss.
    pub fn get(&mut self, sql: &str) -> Option<Arc<PreparedQuery>> {
        self.access_counter += 1;
        let key = fingerprint(sql);
        match self.cache.get_mut(&key) {
            Some(entry) if entry.statement.source() == sql => {
                entry.last_access = self.access_counter;
                self.hits += 1;
                trace!(target: "rowql::cache", fingerprint = key, "statement cache hit");
                Some(Arc::clone(&entry.statement))
            }
            _ => {
                self.misses += 1;
                trace!(target: "rowql::cache", fingerprint = key, "statement cache miss");
                None
            }
        }
    }

    /// Inserts a statement, evicting the least recently used one if full.
    pub fn insert(&mut self, statement: Arc<PreparedQuery>) {
        if self.max_size == 0 {
            return;
        }
        let key = fingerprint(statement.source());
        if !self.cache.contains_key(&key) && self.cache.len() >= self.max_size {
            self.evict_lru();
        }

        self.access_counter += 1;
        self.cache.insert(
            key,
            CacheEntry {
                statement,
                last_access: self.access_counter,
            },
        );
    }

    /// Gets a cached statement or prepares and caches a new one.
    pub fn get_or_insert_with<F, E>(&mut self, sql: &str, prepare: F) -> Result<Arc<PreparedQuery>, E>
    where
        F: FnOnce() -> Result<PreparedQuery, E>,
    {
        if let Some(statement) = self.get(sql) {
            return Ok(statement);
        }
        let statement = Arc::new(prepare()?);
        self.insert(Arc::clone(&statement));
        Ok(statement)
    }

    /// Evicts the least recently used entry.
    fn evict_lru(&mut self) {
        let lru_key = self
            .cache
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(k, _)| *k);

        if let Some(key) = lru_key {
            self.cache.remove(&key);
            trace!(target: "rowql::cache", fingerprint = key, "statement evicted");
        }
    }

    /// Clears the cache and its counters.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Returns the number of cached statements.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Returns cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::default_size()
    }
}
