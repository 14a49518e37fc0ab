//! Cross-request term statistics cache.
//!
//! Field boost models that derive weights from corpus statistics may consult
//! a [`TermStatsCache`] instead of reading the index again. The cache itself
//! and its eviction policy are owned by the caller. A request only decides
//! whether it may write back through [`CacheAccess::ignore_updates`].

use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::index::Term;

/// Cached raw statistics of a term in its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedTermStats {
    /// Number of documents containing the term.
    pub doc_freq: u64,
    /// Number of occurrences of the term.
    pub total_term_freq: u64,
}

/// A get/put cache keyed by term.
pub trait TermStatsCache: Send + Sync + Debug {
    /// Look up a term.
    fn get(&self, term: &Term) -> Option<CachedTermStats>;

    /// Store the statistics of a term.
    fn put(&self, term: Term, stats: CachedTermStats);
}

/// Unbounded in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryTermStatsCache {
    entries: RwLock<AHashMap<Term, CachedTermStats>>,
}

impl MemoryTermStatsCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached terms.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl TermStatsCache for MemoryTermStatsCache {
    fn get(&self, term: &Term) -> Option<CachedTermStats> {
        self.entries.read().get(term).copied()
    }

    fn put(&self, term: Term, stats: CachedTermStats) {
        self.entries.write().insert(term, stats);
    }
}

/// Per-request view of a shared cache.
#[derive(Debug, Clone)]
pub struct CacheAccess {
    cache: Arc<dyn TermStatsCache>,
    ignore_updates: bool,
}

impl CacheAccess {
    /// Read and write through to `cache`.
    pub fn new(cache: Arc<dyn TermStatsCache>) -> Self {
        CacheAccess {
            cache,
            ignore_updates: false,
        }
    }

    /// Control whether results of this request may be written back.
    pub fn ignore_updates(mut self, ignore_updates: bool) -> Self {
        self.ignore_updates = ignore_updates;
        self
    }

    /// Whether writes are suppressed.
    pub fn ignores_updates(&self) -> bool {
        self.ignore_updates
    }

    /// Look up a term.
    pub fn get(&self, term: &Term) -> Option<CachedTermStats> {
        self.cache.get(term)
    }

    /// Store the statistics of a term unless updates are ignored.
    pub fn put(&self, term: Term, stats: CachedTermStats) {
        if !self.ignore_updates {
            self.cache.put(term, stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(doc_freq: u64) -> CachedTermStats {
        CachedTermStats {
            doc_freq,
            total_term_freq: doc_freq * 2,
        }
    }

    #[test]
    fn test_memory_cache_get_put() {
        let cache = MemoryTermStatsCache::new();
        let term = Term::new("title", "laptop");

        assert!(cache.get(&term).is_none());
        cache.put(term.clone(), stats(3));
        assert_eq!(cache.get(&term), Some(stats(3)));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_access_ignore_updates() {
        let cache = Arc::new(MemoryTermStatsCache::new());
        let term = Term::new("title", "laptop");

        let readonly = CacheAccess::new(cache.clone()).ignore_updates(true);
        readonly.put(term.clone(), stats(1));
        assert!(cache.is_empty());
        assert!(readonly.ignores_updates());

        let writable = CacheAccess::new(cache.clone());
        writable.put(term.clone(), stats(1));
        assert_eq!(readonly.get(&term), Some(stats(1)));
    }
}
