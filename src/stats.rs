//! Per-build term statistics and document frequency correction.
//!
//! A query build registers every term it references with a
//! [`StatsCorrectionRegistry`], grouped into alternative clauses. The first
//! leaf that needs statistics triggers a single computation that reads raw
//! document frequencies from the index and, in
//! [`CorrectionMode::Corrected`], equalizes them within each clause.

pub mod registry;

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::index::{SnapshotId, Term, TermHandle};

pub use self::registry::StatsCorrectionRegistry;

/// Whether a registry equalizes document frequencies within clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionMode {
    /// Equalize document frequencies per alternative clause.
    #[default]
    Corrected,
    /// Use raw document frequencies.
    Standard,
}

/// Identity of one registry instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryId(u64);

impl RegistryId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        RegistryId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable slot of a registered term occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TermIndex {
    registry: RegistryId,
    slot: usize,
}

impl TermIndex {
    pub(crate) fn new(registry: RegistryId, slot: usize) -> Self {
        TermIndex { registry, slot }
    }

    /// Position of the term in the registry's term list.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The registry that issued this index.
    pub fn registry(&self) -> RegistryId {
        self.registry
    }
}

/// Statistics of one registered term.
#[derive(Debug, Clone)]
pub struct TermStats {
    term: Term,
    raw_doc_freq: u64,
    corrected_doc_freq: u64,
    handle: TermHandle,
}

impl TermStats {
    pub(crate) fn new(term: Term, raw_doc_freq: u64, handle: TermHandle) -> Self {
        TermStats {
            term,
            raw_doc_freq,
            corrected_doc_freq: raw_doc_freq,
            handle,
        }
    }

    pub(crate) fn correct_to(&mut self, corrected_doc_freq: u64) {
        let delta = corrected_doc_freq.saturating_sub(self.corrected_doc_freq);
        if delta > 0 {
            self.corrected_doc_freq = corrected_doc_freq;
            self.handle.accumulate_statistics(delta);
        }
    }

    /// The registered term.
    pub fn term(&self) -> &Term {
        &self.term
    }

    /// Document frequency aggregated across segments.
    pub fn raw_doc_freq(&self) -> u64 {
        self.raw_doc_freq
    }

    /// Document frequency after correction, never below the raw value.
    pub fn corrected_doc_freq(&self) -> u64 {
        self.corrected_doc_freq
    }

    /// Handle for posting access, carrying the (possibly inflated) aggregates.
    pub fn handle(&self) -> &TermHandle {
        &self.handle
    }

    /// A term that no document contains can never match.
    pub fn is_never_match(&self) -> bool {
        self.corrected_doc_freq < 1
    }
}

/// Immutable result of one statistics computation.
#[derive(Debug)]
pub struct TermStatsTable {
    registry: RegistryId,
    snapshot: SnapshotId,
    stats: Vec<TermStats>,
    clause_offsets: Vec<usize>,
    end_user_query: Option<usize>,
}

impl TermStatsTable {
    pub(crate) fn new(
        registry: RegistryId,
        snapshot: SnapshotId,
        stats: Vec<TermStats>,
        clause_offsets: Vec<usize>,
        end_user_query: Option<usize>,
    ) -> Self {
        TermStatsTable {
            registry,
            snapshot,
            stats,
            clause_offsets,
            end_user_query,
        }
    }

    /// Get the statistics of a registered term.
    ///
    /// # Panics
    ///
    /// Panics if `index` was issued by a different registry. Mixing term
    /// indices across builds is a programming error.
    pub fn get(&self, index: TermIndex) -> &TermStats {
        assert_eq!(
            index.registry, self.registry,
            "term index issued by registry {} used with registry {}",
            index.registry, self.registry
        );
        &self.stats[index.slot]
    }

    /// Statistics of all terms, in registration order.
    pub fn all(&self) -> &[TermStats] {
        &self.stats
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    /// Check whether no term was registered.
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// The snapshot the statistics were read from.
    pub fn snapshot(&self) -> SnapshotId {
        self.snapshot
    }

    /// Start offsets of the clauses at computation time.
    pub fn clause_offsets(&self) -> &[usize] {
        &self.clause_offsets
    }

    /// Offset where user clauses ended, if recorded.
    pub fn end_user_query(&self) -> Option<usize> {
        self.end_user_query
    }

    /// Term slot ranges of all clauses.
    pub fn clause_ranges(&self) -> Vec<std::ops::Range<usize>> {
        clause_ranges(&self.clause_offsets, self.stats.len())
    }
}

pub(crate) fn clause_ranges(offsets: &[usize], term_count: usize) -> Vec<std::ops::Range<usize>> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = offsets.get(i + 1).copied().unwrap_or(term_count);
            start..end
        })
        .collect()
}
