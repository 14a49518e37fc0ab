//! Registry collecting the terms of one query build.

use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::{PilumError, Result};
use crate::index::{IndexAccess, Term};
use crate::stats::{
    CorrectionMode, RegistryId, TermIndex, TermStats, TermStatsTable, clause_ranges,
};

#[derive(Debug, Default)]
struct Registrations {
    terms: Vec<Term>,
    clause_offsets: Vec<usize>,
    end_user_query: Option<usize>,
}

/// Collects all terms referenced by one query build and computes their
/// (corrected) statistics exactly once.
///
/// Registration happens through a shared reference so that leaves already
/// built for the user query can hold on to the registry while filter
/// queries keep registering. Once statistics are computed the term list is
/// frozen.
#[derive(Debug)]
pub struct StatsCorrectionRegistry {
    id: RegistryId,
    mode: CorrectionMode,
    registrations: RwLock<Registrations>,
    compute_lock: Mutex<()>,
    stats: OnceLock<Arc<TermStatsTable>>,
}

impl Default for StatsCorrectionRegistry {
    fn default() -> Self {
        Self::new(CorrectionMode::Corrected)
    }
}

impl StatsCorrectionRegistry {
    /// Create an empty registry.
    pub fn new(mode: CorrectionMode) -> Self {
        StatsCorrectionRegistry {
            id: RegistryId::next(),
            mode,
            registrations: RwLock::new(Registrations::default()),
            compute_lock: Mutex::new(()),
            stats: OnceLock::new(),
        }
    }

    /// Create an empty registry ready to be shared by scoring leaves.
    pub fn shared(mode: CorrectionMode) -> Arc<Self> {
        Arc::new(Self::new(mode))
    }

    /// Identity of this registry.
    pub fn id(&self) -> RegistryId {
        self.id
    }

    /// The correction mode.
    pub fn mode(&self) -> CorrectionMode {
        self.mode
    }

    /// Must be called with the registration lock held, so no term can be
    /// added between computing and publishing the statistics.
    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.stats.get().is_some() {
            return Err(PilumError::invalid_operation(format!(
                "cannot {operation} after term statistics were computed"
            )));
        }
        Ok(())
    }

    /// Append a term and return its new, never reused index.
    ///
    /// Identical terms are not deduplicated.
    pub fn register(&self, term: Term) -> Result<TermIndex> {
        let mut registrations = self.registrations.write();
        self.ensure_open("register a term")?;
        let slot = registrations.terms.len();
        registrations.terms.push(term);
        Ok(TermIndex::new(self.id, slot))
    }

    /// Start a new alternative clause at the current end of the term list.
    ///
    /// Returns the ordinal of the new clause.
    pub fn new_clause(&self) -> Result<usize> {
        let mut registrations = self.registrations.write();
        self.ensure_open("start a clause")?;
        let start = registrations.terms.len();
        registrations.clause_offsets.push(start);
        Ok(registrations.clause_offsets.len() - 1)
    }

    /// Mark the end of the user-authored clauses.
    pub fn finished_user_query(&self) -> Result<()> {
        let mut registrations = self.registrations.write();
        self.ensure_open("finish the user query")?;
        registrations.end_user_query = Some(registrations.terms.len());
        Ok(())
    }

    /// Number of registered terms.
    pub fn term_count(&self) -> usize {
        self.registrations.read().terms.len()
    }

    /// Registered terms, in registration order.
    pub fn terms(&self) -> Vec<Term> {
        self.registrations.read().terms.clone()
    }

    /// Start offsets of all clauses.
    pub fn clause_offsets(&self) -> Vec<usize> {
        self.registrations.read().clause_offsets.clone()
    }

    /// Offset where user clauses end, if recorded.
    pub fn end_user_query(&self) -> Option<usize> {
        self.registrations.read().end_user_query
    }

    /// Whether statistics have been computed.
    pub fn is_computed(&self) -> bool {
        self.stats.get().is_some()
    }

    /// Statistics, if already computed.
    pub fn stats(&self) -> Option<Arc<TermStatsTable>> {
        self.stats.get().cloned()
    }

    /// Compute the statistics of all registered terms, or return the ones
    /// computed by an earlier call.
    ///
    /// Any failure while reading the index is fatal for the build; the
    /// registry stays uncomputed so the caller may retry.
    pub fn compute_stats(&self, index: &dyn IndexAccess) -> Result<Arc<TermStatsTable>> {
        if let Some(stats) = self.stats.get() {
            return Ok(Arc::clone(stats));
        }
        let _guard = self.compute_lock.lock();
        if let Some(stats) = self.stats.get() {
            return Ok(Arc::clone(stats));
        }

        let registrations = self.registrations.read();
        let table = Arc::new(self.calculate(&registrations, index)?);
        Ok(Arc::clone(self.stats.get_or_init(|| table)))
    }

    fn calculate(
        &self,
        registrations: &Registrations,
        index: &dyn IndexAccess,
    ) -> Result<TermStatsTable> {

        let mut stats = Vec::with_capacity(registrations.terms.len());
        for term in &registrations.terms {
            let (doc_freq, handle) = index.document_frequency(term).map_err(|e| {
                PilumError::index_access_caused_by(
                    format!("reading document frequency of {term}"),
                    e,
                )
            })?;
            stats.push(TermStats::new(term.clone(), doc_freq, handle));
        }

        if self.mode == CorrectionMode::Corrected {
            correct_clauses(
                &mut stats,
                &registrations.clause_offsets,
                registrations.end_user_query,
            );
        }

        debug!(
            registry = %self.id,
            mode = ?self.mode,
            terms = stats.len(),
            clauses = registrations.clause_offsets.len(),
            end_user_query = ?registrations.end_user_query,
            snapshot = %index.snapshot(),
            "computed term statistics"
        );

        Ok(TermStatsTable::new(
            self.id,
            index.snapshot(),
            stats,
            registrations.clause_offsets.clone(),
            registrations.end_user_query,
        ))
    }
}

/// Equalize document frequencies within each clause.
///
/// Clauses starting before `end_user_query` raise every matching term to the
/// clause maximum and feed the running user maximum. Later (injected) clauses
/// are raised to `max + running_user_max - 1`. Terms that match no document
/// are left alone.
fn correct_clauses(
    stats: &mut [TermStats],
    clause_offsets: &[usize],
    end_user_query: Option<usize>,
) {
    let end_user_query = end_user_query.unwrap_or(usize::MAX);
    let mut running_max_user: i64 = 0;

    for (clause, range) in clause_ranges(clause_offsets, stats.len())
        .into_iter()
        .enumerate()
    {
        let group = &mut stats[range.clone()];
        let max_raw = group
            .iter()
            .map(TermStats::raw_doc_freq)
            .filter(|&df| df > 0)
            .max()
            .unwrap_or(0) as i64;
        if max_raw == 0 {
            continue;
        }

        let effective_max = if range.start < end_user_query {
            running_max_user = running_max_user.max(max_raw);
            max_raw
        } else {
            max_raw + (running_max_user - 1)
        };

        for term_stats in group.iter_mut() {
            let df = term_stats.raw_doc_freq() as i64;
            if df > 0 && effective_max > df {
                term_stats.correct_to(effective_max as u64);
            }
        }

        trace!(clause, start = range.start, end = range.end, effective_max, "corrected clause");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{MemoryDocument, MemoryIndex};

    /// Index where term `tN` occurs in exactly N documents of field `f`.
    fn index_with_dfs(dfs: &[(&str, usize)]) -> MemoryIndex {
        let max = dfs.iter().map(|(_, df)| *df).max().unwrap_or(0);
        let mut builder = MemoryIndex::builder().max_segment_docs(7);
        for doc in 0..max.max(1) {
            let text: Vec<&str> = dfs
                .iter()
                .filter(|(_, df)| doc < *df)
                .map(|(text, _)| *text)
                .collect();
            builder.add_document(MemoryDocument::new().with_text("f", text.join(" ")));
        }
        builder.build().unwrap()
    }

    fn corrected(table: &TermStatsTable) -> Vec<u64> {
        table.all().iter().map(TermStats::corrected_doc_freq).collect()
    }

    #[test]
    fn test_register_assigns_distinct_slots() {
        let registry = StatsCorrectionRegistry::new(CorrectionMode::Corrected);

        let a = registry.register(Term::new("f", "a")).unwrap();
        let b = registry.register(Term::new("f", "a")).unwrap();

        assert_eq!(a.slot(), 0);
        assert_eq!(b.slot(), 1);
        assert_eq!(a.registry(), registry.id());
        assert_eq!(registry.term_count(), 2);
    }

    #[test]
    fn test_group_is_raised_to_max() {
        let index = index_with_dfs(&[("rare", 5), ("common", 50)]);
        let registry = StatsCorrectionRegistry::new(CorrectionMode::Corrected);
        registry.new_clause().unwrap();
        registry.register(Term::new("f", "rare")).unwrap();
        registry.register(Term::new("f", "common")).unwrap();
        registry.finished_user_query().unwrap();

        let table = registry.compute_stats(&index).unwrap();

        assert_eq!(corrected(&table), vec![50, 50]);
        assert_eq!(table.all()[0].raw_doc_freq(), 5);
        assert_eq!(table.all()[0].handle().doc_freq(), 50);
    }

    #[test]
    fn test_zero_df_term_stays_never_match() {
        let index = index_with_dfs(&[("a", 3)]);
        let registry = StatsCorrectionRegistry::new(CorrectionMode::Corrected);
        registry.new_clause().unwrap();
        registry.register(Term::new("f", "a")).unwrap();
        registry.register(Term::new("f", "missing")).unwrap();

        let table = registry.compute_stats(&index).unwrap();

        assert_eq!(corrected(&table), vec![3, 0]);
        assert!(table.all()[1].is_never_match());
    }

    #[test]
    fn test_injected_clause_is_capped_by_user_max() {
        let index = index_with_dfs(&[
            ("a", 10),
            ("b", 10),
            ("c", 10),
            ("d", 2),
            ("e", 2),
            ("g", 1),
            ("h", 1),
        ]);
        let registry = StatsCorrectionRegistry::new(CorrectionMode::Corrected);
        for (i, text) in ["a", "b", "c", "d", "e", "g", "h"].iter().enumerate() {
            if i == 0 || i == 3 || i == 5 {
                registry.new_clause().unwrap();
            }
            if i == 5 {
                registry.finished_user_query().unwrap();
            }
            registry.register(Term::new("f", *text)).unwrap();
        }
        assert_eq!(registry.clause_offsets(), vec![0, 3, 5]);

        let table = registry.compute_stats(&index).unwrap();

        // 1 + (10 - 1)
        assert_eq!(corrected(&table), vec![10, 10, 10, 2, 2, 10, 10]);
    }

    #[test]
    fn test_terms_outside_clauses_are_untouched() {
        let index = index_with_dfs(&[("a", 2), ("b", 9)]);
        let registry = StatsCorrectionRegistry::new(CorrectionMode::Corrected);
        registry.register(Term::new("f", "a")).unwrap();
        registry.new_clause().unwrap();
        registry.register(Term::new("f", "b")).unwrap();

        let table = registry.compute_stats(&index).unwrap();
        assert_eq!(corrected(&table), vec![2, 9]);
    }

    #[test]
    fn test_standard_mode_keeps_raw_frequencies() {
        let index = index_with_dfs(&[("rare", 5), ("common", 50)]);
        let registry = StatsCorrectionRegistry::new(CorrectionMode::Standard);
        registry.new_clause().unwrap();
        registry.register(Term::new("f", "rare")).unwrap();
        registry.register(Term::new("f", "common")).unwrap();

        let table = registry.compute_stats(&index).unwrap();
        assert_eq!(corrected(&table), vec![5, 50]);
    }

    #[test]
    fn test_compute_runs_once_and_freezes() {
        let index = index_with_dfs(&[("a", 2)]);
        let registry = StatsCorrectionRegistry::new(CorrectionMode::Corrected);
        registry.new_clause().unwrap();
        registry.register(Term::new("f", "a")).unwrap();

        let first = registry.compute_stats(&index).unwrap();
        let second = registry.compute_stats(&index).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_computed());

        let result = registry.register(Term::new("f", "b"));
        assert!(matches!(result, Err(PilumError::InvalidOperation(_))));
        assert!(registry.new_clause().is_err());
        assert!(registry.finished_user_query().is_err());
    }

    #[test]
    fn test_registration_racing_compute_resolves_or_fails() {
        let index = index_with_dfs(&[("a", 2), ("b", 1)]);
        let registry = StatsCorrectionRegistry::new(CorrectionMode::Corrected);
        registry.new_clause().unwrap();
        registry.register(Term::new("f", "a")).unwrap();

        let (table, registered) = std::thread::scope(|scope| {
            let writers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut accepted = Vec::new();
                        while let Ok(slot) = registry.register(Term::new("f", "b")) {
                            accepted.push(slot);
                        }
                        accepted
                    })
                })
                .collect();
            let table = registry.compute_stats(&index).unwrap();
            let registered: Vec<TermIndex> = writers
                .into_iter()
                .flat_map(|writer| writer.join().unwrap())
                .collect();
            (table, registered)
        });

        assert_eq!(table.len(), registry.term_count());
        for slot in registered {
            assert_eq!(table.get(slot).raw_doc_freq(), 1);
        }
    }
}
