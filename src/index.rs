//! Index access capability.
//!
//! The scoring core never decodes postings or walks segments on its own; it
//! consumes an [`IndexAccess`] implementation that exposes per-segment term
//! lookups, posting iteration and per-field corpus aggregates. Statistics
//! gathered through it are bound to a single [`SnapshotId`]: a
//! [`TermHandle`] is only valid for the snapshot it was built for.

pub mod cache;
pub mod memory;

use std::fmt::{self, Debug, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PilumError, Result};

/// Doc id returned by exhausted iterators.
pub const NO_MORE_DOCS: u64 = u64::MAX;

/// A (field, text) unit of match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Term {
    field: String,
    text: String,
}

impl Term {
    /// Create a new term.
    pub fn new<F, T>(field: F, text: T) -> Self
    where
        F: Into<String>,
        T: Into<String>,
    {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Get the field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Get the term text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

/// Identifies one point-in-time view of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    /// Create a fresh, unique snapshot id.
    pub fn new() -> Self {
        SnapshotId(Uuid::new_v4())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a term inside one segment's dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentTermState {
    /// Ordinal of the term in the segment's dictionary.
    pub ord: u64,
    /// Number of documents in the segment containing the term.
    pub doc_freq: u64,
    /// Number of occurrences of the term in the segment.
    pub total_term_freq: u64,
}

/// Opaque handle to a term's postings across the segments of one snapshot.
///
/// Besides the per-segment states, the handle carries the aggregate term
/// statistics that similarity scoring observes. Those aggregates may be
/// inflated by document frequency correction.
#[derive(Debug, Clone)]
pub struct TermHandle {
    snapshot: SnapshotId,
    states: Vec<Option<SegmentTermState>>,
    doc_freq: u64,
    total_term_freq: u64,
}

impl TermHandle {
    /// Create an empty handle for an index snapshot with `segment_count` segments.
    pub fn new(snapshot: SnapshotId, segment_count: usize) -> Self {
        TermHandle {
            snapshot,
            states: vec![None; segment_count],
            doc_freq: 0,
            total_term_freq: 0,
        }
    }

    /// Record the term's state in a segment and add its statistics to the aggregates.
    pub fn register(&mut self, segment: usize, state: SegmentTermState) {
        if let Some(slot) = self.states.get_mut(segment) {
            *slot = Some(state);
            self.doc_freq += state.doc_freq;
            self.total_term_freq += state.total_term_freq;
        }
    }

    /// Inflate the aggregate statistics by `delta` documents.
    ///
    /// Every extra document counts as one extra occurrence so that
    /// `total_term_freq >= doc_freq` keeps holding.
    pub fn accumulate_statistics(&mut self, delta: u64) {
        self.doc_freq += delta;
        self.total_term_freq += delta;
    }

    /// Aggregate document frequency seen by similarity scoring.
    pub fn doc_freq(&self) -> u64 {
        self.doc_freq
    }

    /// Aggregate total term frequency seen by similarity scoring.
    pub fn total_term_freq(&self) -> u64 {
        self.total_term_freq
    }

    /// The snapshot this handle was built for.
    pub fn snapshot(&self) -> SnapshotId {
        self.snapshot
    }

    /// Check whether this handle may be used against the given snapshot.
    pub fn was_built_for(&self, snapshot: SnapshotId) -> bool {
        self.snapshot == snapshot
    }

    /// Get the term's state in a segment, if the segment contains the term.
    pub fn segment_state(&self, segment: usize) -> Option<&SegmentTermState> {
        self.states.get(segment).and_then(Option::as_ref)
    }
}

/// Corpus-wide aggregates for one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldStats {
    /// Number of documents in the index, including ones without the field.
    pub max_doc: u64,
    /// Number of documents that have at least one term in the field.
    pub doc_count: u64,
    /// Sum of the field lengths of all documents.
    pub sum_total_term_freq: u64,
    /// Sum of the document frequencies of all terms in the field.
    pub sum_doc_freq: u64,
}

impl FieldStats {
    /// Neutral statistics used when scores are not needed.
    pub fn unit() -> Self {
        FieldStats {
            max_doc: 1,
            doc_count: 1,
            sum_total_term_freq: 1,
            sum_doc_freq: 1,
        }
    }

    /// Statistics for a field that no document has.
    pub fn empty(max_doc: u64) -> Self {
        FieldStats {
            max_doc,
            doc_count: 0,
            sum_total_term_freq: 0,
            sum_doc_freq: 0,
        }
    }

    /// Average number of terms per document having the field.
    pub fn avg_field_length(&self) -> f32 {
        if self.doc_count == 0 {
            1.0
        } else {
            self.sum_total_term_freq as f32 / self.doc_count as f32
        }
    }
}

/// Iterator over one segment's posting list for a term.
///
/// A freshly opened iterator is positioned on its first document, or on
/// [`NO_MORE_DOCS`] if the list is empty. Doc ids are segment-local.
pub trait PostingIterator: Send + Debug {
    /// Get the current document ID.
    fn doc_id(&self) -> u64;

    /// Get the term frequency in the current document.
    fn term_freq(&self) -> u64;

    /// Move to the next document.
    fn next(&mut self) -> Result<bool>;

    /// Skip to the first document >= target.
    fn skip_to(&mut self, target: u64) -> Result<bool>;

    /// Get the cost of iterating through this posting list.
    fn cost(&self) -> u64;
}

/// Read access to a segmented inverted index.
///
/// All calls are synchronous. Implementations may parallelize internally.
pub trait IndexAccess: Send + Sync + Debug {
    /// The snapshot currently exposed by this index.
    fn snapshot(&self) -> SnapshotId;

    /// Total number of documents across all segments.
    fn max_doc(&self) -> u64;

    /// Number of segments.
    fn segment_count(&self) -> usize;

    /// Global doc id of the first document in a segment.
    fn segment_doc_base(&self, segment: usize) -> u64;

    /// Number of documents in a segment.
    fn segment_max_doc(&self, segment: usize) -> u64;

    /// Look up a term in one segment's dictionary.
    fn seek_term(&self, segment: usize, term: &Term) -> Result<Option<SegmentTermState>>;

    /// Open the posting list of a term previously found by [`IndexAccess::seek_term`].
    fn postings(
        &self,
        segment: usize,
        term: &Term,
        state: &SegmentTermState,
    ) -> Result<Box<dyn PostingIterator>>;

    /// Number of terms of `field` in a segment-local document.
    fn field_length(&self, segment: usize, field: &str, doc: u64) -> Result<u32>;

    /// Corpus aggregates for a field, `None` if no document has the field.
    fn field_stats(&self, field: &str) -> Result<Option<FieldStats>>;

    /// Numeric sort value of a segment-local document.
    fn sort_value(&self, segment: usize, field: &str, doc: u64) -> Result<Option<f64>> {
        let _ = (segment, field, doc);
        Ok(None)
    }

    /// Document frequency of a term aggregated across all segments, together
    /// with a handle for later posting access.
    fn document_frequency(&self, term: &Term) -> Result<(u64, TermHandle)> {
        let segment_count = self.segment_count();
        let mut handle = TermHandle::new(self.snapshot(), segment_count);
        for segment in 0..segment_count {
            if let Some(state) = self.seek_term(segment, term)? {
                handle.register(segment, state);
            }
        }
        Ok((handle.doc_freq(), handle))
    }
}

/// Open a term's postings in one segment through a handle.
///
/// Returns `None` without touching the index when the term does not occur
/// in the segment.
pub fn open_postings(
    index: &dyn IndexAccess,
    segment: usize,
    term: &Term,
    handle: &TermHandle,
) -> Result<Option<Box<dyn PostingIterator>>> {
    if !handle.was_built_for(index.snapshot()) {
        return Err(PilumError::invalid_operation(format!(
            "term handle for {term} was built for snapshot {} but the index exposes {}",
            handle.snapshot(),
            index.snapshot()
        )));
    }
    match handle.segment_state(segment) {
        Some(state) => index.postings(segment, term, state).map(Some),
        None => Ok(None),
    }
}
