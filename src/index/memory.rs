//! In-memory segmented index.
//!
//! [`MemoryIndex`] is a small but complete [`IndexAccess`] implementation:
//! documents are analyzed into per-segment term dictionaries with posting
//! lists, field lengths are kept per document and numeric values can be
//! attached for sorting. Every built index gets a fresh [`SnapshotId`].

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::error::{PilumError, Result};
use crate::index::{
    FieldStats, IndexAccess, NO_MORE_DOCS, PostingIterator, SegmentTermState, SnapshotId, Term,
};

/// A document to be indexed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    /// Text fields, analyzed at index time.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Numeric values usable for sorting.
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl MemoryDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    pub fn with_text<F, T>(mut self, field: F, text: T) -> Self
    where
        F: Into<String>,
        T: Into<String>,
    {
        self.fields.insert(field.into(), text.into());
        self
    }

    /// Add a numeric value.
    pub fn with_value<F: Into<String>>(mut self, field: F, value: f64) -> Self {
        self.values.insert(field.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: u64,
    freq: u32,
}

#[derive(Debug, Default)]
struct MemorySegment {
    max_doc: u64,
    dictionary: AHashMap<String, BTreeMap<String, u64>>,
    postings: Vec<Arc<[Posting]>>,
    field_lengths: AHashMap<String, Vec<u32>>,
    values: AHashMap<String, Vec<Option<f64>>>,
}

impl MemorySegment {
    fn build(docs: &[MemoryDocument], analyzer: &dyn Analyzer) -> Result<Self> {
        let max_doc = docs.len() as u64;
        let mut inverted: BTreeMap<String, BTreeMap<String, Vec<Posting>>> = BTreeMap::new();
        let mut field_lengths: AHashMap<String, Vec<u32>> = AHashMap::new();
        let mut values: AHashMap<String, Vec<Option<f64>>> = AHashMap::new();

        for (doc, document) in docs.iter().enumerate() {
            for (field, text) in &document.fields {
                let tokens = analyzer.analyze(text)?;
                field_lengths
                    .entry(field.clone())
                    .or_insert_with(|| vec![0; docs.len()])[doc] = tokens.len() as u32;

                let mut freqs: BTreeMap<String, u32> = BTreeMap::new();
                for token in tokens {
                    *freqs.entry(token).or_insert(0) += 1;
                }
                let terms = inverted.entry(field.clone()).or_default();
                for (text, freq) in freqs {
                    terms.entry(text).or_default().push(Posting {
                        doc: doc as u64,
                        freq,
                    });
                }
            }
            for (field, value) in &document.values {
                values
                    .entry(field.clone())
                    .or_insert_with(|| vec![None; docs.len()])[doc] = Some(*value);
            }
        }

        let mut dictionary = AHashMap::new();
        let mut postings = Vec::new();
        for (field, terms) in inverted {
            let mut ords = BTreeMap::new();
            for (text, list) in terms {
                ords.insert(text, postings.len() as u64);
                postings.push(Arc::from(list));
            }
            dictionary.insert(field, ords);
        }

        Ok(MemorySegment {
            max_doc,
            dictionary,
            postings,
            field_lengths,
            values,
        })
    }
}

/// Builder collecting documents into segments.
#[derive(Debug)]
pub struct MemoryIndexBuilder {
    analyzer: Arc<dyn Analyzer>,
    max_segment_docs: usize,
    segments: Vec<Vec<MemoryDocument>>,
}

impl Default for MemoryIndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexBuilder {
    /// Create a builder using the [`StandardAnalyzer`] and unbounded segments.
    pub fn new() -> Self {
        MemoryIndexBuilder {
            analyzer: Arc::new(StandardAnalyzer::new()),
            max_segment_docs: usize::MAX,
            segments: Vec::new(),
        }
    }

    /// Set the analyzer used for all text fields.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Start a new segment after this many documents.
    pub fn max_segment_docs(mut self, max_segment_docs: usize) -> Self {
        self.max_segment_docs = max_segment_docs.max(1);
        self
    }

    /// Add a document to the current segment.
    pub fn add_document(&mut self, document: MemoryDocument) -> &mut Self {
        let needs_segment = self
            .segments
            .last()
            .is_none_or(|segment| segment.len() >= self.max_segment_docs);
        if needs_segment {
            self.segments.push(Vec::new());
        }
        if let Some(segment) = self.segments.last_mut() {
            segment.push(document);
        }
        self
    }

    /// Add several documents.
    pub fn add_documents<I>(&mut self, documents: I) -> &mut Self
    where
        I: IntoIterator<Item = MemoryDocument>,
    {
        for document in documents {
            self.add_document(document);
        }
        self
    }

    /// Close the current segment; the next document starts a new one.
    pub fn flush_segment(&mut self) -> &mut Self {
        if self.segments.last().is_some_and(|segment| !segment.is_empty()) {
            self.segments.push(Vec::new());
        }
        self
    }

    /// Analyze all documents and build the index.
    pub fn build(self) -> Result<MemoryIndex> {
        let mut segments = Vec::new();
        let mut doc_bases = Vec::new();
        let mut max_doc = 0u64;
        for docs in self.segments.iter().filter(|docs| !docs.is_empty()) {
            let segment = MemorySegment::build(docs, self.analyzer.as_ref())?;
            doc_bases.push(max_doc);
            max_doc += segment.max_doc;
            segments.push(segment);
        }

        let mut field_stats: AHashMap<String, FieldStats> = AHashMap::new();
        for segment in &segments {
            for (field, lengths) in &segment.field_lengths {
                let stats = field_stats
                    .entry(field.clone())
                    .or_insert_with(|| FieldStats::empty(max_doc));
                stats.doc_count += lengths.iter().filter(|&&len| len > 0).count() as u64;
                stats.sum_total_term_freq += lengths.iter().map(|&len| len as u64).sum::<u64>();
            }
            for (field, terms) in &segment.dictionary {
                let stats = field_stats
                    .entry(field.clone())
                    .or_insert_with(|| FieldStats::empty(max_doc));
                stats.sum_doc_freq += terms
                    .values()
                    .map(|&ord| segment.postings[ord as usize].len() as u64)
                    .sum::<u64>();
            }
        }

        Ok(MemoryIndex {
            snapshot: SnapshotId::new(),
            segments,
            doc_bases,
            max_doc,
            field_stats,
        })
    }
}

/// An immutable in-memory index snapshot.
#[derive(Debug)]
pub struct MemoryIndex {
    snapshot: SnapshotId,
    segments: Vec<MemorySegment>,
    doc_bases: Vec<u64>,
    max_doc: u64,
    field_stats: AHashMap<String, FieldStats>,
}

impl MemoryIndex {
    /// Create a new builder.
    pub fn builder() -> MemoryIndexBuilder {
        MemoryIndexBuilder::new()
    }

    /// Build a single-segment index from documents.
    pub fn from_documents<I>(documents: I) -> Result<Self>
    where
        I: IntoIterator<Item = MemoryDocument>,
    {
        let mut builder = MemoryIndexBuilder::new();
        builder.add_documents(documents);
        builder.build()
    }

    fn segment(&self, segment: usize) -> Result<&MemorySegment> {
        self.segments.get(segment).ok_or_else(|| {
            PilumError::index_access(format!(
                "segment {segment} out of range ({} segments)",
                self.segments.len()
            ))
        })
    }
}

impl IndexAccess for MemoryIndex {
    fn snapshot(&self) -> SnapshotId {
        self.snapshot
    }

    fn max_doc(&self) -> u64 {
        self.max_doc
    }

    fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_doc_base(&self, segment: usize) -> u64 {
        self.doc_bases.get(segment).copied().unwrap_or(self.max_doc)
    }

    fn segment_max_doc(&self, segment: usize) -> u64 {
        self.segments.get(segment).map_or(0, |s| s.max_doc)
    }

    fn seek_term(&self, segment: usize, term: &Term) -> Result<Option<SegmentTermState>> {
        let segment = self.segment(segment)?;
        let Some(ord) = segment
            .dictionary
            .get(term.field())
            .and_then(|terms| terms.get(term.text()))
            .copied()
        else {
            return Ok(None);
        };
        let list = &segment.postings[ord as usize];
        Ok(Some(SegmentTermState {
            ord,
            doc_freq: list.len() as u64,
            total_term_freq: list.iter().map(|p| p.freq as u64).sum(),
        }))
    }

    fn postings(
        &self,
        segment: usize,
        term: &Term,
        state: &SegmentTermState,
    ) -> Result<Box<dyn PostingIterator>> {
        let list = self
            .segment(segment)?
            .postings
            .get(state.ord as usize)
            .ok_or_else(|| {
                PilumError::index_access(format!(
                    "no posting list with ordinal {} for {term} in segment {segment}",
                    state.ord
                ))
            })?;
        Ok(Box::new(MemoryPostingIterator::new(Arc::clone(list))))
    }

    fn field_length(&self, segment: usize, field: &str, doc: u64) -> Result<u32> {
        Ok(self
            .segment(segment)?
            .field_lengths
            .get(field)
            .and_then(|lengths| lengths.get(doc as usize))
            .copied()
            .unwrap_or(0))
    }

    fn field_stats(&self, field: &str) -> Result<Option<FieldStats>> {
        Ok(self.field_stats.get(field).copied())
    }

    fn sort_value(&self, segment: usize, field: &str, doc: u64) -> Result<Option<f64>> {
        Ok(self
            .segment(segment)?
            .values
            .get(field)
            .and_then(|values| values.get(doc as usize))
            .copied()
            .flatten())
    }
}

/// Posting iterator over an in-memory posting list.
#[derive(Debug)]
pub struct MemoryPostingIterator {
    postings: Arc<[Posting]>,
    position: usize,
}

impl MemoryPostingIterator {
    fn new(postings: Arc<[Posting]>) -> Self {
        MemoryPostingIterator {
            postings,
            position: 0,
        }
    }
}

impl PostingIterator for MemoryPostingIterator {
    fn doc_id(&self) -> u64 {
        self.postings
            .get(self.position)
            .map_or(NO_MORE_DOCS, |p| p.doc)
    }

    fn term_freq(&self) -> u64 {
        self.postings.get(self.position).map_or(0, |p| p.freq as u64)
    }

    fn next(&mut self) -> Result<bool> {
        if self.position < self.postings.len() {
            self.position += 1;
        }
        Ok(self.position < self.postings.len())
    }

    fn skip_to(&mut self, target: u64) -> Result<bool> {
        let rest = &self.postings[self.position.min(self.postings.len())..];
        self.position += rest.partition_point(|p| p.doc < target);
        Ok(self.position < self.postings.len())
    }

    fn cost(&self) -> u64 {
        self.postings.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::open_postings;

    fn sample_index() -> MemoryIndex {
        let mut builder = MemoryIndex::builder().max_segment_docs(2);
        builder.add_documents(vec![
            MemoryDocument::new().with_text("title", "red laptop bag"),
            MemoryDocument::new().with_text("title", "laptop laptop"),
            MemoryDocument::new()
                .with_text("title", "notebook")
                .with_value("price", 10.0),
            MemoryDocument::new().with_text("body", "a laptop in the body"),
        ]);
        builder.build().unwrap()
    }

    #[test]
    fn test_segments_and_doc_bases() {
        let index = sample_index();

        assert_eq!(index.segment_count(), 2);
        assert_eq!(index.max_doc(), 4);
        assert_eq!(index.segment_doc_base(0), 0);
        assert_eq!(index.segment_doc_base(1), 2);
        assert_eq!(index.segment_max_doc(1), 2);
    }

    #[test]
    fn test_document_frequency_aggregates_segments() {
        let index = sample_index();

        let (df, handle) = index
            .document_frequency(&Term::new("title", "laptop"))
            .unwrap();
        assert_eq!(df, 2);
        assert_eq!(handle.total_term_freq(), 3);
        assert!(handle.segment_state(1).is_none());

        let (df, _) = index
            .document_frequency(&Term::new("title", "missing"))
            .unwrap();
        assert_eq!(df, 0);
    }

    #[test]
    fn test_postings_iteration() {
        let index = sample_index();
        let term = Term::new("title", "laptop");
        let (_, handle) = index.document_frequency(&term).unwrap();

        let mut postings = open_postings(&index, 0, &term, &handle).unwrap().unwrap();
        assert_eq!(postings.doc_id(), 0);
        assert_eq!(postings.term_freq(), 1);
        assert!(postings.next().unwrap());
        assert_eq!(postings.doc_id(), 1);
        assert_eq!(postings.term_freq(), 2);
        assert!(!postings.next().unwrap());
        assert_eq!(postings.doc_id(), NO_MORE_DOCS);

        assert!(open_postings(&index, 1, &term, &handle).unwrap().is_none());
    }

    #[test]
    fn test_skip_to() {
        let mut builder = MemoryIndex::builder();
        for i in 0..10 {
            let text = if i % 3 == 0 { "match" } else { "other" };
            builder.add_document(MemoryDocument::new().with_text("f", text));
        }
        let index = builder.build().unwrap();
        let term = Term::new("f", "match");
        let (_, handle) = index.document_frequency(&term).unwrap();
        let mut postings = open_postings(&index, 0, &term, &handle).unwrap().unwrap();

        assert!(postings.skip_to(4).unwrap());
        assert_eq!(postings.doc_id(), 6);
        assert!(postings.skip_to(6).unwrap());
        assert_eq!(postings.doc_id(), 6);
        assert!(!postings.skip_to(10).unwrap());
        assert_eq!(postings.doc_id(), NO_MORE_DOCS);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let index = sample_index();
        let other = sample_index();
        let term = Term::new("title", "laptop");
        let (_, handle) = other.document_frequency(&term).unwrap();

        let result = open_postings(&index, 0, &term, &handle);
        assert!(matches!(result, Err(PilumError::InvalidOperation(_))));
    }

    #[test]
    fn test_field_stats_and_lengths() {
        let index = sample_index();

        let stats = index.field_stats("title").unwrap().unwrap();
        assert_eq!(stats.max_doc, 4);
        assert_eq!(stats.doc_count, 3);
        assert_eq!(stats.sum_total_term_freq, 6);
        assert_eq!(stats.sum_doc_freq, 5);
        assert!(index.field_stats("nope").unwrap().is_none());

        assert_eq!(index.field_length(0, "title", 0).unwrap(), 3);
        assert_eq!(index.field_length(1, "title", 1).unwrap(), 0);
        assert_eq!(index.sort_value(1, "price", 0).unwrap(), Some(10.0));
        assert_eq!(index.sort_value(1, "price", 1).unwrap(), None);
    }

    #[test]
    fn test_segment_out_of_range() {
        let index = sample_index();
        let result = index.seek_term(7, &Term::new("title", "laptop"));

        assert!(matches!(result, Err(PilumError::IndexAccess { .. })));
    }
}
