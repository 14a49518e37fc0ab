//! Per-segment document scorers.
//!
//! A scorer iterates the segment-local doc ids it matches in increasing
//! order and scores the current one. A freshly created scorer is positioned
//! on its first match, or on [`NO_MORE_DOCS`].

use std::fmt::Debug;

use crate::error::Result;
use crate::index::{IndexAccess, NO_MORE_DOCS, PostingIterator};
use crate::search::similarity::SimScorer;

/// Trait for document scorers.
pub trait DocScorer: Debug {
    /// Get the current document ID.
    fn doc_id(&self) -> u64;

    /// Move to the next matching document.
    fn next(&mut self) -> Result<bool>;

    /// Skip to the first matching document >= target. Never moves backwards.
    fn skip_to(&mut self, target: u64) -> Result<bool>;

    /// Score the current document.
    fn score(&mut self) -> Result<f32>;

    /// Get the cost of iterating through this scorer.
    fn cost(&self) -> u64;
}

/// Boxed scorer borrowing the index.
pub type BoxedScorer<'a> = Box<dyn DocScorer + 'a>;

/// Scores a term's postings by similarity.
#[derive(Debug)]
pub struct TermScorer<'a> {
    postings: Box<dyn PostingIterator>,
    sim: SimScorer,
    index: &'a dyn IndexAccess,
    segment: usize,
    field: String,
}

impl<'a> TermScorer<'a> {
    pub fn new(
        postings: Box<dyn PostingIterator>,
        sim: SimScorer,
        index: &'a dyn IndexAccess,
        segment: usize,
        field: impl Into<String>,
    ) -> Self {
        TermScorer {
            postings,
            sim,
            index,
            segment,
            field: field.into(),
        }
    }
}

impl DocScorer for TermScorer<'_> {
    fn doc_id(&self) -> u64 {
        self.postings.doc_id()
    }

    fn next(&mut self) -> Result<bool> {
        self.postings.next()
    }

    fn skip_to(&mut self, target: u64) -> Result<bool> {
        if self.postings.doc_id() >= target {
            return Ok(self.postings.doc_id() != NO_MORE_DOCS);
        }
        self.postings.skip_to(target)
    }

    fn score(&mut self) -> Result<f32> {
        let doc = self.postings.doc_id();
        let field_length = self.index.field_length(self.segment, &self.field, doc)?;
        Ok(self
            .sim
            .score(self.postings.term_freq() as f32, field_length as f32))
    }

    fn cost(&self) -> u64 {
        self.postings.cost()
    }
}

/// Gives every document of a posting list the same score.
#[derive(Debug)]
pub struct ConstantScorer {
    postings: Box<dyn PostingIterator>,
    score: f32,
}

impl ConstantScorer {
    pub fn new(postings: Box<dyn PostingIterator>, score: f32) -> Self {
        ConstantScorer { postings, score }
    }
}

impl DocScorer for ConstantScorer {
    fn doc_id(&self) -> u64 {
        self.postings.doc_id()
    }

    fn next(&mut self) -> Result<bool> {
        self.postings.next()
    }

    fn skip_to(&mut self, target: u64) -> Result<bool> {
        if self.postings.doc_id() >= target {
            return Ok(self.postings.doc_id() != NO_MORE_DOCS);
        }
        self.postings.skip_to(target)
    }

    fn score(&mut self) -> Result<f32> {
        Ok(self.score)
    }

    fn cost(&self) -> u64 {
        self.postings.cost()
    }
}

/// Matches every document of a segment.
#[derive(Debug)]
pub struct MatchAllScorer {
    current_doc: u64,
    max_doc: u64,
    score: f32,
}

impl MatchAllScorer {
    pub fn new(max_doc: u64, score: f32) -> Self {
        MatchAllScorer {
            current_doc: 0,
            max_doc,
            score,
        }
    }
}

impl DocScorer for MatchAllScorer {
    fn doc_id(&self) -> u64 {
        if self.current_doc >= self.max_doc {
            NO_MORE_DOCS
        } else {
            self.current_doc
        }
    }

    fn next(&mut self) -> Result<bool> {
        if self.current_doc < self.max_doc {
            self.current_doc += 1;
        }
        Ok(self.current_doc < self.max_doc)
    }

    fn skip_to(&mut self, target: u64) -> Result<bool> {
        self.current_doc = self.current_doc.max(target).min(self.max_doc);
        Ok(self.current_doc < self.max_doc)
    }

    fn score(&mut self) -> Result<f32> {
        Ok(self.score)
    }

    fn cost(&self) -> u64 {
        self.max_doc
    }
}

/// Documents matched by all sub-scorers, scored by the sum of their scores.
#[derive(Debug)]
pub struct ConjunctionScorer<'a> {
    scorers: Vec<BoxedScorer<'a>>,
    doc: u64,
}

impl<'a> ConjunctionScorer<'a> {
    /// Create a conjunction. `scorers` must not be empty.
    pub fn new(mut scorers: Vec<BoxedScorer<'a>>) -> Result<Self> {
        scorers.sort_by_key(|s| s.cost());
        let start = scorers.first().map_or(NO_MORE_DOCS, |s| s.doc_id());
        let mut conjunction = ConjunctionScorer {
            scorers,
            doc: NO_MORE_DOCS,
        };
        conjunction.doc = conjunction.align(start)?;
        Ok(conjunction)
    }

    fn align(&mut self, mut target: u64) -> Result<u64> {
        'search: loop {
            if target == NO_MORE_DOCS {
                return Ok(NO_MORE_DOCS);
            }
            for scorer in self.scorers.iter_mut() {
                scorer.skip_to(target)?;
                let doc = scorer.doc_id();
                if doc > target {
                    target = doc;
                    continue 'search;
                }
            }
            return Ok(target);
        }
    }
}

impl DocScorer for ConjunctionScorer<'_> {
    fn doc_id(&self) -> u64 {
        self.doc
    }

    fn next(&mut self) -> Result<bool> {
        if self.doc == NO_MORE_DOCS {
            return Ok(false);
        }
        self.scorers[0].next()?;
        let lead = self.scorers[0].doc_id();
        self.doc = self.align(lead)?;
        Ok(self.doc != NO_MORE_DOCS)
    }

    fn skip_to(&mut self, target: u64) -> Result<bool> {
        if self.doc >= target {
            return Ok(self.doc != NO_MORE_DOCS);
        }
        self.doc = self.align(target)?;
        Ok(self.doc != NO_MORE_DOCS)
    }

    fn score(&mut self) -> Result<f32> {
        let mut sum = 0.0;
        for scorer in self.scorers.iter_mut() {
            sum += scorer.score()?;
        }
        Ok(sum)
    }

    fn cost(&self) -> u64 {
        self.scorers.iter().map(|s| s.cost()).min().unwrap_or(0)
    }
}

/// How a disjunction combines the scores of matching sub-scorers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Combine {
    /// Sum of all scores.
    Sum,
    /// `max + tie_breaker * (sum - max)`.
    Max { tie_breaker: f32 },
}

/// Documents matched by any sub-scorer.
#[derive(Debug)]
pub struct DisjunctionScorer<'a> {
    scorers: Vec<BoxedScorer<'a>>,
    combine: Combine,
    doc: u64,
}

impl<'a> DisjunctionScorer<'a> {
    pub fn new(scorers: Vec<BoxedScorer<'a>>, combine: Combine) -> Self {
        let doc = Self::min_doc(&scorers);
        DisjunctionScorer {
            scorers,
            combine,
            doc,
        }
    }

    fn min_doc(scorers: &[BoxedScorer<'a>]) -> u64 {
        scorers
            .iter()
            .map(|s| s.doc_id())
            .min()
            .unwrap_or(NO_MORE_DOCS)
    }
}

impl DocScorer for DisjunctionScorer<'_> {
    fn doc_id(&self) -> u64 {
        self.doc
    }

    fn next(&mut self) -> Result<bool> {
        if self.doc == NO_MORE_DOCS {
            return Ok(false);
        }
        for scorer in self.scorers.iter_mut() {
            if scorer.doc_id() == self.doc {
                scorer.next()?;
            }
        }
        self.doc = Self::min_doc(&self.scorers);
        Ok(self.doc != NO_MORE_DOCS)
    }

    fn skip_to(&mut self, target: u64) -> Result<bool> {
        if self.doc >= target {
            return Ok(self.doc != NO_MORE_DOCS);
        }
        for scorer in self.scorers.iter_mut() {
            if scorer.doc_id() < target {
                scorer.skip_to(target)?;
            }
        }
        self.doc = Self::min_doc(&self.scorers);
        Ok(self.doc != NO_MORE_DOCS)
    }

    fn score(&mut self) -> Result<f32> {
        let mut sum = 0.0f32;
        let mut max = f32::NEG_INFINITY;
        for scorer in self.scorers.iter_mut() {
            if scorer.doc_id() == self.doc {
                let score = scorer.score()?;
                sum += score;
                max = max.max(score);
            }
        }
        if max == f32::NEG_INFINITY {
            return Ok(0.0);
        }
        Ok(match self.combine {
            Combine::Sum => sum,
            Combine::Max { tie_breaker } => max + tie_breaker * (sum - max),
        })
    }

    fn cost(&self) -> u64 {
        self.scorers.iter().map(|s| s.cost()).sum()
    }
}

/// Documents of `required` not matched by `excluded`.
#[derive(Debug)]
pub struct ReqExclScorer<'a> {
    required: BoxedScorer<'a>,
    excluded: BoxedScorer<'a>,
}

impl<'a> ReqExclScorer<'a> {
    pub fn new(required: BoxedScorer<'a>, excluded: BoxedScorer<'a>) -> Result<Self> {
        let mut scorer = ReqExclScorer { required, excluded };
        scorer.skip_excluded()?;
        Ok(scorer)
    }

    fn skip_excluded(&mut self) -> Result<bool> {
        loop {
            let doc = self.required.doc_id();
            if doc == NO_MORE_DOCS {
                return Ok(false);
            }
            self.excluded.skip_to(doc)?;
            if self.excluded.doc_id() != doc {
                return Ok(true);
            }
            self.required.next()?;
        }
    }
}

impl DocScorer for ReqExclScorer<'_> {
    fn doc_id(&self) -> u64 {
        self.required.doc_id()
    }

    fn next(&mut self) -> Result<bool> {
        self.required.next()?;
        self.skip_excluded()
    }

    fn skip_to(&mut self, target: u64) -> Result<bool> {
        self.required.skip_to(target)?;
        self.skip_excluded()
    }

    fn score(&mut self) -> Result<f32> {
        self.required.score()
    }

    fn cost(&self) -> u64 {
        self.required.cost()
    }
}

/// Documents of `required`, adding the score of `optional` where it matches.
#[derive(Debug)]
pub struct ReqOptScorer<'a> {
    required: BoxedScorer<'a>,
    optional: BoxedScorer<'a>,
}

impl<'a> ReqOptScorer<'a> {
    pub fn new(required: BoxedScorer<'a>, optional: BoxedScorer<'a>) -> Self {
        ReqOptScorer { required, optional }
    }
}

impl DocScorer for ReqOptScorer<'_> {
    fn doc_id(&self) -> u64 {
        self.required.doc_id()
    }

    fn next(&mut self) -> Result<bool> {
        self.required.next()
    }

    fn skip_to(&mut self, target: u64) -> Result<bool> {
        self.required.skip_to(target)
    }

    fn score(&mut self) -> Result<f32> {
        let doc = self.required.doc_id();
        let mut score = self.required.score()?;
        self.optional.skip_to(doc)?;
        if self.optional.doc_id() == doc {
            score += self.optional.score()?;
        }
        Ok(score)
    }

    fn cost(&self) -> u64 {
        self.required.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scorer over a fixed list of (doc, score) pairs.
    #[derive(Debug)]
    struct ListScorer {
        docs: Vec<(u64, f32)>,
        position: usize,
    }

    fn list(docs: &[(u64, f32)]) -> BoxedScorer<'static> {
        Box::new(ListScorer {
            docs: docs.to_vec(),
            position: 0,
        })
    }

    impl DocScorer for ListScorer {
        fn doc_id(&self) -> u64 {
            self.docs.get(self.position).map_or(NO_MORE_DOCS, |d| d.0)
        }

        fn next(&mut self) -> Result<bool> {
            self.position = (self.position + 1).min(self.docs.len());
            Ok(self.position < self.docs.len())
        }

        fn skip_to(&mut self, target: u64) -> Result<bool> {
            while self.doc_id() < target {
                self.next()?;
            }
            Ok(self.doc_id() != NO_MORE_DOCS)
        }

        fn score(&mut self) -> Result<f32> {
            Ok(self.docs[self.position].1)
        }

        fn cost(&self) -> u64 {
            self.docs.len() as u64
        }
    }

    fn drain(scorer: &mut dyn DocScorer) -> Vec<(u64, f32)> {
        let mut hits = Vec::new();
        while scorer.doc_id() != NO_MORE_DOCS {
            hits.push((scorer.doc_id(), scorer.score().unwrap()));
            scorer.next().unwrap();
        }
        hits
    }

    #[test]
    fn test_conjunction() {
        let mut scorer = ConjunctionScorer::new(vec![
            list(&[(1, 1.0), (3, 1.0), (5, 1.0), (8, 1.0)]),
            list(&[(3, 2.0), (4, 2.0), (8, 2.0)]),
        ])
        .unwrap();

        assert_eq!(drain(&mut scorer), vec![(3, 3.0), (8, 3.0)]);
    }

    #[test]
    fn test_disjunction_sum_and_max() {
        let mut sum = DisjunctionScorer::new(
            vec![list(&[(1, 1.0), (3, 1.0)]), list(&[(3, 2.0), (4, 2.0)])],
            Combine::Sum,
        );
        assert_eq!(drain(&mut sum), vec![(1, 1.0), (3, 3.0), (4, 2.0)]);

        let mut max = DisjunctionScorer::new(
            vec![list(&[(3, 1.0)]), list(&[(3, 2.0)])],
            Combine::Max { tie_breaker: 0.5 },
        );
        assert_eq!(drain(&mut max), vec![(3, 2.5)]);
    }

    #[test]
    fn test_req_excl() {
        let mut scorer = ReqExclScorer::new(
            list(&[(1, 1.0), (2, 1.0), (3, 1.0), (6, 1.0)]),
            list(&[(1, 0.0), (3, 0.0), (4, 0.0)]),
        )
        .unwrap();

        assert_eq!(drain(&mut scorer), vec![(2, 1.0), (6, 1.0)]);
    }

    #[test]
    fn test_req_opt() {
        let mut scorer = ReqOptScorer::new(
            list(&[(1, 1.0), (2, 1.0), (5, 1.0)]),
            list(&[(2, 0.5), (3, 0.5), (5, 0.25)]),
        );

        assert_eq!(drain(&mut scorer), vec![(1, 1.0), (2, 1.5), (5, 1.25)]);
    }

    #[test]
    fn test_match_all_skip() {
        let mut scorer = MatchAllScorer::new(5, 2.0);

        assert!(scorer.skip_to(3).unwrap());
        assert_eq!(scorer.doc_id(), 3);
        assert!(scorer.skip_to(1).unwrap());
        assert_eq!(scorer.doc_id(), 3);
        assert_eq!(drain(&mut scorer), vec![(3, 2.0), (4, 2.0)]);
        assert!(!MatchAllScorer::new(0, 1.0).skip_to(0).unwrap());
    }
}
