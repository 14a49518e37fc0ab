//! BM25 similarity.

use crate::index::FieldStats;

/// BM25 with Lucene's non-negative idf for regular statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Similarity {
    k1: f32,
    b: f32,
}

impl Default for Bm25Similarity {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Similarity {
    /// Create a similarity with `k1 = 1.2` and `b = 0.75`.
    pub fn new() -> Self {
        Bm25Similarity { k1: 1.2, b: 0.75 }
    }

    /// Create a similarity with custom parameters.
    pub fn with_params(k1: f32, b: f32) -> Self {
        Bm25Similarity { k1, b }
    }

    /// Get the k1 parameter.
    pub fn k1(&self) -> f32 {
        self.k1
    }

    /// Get the b parameter.
    pub fn b(&self) -> f32 {
        self.b
    }

    /// IDF = ln(1 + (N - df + 0.5) / (df + 0.5)), N being the number of
    /// documents having the field.
    pub fn idf(&self, doc_freq: u64, doc_count: u64) -> f32 {
        let n = doc_count as f64;
        let df = doc_freq as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln() as f32
    }

    /// Prepare scoring of one term.
    ///
    /// A corrected `doc_freq` may exceed the number of documents having the
    /// field; it is capped there so the idf stays positive.
    pub fn scorer(&self, boost: f32, field_stats: &FieldStats, doc_freq: u64) -> SimScorer {
        let doc_freq = doc_freq.min(field_stats.doc_count);
        SimScorer {
            weight: boost * self.idf(doc_freq, field_stats.doc_count),
            avg_field_length: field_stats.avg_field_length(),
            k1: self.k1,
            b: self.b,
        }
    }
}

/// Scores documents for one term with fixed collection statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimScorer {
    weight: f32,
    avg_field_length: f32,
    k1: f32,
    b: f32,
}

impl SimScorer {
    /// Score a document with term frequency `term_freq` and field length
    /// `field_length`.
    pub fn score(&self, term_freq: f32, field_length: f32) -> f32 {
        if term_freq == 0.0 {
            return 0.0;
        }
        let norm = 1.0 - self.b + self.b * (field_length / self.avg_field_length);

        // TF = (tf * (k1 + 1)) / (tf + k1 * norm)
        self.weight * (term_freq * (self.k1 + 1.0)) / (term_freq + self.k1 * norm)
    }

    /// Boost times idf.
    pub fn weight(&self) -> f32 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(doc_count: u64, sum_total_term_freq: u64) -> FieldStats {
        FieldStats {
            max_doc: doc_count,
            doc_count,
            sum_total_term_freq,
            sum_doc_freq: sum_total_term_freq,
        }
    }

    #[test]
    fn test_idf_decreases_with_doc_freq() {
        let sim = Bm25Similarity::new();

        let rare = sim.idf(5, 100);
        let common = sim.idf(50, 100);

        assert!(rare > common);
        assert!((sim.idf(50, 100) - (1.0f64 + 50.5 / 50.5).ln() as f32).abs() < 1e-6);
        assert!(sim.idf(100, 100) > 0.0);
    }

    #[test]
    fn test_score() {
        let sim = Bm25Similarity::new();
        let scorer = sim.scorer(2.0, &stats(10, 20), 2);

        // avg length 2, field length 2 -> norm 1
        let expected = 2.0 * sim.idf(2, 10) * (1.0 * 2.2) / (1.0 + 1.2);
        assert!((scorer.score(1.0, 2.0) - expected).abs() < 1e-6);
        assert_eq!(scorer.score(0.0, 2.0), 0.0);
        assert!(scorer.score(3.0, 2.0) > scorer.score(1.0, 2.0));
        assert!(scorer.score(1.0, 1.0) > scorer.score(1.0, 4.0));
    }

    #[test]
    fn test_unit_statistics() {
        let sim = Bm25Similarity::new();
        let scorer = sim.scorer(1.0, &FieldStats::unit(), 1);

        assert!(scorer.weight() > 0.0);
        assert_eq!(sim.idf(1, 1), (1.0f64 + 0.5 / 1.5).ln() as f32);
    }

    #[test]
    fn test_doc_freq_capped_at_doc_count() {
        let sim = Bm25Similarity::new();
        let capped = sim.scorer(1.0, &stats(4, 8), 7);
        let full = sim.scorer(1.0, &stats(4, 8), 4);

        assert!(sim.idf(7, 4) < 0.0);
        assert!(capped.weight() > 0.0);
        assert_eq!(capped, full);
    }
}
