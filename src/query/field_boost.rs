//! Per-field weight strategies.
//!
//! Every term leaf is bound to a [`FieldBoost`]. The strategies are resolved
//! once per build: [`FixedFieldBoost`] reads a configured table,
//! [`PrmsFieldBoost`] derives weights from corpus statistics of the term in
//! each query field, [`ConstantFieldBoost`] and [`NoFieldBoost`] return a
//! single scalar.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::config::{BuilderConfig, FieldBoostModel};
use crate::error::Result;
use crate::index::IndexAccess;
use crate::index::Term;
use crate::index::cache::{CacheAccess, CachedTermStats};

/// Smallest weight a PRMS field boost may return.
pub const PRMS_MIN_BOOST: f32 = 1e-4;

/// Strategy returning a positive weight for a field.
pub trait FieldBoost: Send + Sync + Debug {
    /// Weight of `field`.
    fn boost(&self, field: &str, index: &dyn IndexAccess) -> Result<f32>;

    /// Get the name of this strategy.
    fn name(&self) -> &'static str;
}

/// Static per-field table. Unknown fields weigh 1.0.
#[derive(Debug, Clone)]
pub struct FixedFieldBoost {
    weights: Arc<BTreeMap<String, f32>>,
}

impl FixedFieldBoost {
    pub fn new(weights: Arc<BTreeMap<String, f32>>) -> Self {
        FixedFieldBoost { weights }
    }
}

impl FieldBoost for FixedFieldBoost {
    fn boost(&self, field: &str, _index: &dyn IndexAccess) -> Result<f32> {
        Ok(self.weights.get(field).copied().unwrap_or(1.0))
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Single scalar for every field.
#[derive(Debug, Clone, Copy)]
pub struct ConstantFieldBoost(pub f32);

impl FieldBoost for ConstantFieldBoost {
    fn boost(&self, _field: &str, _index: &dyn IndexAccess) -> Result<f32> {
        Ok(self.0)
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}

/// Always 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFieldBoost;

impl FieldBoost for NoFieldBoost {
    fn boost(&self, _field: &str, _index: &dyn IndexAccess) -> Result<f32> {
        Ok(1.0)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Field weights from a per-field probability model of one term.
///
/// For every query field `f` the term's smoothed probability
/// `p(f) = (ttf(t, f) + 1) / (sum_ttf(f) + 1)` is computed. The weight of a
/// field is `p(f) / max p` multiplied by the configured field weight, so the
/// field in which the term is most typical gets its full weight. Weights
/// never drop below [`PRMS_MIN_BOOST`].
#[derive(Debug)]
pub struct PrmsFieldBoost {
    text: String,
    weights: Arc<BTreeMap<String, f32>>,
    cache: Option<CacheAccess>,
    boosts: OnceLock<BTreeMap<String, f32>>,
}

impl PrmsFieldBoost {
    pub fn new(
        text: impl Into<String>,
        weights: Arc<BTreeMap<String, f32>>,
        cache: Option<CacheAccess>,
    ) -> Self {
        PrmsFieldBoost {
            text: text.into(),
            weights,
            cache,
            boosts: OnceLock::new(),
        }
    }

    fn term_stats(&self, term: Term, index: &dyn IndexAccess) -> Result<CachedTermStats> {
        if let Some(stats) = self.cache.as_ref().and_then(|cache| cache.get(&term)) {
            return Ok(stats);
        }
        let (doc_freq, handle) = index.document_frequency(&term)?;
        let stats = CachedTermStats {
            doc_freq,
            total_term_freq: handle.total_term_freq(),
        };
        if let Some(cache) = &self.cache {
            cache.put(term, stats);
        }
        Ok(stats)
    }

    fn compute(&self, index: &dyn IndexAccess) -> Result<BTreeMap<String, f32>> {
        let mut probabilities = BTreeMap::new();
        for field in self.weights.keys() {
            let stats = self.term_stats(Term::new(field.as_str(), self.text.as_str()), index)?;
            let sum_ttf = index
                .field_stats(field)?
                .map_or(0, |s| s.sum_total_term_freq);
            let p = (stats.total_term_freq as f64 + 1.0) / (sum_ttf as f64 + 1.0);
            probabilities.insert(field.clone(), p);
        }

        let max_p = probabilities.values().copied().fold(0.0f64, f64::max);
        let mut boosts = BTreeMap::new();
        for (field, p) in probabilities {
            let weight = self.weights.get(&field).copied().unwrap_or(1.0);
            let mut boost = ((p / max_p) as f32) * weight;
            if !boost.is_finite() || boost < PRMS_MIN_BOOST {
                warn!(term = %self.text, field = %field, boost, "PRMS boost below floor");
                boost = PRMS_MIN_BOOST;
            }
            boosts.insert(field, boost);
        }
        Ok(boosts)
    }
}

impl FieldBoost for PrmsFieldBoost {
    fn boost(&self, field: &str, index: &dyn IndexAccess) -> Result<f32> {
        let boosts = match self.boosts.get() {
            Some(boosts) => boosts,
            None => {
                let computed = self.compute(index)?;
                self.boosts.get_or_init(|| computed)
            }
        };
        Ok(boosts.get(field).copied().unwrap_or(PRMS_MIN_BOOST))
    }

    fn name(&self) -> &'static str {
        "prms"
    }
}

/// Search fields of user and generated terms together with the model that
/// weighs them.
#[derive(Debug, Clone)]
pub struct SearchFieldsAndBoosting {
    model: FieldBoostModel,
    query_fields: Arc<BTreeMap<String, f32>>,
    generated_query_fields: Arc<BTreeMap<String, f32>>,
    cache: Option<CacheAccess>,
}

impl SearchFieldsAndBoosting {
    pub fn new(
        model: FieldBoostModel,
        query_fields: BTreeMap<String, f32>,
        generated_query_fields: BTreeMap<String, f32>,
    ) -> Self {
        SearchFieldsAndBoosting {
            model,
            query_fields: Arc::new(query_fields),
            generated_query_fields: Arc::new(generated_query_fields),
            cache: None,
        }
    }

    /// Fields and model taken from a builder configuration.
    pub fn from_config(config: &BuilderConfig) -> Self {
        Self::new(
            config.field_boost_model,
            config.query_fields.clone(),
            config.effective_generated_fields(),
        )
    }

    /// Consult a term statistics cache for corpus derived weights.
    pub fn with_cache(mut self, cache: Option<CacheAccess>) -> Self {
        self.cache = cache;
        self
    }

    /// The same fields weighed by another model.
    pub fn with_field_boost_model(&self, model: FieldBoostModel) -> Self {
        SearchFieldsAndBoosting {
            model,
            ..self.clone()
        }
    }

    pub fn model(&self) -> FieldBoostModel {
        self.model
    }

    /// Fields searched by user terms (`generated == false`) or generated terms.
    pub fn fields(&self, generated: bool) -> &BTreeMap<String, f32> {
        if generated {
            &self.generated_query_fields
        } else {
            &self.query_fields
        }
    }

    /// Check whether terms of this kind may search `field`.
    pub fn is_searchable(&self, field: &str, generated: bool) -> bool {
        self.fields(generated).contains_key(field)
    }

    /// Create the field boost for all expansions of one term.
    pub fn field_boost(&self, text: &str, generated: bool) -> Arc<dyn FieldBoost> {
        let weights = if generated {
            Arc::clone(&self.generated_query_fields)
        } else {
            Arc::clone(&self.query_fields)
        };
        match self.model {
            FieldBoostModel::Fixed => Arc::new(FixedFieldBoost::new(weights)),
            FieldBoostModel::Prms => {
                Arc::new(PrmsFieldBoost::new(text, weights, self.cache.clone()))
            }
            FieldBoostModel::Off => Arc::new(NoFieldBoost),
        }
    }
}
