//! Configuration of a query build.
//!
//! [`BuilderConfig`] can be deserialized from JSON or parsed from flat
//! request parameters with [`BuilderConfig::from_params`]:
//!
//! | parameter                | field                    | values                |
//! |--------------------------|--------------------------|-----------------------|
//! | `fbm`                    | `field_boost_model`      | `fixed`, `prms`, `off`|
//! | `qf`                     | `query_fields`           | `f1^2.0 f2`           |
//! | `gqf`                    | `generated_query_fields` | `f1^0.5 f2`           |
//! | `gfb`                    | `generated_field_boost`  | float                 |
//! | `tie`                    | `tie_breaker`            | float                 |
//! | `normalizeBoolean`       | `normalize_boolean`      | `true`, `false`       |
//! | `qboost.method`          | `boost_method`           | `opt`, `rerank`       |
//! | `qboost.rerank.numDocs`  | `rerank_num_docs`        | integer               |
//! | `qboost.rerank.weight`   | `rerank_weight`          | float                 |
//! | `qboost.similarityScore` | `boost_similarity`       | `on`, `off`, `dfc`    |
//! | `qboost.fieldBoost`      | `boost_field_boost`      | `on`, `off`           |

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PilumError, Result};

pub const PARAM_FIELD_BOOST_MODEL: &str = "fbm";
pub const PARAM_QUERY_FIELDS: &str = "qf";
pub const PARAM_GENERATED_QUERY_FIELDS: &str = "gqf";
pub const PARAM_GENERATED_FIELD_BOOST: &str = "gfb";
pub const PARAM_TIE_BREAKER: &str = "tie";
pub const PARAM_NORMALIZE_BOOLEAN: &str = "normalizeBoolean";
pub const PARAM_BOOST_METHOD: &str = "qboost.method";
pub const PARAM_RERANK_NUM_DOCS: &str = "qboost.rerank.numDocs";
pub const PARAM_RERANK_WEIGHT: &str = "qboost.rerank.weight";
pub const PARAM_BOOST_SIMILARITY: &str = "qboost.similarityScore";
pub const PARAM_BOOST_FIELD_BOOST: &str = "qboost.fieldBoost";

/// Default rerank window size.
pub const DEFAULT_RERANK_NUM_DOCS: usize = 500;

/// How per-field weights are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldBoostModel {
    /// Static per-field table.
    #[default]
    Fixed,
    /// Corpus probability model.
    Prms,
    /// Every field weighs 1.0.
    Off,
}

impl FromStr for FieldBoostModel {
    type Err = PilumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(FieldBoostModel::Fixed),
            "prms" => Ok(FieldBoostModel::Prms),
            "off" => Ok(FieldBoostModel::Off),
            other => Err(PilumError::configuration(format!(
                "unknown field boost model: {other}"
            ))),
        }
    }
}

/// How boost queries are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostMethod {
    /// Boost queries become optional clauses of the main query.
    #[default]
    Opt,
    /// Boost queries rescore the top window of the user query.
    Rerank,
}

impl FromStr for BoostMethod {
    type Err = PilumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opt" => Ok(BoostMethod::Opt),
            "rerank" => Ok(BoostMethod::Rerank),
            other => Err(PilumError::configuration(format!(
                "unknown boost method: {other}"
            ))),
        }
    }
}

/// Similarity used for boost query terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostSimilarity {
    /// Corpus similarity with raw statistics.
    On,
    /// Constant scores, no corpus similarity.
    Off,
    /// Corpus similarity sharing the user query's corrected statistics.
    #[default]
    Dfc,
}

impl FromStr for BoostSimilarity {
    type Err = PilumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(BoostSimilarity::On),
            "off" => Ok(BoostSimilarity::Off),
            "dfc" => Ok(BoostSimilarity::Dfc),
            other => Err(PilumError::configuration(format!(
                "unknown boost similarity: {other}"
            ))),
        }
    }
}

impl Display for BoostSimilarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoostSimilarity::On => "on",
            BoostSimilarity::Off => "off",
            BoostSimilarity::Dfc => "dfc",
        };
        f.write_str(name)
    }
}

/// Configuration of the query tree builder and planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// How per-field weights are derived.
    pub field_boost_model: FieldBoostModel,
    /// Fields searched by user terms with their weights.
    pub query_fields: BTreeMap<String, f32>,
    /// Fields searched by generated terms. A missing weight falls back to
    /// the query field weight times `generated_field_boost`.
    pub generated_query_fields: BTreeMap<String, Option<f32>>,
    /// Multiplier for generated terms.
    pub generated_field_boost: f32,
    /// Tie breaker of alternative groups.
    pub tie_breaker: f32,
    /// Divide the score of boolean groups nested in alternative groups by
    /// their number of children.
    pub normalize_boolean: bool,
    /// How boost queries are applied.
    pub boost_method: BoostMethod,
    /// Rerank window size.
    pub rerank_num_docs: usize,
    /// Weight of the secondary score when reranking.
    pub rerank_weight: f32,
    /// Similarity used for boost query terms.
    pub boost_similarity: BoostSimilarity,
    /// Apply field weights to boost query terms.
    pub boost_field_boost: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            field_boost_model: FieldBoostModel::default(),
            query_fields: BTreeMap::new(),
            generated_query_fields: BTreeMap::new(),
            generated_field_boost: 1.0,
            tie_breaker: 0.0,
            normalize_boolean: true,
            boost_method: BoostMethod::default(),
            rerank_num_docs: DEFAULT_RERANK_NUM_DOCS,
            rerank_weight: 1.0,
            boost_similarity: BoostSimilarity::default(),
            boost_field_boost: true,
        }
    }
}

impl BuilderConfig {
    /// Create a configuration searching the given fields with weight 1.0.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BuilderConfig {
            query_fields: fields.into_iter().map(|f| (f.into(), 1.0)).collect(),
            ..Default::default()
        }
    }

    /// Set the weight of a query field.
    pub fn with_query_field<S: Into<String>>(mut self, field: S, weight: f32) -> Self {
        self.query_fields.insert(field.into(), weight);
        self
    }

    /// Set the field boost model.
    pub fn with_field_boost_model(mut self, model: FieldBoostModel) -> Self {
        self.field_boost_model = model;
        self
    }

    /// Set the tie breaker.
    pub fn with_tie_breaker(mut self, tie_breaker: f32) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    /// Set the boost method.
    pub fn with_boost_method(mut self, method: BoostMethod) -> Self {
        self.boost_method = method;
        self
    }

    /// Set the rerank window and weight.
    pub fn with_rerank(mut self, num_docs: usize, weight: f32) -> Self {
        self.rerank_num_docs = num_docs;
        self.rerank_weight = weight;
        self
    }

    /// Set the boost similarity.
    pub fn with_boost_similarity(mut self, similarity: BoostSimilarity) -> Self {
        self.boost_similarity = similarity;
        self
    }

    /// Parse flat request parameters. Missing parameters keep their defaults.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mut config = BuilderConfig::default();

        if let Some(value) = params.get(PARAM_FIELD_BOOST_MODEL) {
            config.field_boost_model = value.parse()?;
        }
        if let Some(value) = params.get(PARAM_QUERY_FIELDS) {
            config.query_fields = parse_field_boosts(value)?
                .into_iter()
                .map(|(field, weight)| (field, weight.unwrap_or(1.0)))
                .collect();
        }
        if let Some(value) = params.get(PARAM_GENERATED_QUERY_FIELDS) {
            config.generated_query_fields = parse_field_boosts(value)?;
        }
        if let Some(value) = params.get(PARAM_GENERATED_FIELD_BOOST) {
            config.generated_field_boost = parse_number(PARAM_GENERATED_FIELD_BOOST, value)?;
        }
        if let Some(value) = params.get(PARAM_TIE_BREAKER) {
            config.tie_breaker = parse_number(PARAM_TIE_BREAKER, value)?;
        }
        if let Some(value) = params.get(PARAM_NORMALIZE_BOOLEAN) {
            config.normalize_boolean = parse_switch(PARAM_NORMALIZE_BOOLEAN, value)?;
        }
        if let Some(value) = params.get(PARAM_BOOST_METHOD) {
            config.boost_method = value.parse()?;
        }
        if let Some(value) = params.get(PARAM_RERANK_NUM_DOCS) {
            config.rerank_num_docs = parse_number(PARAM_RERANK_NUM_DOCS, value)?;
        }
        if let Some(value) = params.get(PARAM_RERANK_WEIGHT) {
            config.rerank_weight = parse_number(PARAM_RERANK_WEIGHT, value)?;
        }
        if let Some(value) = params.get(PARAM_BOOST_SIMILARITY) {
            config.boost_similarity = value.parse()?;
        }
        if let Some(value) = params.get(PARAM_BOOST_FIELD_BOOST) {
            config.boost_field_boost = parse_switch(PARAM_BOOST_FIELD_BOOST, value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for settings that cannot produce a query.
    pub fn validate(&self) -> Result<()> {
        if self.query_fields.is_empty() {
            return Err(PilumError::configuration("qf must name at least one field"));
        }
        let weights = self
            .query_fields
            .values()
            .copied()
            .chain(self.generated_query_fields.values().flatten().copied())
            .chain([self.generated_field_boost]);
        for weight in weights {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(PilumError::configuration(format!(
                    "field weights must be positive, got {weight}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.tie_breaker) {
            return Err(PilumError::configuration(format!(
                "tie breaker must be within [0, 1], got {}",
                self.tie_breaker
            )));
        }
        if !self.rerank_weight.is_finite() {
            return Err(PilumError::configuration("rerank weight must be finite"));
        }
        Ok(())
    }

    /// Weights of the fields searched by generated terms.
    pub fn effective_generated_fields(&self) -> BTreeMap<String, f32> {
        if self.generated_query_fields.is_empty() {
            return self
                .query_fields
                .iter()
                .map(|(field, weight)| (field.clone(), weight * self.generated_field_boost))
                .collect();
        }
        self.generated_query_fields
            .iter()
            .map(|(field, weight)| {
                let weight = weight.unwrap_or_else(|| {
                    self.query_fields.get(field).copied().unwrap_or(1.0)
                        * self.generated_field_boost
                });
                (field.clone(), weight)
            })
            .collect()
    }
}

/// Parse a field list such as `"title^2.0 body brand^0.5"`.
pub fn parse_field_boosts(value: &str) -> Result<BTreeMap<String, Option<f32>>> {
    let mut fields = BTreeMap::new();
    for token in value.split([' ', ',']).filter(|t| !t.is_empty()) {
        let (field, weight) = match token.split_once('^') {
            Some((field, weight)) => (field, Some(parse_number::<f32>("field weight", weight)?)),
            None => (token, None),
        };
        if field.is_empty() {
            return Err(PilumError::configuration(format!(
                "missing field name in '{token}'"
            )));
        }
        fields.insert(field.to_string(), weight);
    }
    Ok(fields)
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        PilumError::configuration(format!("invalid value for {name}: '{value}'"))
    })
}

fn parse_switch(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        _ => Err(PilumError::configuration(format!(
            "invalid value for {name}: '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_field_boosts() {
        let fields = parse_field_boosts("title^2.0 body  brand^0.5").unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields["title"], Some(2.0));
        assert_eq!(fields["body"], None);
        assert_eq!(fields["brand"], Some(0.5));

        assert!(parse_field_boosts("title^x").is_err());
        assert!(parse_field_boosts("^2").is_err());
    }

    #[test]
    fn test_from_params_defaults() {
        let config = BuilderConfig::from_params(&params(&[("qf", "title body^3")])).unwrap();

        assert_eq!(config.field_boost_model, FieldBoostModel::Fixed);
        assert_eq!(config.query_fields["title"], 1.0);
        assert_eq!(config.query_fields["body"], 3.0);
        assert_eq!(config.boost_method, BoostMethod::Opt);
        assert_eq!(config.rerank_num_docs, 500);
        assert_eq!(config.boost_similarity, BoostSimilarity::Dfc);
        assert!(config.boost_field_boost);
        assert!(config.normalize_boolean);
    }

    #[test]
    fn test_from_params_all_settings() {
        let config = BuilderConfig::from_params(&params(&[
            ("qf", "title"),
            ("fbm", "prms"),
            ("tie", "0.3"),
            ("qboost.method", "rerank"),
            ("qboost.rerank.numDocs", "20"),
            ("qboost.rerank.weight", "2.5"),
            ("qboost.similarityScore", "off"),
            ("qboost.fieldBoost", "off"),
            ("normalizeBoolean", "false"),
        ]))
        .unwrap();

        assert_eq!(config.field_boost_model, FieldBoostModel::Prms);
        assert_eq!(config.tie_breaker, 0.3);
        assert_eq!(config.boost_method, BoostMethod::Rerank);
        assert_eq!(config.rerank_num_docs, 20);
        assert_eq!(config.rerank_weight, 2.5);
        assert_eq!(config.boost_similarity, BoostSimilarity::Off);
        assert!(!config.boost_field_boost);
        assert!(!config.normalize_boolean);
    }

    #[test]
    fn test_from_params_errors() {
        let unknown_model = BuilderConfig::from_params(&params(&[("qf", "a"), ("fbm", "bm42")]));
        assert!(matches!(unknown_model, Err(PilumError::Configuration(_))));

        let missing_qf = BuilderConfig::from_params(&params(&[]));
        assert!(matches!(missing_qf, Err(PilumError::Configuration(_))));

        let bad_window =
            BuilderConfig::from_params(&params(&[("qf", "a"), ("qboost.rerank.numDocs", "-1")]));
        assert!(bad_window.is_err());

        let bad_tie = BuilderConfig::from_params(&params(&[("qf", "a"), ("tie", "1.5")]));
        assert!(bad_tie.is_err());
    }

    #[test]
    fn test_effective_generated_fields() {
        let mut config = BuilderConfig::new(["title", "body"]).with_query_field("title", 2.0);
        config.generated_field_boost = 0.5;

        let derived = config.effective_generated_fields();
        assert_eq!(derived["title"], 1.0);
        assert_eq!(derived["body"], 0.5);

        config.generated_query_fields = parse_field_boosts("title brand^0.8").unwrap();
        let explicit = config.effective_generated_fields();
        assert_eq!(explicit.len(), 2);
        assert_eq!(explicit["title"], 1.0);
        assert_eq!(explicit["brand"], 0.8);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: BuilderConfig =
            serde_json::from_str(r#"{"query_fields": {"title": 1.5}, "boost_method": "rerank"}"#)
                .unwrap();

        assert_eq!(config.query_fields["title"], 1.5);
        assert_eq!(config.boost_method, BoostMethod::Rerank);
        assert_eq!(config.rerank_weight, 1.0);
    }
}
