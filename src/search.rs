//! Execution of scoring trees: weights, scorers, collection and re-ranking.

pub mod collector;
pub mod rerank;
pub mod scorer;
pub mod searcher;
pub mod similarity;
pub mod weight;

pub use self::collector::{SearchHit, SortField, SortOrder, TopDocs, TopDocsCollector};
pub use self::rerank::{RerankSpec, RerankState, TwoPassReRanker};
pub use self::searcher::{SearchRequest, Searcher};
pub use self::similarity::Bm25Similarity;
pub use self::weight::Weight;
