//! Output formatting for CLI commands.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, PilumArgs};
use crate::error::Result;
use crate::search::collector::SearchHit;

/// Result structure for search operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
    /// The query retrieving the hits.
    pub query: String,
    /// Whether boost queries were applied by reranking.
    pub reranked: bool,
    pub total_hits: u64,
    pub start: usize,
    pub hits: Vec<SearchHit>,
    pub duration_ms: u64,
}

/// Statistics of one registered term.
#[derive(Debug, Serialize, Deserialize)]
pub struct TermReport {
    pub term: String,
    pub raw_doc_freq: u64,
    pub corrected_doc_freq: u64,
    pub never_match: bool,
}

/// Terms of one clause.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClauseReport {
    pub clause: usize,
    /// Whether the clause belongs to the user query.
    pub user: bool,
    pub terms: Vec<TermReport>,
}

/// Statistics of a whole registry.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsReport {
    pub mode: String,
    /// Terms registered outside any clause.
    pub unclaused: Vec<TermReport>,
    pub clauses: Vec<ClauseReport>,
}

impl Display for SearchResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Query: {}", self.query)?;
        if self.reranked {
            writeln!(f, "Boosts applied by reranking")?;
        }
        writeln!(
            f,
            "Found {} hits in {} ms (showing {} from {})",
            self.total_hits,
            self.duration_ms,
            self.hits.len(),
            self.start
        )?;
        for (i, hit) in self.hits.iter().enumerate() {
            write!(f, "{:>4}. doc {:<8} score {:.4}", self.start + i + 1, hit.doc_id, hit.score)?;
            if let Some(value) = hit.sort_value {
                write!(f, "  sort {value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Display for TermReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  {:<30} df {:>8} -> {:>8}",
            self.term, self.raw_doc_freq, self.corrected_doc_freq
        )?;
        if self.never_match {
            f.write_str("  (never matches)")?;
        }
        Ok(())
    }
}

impl Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Correction mode: {}", self.mode)?;
        if !self.unclaused.is_empty() {
            writeln!(f, "Outside clauses:")?;
            for term in &self.unclaused {
                writeln!(f, "{term}")?;
            }
        }
        for clause in &self.clauses {
            let kind = if clause.user { "user" } else { "injected" };
            writeln!(f, "Clause {} ({kind}):", clause.clause)?;
            for term in &clause.terms {
                writeln!(f, "{term}")?;
            }
        }
        Ok(())
    }
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize + Display>(result: &T, args: &PilumArgs) -> Result<()> {
    println!("{}", render(result, args.output_format, args.pretty)?);
    Ok(())
}

/// Render a result in the specified format.
pub fn render<T: Serialize + Display>(
    result: &T,
    format: OutputFormat,
    pretty: bool,
) -> Result<String> {
    Ok(match format {
        OutputFormat::Human => result.to_string().trim_end().to_string(),
        OutputFormat::Json if pretty => serde_json::to_string_pretty(result)?,
        OutputFormat::Json => serde_json::to_string(result)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> SearchResults {
        SearchResults {
            query: "title:laptop".to_string(),
            reranked: false,
            total_hits: 2,
            start: 0,
            hits: vec![
                SearchHit {
                    doc_id: 3,
                    score: 1.5,
                    sort_value: None,
                },
                SearchHit {
                    doc_id: 1,
                    score: 0.25,
                    sort_value: None,
                },
            ],
            duration_ms: 0,
        }
    }

    #[test]
    fn test_render_human() {
        let text = render(&results(), OutputFormat::Human, false).unwrap();

        assert!(text.starts_with("Query: title:laptop"));
        assert!(text.contains("Found 2 hits"));
        assert!(text.contains("1. doc 3"));
        assert!(text.contains("score 0.2500"));
    }

    #[test]
    fn test_render_json() {
        let text = render(&results(), OutputFormat::Json, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["total_hits"], 2);
        assert_eq!(value["hits"][0]["doc_id"], 3);
        assert!(!text.contains('\n'));

        let pretty = render(&results(), OutputFormat::Json, true).unwrap();
        assert!(pretty.contains('\n'));
    }

    #[test]
    fn test_render_stats() {
        let report = StatsReport {
            mode: "corrected".to_string(),
            unclaused: Vec::new(),
            clauses: vec![ClauseReport {
                clause: 0,
                user: true,
                terms: vec![TermReport {
                    term: "title:notebook".to_string(),
                    raw_doc_freq: 5,
                    corrected_doc_freq: 50,
                    never_match: false,
                }],
            }],
        };

        let text = render(&report, OutputFormat::Human, false).unwrap();
        assert!(text.contains("Clause 0 (user):"));
        assert!(text.contains("title:notebook"));
        assert!(text.contains("50"));
    }
}
