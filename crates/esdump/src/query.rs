//! Query input: one literal query, a newline-delimited query file, or the
//! implicit match-all.

use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Query;

/// Maximum number of queries accepted from a query file.
pub const MAX_QUERY_FILE_LINES: usize = 10_000;

/// Ordered list of queries for one run.
///
/// Never empty: a run without queries holds a single `None` (match all).
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySet {
    queries: Vec<Option<Query>>,
}

impl QuerySet {
    /// A single match-all query.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            queries: vec![None],
        }
    }

    /// Builds a set from already parsed queries. An empty list becomes
    /// match-all, and empty query objects are treated as match-all.
    #[must_use]
    pub fn from_queries(queries: Vec<Query>) -> Self {
        if queries.is_empty() {
            return Self::match_all();
        }

        Self {
            queries: queries
                .into_iter()
                .map(|q| (!q.is_empty()).then_some(q))
                .collect(),
        }
    }

    /// Parses one literal query (the object placed under `"query"`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] if the text is not a JSON object.
    pub fn from_literal(text: &str) -> Result<Self> {
        let query = parse_query(text).map_err(|e| Error::Query(e.to_string()))?;
        Ok(Self::from_queries(vec![query]))
    }

    /// Reads a query file, one JSON object per line.
    ///
    /// The whole file is parsed before anything is returned, so a bad line
    /// fails the run before any page is requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryLine`] naming the first malformed line, or a
    /// config error when the file holds more than
    /// [`MAX_QUERY_FILE_LINES`] queries or cannot be opened.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).await.map_err(|e| {
            Error::Config(format!(
                "Failed to open query file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut queries = Vec::new();
        let mut lines = BufReader::new(file).lines();
        let mut line_no: usize = 0;
        loop {
            line_no += 1;
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    return Err(Error::QueryLine {
                        line: line_no,
                        reason: e.to_string(),
                    })
                }
            };

            let query = parse_query(&line).map_err(|e| Error::QueryLine {
                line: line_no,
                reason: e.to_string(),
            })?;
            queries.push(query);

            if queries.len() > MAX_QUERY_FILE_LINES {
                return Err(Error::Config(format!(
                    "query file supports at most {} lines",
                    MAX_QUERY_FILE_LINES
                )));
            }
        }

        debug!("Loaded {} queries from {}", queries.len(), path.display());
        Ok(Self::from_queries(queries))
    }

    /// Number of queries (at least 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Never true for a constructed set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// True when the set is the single implicit match-all.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.queries.iter().all(Option::is_none)
    }

    /// Queries in run order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&Query>> {
        self.queries.iter().map(Option::as_ref)
    }
}

impl Default for QuerySet {
    fn default() -> Self {
        Self::match_all()
    }
}

fn parse_query(text: &str) -> serde_json::Result<Query> {
    serde_json::from_str::<Query>(text.trim())
}
