//! Record sources.
//!
//! A [`Paginator`] knows how to fetch one page for a query given the
//! previous cursor. [`SourceReader`] drives a paginator for a single query,
//! applying the run's record budget and detecting exhaustion.

mod file;
mod reader;
mod scroll;
mod search_after;

pub use file::FilePaginator;
pub use reader::SourceReader;
pub use scroll::ScrollPaginator;
pub use search_after::SearchAfterPaginator;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cluster::{ClientOptions, ClusterClient, ClusterVersion};
use crate::config::{PaginationStrategy, TransferOptions};
use crate::endpoint::{Endpoint, Role};
use crate::error::{Error, Result};
use crate::model::{Page, PageCursor, Query};

/// A page together with the cursor to continue from.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// Records returned by the server, possibly more than requested.
    pub page: Page,
    /// Cursor for the next request.
    pub cursor: PageCursor,
}

/// Pagination strategy over one source.
///
/// Implementations are stateless with respect to queries: everything needed
/// to continue a query lives in the [`PageCursor`].
#[async_trait]
pub trait Paginator: Send {
    /// Strategy name for logs.
    fn strategy(&self) -> &'static str;

    /// Fetches up to `size` records for `query`, continuing from `cursor`.
    ///
    /// An empty page means the query is exhausted.
    async fn fetch(
        &mut self,
        query: Option<&Query>,
        cursor: &PageCursor,
        size: usize,
    ) -> Result<FetchedPage>;

    /// Releases any server-side resource held by `cursor`.
    async fn release(&mut self, cursor: &PageCursor) -> Result<()>;
}

/// Creates the paginator for an input endpoint.
///
/// Sort specs are validated before the cluster is contacted.
///
/// # Errors
///
/// Returns a config error for bad sort specs, or a source error if the
/// input cannot be opened.
pub async fn create_paginator(
    endpoint: &Endpoint,
    options: &TransferOptions,
) -> Result<Box<dyn Paginator>> {
    match endpoint {
        Endpoint::File(path) => Ok(Box::new(FilePaginator::open(path).await?)),
        Endpoint::Cluster(cluster) => {
            let sort = parse_sort_specs(&options.sort)?;
            let client = ClusterClient::connect(
                cluster,
                Role::Input,
                &ClientOptions::for_role(options, Role::Input),
            )
            .await?;

            let paginator: Box<dyn Paginator> = match options.pagination {
                PaginationStrategy::Scroll => {
                    Box::new(ScrollPaginator::new(client, options.fields.clone(), sort))
                }
                PaginationStrategy::SearchAfter => {
                    check_tiebreak(&options.tiebreak_field, client.version())?;
                    Box::new(SearchAfterPaginator::new(
                        client,
                        options.fields.clone(),
                        with_tiebreak(sort, &options.tiebreak_field),
                    ))
                }
            };
            debug!("Using {} pagination", paginator.strategy());
            Ok(paginator)
        }
    }
}

/// Parses `field[:asc|desc]` specs into search sort clauses.
///
/// # Errors
///
/// Returns a config error for an empty field or unknown direction.
pub fn parse_sort_specs(specs: &[String]) -> Result<Vec<Value>> {
    specs
        .iter()
        .map(|spec| {
            let (field, order) = match spec.split_once(':') {
                Some((field, order)) => (field.trim(), order.trim().to_ascii_lowercase()),
                None => (spec.trim(), "asc".to_string()),
            };

            if field.is_empty() {
                return Err(Error::Config(format!("invalid sort '{}': empty field", spec)));
            }
            if order != "asc" && order != "desc" {
                return Err(Error::Config(format!(
                    "invalid sort '{}': order must be asc or desc",
                    spec
                )));
            }

            Ok(sort_clause(field, &order))
        })
        .collect()
}

/// Rejects a search-after tie-break the input cluster cannot sort on.
///
/// 8.x disables fielddata on `_id` by default, so the tie-break has to be a
/// unique keyword or numeric field there.
///
/// # Errors
///
/// Returns a config error for `_id` against an 8.x input.
pub fn check_tiebreak(field: &str, version: ClusterVersion) -> Result<()> {
    if field.trim() == "_id" && version == ClusterVersion::V8 {
        return Err(Error::Config(
            "search_after on 8.x cannot sort on _id; set --tiebreak (tiebreak_field) \
             to a unique keyword or numeric field"
                .to_string(),
        ));
    }
    Ok(())
}

/// Appends an ascending sort on `field` unless the sort already has one.
#[must_use]
pub fn with_tiebreak(mut sort: Vec<Value>, field: &str) -> Vec<Value> {
    let present = sort.iter().any(|clause| match clause {
        Value::Object(map) => map.contains_key(field),
        Value::String(name) => name == field,
        _ => false,
    });

    if !present {
        sort.push(sort_clause(field, "asc"));
    }
    sort
}

fn sort_clause(field: &str, order: &str) -> Value {
    let mut clause = Map::new();
    clause.insert(field.to_string(), Value::String(order.to_string()));
    Value::Object(clause)
}

/// Builds a search body.
pub(crate) fn search_body(
    query: Option<&Query>,
    size: usize,
    fields: &[String],
    sort: &[Value],
) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(
        "query".to_string(),
        query.map_or_else(|| json!({ "match_all": {} }), |q| Value::Object(q.clone())),
    );
    body.insert("size".to_string(), json!(size));
    if !fields.is_empty() {
        body.insert("_source".to_string(), json!(fields));
    }
    if !sort.is_empty() {
        body.insert("sort".to_string(), Value::Array(sort.to_vec()));
    }
    body
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
