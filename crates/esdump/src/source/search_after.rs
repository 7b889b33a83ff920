//! Keyset pagination with `search_after`.

use async_trait::async_trait;
use serde_json::Value;

use super::{search_body, FetchedPage, Paginator};
use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::model::{Page, PageCursor, Query};

/// Pages through a query by resuming after the last hit's sort values.
///
/// `sort` must end in a unique field so that ties cannot skip or repeat
/// documents. Holds no server-side state.
pub struct SearchAfterPaginator {
    client: ClusterClient,
    fields: Vec<String>,
    sort: Vec<Value>,
}

impl SearchAfterPaginator {
    /// Creates a search-after paginator with a tiebroken sort.
    #[must_use]
    pub fn new(client: ClusterClient, fields: Vec<String>, sort: Vec<Value>) -> Self {
        Self {
            client,
            fields,
            sort,
        }
    }
}

#[async_trait]
impl Paginator for SearchAfterPaginator {
    fn strategy(&self) -> &'static str {
        "search_after"
    }

    async fn fetch(
        &mut self,
        query: Option<&Query>,
        cursor: &PageCursor,
        size: usize,
    ) -> Result<FetchedPage> {
        let mut body = search_body(query, size, &self.fields, &self.sort);
        match cursor {
            PageCursor::Initial => {}
            PageCursor::LastSortKey(key) => {
                body.insert("search_after".to_string(), Value::Array(key.clone()));
            }
            PageCursor::ScrollToken(_) => {
                return Err(Error::Internal(
                    "search_after pagination given a scroll cursor".to_string(),
                ))
            }
        }

        let records = self.client.search(&Value::Object(body), false).await?.hits.hits;

        let next = match records.last() {
            None => cursor.clone(),
            Some(last) => match &last.sort_key {
                Some(key) if !key.is_empty() => PageCursor::LastSortKey(key.clone()),
                _ => {
                    return Err(Error::Source(format!(
                        "hit '{}' carried no sort values",
                        last.id
                    )))
                }
            },
        };

        Ok(FetchedPage {
            page: Page::from(records),
            cursor: next,
        })
    }

    async fn release(&mut self, _cursor: &PageCursor) -> Result<()> {
        Ok(())
    }
}
