//! Scroll-context pagination.

use async_trait::async_trait;
use serde_json::Value;

use super::{search_body, FetchedPage, Paginator};
use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::model::{Page, PageCursor, Query};

/// Pages through a query with a server-side scroll context.
///
/// The first request opens the context with the query body; later requests
/// carry only the scroll id. The context is released on [`Paginator::release`].
pub struct ScrollPaginator {
    client: ClusterClient,
    fields: Vec<String>,
    sort: Vec<Value>,
}

impl ScrollPaginator {
    /// Creates a scroll paginator.
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
impl Paginator for ScrollPaginator {
    fn strategy(&self) -> &'static str {
        "scroll"
    }

    async fn fetch(
        &mut self,
        query: Option<&Query>,
        cursor: &PageCursor,
        size: usize,
    ) -> Result<FetchedPage> {
        let resp = match cursor {
            PageCursor::Initial => {
                let body = search_body(query, size, &self.fields, &self.sort);
                self.client.search(&Value::Object(body), true).await?
            }
            PageCursor::ScrollToken(id) => self.client.scroll(id).await?,
            PageCursor::LastSortKey(_) => {
                return Err(Error::Internal(
                    "scroll pagination given a sort-key cursor".to_string(),
                ))
            }
        };

        let records = resp.hits.hits;
        let cursor = match (resp.scroll_id, cursor) {
            (Some(id), _) => PageCursor::ScrollToken(id),
            (None, PageCursor::Initial) if records.is_empty() => PageCursor::Initial,
            (None, PageCursor::Initial) => {
                return Err(Error::Source(
                    "search response carried no _scroll_id".to_string(),
                ))
            }
            (None, previous) => previous.clone(),
        };

        Ok(FetchedPage {
            page: Page::from(records),
            cursor,
        })
    }

    async fn release(&mut self, cursor: &PageCursor) -> Result<()> {
        match cursor {
            PageCursor::ScrollToken(id) => self.client.clear_scroll(id).await,
            _ => Ok(()),
        }
    }
}
