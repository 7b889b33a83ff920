//! Per-query page reader.

use super::Paginator;
use crate::error::Result;
use crate::model::{Page, PageCursor, Query, RecordBudget};

/// Pulls successive pages of one query from a paginator.
///
/// The cursor starts at [`PageCursor::Initial`]. A page shorter than the
/// request marks the reader exhausted, so the next call returns an empty
/// page without touching the source.
pub struct SourceReader<'a> {
    paginator: &'a mut dyn Paginator,
    query: Option<&'a Query>,
    cursor: PageCursor,
    exhausted: bool,
}

impl<'a> SourceReader<'a> {
    /// Creates a reader for `query` (`None` = match all).
    pub fn new(paginator: &'a mut dyn Paginator, query: Option<&'a Query>) -> Self {
        Self {
            paginator,
            query,
            cursor: PageCursor::Initial,
            exhausted: false,
        }
    }

    /// Fetches the next page, sized by the budget.
    ///
    /// Returns an empty page once the query or the budget is exhausted.
    /// Pages larger than the request are truncated to it.
    ///
    /// # Errors
    ///
    /// Returns the paginator's error. There are no retries.
    pub async fn next(&mut self, budget: &RecordBudget) -> Result<Page> {
        if self.exhausted {
            return Ok(Page::empty());
        }

        let size = budget.next_request_size();
        if size == 0 {
            self.exhausted = true;
            return Ok(Page::empty());
        }

        let fetched = self.paginator.fetch(self.query, &self.cursor, size).await?;
        self.cursor = fetched.cursor;

        let mut records = fetched.page.into_records();
        if records.len() < size {
            self.exhausted = true;
        }
        records.truncate(size);

        Ok(Page::from(records))
    }

    /// Current cursor.
    #[must_use]
    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    /// True when no further request will be made.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Hands the cursor back to the paginator and resets it.
    ///
    /// # Errors
    ///
    /// Returns the paginator's release error.
    pub async fn release(&mut self) -> Result<()> {
        let cursor = std::mem::take(&mut self.cursor);
        self.paginator.release(&cursor).await
    }
}
