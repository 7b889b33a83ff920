//! Records, pages, cursors and the run-wide request budget.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A search query body (the object placed under `"query"`).
///
/// `None` or an empty map means "match all".
pub type Query = Map<String, Value>;

/// One document moved by the pipeline.
///
/// Serializes to the `{"_id", "_index", "_source"}` envelope used in dump
/// files. The sort key is only read from search hits and never written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Document ID. Empty when the document came from a bare JSON line.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Index the document was read from.
    #[serde(rename = "_index", default)]
    pub index_name: String,
    /// Document body.
    #[serde(rename = "_source", default)]
    pub content: Map<String, Value>,
    /// Sort values of the hit, present on sorted searches.
    #[serde(rename = "sort", default, skip_serializing)]
    pub sort_key: Option<Vec<Value>>,
}

impl Record {
    /// Creates a record without a sort key.
    pub fn new(
        id: impl Into<String>,
        index_name: impl Into<String>,
        content: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            index_name: index_name.into(),
            content,
            sort_key: None,
        }
    }
}

/// An ordered batch of records from one fetch.
///
/// An empty page is the end-of-query signal and is never forwarded to a sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    records: Vec<Record>,
}

impl Page {
    /// Creates an empty (terminal) page.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True for the terminal page.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in fetch order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterates records in fetch order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Consumes the page.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl From<Vec<Record>> for Page {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl<'a> IntoIterator for &'a Page {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Pagination state for one in-flight query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PageCursor {
    /// No request has been made yet.
    #[default]
    Initial,
    /// Open server-side scroll context. Must be released.
    ScrollToken(String),
    /// Sort values of the last record seen.
    LastSortKey(Vec<Value>),
}

impl PageCursor {
    /// True when the cursor holds a server-side resource.
    #[must_use]
    pub fn holds_resource(&self) -> bool {
        matches!(self, Self::ScrollToken(_))
    }
}

/// Computes the next request size.
///
/// `max == 0` means unlimited. Returns 0 once `total` has reached `max`.
#[must_use]
pub fn calculate_limit(page_size: usize, total: usize, max: usize) -> usize {
    if max == 0 {
        return page_size;
    }

    max.saturating_sub(total).min(page_size)
}

/// Page size and record cap for a whole run, plus the records already
/// requested against the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordBudget {
    page_size: usize,
    max: usize,
    consumed: usize,
}

impl RecordBudget {
    /// Creates a budget. `max == 0` is unlimited.
    #[must_use]
    pub fn new(page_size: usize, max: usize) -> Self {
        Self {
            page_size,
            max,
            consumed: 0,
        }
    }

    /// Size of the next page request.
    #[must_use]
    pub fn next_request_size(&self) -> usize {
        calculate_limit(self.page_size, self.consumed, self.max)
    }

    /// Records a forwarded page against the cap.
    pub fn consume(&mut self, records: usize) {
        self.consumed = self.consumed.saturating_add(records);
    }

    /// True when the cap has been reached.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.max > 0 && self.consumed >= self.max
    }

    /// Records consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Configured page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Configured cap (0 = unlimited).
    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }
}
