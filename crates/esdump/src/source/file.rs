//! Newline-delimited JSON file source.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

use super::{FetchedPage, Paginator};
use crate::error::{Error, Result};
use crate::model::{Page, PageCursor, Query, Record};

/// Reads records from a dump file, one JSON object per line.
///
/// A line is either a record envelope (`{"_id", "_index", "_source"}`) or a
/// bare document, which becomes the record content. Blank lines are skipped.
pub struct FilePaginator {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl FilePaginator {
    /// Opens a dump file for reading.
    ///
    /// # Errors
    ///
    /// Returns a source error if the file cannot be opened.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await.map_err(|e| {
            Error::Source(format!("Failed to open input '{}': {}", path.display(), e))
        })?;
        debug!("Reading records from {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    fn parse_line(&self, line: &str) -> Result<Record> {
        let invalid = |reason: String| {
            Error::Source(format!(
                "{} line={} invalid: {}",
                self.path.display(),
                self.line_no,
                reason
            ))
        };

        match serde_json::from_str::<Value>(line).map_err(|e| invalid(e.to_string()))? {
            Value::Object(map) if map.get("_source").is_some_and(Value::is_object) => {
                serde_json::from_value(Value::Object(map)).map_err(|e| invalid(e.to_string()))
            }
            Value::Object(map) => Ok(Record::new("", "", map)),
            _ => Err(invalid("expected a JSON object".to_string())),
        }
    }
}

#[async_trait]
impl Paginator for FilePaginator {
    fn strategy(&self) -> &'static str {
        "file"
    }

    async fn fetch(
        &mut self,
        _query: Option<&Query>,
        cursor: &PageCursor,
        size: usize,
    ) -> Result<FetchedPage> {
        let mut records = Vec::with_capacity(size);

        while records.len() < size {
            let Some(line) = self.lines.next_line().await.map_err(|e| {
                Error::Source(format!("Failed to read '{}': {}", self.path.display(), e))
            })?
            else {
                break;
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            records.push(self.parse_line(line)?);
        }

        Ok(FetchedPage {
            page: Page::from(records),
            cursor: cursor.clone(),
        })
    }

    async fn release(&mut self, _cursor: &PageCursor) -> Result<()> {
        Ok(())
    }
}
