//! Bulk writes into a cluster index.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::Sink;
use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::model::Page;

/// Maximum number of per-document failures included in the log.
const MAX_LOGGED_FAILURES: usize = 5;

/// Writes each page as one bulk request against a fixed index.
pub struct ClusterSink {
    client: ClusterClient,
}

impl ClusterSink {
    /// Creates a sink writing into the client's index.
    #[must_use]
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    /// Builds the newline-delimited bulk body for a page.
    ///
    /// # Errors
    ///
    /// Returns a sink error if any document fails to serialize; nothing is
    /// sent in that case.
    pub fn bulk_body(&self, page: &Page) -> Result<String> {
        let mut body = String::new();

        for record in page {
            let mut meta = Map::new();
            meta.insert("_index".to_string(), Value::from(self.client.index()));
            if !record.id.is_empty() {
                meta.insert("_id".to_string(), Value::from(record.id.as_str()));
            }
            if self.client.version().requires_doc_type() {
                meta.insert("_type".to_string(), Value::from("_doc"));
            }

            let mut action = Map::new();
            action.insert("index".to_string(), Value::Object(meta));

            push_line(&mut body, &Value::Object(action), &record.id)?;
            push_line(&mut body, &record.content, &record.id)?;
        }

        Ok(body)
    }
}

fn push_line<T: Serialize>(body: &mut String, value: &T, id: &str) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|e| Error::Sink(format!("Failed to encode document '{}': {}", id, e)))?;
    body.push_str(&line);
    body.push('\n');
    Ok(())
}

#[async_trait]
impl Sink for ClusterSink {
    fn kind(&self) -> &'static str {
        "cluster"
    }

    async fn write(&mut self, page: &Page) -> Result<usize> {
        if page.is_empty() {
            return Ok(0);
        }

        let body = self.bulk_body(page)?;
        let resp = self.client.bulk(body).await?;

        if !resp.errors {
            debug!("bulk wrote {} documents", page.len());
            return Ok(page.len());
        }

        let failures = resp.failures();
        for (id, reason) in failures.iter().take(MAX_LOGGED_FAILURES) {
            warn!("bulk item failed: id={} reason={}", id, reason);
        }

        let failed = failures.len().min(page.len());
        if failed == page.len() {
            return Err(Error::Sink(format!(
                "bulk write failed for all {} documents: {}",
                page.len(),
                failures
                    .first()
                    .map_or("unknown error", |(_, reason)| reason.as_str())
            )));
        }

        Ok(page.len() - failed)
    }

    async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}
