//! Producer side of a transfer: runs every query in order and forwards
//! non-empty pages to the writer.

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::RELEASE_TIMEOUT;
use crate::error::{Error, Result};
use crate::model::{Page, RecordBudget};
use crate::query::QuerySet;
use crate::source::{Paginator, SourceReader};

/// Counters reported by the producer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriveStats {
    /// Queries started.
    pub queries: usize,
    /// Pages forwarded.
    pub pages: usize,
    /// Records forwarded.
    pub records: usize,
}

/// Runs a [`QuerySet`] against one paginator under a shared budget.
pub struct QueryBatchDriver {
    paginator: Box<dyn Paginator>,
    queries: QuerySet,
    budget: RecordBudget,
}

impl QueryBatchDriver {
    /// Creates a driver.
    #[must_use]
    pub fn new(paginator: Box<dyn Paginator>, queries: QuerySet, budget: RecordBudget) -> Self {
        Self {
            paginator,
            queries,
            budget,
        }
    }

    /// Maximum records for the run (0 = unlimited).
    #[must_use]
    pub fn max_records(&self) -> usize {
        self.budget.max()
    }

    /// Fetches and forwards pages until every query is exhausted or the
    /// budget runs out.
    ///
    /// The reader of each query is released before the next query starts,
    /// and also when the query fails or the run is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first source error, or [`Error::Cancelled`] once `cancel`
    /// fires or the receiver goes away.
    pub async fn drive(
        self,
        tx: mpsc::Sender<Page>,
        cancel: CancellationToken,
    ) -> Result<DriveStats> {
        let Self {
            mut paginator,
            queries,
            mut budget,
        } = self;
        let mut stats = DriveStats::default();
        let total_queries = queries.len();

        for (idx, query) in queries.iter().enumerate() {
            if budget.is_exhausted() {
                debug!("record cap reached, skipping remaining queries");
                break;
            }
            stats.queries += 1;

            let before = stats.records;
            let mut reader = SourceReader::new(paginator.as_mut(), query);
            let result = pump(&mut reader, &mut budget, &tx, &cancel, &mut stats).await;
            release(&mut reader).await;
            result?;

            info!(
                "query {}/{} done: {} records",
                idx + 1,
                total_queries,
                stats.records - before
            );
        }

        Ok(stats)
    }
}

async fn pump(
    reader: &mut SourceReader<'_>,
    budget: &mut RecordBudget,
    tx: &mpsc::Sender<Page>,
    cancel: &CancellationToken,
    stats: &mut DriveStats,
) -> Result<()> {
    loop {
        let page = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            page = reader.next(budget) => page?,
        };
        if page.is_empty() {
            return Ok(());
        }

        let records = page.len();
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            sent = tx.send(page) => {
                if sent.is_err() {
                    return Err(Error::Cancelled);
                }
            }
        }

        budget.consume(records);
        stats.pages += 1;
        stats.records += records;
    }
}

/// Best-effort cursor release. Cursors holding a server-side resource are
/// bounded by [`RELEASE_TIMEOUT`].
async fn release(reader: &mut SourceReader<'_>) {
    let released = if reader.cursor().holds_resource() {
        match timeout(RELEASE_TIMEOUT, reader.release()).await {
            Ok(released) => released,
            Err(_) => {
                warn!(
                    "releasing source cursor timed out after {:?}",
                    RELEASE_TIMEOUT
                );
                return;
            }
        }
    } else {
        reader.release().await
    };

    match released {
        Ok(()) => debug!("released source cursor"),
        Err(e) => warn!("failed to release source cursor: {}", e),
    }
}
