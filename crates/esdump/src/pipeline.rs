//! Transfer pipeline orchestration.
//!
//! The producer ([`QueryBatchDriver`]) runs on its own task and hands pages
//! to the writer over a depth-1 channel, so the reader is never more than
//! one page ahead of the sink. The writer runs on the caller's task and owns
//! both the sink and the running total.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{DriveStats, QueryBatchDriver};
use crate::error::{Error, Result};
use crate::model::Page;
use crate::sink::Sink;

/// Pages buffered between reader and writer.
const CHANNEL_DEPTH: usize = 1;

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Built, not started.
    Idle,
    /// Reader and writer are both running.
    Streaming,
    /// The reader finished; the writer is flushing the last page.
    Draining,
    /// A fatal error or cancellation stopped the run.
    Aborted,
    /// Sink cleaned up. Terminal.
    Closed,
}

/// Transfer statistics.
#[derive(Debug, Default, Clone)]
pub struct TransferStats {
    /// Queries started.
    pub queries: usize,
    /// Pages written.
    pub pages: usize,
    /// Records confirmed by the sink.
    pub total: usize,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl TransferStats {
    /// Records per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.total as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// One transfer run from a query batch into a sink.
pub struct TransferPipeline {
    driver: Option<QueryBatchDriver>,
    sink: Box<dyn Sink>,
    state: PipelineState,
    show_progress: bool,
}

impl TransferPipeline {
    /// Creates an idle pipeline.
    #[must_use]
    pub fn new(driver: QueryBatchDriver, sink: Box<dyn Sink>) -> Self {
        Self {
            driver: Some(driver),
            sink,
            state: PipelineState::Idle,
            show_progress: false,
        }
    }

    /// Shows a progress spinner (or bar, with a record cap) while running.
    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs the transfer to completion.
    ///
    /// The sink is cleaned up on every exit path. Cancelling `cancel` stops
    /// both sides at their next blocking point.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error from either side, [`Error::CountMismatch`]
    /// when the sink confirms fewer records than it was handed, or
    /// [`Error::Cancelled`] when the run was cancelled.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<TransferStats> {
        let Some(driver) = self.driver.take() else {
            return Err(Error::Internal(format!(
                "pipeline cannot start from state {:?}",
                self.state
            )));
        };

        let start = Instant::now();
        let progress = create_progress_bar(driver.max_records(), self.show_progress);
        info!("Starting transfer into {} sink", self.sink.kind());

        // Errors on either side cancel the run token; the caller's token is
        // only observed, never cancelled.
        let run_token = cancel.child_token();
        let (tx, mut rx) = mpsc::channel::<Page>(CHANNEL_DEPTH);

        self.transition(PipelineState::Streaming);
        let producer_token = run_token.clone();
        let producer = tokio::spawn(async move {
            let result = driver.drive(tx, producer_token.clone()).await;
            if result.is_err() {
                producer_token.cancel();
            }
            result
        });

        let mut stats = TransferStats::default();
        let written = write_pages(
            self.sink.as_mut(),
            &mut rx,
            &run_token,
            &progress,
            &mut stats,
        )
        .await;
        if written.is_err() {
            run_token.cancel();
        }
        drop(rx);

        let produced = match producer.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("reader task failed: {}", e))),
        };

        let outcome = merge_outcome(written, produced);
        match &outcome {
            Ok(drive) => {
                self.transition(PipelineState::Draining);
                stats.queries = drive.queries;
                debug_assert_eq!(drive.records, stats.total);
            }
            Err(_) => self.transition(PipelineState::Aborted),
        }

        let cleaned = self.sink.cleanup().await;
        self.transition(PipelineState::Closed);
        stats.duration_secs = start.elapsed().as_secs_f64();

        match (outcome, cleaned) {
            (Err(e), cleaned) => {
                if let Err(cleanup_err) = cleaned {
                    warn!("sink cleanup failed: {}", cleanup_err);
                }
                progress.abandon_with_message("Transfer aborted");
                Err(e)
            }
            (Ok(_), Err(e)) => {
                progress.abandon_with_message("Transfer aborted");
                Err(e)
            }
            (Ok(_), Ok(())) => {
                progress.finish_with_message("Transfer complete");
                info!(
                    "Transfer complete: {} records in {} pages from {} queries in {:.2}s ({:.0} docs/sec)",
                    stats.total,
                    stats.pages,
                    stats.queries,
                    stats.duration_secs,
                    stats.throughput()
                );
                Ok(stats)
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Writer side: drains the channel into the sink until the reader hangs up.
async fn write_pages(
    sink: &mut dyn Sink,
    rx: &mut mpsc::Receiver<Page>,
    cancel: &CancellationToken,
    progress: &ProgressBar,
    stats: &mut TransferStats,
) -> Result<()> {
    loop {
        let page = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            page = rx.recv() => match page {
                Some(page) => page,
                None => return Ok(()),
            },
        };

        let succeeded = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            written = sink.write(&page) => written?,
        };

        if succeeded != page.len() {
            return Err(Error::CountMismatch {
                got: page.len(),
                succeeded,
            });
        }

        stats.total += succeeded;
        stats.pages += 1;
        progress.inc(succeeded as u64);
        info!("Dump: dump data success = {} total = {}", succeeded, stats.total);
    }
}

/// Picks the error to report. A data error beats the cancellation it caused
/// on the other side.
fn merge_outcome(written: Result<()>, produced: Result<DriveStats>) -> Result<DriveStats> {
    match (written, produced) {
        (Ok(()), produced) => produced,
        (Err(w), Ok(_)) => Err(w),
        (Err(w), Err(p)) => {
            if !w.is_cancellation() || p.is_cancellation() {
                Err(w)
            } else {
                Err(p)
            }
        }
    }
}

fn create_progress_bar(max: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let (pb, template) = if max > 0 {
        (
            ProgressBar::new(max as u64),
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
    } else {
        (
            ProgressBar::new_spinner(),
            "{spinner:.green} [{elapsed_precise}] {pos} docs ({per_sec})",
        )
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
