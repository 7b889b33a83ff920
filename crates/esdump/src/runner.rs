//! Top-level run: validates the config, builds the endpoints, and dispatches
//! on the data type.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{DataType, DumpConfig, TransferOptions};
use crate::driver::QueryBatchDriver;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::metadata::{copy_metadata, MetadataKind};
use crate::model::RecordBudget;
use crate::pipeline::{TransferPipeline, TransferStats};
use crate::query::QuerySet;
use crate::sink::{check_output, create_sink};
use crate::source::create_paginator;

/// Prefix for split files when the input name gives none.
const DEFAULT_SPLIT_PREFIX: &str = "dump";

/// What a finished run did.
#[derive(Debug, Clone)]
pub enum RunSummary {
    /// Documents moved through the pipeline.
    Data(TransferStats),
    /// Mapping or settings copied.
    Metadata {
        /// Which metadata.
        kind: MetadataKind,
        /// Index entries copied.
        entries: usize,
    },
}

/// Runs one dump.
///
/// # Errors
///
/// Returns a config or parse error before either endpoint is contacted,
/// otherwise the first
/// fatal error of the run, or [`Error::Cancelled`].
pub async fn run(config: &DumpConfig, cancel: CancellationToken) -> Result<RunSummary> {
    config.validate()?;

    let input = Endpoint::parse(&config.input)?;
    let output = Endpoint::parse(&config.output)?;
    info!(
        "Dump {:?}: {} => {}",
        config.data_type,
        input.describe(),
        output.describe()
    );
    check_output(&output, &config.options).await?;

    match config.data_type {
        DataType::Data => run_data(&input, &output, &config.options, cancel)
            .await
            .map(RunSummary::Data),
        DataType::Mapping => {
            run_metadata(&input, &output, MetadataKind::Mapping, config, cancel).await
        }
        DataType::Setting => {
            run_metadata(&input, &output, MetadataKind::Setting, config, cancel).await
        }
    }
}

/// Loads the run's queries. A query file is parsed completely here.
///
/// # Errors
///
/// Returns a parse error for a bad query or query-file line.
pub async fn load_queries(options: &TransferOptions) -> Result<QuerySet> {
    match (&options.query, &options.query_file) {
        (Some(_), Some(_)) => Err(Error::Config(
            "cannot specify both query and query_file at the same time".to_string(),
        )),
        (Some(query), None) => QuerySet::from_literal(query),
        (None, Some(path)) => QuerySet::from_file(path).await,
        (None, None) => Ok(QuerySet::match_all()),
    }
}

/// File name prefix for split output, taken from the input's index or
/// file name.
#[must_use]
pub fn split_prefix(input: &Endpoint) -> String {
    match input {
        Endpoint::Cluster(cluster) => cluster.file_prefix(),
        Endpoint::File(path) => path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SPLIT_PREFIX)
            .to_string(),
    }
}

async fn run_data(
    input: &Endpoint,
    output: &Endpoint,
    options: &TransferOptions,
    cancel: CancellationToken,
) -> Result<TransferStats> {
    let queries = load_queries(options).await?;
    info!("Dump: {} queries", queries.len());

    let setup = async {
        let paginator = create_paginator(input, options).await?;
        let sink = create_sink(output, options, &split_prefix(input)).await?;
        Ok::<_, Error>((paginator, sink))
    };
    let (paginator, sink) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        ready = setup => ready?,
    };

    let driver = QueryBatchDriver::new(
        paginator,
        queries,
        RecordBudget::new(options.limit, options.max),
    );
    let mut pipeline = TransferPipeline::new(driver, sink).with_progress(options.show_progress);
    pipeline.run(cancel).await
}

async fn run_metadata(
    input: &Endpoint,
    output: &Endpoint,
    kind: MetadataKind,
    config: &DumpConfig,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        copied = copy_metadata(input, output, kind, &config.options) => {
            Ok(RunSummary::Metadata { kind, entries: copied? })
        }
    }
}
