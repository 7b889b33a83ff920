//! Record sinks.
//!
//! A [`Sink`] accepts pages in production order and reports how many
//! records of each page it wrote. The pipeline treats any shortfall as
//! fatal.

mod cluster;
mod file;
mod split;

pub use cluster::ClusterSink;
pub use file::FileSink;
pub use split::SplitFileSink;

use async_trait::async_trait;
use std::path::Path;

use crate::cluster::{ClientOptions, ClusterClient};
use crate::config::TransferOptions;
use crate::endpoint::{Endpoint, Role};
use crate::error::{Error, Result};
use crate::model::{Page, Record};

/// Destination for pages of records.
#[async_trait]
pub trait Sink: Send {
    /// Sink kind for logs.
    fn kind(&self) -> &'static str;

    /// Writes one page, returning the number of records written.
    async fn write(&mut self, page: &Page) -> Result<usize>;

    /// Flushes and closes held resources. Called on every exit path.
    async fn cleanup(&mut self) -> Result<()>;
}

/// Creates the sink for an output endpoint.
///
/// With `split_limit > 0` a file endpoint is a directory receiving
/// `{split_prefix}-{n}.json` files.
///
/// # Errors
///
/// Returns a config error for an unusable output path, or a sink error if
/// the output cluster cannot be reached.
pub async fn create_sink(
    endpoint: &Endpoint,
    options: &TransferOptions,
    split_prefix: &str,
) -> Result<Box<dyn Sink>> {
    match endpoint {
        Endpoint::Cluster(cluster) => {
            let client = ClusterClient::connect(
                cluster,
                Role::Output,
                &ClientOptions::for_role(options, Role::Output),
            )
            .await?;
            Ok(Box::new(ClusterSink::new(client)))
        }
        Endpoint::File(path) if options.split_limit > 0 => Ok(Box::new(
            SplitFileSink::open(path, split_prefix, options.split_limit).await?,
        )),
        Endpoint::File(path) => Ok(Box::new(FileSink::create(path).await?)),
    }
}

/// Checks a file output before anything else is opened.
///
/// A split output must be a directory or not exist yet; a single output
/// file must not exist.
///
/// # Errors
///
/// Returns a config error naming the offending path.
pub async fn check_output(endpoint: &Endpoint, options: &TransferOptions) -> Result<()> {
    let Endpoint::File(path) = endpoint else {
        return Ok(());
    };
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return Ok(());
    };

    if options.split_limit > 0 && !meta.is_dir() {
        return Err(Error::Config(format!(
            "split output '{}' exists and is not a directory",
            path.display()
        )));
    }
    if options.split_limit == 0 {
        return Err(Error::Config(format!(
            "output file already exists: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Encodes a record as one dump-file line, newline included.
///
/// # Errors
///
/// Returns a sink error if the record cannot be serialized.
pub fn encode_record(record: &Record) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record)
        .map_err(|e| Error::Sink(format!("Failed to encode record '{}': {}", record.id, e)))?;
    line.push(b'\n');
    Ok(line)
}

pub(crate) fn write_error(path: &Path, e: &std::io::Error) -> Error {
    Error::Sink(format!("Failed to write '{}': {}", path.display(), e))
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
