//! Dump split across numbered files.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::{encode_record, write_error, Sink};
use crate::error::{Error, Result};
use crate::model::Page;

/// Writes records into `{prefix}-{n}.json` files of at most `limit`
/// records each, numbered from 1.
pub struct SplitFileSink {
    dir: PathBuf,
    prefix: String,
    limit: usize,
    current: Option<(PathBuf, BufWriter<File>)>,
    current_count: usize,
    file_index: usize,
}

impl SplitFileSink {
    /// Prepares the output directory, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns a config error for a zero limit, a path that exists but is
    /// not a directory, or a directory that cannot be created.
    pub async fn open(dir: &Path, prefix: &str, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::Config("split-limit must be > 0".to_string()));
        }

        match fs::metadata(dir).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(Error::Config(format!(
                    "split output '{}' exists and is not a directory",
                    dir.display()
                )));
            }
            Ok(_) => {}
            Err(_) => fs::create_dir_all(dir).await.map_err(|e| {
                Error::Config(format!(
                    "Failed to create output directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?,
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            limit,
            current: None,
            current_count: 0,
            file_index: 0,
        })
    }

    /// Number of files opened so far.
    #[must_use]
    pub fn files_created(&self) -> usize {
        self.file_index
    }

    async fn close_current(&mut self) -> Result<()> {
        if let Some((path, mut writer)) = self.current.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| write_error(&path, &e))?;
        }
        self.current_count = 0;
        Ok(())
    }

    async fn rotate(&mut self) -> Result<()> {
        if let Err(e) = self.close_current().await {
            warn!("failed to close current split file: {}", e);
        }

        self.file_index += 1;
        let path = self
            .dir
            .join(format!("{}-{}.json", self.prefix, self.file_index));
        let file = File::create(&path).await.map_err(|e| {
            Error::Sink(format!(
                "Failed to create split file '{}': {}",
                path.display(),
                e
            ))
        })?;

        debug!("created new split file: {}", path.display());
        self.current = Some((path, BufWriter::new(file)));
        Ok(())
    }
}

#[async_trait]
impl Sink for SplitFileSink {
    fn kind(&self) -> &'static str {
        "split"
    }

    async fn write(&mut self, page: &Page) -> Result<usize> {
        for record in page {
            if self.current.is_none() || self.current_count >= self.limit {
                self.rotate().await?;
            }

            let line = encode_record(record)?;
            if let Some((path, writer)) = self.current.as_mut() {
                writer
                    .write_all(&line)
                    .await
                    .map_err(|e| write_error(path, &e))?;
            }
            self.current_count += 1;
        }

        if let Some((path, writer)) = self.current.as_mut() {
            writer.flush().await.map_err(|e| write_error(path, &e))?;
        }

        Ok(page.len())
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.close_current().await
    }
}
