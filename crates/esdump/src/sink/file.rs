//! Single dump file.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::{encode_record, write_error, Sink};
use crate::error::{Error, Result};
use crate::model::Page;

/// Writes every record as one JSON line to a new file.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Creates the output file. It must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a config error if the file exists or cannot be created.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    Error::Config(format!("output file already exists: {}", path.display()))
                }
                _ => Error::Config(format!(
                    "Failed to create output '{}': {}",
                    path.display(),
                    e
                )),
            })?;
        debug!("Writing records to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn write(&mut self, page: &Page) -> Result<usize> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::Sink(format!(
                "output '{}' is already closed",
                self.path.display()
            )));
        };

        for record in page {
            let line = encode_record(record)?;
            writer
                .write_all(&line)
                .await
                .map_err(|e| write_error(&self.path, &e))?;
        }
        writer
            .flush()
            .await
            .map_err(|e| write_error(&self.path, &e))?;

        Ok(page.len())
    }

    async fn cleanup(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| write_error(&self.path, &e))?;
        }
        Ok(())
    }
}
