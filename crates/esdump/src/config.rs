//! Configuration types for esdump.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

/// Largest page size a search may request.
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Main dump configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Input file or cluster URL (e.g. `http://127.0.0.1:9200/my_index`).
    pub input: String,
    /// Output file, directory (with `split_limit`) or cluster URL.
    #[serde(default = "default_output")]
    pub output: String,
    /// What to transfer.
    #[serde(default, rename = "type")]
    pub data_type: DataType,
    /// Transfer options.
    #[serde(default)]
    pub options: TransferOptions,
}

/// What a run transfers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Documents, through the streaming pipeline.
    #[default]
    Data,
    /// Index mapping, one-shot.
    Mapping,
    /// Index settings, one-shot.
    Setting,
}

impl std::str::FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "data" => Ok(Self::Data),
            "mapping" => Ok(Self::Mapping),
            "setting" | "settings" => Ok(Self::Setting),
            other => Err(Error::Config(format!("unknown type={}", other))),
        }
    }
}

/// How a cluster source pages through results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStrategy {
    /// Server-side scroll context.
    #[default]
    Scroll,
    /// Keyset pagination with `search_after`.
    SearchAfter,
}

impl std::str::FromStr for PaginationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "scroll" => Ok(Self::Scroll),
            "search_after" => Ok(Self::SearchAfter),
            other => Err(Error::Config(format!(
                "unknown pagination strategy '{}' (scroll, search_after)",
                other
            ))),
        }
    }
}

/// Engine major version to speak, or `Auto` to ask the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionSelector {
    /// Detect from `GET /`.
    #[default]
    Auto,
    /// Elasticsearch 6.x.
    #[serde(rename = "6")]
    V6,
    /// Elasticsearch 7.x (and OpenSearch).
    #[serde(rename = "7")]
    V7,
    /// Elasticsearch 8.x.
    #[serde(rename = "8")]
    V8,
}

impl std::str::FromStr for VersionSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "6" => Ok(Self::V6),
            "7" => Ok(Self::V7),
            "8" => Ok(Self::V8),
            other => Err(Error::Config(format!("unknown es version={}", other))),
        }
    }
}

/// Transfer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Records per page request (1-10000).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Cap on records for the whole run (0 = unlimited).
    #[serde(default)]
    pub max: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `_source` fields to include (empty = all).
    #[serde(default)]
    pub fields: Vec<String>,
    /// Sort specs, `field[:asc|desc]`.
    #[serde(default)]
    pub sort: Vec<String>,
    /// Literal query (JSON object placed under `"query"`).
    pub query: Option<String>,
    /// File with one query per line.
    pub query_file: Option<PathBuf>,
    /// Records per output file; 0 writes a single file.
    #[serde(default)]
    pub split_limit: usize,
    /// Input cluster version.
    #[serde(default)]
    pub input_version: VersionSelector,
    /// Output cluster version.
    #[serde(default)]
    pub output_version: VersionSelector,
    /// Pagination strategy for cluster inputs.
    #[serde(default)]
    pub pagination: PaginationStrategy,
    /// Unique field appended to search-after sorts.
    #[serde(default = "default_tiebreak_field")]
    pub tiebreak_field: String,
    /// API key sent as `Authorization: ApiKey ...`.
    pub api_key: Option<String>,
    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Show a progress spinner.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            max: 0,
            timeout_secs: default_timeout_secs(),
            fields: Vec::new(),
            sort: Vec::new(),
            query: None,
            query_file: None,
            split_limit: 0,
            input_version: VersionSelector::Auto,
            output_version: VersionSelector::Auto,
            pagination: PaginationStrategy::Scroll,
            tiebreak_field: default_tiebreak_field(),
            api_key: None,
            accept_invalid_certs: false,
            show_progress: true,
        }
    }
}

fn default_output() -> String {
    "output.json".to_string()
}

fn default_limit() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_tiebreak_field() -> String {
    "_id".to_string()
}

fn default_true() -> bool {
    true
}

impl DumpConfig {
    /// Creates a config with default options.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            data_type: DataType::Data,
            options: TransferOptions::default(),
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Path checks that need the filesystem (split output directories,
    /// existing output files) are done by [`crate::sink::check_output`]
    /// before either endpoint is contacted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        let opts = &self.options;

        if self.input.trim().is_empty() {
            return Err(Error::Config(
                "must specify input (example: data.json / http://127.0.0.1:9200/my_index)"
                    .to_string(),
            ));
        }
        if self.output.trim().is_empty() {
            return Err(Error::Config("output cannot be empty".to_string()));
        }
        if opts.limit == 0 || opts.limit > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "invalid limit {} (1 - {})",
                opts.limit, MAX_PAGE_SIZE
            )));
        }
        if opts.timeout_secs == 0 {
            return Err(Error::Config("timeout must be greater than 0".to_string()));
        }
        if opts.query.is_some() && opts.query_file.is_some() {
            return Err(Error::Config(
                "cannot specify both query and query_file at the same time".to_string(),
            ));
        }
        if opts.tiebreak_field.trim().is_empty() {
            return Err(Error::Config("tiebreak_field cannot be empty".to_string()));
        }

        let input = Endpoint::parse(&self.input)?;
        let output = Endpoint::parse(&self.output)?;

        if input.is_file() {
            if opts.query.is_some() || opts.query_file.is_some() {
                return Err(Error::Config(
                    "with file input, query or query_file can't be supported".to_string(),
                ));
            }
            if !opts.fields.is_empty() {
                return Err(Error::Config(
                    "with file input, source can't be supported".to_string(),
                ));
            }
            if !opts.sort.is_empty() {
                return Err(Error::Config(
                    "with file input, sort can't be supported".to_string(),
                ));
            }
        }

        if opts.split_limit > 0 {
            if self.data_type != DataType::Data {
                return Err(Error::Config(
                    "split-limit only supports type=data".to_string(),
                ));
            }
            if !output.is_file() {
                return Err(Error::Config(
                    "split-limit requires a directory output".to_string(),
                ));
            }
        }

        Ok(())
    }
}
