//! Error types for `esdump`.
//!
//! Every failure a transfer can hit maps onto one [`Error`] variant, and every
//! variant belongs to exactly one [`ErrorKind`] so callers can tell a
//! configuration mistake from a broken source, a failed write, or a
//! user-requested cancellation.

use thiserror::Error;

/// Result type alias for `esdump` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad flags, paths or config values. Raised before any I/O.
    Config,
    /// Malformed query JSON.
    Parse,
    /// Transport or protocol failure while reading.
    Source,
    /// Transport failure while writing, or a write count mismatch.
    Sink,
    /// The run was cancelled or timed out.
    Cancellation,
    /// Unexpected internal failure.
    Internal,
}

/// Errors that can occur while dumping data.
///
/// Error codes follow the pattern `DUMP-XXX`.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (DUMP-001).
    #[error("[DUMP-001] Configuration error: {0}")]
    Config(String),

    /// Invalid literal query (DUMP-002).
    #[error("[DUMP-002] Invalid query: {0}")]
    Query(String),

    /// Invalid line in a query file (DUMP-003).
    #[error("[DUMP-003] query file line={line} invalid: {reason}")]
    QueryLine {
        /// 1-based line number.
        line: usize,
        /// Parser message.
        reason: String,
    },

    /// Source read failure (DUMP-004).
    #[error("[DUMP-004] Source error: {0}")]
    Source(String),

    /// Sink write failure (DUMP-005).
    #[error("[DUMP-005] Sink error: {0}")]
    Sink(String),

    /// The sink wrote fewer records than it was handed (DUMP-006).
    #[error("[DUMP-006] Write count mismatch: got={got} succeeded={succeeded}")]
    CountMismatch {
        /// Records in the page.
        got: usize,
        /// Records the sink confirmed.
        succeeded: usize,
    },

    /// The run was cancelled (DUMP-007).
    #[error("[DUMP-007] Transfer cancelled")]
    Cancelled,

    /// IO error (DUMP-008).
    #[error("[DUMP-008] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML config parse error (DUMP-009).
    #[error("[DUMP-009] Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error (DUMP-010).
    #[error("[DUMP-010] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "DUMP-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "DUMP-001",
            Self::Query(_) => "DUMP-002",
            Self::QueryLine { .. } => "DUMP-003",
            Self::Source(_) => "DUMP-004",
            Self::Sink(_) => "DUMP-005",
            Self::CountMismatch { .. } => "DUMP-006",
            Self::Cancelled => "DUMP-007",
            Self::Io(_) => "DUMP-008",
            Self::Yaml(_) => "DUMP-009",
            Self::Internal(_) => "DUMP-010",
        }
    }

    /// Returns the broad kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Io(_) | Self::Yaml(_) => ErrorKind::Config,
            Self::Query(_) | Self::QueryLine { .. } => ErrorKind::Parse,
            Self::Source(_) => ErrorKind::Source,
            Self::Sink(_) | Self::CountMismatch { .. } => ErrorKind::Sink,
            Self::Cancelled => ErrorKind::Cancellation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the run ended because it was cancelled.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
