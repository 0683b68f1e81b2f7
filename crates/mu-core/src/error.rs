//! Error types for the Mu kernel.
//!
//! Uses a single hierarchical error enum so callers can pattern-match on
//! the failure kind named in SPEC_FULL.md §7, rather than on the subsystem
//! that raised it.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all mu-core / mu-daemon operations.
#[derive(Debug, Error)]
pub enum MuError {
    /// Bad input or a missing config file. User-correctable, exit 1.
    #[error("configuration error: {details}")]
    Config {
        /// What's wrong with the config.
        details: String,
    },

    /// The mubase is held open for write by another process.
    #[error("mubase locked by another writer: {path}")]
    Locked {
        /// Path to the locked mubase file.
        path: PathBuf,
    },

    /// The stored schema version is newer than this binary understands.
    #[error("incompatible schema: stored version {stored}, supported {supported}")]
    Incompatible {
        /// Schema version found in the mubase.
        stored: u32,
        /// Highest schema version this binary supports.
        supported: u32,
    },

    /// A single file failed to parse. That file's previous state is retained.
    #[error("parse error for {path}: {message}")]
    Parse {
        /// Path to the file that failed to parse.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// Requested node/edge/name was not found.
    #[error("not found: {entity}")]
    NotFound {
        /// Description of what was not found.
        entity: String,
    },

    /// A create-once operation (snapshotting a commit that already has one)
    /// was attempted without `force`.
    #[error("already exists: {entity}")]
    AlreadyExists {
        /// Description of what already exists.
        entity: String,
    },

    /// The Graph Engine was queried before `load()`.
    #[error("graph not loaded: call load() first")]
    GraphNotLoaded,

    /// Cooperative cancellation via a `CancellationToken` checkpoint.
    #[error("operation cancelled")]
    Cancelled,

    /// An upstream collaborator (embedding provider, VCS) failed.
    #[error("upstream error: {message}")]
    Upstream {
        /// Human-readable description of the upstream failure.
        message: String,
        /// Whether retrying the same call might succeed.
        retryable: bool,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// MUQL syntax error, caught at parse time with line/column.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// Human-readable description.
        message: String,
        line: u32,
        column: u32,
    },

    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for conditions that should be unreachable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MuError {
    /// True when the error maps to an empty-rectangle-with-warning response
    /// rather than a hard failure, per §4.4's failure semantics.
    #[must_use]
    pub fn is_semantic_query_error(&self) -> bool {
        matches!(self, MuError::NotFound { .. })
    }
}

/// Convenience type alias for Results in the Mu kernel.
pub type MuResult<T> = Result<T, MuError>;
