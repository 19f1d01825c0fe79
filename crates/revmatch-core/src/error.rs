//! Error types for the revmatch-core library.
//!
//! Only conditions that abort a run live here. Per-token problems met while
//! patching (unparsable ids, ids missing from the previous catalog, ids with
//! no candidate in the current revision) are ordinary values, see
//! [`crate::matcher::MatchOutcome`] and [`crate::patch::TokenOutcome`].

use crate::catalog::{Direction, MessageId};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for revmatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all revmatch operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Stream I/O failure while patching
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The identifier pattern is not a valid regular expression
    #[error("invalid identifier pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// An explicit occurrence index exceeded the matches found on a line
    #[error("occurrence index {index} out of range on line {line}: only {found} match(es)")]
    OccurrenceOutOfRange {
        /// One-based line number
        line: usize,
        /// Requested zero-based occurrence
        index: usize,
        /// Number of matches on the line
        found: usize,
    },

    /// Failed to decode a revision snapshot
    #[error("failed to decode revision snapshot: {0}")]
    SnapshotDecode(#[from] prost::DecodeError),

    /// Snapshot decoded but its content is unusable
    #[error("invalid revision snapshot: {0}")]
    InvalidSnapshot(String),

    /// The same id appears twice within one direction
    #[error("duplicate {direction} message id {id}")]
    DuplicateMessageId {
        /// Direction of the catalog being built
        direction: Direction,
        /// The repeated id
        id: MessageId,
    },

    /// A record was offered to a catalog of the other direction
    #[error("message {id} is {found} but the catalog is {expected}")]
    DirectionMismatch {
        /// The offending id
        id: MessageId,
        /// Direction of the catalog
        expected: Direction,
        /// Direction of the record
        found: Direction,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    /// Creates a new invalid snapshot error
    pub fn invalid_snapshot(details: impl Into<String>) -> Self {
        Self::InvalidSnapshot(details.into())
    }
}
