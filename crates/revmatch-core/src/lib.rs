//! # revmatch-core
//!
//! A library for carrying protocol message identifiers from one client
//! revision to the next.
//!
//! Message ids are renumbered on every client build, while the structural
//! fingerprint of an unchanged message stays the same. This crate provides:
//! - Loading per-revision message catalogs from snapshots
//! - Indexing catalogs by fingerprint, reporting collisions and dead messages
//! - Resolving an old id to the id of the same message in a newer revision
//! - Rewriting header files so that embedded ids follow the new revision
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`catalog`]: Message records, catalogs and revisions
//! - [`snapshot`]: Protobuf snapshot interchange format
//! - [`index`]: Fingerprint index and catalog partitioning
//! - [`report`]: Annotated catalog reports
//! - [`matcher`]: Cross-revision id resolution
//! - [`patch`]: Streaming header rewriting
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use revmatch_core::{load_revision, Direction, PatchConfig, Patcher, RevisionMatcher};
//! use std::io::{stdout, BufReader};
//! use std::fs::File;
//!
//! let previous = load_revision("PRODUCTION-201611291003-338511768.pb")?;
//! let current = load_revision("PRODUCTION-201701242205-837386173.pb")?;
//!
//! let catalog = current.catalog(Direction::Outgoing);
//! let index = catalog.index();
//! let matcher = RevisionMatcher::new(previous.catalog(Direction::Outgoing), &index);
//!
//! let config = PatchConfig::new(r"=\s*(\d+)", previous.label(), current.label())?;
//! let summary = Patcher::new(&config, &matcher)
//!     .patch(BufReader::new(File::open("Outgoing.cs")?), stdout())?;
//! println!("Matches: {}", summary);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! The library provides several traits for customization:
//!
//! - [`ReportWriter`]: Customize what a catalog report produces
//! - [`TieBreak`]: Customize how fingerprint collisions are resolved
//! - [`IdResolver`]: Plug any id mapping into the [`Patcher`]
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod catalog;
pub mod error;
pub mod index;
pub mod matcher;
pub mod patch;
pub mod report;
pub mod snapshot;

// Re-export primary types for convenience
pub use catalog::{Catalog, Direction, MessageId, MessageRecord, Revision};
pub use error::{Error, Result};
pub use index::FingerprintIndex;
pub use matcher::{IdResolver, LowestId, MatchOutcome, RevisionMatcher, ShapeSimilarity, TieBreak};
pub use patch::{
    CommentBoundary, Occurrence, PatchConfig, PatchSummary, Patcher, TokenOutcome,
    DEFAULT_PATTERN,
};
pub use report::{render_revision, NullWriter, ReportWriter, StatsWriter, TextWriter};
pub use snapshot::{load_revision, RevisionSnapshot};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
