//! Stratum Core - Commit-aware symbol indexing
//!
//! This library maintains an incremental symbol index over a linear branch of
//! a git repository. Each indexed file revision (a blob) carries the sets of
//! commits at which it became visible and hidden; queries resolve a commit to
//! its visible blob set by walking a logarithmic hop spine derived from the
//! ruler sequence.

pub mod config;
pub mod error;
pub mod extract;
pub mod git;
pub mod index;
pub mod model;
pub mod query;
pub mod ruler;
pub mod store;

pub use config::Config;
pub use error::StratumError;
pub use extract::{FileType, SymbolExtractor, TreeSitterExtractor};
pub use git::{GitRepo, VcsSource};
pub use index::{IndexStats, Indexer};
pub use model::{Blob, BlobId, CommitRecord, FileStatus, HopSide, LogEntry, PathStatus, NULL_COMMIT};
pub use query::search;
pub use ruler::ruler;
pub use store::{
    hop_spine, AncestryRow, AncestryStore, BlobStore, IndexDump, IndexStatus, IndexStore,
    MemoryStore, SqliteStore,
};

/// Result type alias for stratum operations
pub type Result<T> = std::result::Result<T, StratumError>;
