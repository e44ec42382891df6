//! Core data model: commits, blobs, and diff entries

use serde::Serialize;

/// Reserved all-zeros hash meaning "before history begins". Never stored;
/// always absent from ancestry lookups, which terminates spine construction.
pub const NULL_COMMIT: &str = "0000000000000000000000000000000000000000";

/// Surrogate blob identifier assigned by the store at creation.
pub type BlobId = i64;

/// Ancestry record for an indexed commit.
///
/// `ancestor` is not the immediate parent: it is the commit at height
/// `height - 2^ruler(height)`, the skip pointer that keeps spines short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub ancestor: String,
    pub height: u32,
}

/// Per-file status reported by the VCS for one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

/// Which of a blob's two commit-sets an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopSide {
    Added,
    Deleted,
}

impl HopSide {
    pub fn as_int(self) -> i64 {
        match self {
            HopSide::Added => 0,
            HopSide::Deleted => 1,
        }
    }
}

/// One changed path within a log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStatus {
    pub path: String,
    pub status: FileStatus,
}

/// One commit of the reverse log with its per-file statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub commit: String,
    pub paths: Vec<PathStatus>,
}

/// An indexed file revision.
///
/// `added` and `deleted` are semantically sets: a blob is visible at commit
/// `Q` iff some commit on `Q`'s hop spine is in `added` and none is in
/// `deleted`. Duplicates are tolerated at the storage layer and collapsed by
/// the per-entry redundancy cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blob {
    pub id: BlobId,
    pub commit: String,
    pub path: String,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub symbols: Vec<String>,
}
