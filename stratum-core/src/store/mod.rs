//! Index storage contracts and realizations

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StratumError;
use crate::model::{Blob, BlobId, CommitRecord, HopSide, NULL_COMMIT};
use serde::Serialize;

/// Append-only commit ancestry: each indexed commit maps to its height and
/// its ruler-selected skip ancestor.
pub trait AncestryStore {
    /// Look up a commit. `None` means not yet indexed; the `NULL_COMMIT`
    /// sentinel is always absent.
    fn get_commit(&self, commit: &str) -> crate::Result<Option<CommitRecord>>;

    /// Append a commit. Errors if `commit` is already present or `height`
    /// does not extend the current tip by exactly one.
    fn insert_commit(&mut self, commit: &str, height: u32, ancestor: &str) -> crate::Result<()>;
}

/// Blob persistence with hop-set maintenance and visibility search.
pub trait BlobStore {
    /// Id of the unique blob at `path` that is visible from `hop`: `hop` in
    /// its added-set and not in its deleted-set. More than one match means
    /// the index is corrupt.
    fn get_blob(&self, hop: &str, path: &str) -> crate::Result<Option<BlobId>>;

    /// Create a blob born at `commit` with `added = {commit}` and an empty
    /// deleted-set.
    fn insert_blob(&mut self, commit: &str, path: &str, symbols: &[String])
        -> crate::Result<BlobId>;

    /// Append `hop` to one blob's added- or deleted-set. Duplicates are
    /// tolerated here and collapsed by `delete_redundant`.
    fn update_blob_hops(&mut self, id: BlobId, side: HopSide, hop: &str) -> crate::Result<()>;

    /// Bulk propagation: every blob whose selected set intersects `hops`
    /// gets `new_hop` appended to that same set. An empty `hops` slice is a
    /// no-op.
    fn append_hop(&mut self, hops: &[String], side: HopSide, new_hop: &str) -> crate::Result<()>;

    /// Remove `hop` (all occurrences) from both sets of every blob where it
    /// appears in both, restoring the disjointness invariant.
    fn delete_redundant(&mut self, hop: &str) -> crate::Result<()>;

    /// All blobs whose added-set intersects `hops` and whose deleted-set does
    /// not, optionally restricted to blobs containing `symbol`. Ordered by
    /// blob id.
    fn search(&self, hops: &[String], symbol: Option<&str>) -> crate::Result<Vec<Blob>>;
}

/// Combined capability the indexer and resolver operate against.
pub trait IndexStore: AncestryStore + BlobStore {}

impl<T: AncestryStore + BlobStore> IndexStore for T {}

/// Walk the skip-ancestor chain of `commit`.
///
/// The spine always contains `commit` as its first element, even when the
/// commit itself is not indexed yet; construction stops at the first unknown
/// commit or at the sentinel.
pub fn hop_spine<S: AncestryStore + ?Sized>(store: &S, commit: &str) -> crate::Result<Vec<String>> {
    let mut current = commit.to_string();
    let mut spine = vec![current.clone()];

    loop {
        if current == NULL_COMMIT {
            break;
        }
        match store.get_commit(&current)? {
            None => break,
            Some(rec) => {
                current = rec.ancestor;
                spine.push(current.clone());
            }
        }
    }

    Ok(spine)
}

/// One row of the ancestry table, as exposed by snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AncestryRow {
    pub commit: String,
    pub height: u32,
    pub ancestor: String,
}

/// Index summary for status reporting.
#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub tip_commit: Option<String>,
    pub tip_height: u32,
    pub commits: usize,
    pub blobs: usize,
    pub index_size_bytes: u64,
}

/// Normalized snapshot of the whole index: ancestry ordered by height, blobs
/// ordered by id with sorted commit- and symbol-sets. Two equal snapshots
/// describe the same index regardless of how it was built up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDump {
    pub ancestry: Vec<AncestryRow>,
    pub blobs: Vec<Blob>,
}

pub(crate) fn normalize_dump(mut dump: IndexDump) -> IndexDump {
    dump.ancestry.sort_by_key(|row| row.height);
    dump.blobs.sort_by_key(|b| b.id);
    for blob in &mut dump.blobs {
        blob.added.sort();
        blob.deleted.sort();
        blob.symbols.sort();
    }
    dump
}

pub(crate) fn invariant(msg: String) -> StratumError {
    StratumError::Corrupt(msg)
}
