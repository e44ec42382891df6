//! Incremental indexer
//!
//! Extends the index one commit at a time. For each new commit at height `h`
//! the spine of the previous tip is computed, the commit is propagated into
//! the added- and deleted-sets of every blob reachable through the first
//! `ruler(h)` spine hops, the commit's own path changes are applied, and the
//! commit is appended to the ancestry last so that an interrupted entry is
//! simply reprocessed on the next run.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::StratumError;
use crate::extract::SymbolExtractor;
use crate::git::VcsSource;
use crate::model::{BlobId, FileStatus, HopSide, NULL_COMMIT};
use crate::ruler::ruler;
use crate::store::{hop_spine, IndexStore};

/// Statistics from an indexing pass
#[derive(Debug, Default, Serialize)]
pub struct IndexStats {
    pub commits_indexed: usize,
    pub blobs_inserted: usize,
    pub blobs_hidden: usize,
}

/// Drives an `IndexStore` forward over a `VcsSource`
pub struct Indexer<'a, V, E> {
    vcs: &'a V,
    extractor: &'a E,
}

impl<'a, V: VcsSource, E: SymbolExtractor> Indexer<'a, V, E> {
    pub fn new(vcs: &'a V, extractor: &'a E) -> Self {
        Self { vcs, extractor }
    }

    /// Index everything between the store's current tip and `commit`.
    ///
    /// Resumes from the newest already-indexed ancestor; a store that
    /// already contains `commit` is left untouched.
    pub fn run<S: IndexStore>(&self, store: &mut S, commit: &str) -> crate::Result<IndexStats> {
        let mut tip_commit = NULL_COMMIT.to_string();
        let mut tip_height: u32 = 0;
        let mut missing = 0usize;

        for candidate in self.vcs.rev_list(commit)? {
            match store.get_commit(&candidate)? {
                Some(rec) => {
                    tip_commit = candidate;
                    tip_height = rec.height;
                    break;
                }
                None => missing += 1,
            }
        }

        let entries = self.vcs.log_reverse(commit, missing)?;
        let mut stats = IndexStats::default();

        for entry in entries {
            let spine = hop_spine(store, &tip_commit)?;
            let height = tip_height + 1;
            let r = ruler(height) as usize;
            if r >= spine.len() {
                return Err(StratumError::Corrupt(format!(
                    "ruler({}) = {} is out of range for spine of length {}",
                    height,
                    r,
                    spine.len()
                )));
            }

            // Inherit visibility across the fresh commit: every blob whose
            // added-set (resp. deleted-set) reaches into the spine prefix
            // carries the new commit in that same set.
            store.append_hop(&spine[..r], HopSide::Added, &entry.commit)?;
            store.append_hop(&spine[..r], HopSide::Deleted, &entry.commit)?;

            let mut path_to_blob: HashMap<String, BlobId> = HashMap::new();

            for change in &entry.paths {
                if matches!(change.status, FileStatus::Deleted | FileStatus::Modified) {
                    let id = match path_to_blob.get(&change.path) {
                        Some(id) => *id,
                        None => self.find_visible_blob(store, &spine, &change.path, &entry.commit)?,
                    };
                    store.update_blob_hops(id, HopSide::Deleted, &entry.commit)?;
                    stats.blobs_hidden += 1;
                }

                if matches!(change.status, FileStatus::Added | FileStatus::Modified) {
                    let contents = self.vcs.cat_file(&entry.commit, &change.path)?;
                    let symbols = self.extractor.extract(&change.path, &contents)?;
                    let id = store.insert_blob(&entry.commit, &change.path, &symbols)?;
                    path_to_blob.insert(change.path.clone(), id);
                    stats.blobs_inserted += 1;
                }
            }

            // A blob touched from both sides in this entry would be both
            // spuriously visible and spuriously hidden; strip the commit
            // from both sets.
            store.delete_redundant(&entry.commit)?;

            store.insert_commit(&entry.commit, height, &spine[r])?;

            tip_commit = entry.commit;
            tip_height = height;
            stats.commits_indexed += 1;
        }

        Ok(stats)
    }

    /// Locate the blob currently visible at `path` by probing every spine
    /// hop. The VCS reported a change to the path, so one must exist.
    fn find_visible_blob<S: IndexStore>(
        &self,
        store: &S,
        spine: &[String],
        path: &str,
        commit: &str,
    ) -> crate::Result<BlobId> {
        for hop in spine {
            if let Some(id) = store.get_blob(hop, path)? {
                return Ok(id);
            }
        }
        Err(StratumError::Corrupt(format!(
            "no visible blob for changed path {} at {}",
            path, commit
        )))
    }
}
