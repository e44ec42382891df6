//! In-memory index store
//!
//! Reference realization of the storage contracts, used by tests and small
//! one-shot runs. State lives in plain maps; blob ids are assigned from a
//! counter starting at 1 so snapshots line up with the SQLite store.

use std::collections::{BTreeMap, HashMap};

use crate::model::{Blob, BlobId, CommitRecord, HopSide};
use crate::store::{invariant, normalize_dump, AncestryRow, AncestryStore, BlobStore, IndexDump};
use crate::StratumError;

#[derive(Debug, Clone, Default)]
struct StoredBlob {
    commit: String,
    path: String,
    added: Vec<String>,
    deleted: Vec<String>,
    symbols: Vec<String>,
}

impl StoredBlob {
    fn side(&self, side: HopSide) -> &Vec<String> {
        match side {
            HopSide::Added => &self.added,
            HopSide::Deleted => &self.deleted,
        }
    }

    fn side_mut(&mut self, side: HopSide) -> &mut Vec<String> {
        match side {
            HopSide::Added => &mut self.added,
            HopSide::Deleted => &mut self.deleted,
        }
    }
}

/// In-memory `IndexStore`
#[derive(Debug)]
pub struct MemoryStore {
    commits: HashMap<String, CommitRecord>,
    tip_height: u32,
    blobs: BTreeMap<BlobId, StoredBlob>,
    next_id: BlobId,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            commits: HashMap::new(),
            tip_height: 0,
            blobs: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Normalized snapshot of the full index state.
    pub fn dump(&self) -> IndexDump {
        let ancestry = self
            .commits
            .iter()
            .map(|(commit, rec)| AncestryRow {
                commit: commit.clone(),
                height: rec.height,
                ancestor: rec.ancestor.clone(),
            })
            .collect();
        let blobs = self
            .blobs
            .iter()
            .map(|(id, b)| Blob {
                id: *id,
                commit: b.commit.clone(),
                path: b.path.clone(),
                added: b.added.clone(),
                deleted: b.deleted.clone(),
                symbols: b.symbols.clone(),
            })
            .collect();
        normalize_dump(IndexDump { ancestry, blobs })
    }
}

impl AncestryStore for MemoryStore {
    fn get_commit(&self, commit: &str) -> crate::Result<Option<CommitRecord>> {
        Ok(self.commits.get(commit).cloned())
    }

    fn insert_commit(&mut self, commit: &str, height: u32, ancestor: &str) -> crate::Result<()> {
        if self.commits.contains_key(commit) {
            return Err(StratumError::DuplicateCommit(commit.to_string()));
        }
        if height != self.tip_height + 1 {
            return Err(StratumError::HeightGap {
                height,
                tip: self.tip_height,
            });
        }
        self.commits.insert(
            commit.to_string(),
            CommitRecord {
                ancestor: ancestor.to_string(),
                height,
            },
        );
        self.tip_height = height;
        Ok(())
    }
}

impl BlobStore for MemoryStore {
    fn get_blob(&self, hop: &str, path: &str) -> crate::Result<Option<BlobId>> {
        let hop = hop.to_string();
        let mut matches = self.blobs.iter().filter(|(_, b)| {
            b.path == path && b.added.contains(&hop) && !b.deleted.contains(&hop)
        });

        let first = matches.next().map(|(id, _)| *id);
        if first.is_some() && matches.next().is_some() {
            return Err(invariant(format!(
                "multiple blobs visible for path {} at {}",
                path, hop
            )));
        }
        Ok(first)
    }

    fn insert_blob(
        &mut self,
        commit: &str,
        path: &str,
        symbols: &[String],
    ) -> crate::Result<BlobId> {
        let id = self.next_id;
        self.next_id += 1;
        self.blobs.insert(
            id,
            StoredBlob {
                commit: commit.to_string(),
                path: path.to_string(),
                added: vec![commit.to_string()],
                deleted: Vec::new(),
                symbols: symbols.to_vec(),
            },
        );
        Ok(id)
    }

    fn update_blob_hops(&mut self, id: BlobId, side: HopSide, hop: &str) -> crate::Result<()> {
        let blob = self
            .blobs
            .get_mut(&id)
            .ok_or_else(|| invariant(format!("no blob with id {}", id)))?;
        blob.side_mut(side).push(hop.to_string());
        Ok(())
    }

    fn append_hop(&mut self, hops: &[String], side: HopSide, new_hop: &str) -> crate::Result<()> {
        if hops.is_empty() {
            return Ok(());
        }
        for blob in self.blobs.values_mut() {
            if blob.side(side).iter().any(|c| hops.contains(c)) {
                blob.side_mut(side).push(new_hop.to_string());
            }
        }
        Ok(())
    }

    fn delete_redundant(&mut self, hop: &str) -> crate::Result<()> {
        let hop = hop.to_string();
        for blob in self.blobs.values_mut() {
            if blob.added.contains(&hop) && blob.deleted.contains(&hop) {
                blob.added.retain(|c| *c != hop);
                blob.deleted.retain(|c| *c != hop);
            }
        }
        Ok(())
    }

    fn search(&self, hops: &[String], symbol: Option<&str>) -> crate::Result<Vec<Blob>> {
        let results = self
            .blobs
            .iter()
            .filter(|(_, b)| {
                b.added.iter().any(|c| hops.contains(c))
                    && !b.deleted.iter().any(|c| hops.contains(c))
            })
            .filter(|(_, b)| match symbol {
                Some(name) => b.symbols.iter().any(|s| s == name),
                None => true,
            })
            .map(|(id, b)| Blob {
                id: *id,
                commit: b.commit.clone(),
                path: b.path.clone(),
                added: b.added.clone(),
                deleted: b.deleted.clone(),
                symbols: b.symbols.clone(),
            })
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NULL_COMMIT;

    fn sha(n: u32) -> String {
        format!("{:040x}", n)
    }

    #[test]
    fn test_insert_commit_requires_contiguous_heights() {
        let mut store = MemoryStore::new();
        store.insert_commit(&sha(1), 1, NULL_COMMIT).unwrap();

        let gap = store.insert_commit(&sha(3), 3, &sha(1));
        assert!(matches!(
            gap,
            Err(StratumError::HeightGap { height: 3, tip: 1 })
        ));

        let dup = store.insert_commit(&sha(1), 2, NULL_COMMIT);
        assert!(matches!(dup, Err(StratumError::DuplicateCommit(_))));
    }

    #[test]
    fn test_get_blob_visibility() {
        let mut store = MemoryStore::new();
        let id = store.insert_blob(&sha(1), "a.txt", &[]).unwrap();

        assert_eq!(store.get_blob(&sha(1), "a.txt").unwrap(), Some(id));
        assert_eq!(store.get_blob(&sha(2), "a.txt").unwrap(), None);
        assert_eq!(store.get_blob(&sha(1), "b.txt").unwrap(), None);

        store.update_blob_hops(id, HopSide::Deleted, &sha(1)).unwrap();
        assert_eq!(store.get_blob(&sha(1), "a.txt").unwrap(), None);
    }

    #[test]
    fn test_get_blob_rejects_duplicate_visibility() {
        let mut store = MemoryStore::new();
        store.insert_blob(&sha(1), "a.txt", &[]).unwrap();
        store.insert_blob(&sha(1), "a.txt", &[]).unwrap();

        assert!(matches!(
            store.get_blob(&sha(1), "a.txt"),
            Err(StratumError::Corrupt(_))
        ));
    }

    #[test]
    fn test_append_hop_propagates_per_side() {
        let mut store = MemoryStore::new();
        let id = store.insert_blob(&sha(1), "a.txt", &[]).unwrap();

        // Empty prefix is a no-op.
        store.append_hop(&[], HopSide::Added, &sha(2)).unwrap();
        assert_eq!(store.get_blob(&sha(2), "a.txt").unwrap(), None);

        store
            .append_hop(&[sha(1)], HopSide::Added, &sha(2))
            .unwrap();
        assert_eq!(store.get_blob(&sha(2), "a.txt").unwrap(), Some(id));

        // The deleted side only propagates along deleted-set membership.
        store
            .append_hop(&[sha(1)], HopSide::Deleted, &sha(2))
            .unwrap();
        assert_eq!(store.get_blob(&sha(2), "a.txt").unwrap(), Some(id));
    }

    #[test]
    fn test_delete_redundant_strips_both_sides() {
        let mut store = MemoryStore::new();
        let id = store.insert_blob(&sha(1), "a.txt", &[]).unwrap();
        store.update_blob_hops(id, HopSide::Added, &sha(2)).unwrap();
        store
            .update_blob_hops(id, HopSide::Deleted, &sha(2))
            .unwrap();

        store.delete_redundant(&sha(2)).unwrap();

        let dump = store.dump();
        assert_eq!(dump.blobs[0].added, vec![sha(1)]);
        assert!(dump.blobs[0].deleted.is_empty());
    }

    #[test]
    fn test_search_filters_by_symbol() {
        let mut store = MemoryStore::new();
        store
            .insert_blob(&sha(1), "a.txt", &["f".to_string()])
            .unwrap();
        store
            .insert_blob(&sha(1), "b.txt", &["g".to_string()])
            .unwrap();

        let all = store.search(&[sha(1)], None).unwrap();
        assert_eq!(all.len(), 2);

        let only_f = store.search(&[sha(1)], Some("f")).unwrap();
        assert_eq!(only_f.len(), 1);
        assert_eq!(only_f[0].path, "a.txt");

        assert!(store.search(&[sha(1)], Some("h")).unwrap().is_empty());
        assert!(store.search(&[sha(2)], None).unwrap().is_empty());
    }
}
