//! SQLite-backed index store
//!
//! The added/deleted commit-sets and symbol sets are normalized into side
//! tables (`blob_hops`, `blob_symbols`) with covering indices, so the
//! membership and intersection predicates behind `get_blob` and `search`
//! stay indexed instead of scanning array columns.

use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::StratumError;
use crate::model::{Blob, BlobId, CommitRecord, HopSide};
use crate::store::{
    invariant, normalize_dump, AncestryRow, AncestryStore, BlobStore, IndexDump, IndexStatus,
};

const SCHEMA_VERSION: i32 = 1;

/// Durable `IndexStore` backed by SQLite
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create an index database at `path`.
    pub fn open(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a throwaway in-memory index.
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Initialize database schema
    fn init_schema(conn: &Connection) -> crate::Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        // Fail fast on other schema versions - require rebuild
        if version != 0 && version != SCHEMA_VERSION {
            return Err(StratumError::SchemaVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        if version == 0 {
            conn.execute_batch(
                "
                -- Commit ancestry: height order plus the ruler skip pointer
                CREATE TABLE IF NOT EXISTS ancestry (
                    commit_id   TEXT PRIMARY KEY,
                    height      INTEGER NOT NULL UNIQUE,
                    ancestor_id TEXT NOT NULL
                );

                -- One row per indexed file revision
                CREATE TABLE IF NOT EXISTS blobs (
                    id        INTEGER PRIMARY KEY,
                    commit_id TEXT NOT NULL,
                    path      TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_blobs_path ON blobs(path);

                -- added/deleted commit-sets, one commit per row (side 0 = added, 1 = deleted)
                CREATE TABLE IF NOT EXISTS blob_hops (
                    blob_id   INTEGER NOT NULL REFERENCES blobs(id) ON DELETE CASCADE,
                    side      INTEGER NOT NULL,
                    commit_id TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_blob_hops_commit ON blob_hops(side, commit_id);
                CREATE INDEX IF NOT EXISTS idx_blob_hops_blob ON blob_hops(blob_id, side);

                CREATE TABLE IF NOT EXISTS blob_symbols (
                    blob_id INTEGER NOT NULL REFERENCES blobs(id) ON DELETE CASCADE,
                    name    TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_blob_symbols_name ON blob_symbols(name);
                CREATE INDEX IF NOT EXISTS idx_blob_symbols_blob ON blob_symbols(blob_id);

                PRAGMA user_version = 1;
                ",
            )?;
        }

        Ok(())
    }

    /// Index summary for status reporting.
    pub fn status(&self) -> crate::Result<IndexStatus> {
        let tip: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT commit_id, height FROM ancestry ORDER BY height DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let commits: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ancestry", [], |row| row.get(0))?;
        let blobs: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?;

        let index_size_bytes = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(IndexStatus {
            tip_commit: tip.as_ref().map(|(commit, _)| commit.clone()),
            tip_height: tip.map(|(_, height)| height as u32).unwrap_or(0),
            commits: commits as usize,
            blobs: blobs as usize,
            index_size_bytes,
        })
    }

    /// Normalized snapshot of the full index state.
    pub fn dump(&self) -> crate::Result<IndexDump> {
        let mut stmt = self
            .conn
            .prepare("SELECT commit_id, height, ancestor_id FROM ancestry ORDER BY height")?;
        let ancestry = stmt
            .query_map([], |row| {
                Ok(AncestryRow {
                    commit: row.get(0)?,
                    height: row.get::<_, i64>(1)? as u32,
                    ancestor: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT id, commit_id, path FROM blobs ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<(i64, String, String)>>>()?;

        let mut blobs = Vec::with_capacity(rows.len());
        for (id, commit, path) in rows {
            blobs.push(self.load_blob(id, commit, path)?);
        }

        Ok(normalize_dump(IndexDump { ancestry, blobs }))
    }

    fn load_hops(&self, id: BlobId, side: HopSide) -> crate::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT commit_id FROM blob_hops WHERE blob_id = ? AND side = ?")?;
        let hops = stmt
            .query_map(params![id, side.as_int()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(hops)
    }

    fn load_blob(&self, id: BlobId, commit: String, path: String) -> crate::Result<Blob> {
        let added = self.load_hops(id, HopSide::Added)?;
        let deleted = self.load_hops(id, HopSide::Deleted)?;

        let mut stmt = self
            .conn
            .prepare("SELECT name FROM blob_symbols WHERE blob_id = ?")?;
        let symbols = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Blob {
            id,
            commit,
            path,
            added,
            deleted,
            symbols,
        })
    }
}

impl AncestryStore for SqliteStore {
    fn get_commit(&self, commit: &str) -> crate::Result<Option<CommitRecord>> {
        let rec = self
            .conn
            .query_row(
                "SELECT ancestor_id, height FROM ancestry WHERE commit_id = ?",
                params![commit],
                |row| {
                    Ok(CommitRecord {
                        ancestor: row.get(0)?,
                        height: row.get::<_, i64>(1)? as u32,
                    })
                },
            )
            .optional()?;
        Ok(rec)
    }

    fn insert_commit(&mut self, commit: &str, height: u32, ancestor: &str) -> crate::Result<()> {
        if self.get_commit(commit)?.is_some() {
            return Err(StratumError::DuplicateCommit(commit.to_string()));
        }
        let tip: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(height), 0) FROM ancestry", [], |row| {
                row.get(0)
            })?;
        if i64::from(height) != tip + 1 {
            return Err(StratumError::HeightGap {
                height,
                tip: tip as u32,
            });
        }
        self.conn.execute(
            "INSERT INTO ancestry (commit_id, height, ancestor_id) VALUES (?, ?, ?)",
            params![commit, height, ancestor],
        )?;
        Ok(())
    }
}

impl BlobStore for SqliteStore {
    fn get_blob(&self, hop: &str, path: &str) -> crate::Result<Option<BlobId>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id FROM blobs b
             WHERE b.path = ?1
               AND EXISTS (SELECT 1 FROM blob_hops h
                           WHERE h.blob_id = b.id AND h.side = 0 AND h.commit_id = ?2)
               AND NOT EXISTS (SELECT 1 FROM blob_hops h
                               WHERE h.blob_id = b.id AND h.side = 1 AND h.commit_id = ?2)
             LIMIT 2",
        )?;
        let ids = stmt
            .query_map(params![path, hop], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<BlobId>>>()?;

        match ids.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => Err(invariant(format!(
                "multiple blobs visible for path {} at {}",
                path, hop
            ))),
        }
    }

    fn insert_blob(
        &mut self,
        commit: &str,
        path: &str,
        symbols: &[String],
    ) -> crate::Result<BlobId> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO blobs (commit_id, path) VALUES (?, ?)",
            params![commit, path],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO blob_hops (blob_id, side, commit_id) VALUES (?, 0, ?)",
            params![id, commit],
        )?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO blob_symbols (blob_id, name) VALUES (?, ?)")?;
            for name in symbols {
                stmt.execute(params![id, name])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    fn update_blob_hops(&mut self, id: BlobId, side: HopSide, hop: &str) -> crate::Result<()> {
        self.conn.execute(
            "INSERT INTO blob_hops (blob_id, side, commit_id) VALUES (?, ?, ?)",
            params![id, side.as_int(), hop],
        )?;
        Ok(())
    }

    fn append_hop(&mut self, hops: &[String], side: HopSide, new_hop: &str) -> crate::Result<()> {
        if hops.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; hops.len()].join(", ");
        let sql = format!(
            "INSERT INTO blob_hops (blob_id, side, commit_id)
             SELECT DISTINCT blob_id, {side}, ?
             FROM blob_hops WHERE side = {side} AND commit_id IN ({placeholders})",
            side = side.as_int(),
            placeholders = placeholders,
        );
        let bind = std::iter::once(new_hop.to_string()).chain(hops.iter().cloned());
        self.conn.execute(&sql, params_from_iter(bind))?;
        Ok(())
    }

    fn delete_redundant(&mut self, hop: &str) -> crate::Result<()> {
        self.conn.execute(
            "DELETE FROM blob_hops
             WHERE commit_id = ?1
               AND blob_id IN (SELECT a.blob_id FROM blob_hops a
                               JOIN blob_hops d ON d.blob_id = a.blob_id
                               WHERE a.side = 0 AND a.commit_id = ?1
                                 AND d.side = 1 AND d.commit_id = ?1)",
            params![hop],
        )?;
        Ok(())
    }

    fn search(&self, hops: &[String], symbol: Option<&str>) -> crate::Result<Vec<Blob>> {
        if hops.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; hops.len()].join(", ");
        let mut sql = format!(
            "SELECT b.id, b.commit_id, b.path FROM blobs b
             WHERE EXISTS (SELECT 1 FROM blob_hops h
                           WHERE h.blob_id = b.id AND h.side = 0 AND h.commit_id IN ({placeholders}))
               AND NOT EXISTS (SELECT 1 FROM blob_hops h
                               WHERE h.blob_id = b.id AND h.side = 1 AND h.commit_id IN ({placeholders}))",
            placeholders = placeholders,
        );
        if symbol.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM blob_symbols s WHERE s.blob_id = b.id AND s.name = ?)",
            );
        }
        sql.push_str(" ORDER BY b.id");

        let mut bind: Vec<String> = hops.to_vec();
        bind.extend(hops.iter().cloned());
        if let Some(name) = symbol {
            bind.push(name.to_string());
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind), |row| {
                Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<(i64, String, String)>>>()?;

        let mut blobs = Vec::with_capacity(rows.len());
        for (id, commit, path) in rows {
            blobs.push(self.load_blob(id, commit, path)?);
        }
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NULL_COMMIT;
    use tempfile::TempDir;

    fn sha(n: u32) -> String {
        format!("{:040x}", n)
    }

    #[test]
    fn test_open_creates_schema_on_disk() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.db");
        {
            let mut store = SqliteStore::open(&db_path).unwrap();
            store.insert_commit(&sha(1), 1, NULL_COMMIT).unwrap();
        }
        // Reopen and read back.
        let store = SqliteStore::open(&db_path).unwrap();
        let rec = store.get_commit(&sha(1)).unwrap().unwrap();
        assert_eq!(rec.height, 1);
        assert_eq!(rec.ancestor, NULL_COMMIT);
        assert!(store.status().unwrap().index_size_bytes > 0);
    }

    #[test]
    fn test_insert_commit_requires_contiguous_heights() {
        let mut store = SqliteStore::open_in_memory().unwrap();
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
    fn test_get_blob_visibility_and_uniqueness() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_blob(&sha(1), "a.txt", &[]).unwrap();

        assert_eq!(store.get_blob(&sha(1), "a.txt").unwrap(), Some(id));
        assert_eq!(store.get_blob(&sha(2), "a.txt").unwrap(), None);

        store.update_blob_hops(id, HopSide::Deleted, &sha(1)).unwrap();
        assert_eq!(store.get_blob(&sha(1), "a.txt").unwrap(), None);

        store.insert_blob(&sha(2), "b.txt", &[]).unwrap();
        store.insert_blob(&sha(2), "b.txt", &[]).unwrap();
        assert!(matches!(
            store.get_blob(&sha(2), "b.txt"),
            Err(StratumError::Corrupt(_))
        ));
    }

    #[test]
    fn test_append_hop_bulk_propagation() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let touched = store.insert_blob(&sha(1), "a.txt", &[]).unwrap();
        let untouched = store.insert_blob(&sha(2), "b.txt", &[]).unwrap();

        store.append_hop(&[], HopSide::Added, &sha(3)).unwrap();
        assert_eq!(store.get_blob(&sha(3), "a.txt").unwrap(), None);

        store
            .append_hop(&[sha(1), sha(9)], HopSide::Added, &sha(3))
            .unwrap();
        assert_eq!(store.get_blob(&sha(3), "a.txt").unwrap(), Some(touched));
        assert_eq!(store.get_blob(&sha(3), "b.txt").unwrap(), None);
        assert_eq!(store.get_blob(&sha(2), "b.txt").unwrap(), Some(untouched));
    }

    #[test]
    fn test_append_hop_inserts_once_per_blob() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_blob(&sha(1), "a.txt", &[]).unwrap();
        store.update_blob_hops(id, HopSide::Added, &sha(2)).unwrap();

        // Both existing added-hops are in the prefix; the new hop must still
        // be appended only once.
        store
            .append_hop(&[sha(1), sha(2)], HopSide::Added, &sha(3))
            .unwrap();
        let dump = store.dump().unwrap();
        let count = dump.blobs[0].added.iter().filter(|c| **c == sha(3)).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_delete_redundant_strips_all_occurrences() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_blob(&sha(1), "a.txt", &[]).unwrap();
        store.update_blob_hops(id, HopSide::Added, &sha(2)).unwrap();
        store.update_blob_hops(id, HopSide::Added, &sha(2)).unwrap();
        store
            .update_blob_hops(id, HopSide::Deleted, &sha(2))
            .unwrap();

        let other = store.insert_blob(&sha(2), "b.txt", &[]).unwrap();
        store
            .update_blob_hops(other, HopSide::Deleted, &sha(3))
            .unwrap();

        store.delete_redundant(&sha(2)).unwrap();

        let dump = store.dump().unwrap();
        assert_eq!(dump.blobs[0].added, vec![sha(1)]);
        assert!(dump.blobs[0].deleted.is_empty());
        // Blobs without the hop on both sides are untouched.
        assert_eq!(dump.blobs[1].added, vec![sha(2)]);
        assert_eq!(dump.blobs[1].deleted, vec![sha(3)]);
    }

    #[test]
    fn test_search_by_spine_and_symbol() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_blob(&sha(1), "a.txt", &["f".to_string(), "g".to_string()])
            .unwrap();
        let hidden = store.insert_blob(&sha(1), "b.txt", &["f".to_string()]).unwrap();
        store
            .update_blob_hops(hidden, HopSide::Deleted, &sha(2))
            .unwrap();

        let spine = vec![sha(2), sha(1)];
        let visible = store.search(&spine, None).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].path, "a.txt");

        let by_symbol = store.search(&spine, Some("g")).unwrap();
        assert_eq!(by_symbol.len(), 1);
        assert!(store.search(&spine, Some("missing")).unwrap().is_empty());
        assert!(store.search(&[], None).unwrap().is_empty());
    }

    #[test]
    fn test_schema_version_gate() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        }
        let err = SqliteStore::open(&db_path);
        assert!(matches!(
            err,
            Err(StratumError::SchemaVersionMismatch {
                found: 99,
                expected: 1
            })
        ));
    }
}
