//! The mubase: a single-file, single-writer, embedded store over the
//! node/edge/metadata tables of §3.
//!
//! ## Concurrency
//!
//! SQLite is configured in WAL mode for concurrent reads during writes.
//! Exactly one writer may hold the file open for write at a time, enforced
//! by an OS-level advisory lock on a `<file>.lock` sidecar acquired in
//! [`Store::open_write`] and held for the `Store`'s entire lifetime; a
//! second writer fails fast with [`MuError::Locked`] rather than blocking,
//! so callers can route through the daemon instead.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as Json;

use crate::error::{MuError, MuResult};
use crate::model::{Edge, EdgeType, Node, NodeType};

/// Highest schema version this binary understands. Bump alongside
/// `schema.sql` changes that are not purely additive.
pub const SCHEMA_VERSION: u32 = 1;

/// Whether a store handle was opened for reading or for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// The mubase store.
pub struct Store {
    conn: Connection,
    mode: OpenMode,
    path: PathBuf,
    /// Advisory lock held for the store's lifetime in write mode. SQLite's
    /// own `BEGIN IMMEDIATE` only reserves the write lock for the duration
    /// of a transaction, which in WAL mode is released the instant it
    /// commits -- it cannot by itself enforce single-writer for as long as
    /// the `Store` handle is alive. `None` for read-only stores.
    _write_lock: Option<File>,
}

impl Store {
    /// Open the mubase for writing, creating it (and its schema) if absent.
    ///
    /// Fails with [`MuError::Locked`] if another process already holds the
    /// write lock.
    pub fn open_write(path: &Path) -> MuResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Claim a whole-process-lifetime advisory lock on a sidecar file
        // before touching the database. This, not the `BEGIN IMMEDIATE`
        // below, is what holds the write lock for as long as the `Store`
        // is alive -- WAL-mode transactions release their reservation the
        // instant they commit, so they can only catch a writer that's
        // mid-transaction at the exact moment of the probe.
        let lock_path = lock_file_path(path);
        let lock_file = File::create(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(|_| MuError::Locked { path: path.to_path_buf() })?;

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", "-64000")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_millis(0))?;

        if let Err(e) = conn.execute_batch("BEGIN IMMEDIATE; COMMIT;") {
            return Err(match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::DatabaseBusy =>
                {
                    MuError::Locked {
                        path: path.to_path_buf(),
                    }
                }
                other => MuError::Database(other),
            });
        }

        let store = Self {
            conn,
            mode: OpenMode::ReadWrite,
            path: path.to_path_buf(),
            _write_lock: Some(lock_file),
        };
        store.ensure_schema()?;
        store.check_schema_version(true)?;
        Ok(store)
    }

    /// Open the mubase read-only. Tolerates the absence of auxiliary tables.
    pub fn open_read(path: &Path) -> MuResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let store = Self {
            conn,
            mode: OpenMode::ReadOnly,
            path: path.to_path_buf(),
            _write_lock: None,
        };
        store.check_schema_version(false)?;
        Ok(store)
    }

    fn ensure_schema(&self) -> MuResult<()> {
        self.conn
            .execute_batch(include_str!("schema.sql"))
            .map_err(MuError::Database)
    }

    fn check_schema_version(&self, writing: bool) -> MuResult<()> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(v) => {
                let stored_version: u32 = v.parse().unwrap_or(0);
                if stored_version > SCHEMA_VERSION {
                    return Err(MuError::Incompatible {
                        stored: stored_version,
                        supported: SCHEMA_VERSION,
                    });
                }
            }
            None if writing => {
                self.conn.execute(
                    "INSERT INTO metadata (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
            }
            None => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run an integrity check on the underlying database file.
    pub fn check_integrity(&self) -> MuResult<bool> {
        let result: String =
            self.conn
                .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Raw connection access for subsystems that need bespoke queries
    /// (patterns, temporal). Prefer adding a method here instead.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `f` inside one transaction; rolled back if `f` returns `Err`.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> MuResult<T>) -> MuResult<T> {
        let tx = self.conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Node / edge CRUD
    // ------------------------------------------------------------------

    /// Upsert a single node outside of an explicit transaction.
    pub fn upsert_node(&self, node: &Node) -> MuResult<()> {
        upsert_node_tx(&self.conn, node)
    }

    /// Upsert many nodes within one transaction (atomic build, §4.1).
    pub fn upsert_nodes(&mut self, nodes: &[Node]) -> MuResult<()> {
        self.transaction(|tx| {
            for node in nodes {
                upsert_node_tx(tx, node)?;
            }
            Ok(())
        })
    }

    pub fn upsert_edge(&self, edge: &Edge) -> MuResult<()> {
        upsert_edge_tx(&self.conn, edge)
    }

    pub fn upsert_edges(&mut self, edges: &[Edge]) -> MuResult<()> {
        self.transaction(|tx| {
            for edge in edges {
                upsert_edge_tx(tx, edge)?;
            }
            Ok(())
        })
    }

    pub fn delete_node(&self, id: &str) -> MuResult<()> {
        self.conn
            .execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn delete_edge(&self, id: &str) -> MuResult<()> {
        self.conn
            .execute("DELETE FROM edges WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Delete every edge that references `node_id` as source or target.
    pub fn delete_edges_touching(&self, node_id: &str) -> MuResult<usize> {
        let n = self.conn.execute(
            "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
            params![node_id],
        )?;
        Ok(n)
    }

    pub fn get_node(&self, id: &str) -> MuResult<Option<Node>> {
        self.conn
            .query_row(
                "SELECT id, type, name, qualified_name, file_path, line_start, line_end, \
                 properties, complexity FROM nodes WHERE id = ?1",
                params![id],
                row_to_node,
            )
            .optional()
            .map_err(MuError::Database)
    }

    pub fn has_node(&self, id: &str) -> MuResult<bool> {
        Ok(self.get_node(id)?.is_some())
    }

    /// All nodes whose `file_path` equals the given path.
    pub fn nodes_in_file(&self, file_path: &str) -> MuResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, type, name, qualified_name, file_path, line_start, line_end, \
             properties, complexity FROM nodes WHERE file_path = ?1",
        )?;
        let rows = stmt
            .query_map(params![file_path], row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Find a node by exact name, preferring code nodes over externals.
    pub fn find_node_by_name(&self, name: &str) -> MuResult<Option<Node>> {
        self.conn
            .query_row(
                "SELECT id, type, name, qualified_name, file_path, line_start, line_end, \
                 properties, complexity FROM nodes WHERE name = ?1 OR qualified_name = ?1 \
                 ORDER BY (type = 'external') ASC LIMIT 1",
                params![name],
                row_to_node,
            )
            .optional()
            .map_err(MuError::Database)
    }

    /// Every edge whose source or target is `node_id`, used by the Graph
    /// Engine's loader and by proximity BFS in the context extractor.
    pub fn edges_touching(&self, node_id: &str) -> MuResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, target_id, type, properties FROM edges \
             WHERE source_id = ?1 OR target_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![node_id], row_to_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Bulk-read all nodes (id only is the common case; full rows here).
    /// Used by the Graph Engine to hydrate its in-memory graph.
    pub fn all_nodes(&self) -> MuResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, type, name, qualified_name, file_path, line_start, line_end, \
             properties, complexity FROM nodes",
        )?;
        let rows = stmt
            .query_map([], row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Bulk-read all `(source, target, type)` triples.
    pub fn all_edges(&self) -> MuResult<Vec<Edge>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, source_id, target_id, type, properties FROM edges")?;
        let rows = stmt
            .query_map([], row_to_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn node_count(&self) -> MuResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?)
    }

    pub fn edge_count(&self) -> MuResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?)
    }

    /// Garbage-collect external nodes with no remaining incoming `imports` edge.
    pub fn gc_unreferenced_externals(&self) -> MuResult<usize> {
        let n = self.conn.execute(
            "DELETE FROM nodes WHERE type = 'external' AND id NOT IN \
             (SELECT target_id FROM edges WHERE type = 'imports')",
            [],
        )?;
        Ok(n)
    }
}

/// Path of the sidecar lock file for a mubase at `path`, kept alongside the
/// `.mubase` file rather than inside it so it survives independent of the
/// SQLite file's own lifecycle.
fn lock_file_path(path: &Path) -> PathBuf {
    let mut lock_path = path.to_path_buf();
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    lock_path.set_file_name(format!("{file_name}.lock"));
    lock_path
}

fn upsert_node_tx(conn: &Connection, node: &Node) -> MuResult<()> {
    conn.execute(
        "INSERT INTO nodes (id, type, name, qualified_name, file_path, line_start, line_end, \
         properties, complexity) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         ON CONFLICT(id) DO UPDATE SET \
         type=excluded.type, name=excluded.name, qualified_name=excluded.qualified_name, \
         file_path=excluded.file_path, line_start=excluded.line_start, \
         line_end=excluded.line_end, properties=excluded.properties, \
         complexity=excluded.complexity",
        params![
            node.id,
            node.node_type.as_str(),
            node.name,
            node.qualified_name,
            node.file_path,
            node.line_start,
            node.line_end,
            node.properties.to_string(),
            node.complexity,
        ],
    )?;
    Ok(())
}

fn upsert_edge_tx(conn: &Connection, edge: &Edge) -> MuResult<()> {
    conn.execute(
        "INSERT INTO edges (id, source_id, target_id, type, properties) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(id) DO UPDATE SET properties=excluded.properties",
        params![
            edge.id,
            edge.source_id,
            edge.target_id,
            edge.edge_type.as_str(),
            edge.properties.to_string(),
        ],
    )?;
    Ok(())
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let type_str: String = row.get(1)?;
    let props_str: String = row.get(7)?;
    Ok(Node {
        id: row.get(0)?,
        node_type: NodeType::from_str_lossy(&type_str).unwrap_or(NodeType::External),
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        file_path: row.get(4)?,
        line_start: row.get(5)?,
        line_end: row.get(6)?,
        properties: serde_json::from_str::<Json>(&props_str).unwrap_or(Json::Null),
        complexity: row.get(8)?,
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let type_str: String = row.get(3)?;
    let props_str: String = row.get(4)?;
    Ok(Edge {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        edge_type: EdgeType::from_str_lossy(&type_str).unwrap_or(EdgeType::Imports),
        properties: serde_json::from_str::<Json>(&props_str).unwrap_or(Json::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{node_id, NodeType};
    use serde_json::json;

    fn sample_node(id: &str, name: &str) -> Node {
        Node {
            id: id.to_string(),
            node_type: NodeType::Function,
            name: name.to_string(),
            qualified_name: Some(name.to_string()),
            file_path: Some("src/a.py".to_string()),
            line_start: Some(1),
            line_end: Some(2),
            properties: json!({}),
            complexity: 3,
        }
    }

    #[test]
    fn test_open_write_creates_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_write(&dir.path().join("test.mubase")).expect("open");
        assert!(store.check_integrity().expect("integrity"));
    }

    #[test]
    fn test_upsert_and_get_node() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_write(&dir.path().join("t.mubase")).expect("open");
        let node = sample_node("fn:src/a.py:foo", "foo");
        store.upsert_node(&node).expect("upsert");
        let fetched = store.get_node("fn:src/a.py:foo").expect("get").expect("present");
        assert_eq!(fetched.name, "foo");
    }

    #[test]
    fn test_second_writer_is_locked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.mubase");
        let _first = Store::open_write(&path).expect("first writer");
        let second = Store::open_write(&path);
        assert!(matches!(second, Err(MuError::Locked { .. })));
    }

    #[test]
    fn test_incompatible_schema_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.mubase");
        {
            let store = Store::open_write(&path).expect("open");
            store
                .connection()
                .execute(
                    "UPDATE metadata SET value = ?1 WHERE key = 'schema_version'",
                    params![(SCHEMA_VERSION + 1).to_string()],
                )
                .expect("bump version");
        }
        let reopened = Store::open_write(&path);
        assert!(matches!(reopened, Err(MuError::Incompatible { .. })));
    }

    #[test]
    fn test_unchanged_rebuild_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open_write(&dir.path().join("t.mubase")).expect("open");
        let node = sample_node("fn:src/a.py:foo", "foo");
        store.upsert_nodes(&[node.clone()]).expect("first upsert");
        let before = store.node_count().expect("count");
        store.upsert_nodes(&[node]).expect("second upsert, same content");
        let after = store.node_count().expect("count");
        assert_eq!(before, after);
    }

    #[test]
    fn test_node_id_contains_file_path() {
        assert_eq!(
            node_id(NodeType::Module, "src/auth.py", None),
            "mod:src/auth.py"
        );
    }

    #[test]
    fn test_gc_unreferenced_externals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_write(&dir.path().join("t.mubase")).expect("open");
        let ext = Node {
            id: "ext:os".to_string(),
            node_type: NodeType::External,
            name: "os".to_string(),
            qualified_name: None,
            file_path: None,
            line_start: None,
            line_end: None,
            properties: json!({}),
            complexity: 0,
        };
        store.upsert_node(&ext).expect("upsert external");
        let removed = store.gc_unreferenced_externals().expect("gc");
        assert_eq!(removed, 1);
        assert!(store.get_node("ext:os").expect("get").is_none());
    }
}
