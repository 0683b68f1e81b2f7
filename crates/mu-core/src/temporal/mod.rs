//! Temporal subsystem: Snapshot, History, Blame, Diff.
//!
//! A snapshot records every currently-live node and edge's content hash
//! alongside git commit metadata. Recording is dense (every live node gets
//! a row at every snapshot, marked `unchanged` when nothing moved) rather
//! than sparse, so [`diff`] can compare two arbitrary snapshots directly
//! without replaying everything in between.

pub mod diff;
mod git;
mod hash;
pub mod models;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use rusqlite::{params, OptionalExtension};

use crate::error::{MuError, MuResult};
use crate::model::{Edge, Node};
use crate::store::Store;

pub use diff::{diff, diff_range};
pub use git::read_commit_metadata;
pub use models::{
    BlameRecord, ChangeKind, CommitMetadata, DiffRangeResult, EdgeDiff, GraphDiff, HistoryRecord,
    NodeDiff, SnapshotSummary,
};

/// Create a snapshot of the current graph state at `commit_ref` (HEAD when
/// `None`). Idempotent: returns [`MuError::AlreadyExists`] if `commit_ref`
/// already has a snapshot, unless `force` replaces it.
pub fn create_snapshot(
    store: &mut Store,
    repo_path: &Path,
    commit_ref: Option<&str>,
    force: bool,
) -> MuResult<SnapshotSummary> {
    let commit = git::read_commit_metadata(repo_path, commit_ref)?;

    let existing: Option<String> = store
        .connection()
        .query_row(
            "SELECT id FROM snapshots WHERE commit_hash = ?1",
            params![commit.hash],
            |row| row.get(0),
        )
        .optional()?;

    if existing.is_some() && !force {
        return Err(MuError::AlreadyExists {
            entity: format!("snapshot for commit {}", commit.hash),
        });
    }

    if let Some(old_id) = &existing {
        store.transaction(|tx| {
            tx.execute("DELETE FROM node_history WHERE snapshot_id = ?1", params![old_id])?;
            tx.execute("DELETE FROM edge_history WHERE snapshot_id = ?1", params![old_id])?;
            tx.execute("DELETE FROM snapshots WHERE id = ?1", params![old_id])?;
            Ok(())
        })?;
    }

    let previous_snapshot_id: Option<String> = store
        .connection()
        .query_row(
            "SELECT id FROM snapshots ORDER BY created_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let mut previous_nodes: HashMap<String, String> = HashMap::new();
    let mut previous_edges: HashSet<String> = HashSet::new();
    if let Some(prev_id) = &previous_snapshot_id {
        let conn = store.connection();
        let mut stmt = conn.prepare(
            "SELECT node_id, after_hash FROM node_history WHERE snapshot_id = ?1 AND change != 'removed'",
        )?;
        previous_nodes = stmt
            .query_map(params![prev_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .filter_map(std::result::Result::ok)
            .filter_map(|(id, hash)| hash.map(|h| (id, h)))
            .collect();

        let mut stmt = conn.prepare(
            "SELECT edge_id FROM edge_history WHERE snapshot_id = ?1 AND change != 'removed'",
        )?;
        previous_edges = stmt
            .query_map(params![prev_id], |row| row.get::<_, String>(0))?
            .filter_map(std::result::Result::ok)
            .collect();
    }

    let current_nodes = store.all_nodes()?;
    let current_edges = store.all_edges()?;
    let current_node_ids: HashSet<&str> = current_nodes.iter().map(|n| n.id.as_str()).collect();
    let current_edge_ids: HashSet<&str> = current_edges.iter().map(|e| e.id.as_str()).collect();

    let snapshot_id = commit.hash.clone();
    let mut nodes_added = 0u64;
    let mut nodes_modified = 0u64;
    let mut nodes_removed = 0u64;

    store.transaction(|tx| {
        tx.execute(
            "INSERT INTO snapshots (id, commit_hash, commit_message, author, created_at, node_count, edge_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                snapshot_id,
                commit.hash,
                commit.message,
                commit.author,
                commit.timestamp,
                current_nodes.len() as i64,
                current_edges.len() as i64,
            ],
        )?;

        for node in &current_nodes {
            let after_hash = hash::content_hash(node);
            let prop_hashes = serde_json::to_string(&hash::property_hashes(node))
                .map_err(|e| MuError::Serialization(e.to_string()))?;
            let before_hash = previous_nodes.get(&node.id).cloned();
            let change = match &before_hash {
                None => {
                    nodes_added += 1;
                    ChangeKind::Added
                }
                Some(prev) if *prev == after_hash => ChangeKind::Unchanged,
                Some(_) => {
                    nodes_modified += 1;
                    ChangeKind::Modified
                }
            };
            tx.execute(
                "INSERT INTO node_history \
                 (snapshot_id, node_id, change, before_hash, after_hash, property_hashes, author, commit_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    snapshot_id,
                    node.id,
                    change.as_str(),
                    before_hash,
                    after_hash,
                    prop_hashes,
                    commit.author,
                    commit.message,
                ],
            )?;
        }

        for (removed_id, before_hash) in &previous_nodes {
            if !current_node_ids.contains(removed_id.as_str()) {
                nodes_removed += 1;
                tx.execute(
                    "INSERT INTO node_history \
                     (snapshot_id, node_id, change, before_hash, after_hash, property_hashes, author, commit_message) \
                     VALUES (?1, ?2, 'removed', ?3, NULL, NULL, ?4, ?5)",
                    params![snapshot_id, removed_id, before_hash, commit.author, commit.message],
                )?;
            }
        }

        for edge in &current_edges {
            let change = if previous_edges.contains(&edge.id) {
                ChangeKind::Unchanged
            } else {
                ChangeKind::Added
            };
            tx.execute(
                "INSERT INTO edge_history (snapshot_id, edge_id, change, author, commit_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![snapshot_id, edge.id, change.as_str(), commit.author, commit.message],
            )?;
        }

        for removed_id in &previous_edges {
            if !current_edge_ids.contains(removed_id.as_str()) {
                tx.execute(
                    "INSERT INTO edge_history (snapshot_id, edge_id, change, author, commit_message) \
                     VALUES (?1, ?2, 'removed', ?3, ?4)",
                    params![snapshot_id, removed_id, commit.author, commit.message],
                )?;
            }
        }

        Ok(())
    })?;

    Ok(SnapshotSummary {
        id: snapshot_id,
        commit_hash: commit.hash,
        commit_message: commit.message,
        author: commit.author,
        created_at: commit.timestamp,
        node_count: current_nodes.len() as u64,
        edge_count: current_edges.len() as u64,
        nodes_added,
        nodes_modified,
        nodes_removed,
    })
}

/// List snapshots most-recent-first.
pub fn list_snapshots(store: &Store, limit: u32) -> MuResult<Vec<SnapshotSummary>> {
    let conn = store.connection();
    let mut stmt = conn.prepare(
        "SELECT s.id, s.commit_hash, s.commit_message, s.author, s.created_at, s.node_count, s.edge_count, \
                (SELECT COUNT(*) FROM node_history h WHERE h.snapshot_id = s.id AND h.change = 'added'), \
                (SELECT COUNT(*) FROM node_history h WHERE h.snapshot_id = s.id AND h.change = 'modified'), \
                (SELECT COUNT(*) FROM node_history h WHERE h.snapshot_id = s.id AND h.change = 'removed') \
         FROM snapshots s ORDER BY s.created_at DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(SnapshotSummary {
                id: row.get(0)?,
                commit_hash: row.get(1)?,
                commit_message: row.get(2)?,
                author: row.get(3)?,
                created_at: row.get(4)?,
                node_count: row.get::<_, i64>(5)? as u64,
                edge_count: row.get::<_, i64>(6)? as u64,
                nodes_added: row.get::<_, i64>(7)? as u64,
                nodes_modified: row.get::<_, i64>(8)? as u64,
                nodes_removed: row.get::<_, i64>(9)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Chronological history of a node, most-recent-first, `unchanged` entries
/// omitted.
pub fn history(store: &Store, node_id: &str, limit: u32) -> MuResult<Vec<HistoryRecord>> {
    let conn = store.connection();
    let mut stmt = conn.prepare(
        "SELECT s.commit_hash, h.change, h.author, h.commit_message, s.created_at \
         FROM node_history h JOIN snapshots s ON h.snapshot_id = s.id \
         WHERE h.node_id = ?1 AND h.change != 'unchanged' \
         ORDER BY s.created_at DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![node_id, limit], |row| {
            Ok(HistoryRecord {
                commit_hash: row.get(0)?,
                change: ChangeKind::from_str_lossy(&row.get::<_, String>(1)?),
                author: row.get(2)?,
                commit_message: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// For every property this node has ever carried, the most recent snapshot
/// whose `property_hashes` entry for that key differs from the value it
/// carried at the immediately preceding snapshot.
pub fn blame(store: &Store, node_id: &str) -> MuResult<HashMap<String, BlameRecord>> {
    let conn = store.connection();
    let mut stmt = conn.prepare(
        "SELECT s.commit_hash, h.author, h.commit_message, s.created_at, h.property_hashes \
         FROM node_history h JOIN snapshots s ON h.snapshot_id = s.id \
         WHERE h.node_id = ?1 AND h.change != 'removed' \
         ORDER BY s.created_at ASC",
    )?;
    let rows: Vec<(String, String, String, String, Option<String>)> = stmt
        .query_map(params![node_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut last_seen: HashMap<String, String> = HashMap::new();
    let mut blame: HashMap<String, BlameRecord> = HashMap::new();

    for (commit_hash, author, commit_message, created_at, prop_hashes_json) in rows {
        let Some(json) = prop_hashes_json else { continue };
        let Ok(prop_hashes) = serde_json::from_str::<BTreeMap<String, String>>(&json) else {
            continue;
        };
        for (property, current_hash) in prop_hashes {
            let changed = last_seen
                .get(&property)
                .is_none_or(|prev| prev != &current_hash);
            if changed {
                blame.insert(
                    property.clone(),
                    BlameRecord {
                        property,
                        commit_hash: commit_hash.clone(),
                        author: author.clone(),
                        commit_message: commit_message.clone(),
                        created_at: created_at.clone(),
                    },
                );
            }
            last_seen.insert(property, current_hash);
        }
    }

    Ok(blame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassDef, FunctionDef, ImportDef, ModuleDef};

    fn init_repo(dir: &std::path::Path, message: &str) -> String {
        std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir)
            .status()
            .expect("git init");
        std::process::Command::new("git")
            .args(["config", "user.email", "a@example.com"])
            .current_dir(dir)
            .status()
            .expect("git config email");
        std::process::Command::new("git")
            .args(["config", "user.name", "A"])
            .current_dir(dir)
            .status()
            .expect("git config name");
        std::fs::write(dir.join("README.md"), "hi").expect("write");
        std::process::Command::new("git")
            .args(["add", "."])
            .current_dir(dir)
            .status()
            .expect("git add");
        std::process::Command::new("git")
            .args(["commit", "-q", "-m", message])
            .current_dir(dir)
            .status()
            .expect("git commit");
        let out = std::process::Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir)
            .output()
            .expect("rev-parse");
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    fn module(docstring: &str) -> ModuleDef {
        ModuleDef {
            name: "auth".to_string(),
            path: "auth.py".to_string(),
            language: "python".to_string(),
            imports: vec![ImportDef {
                module: "os".to_string(),
                names: vec![],
                alias: None,
                is_from: false,
                is_dynamic: false,
                line: 1,
            }],
            classes: vec![ClassDef {
                name: "AuthService".to_string(),
                bases: vec![],
                decorators: vec![],
                docstring: Some(docstring.to_string()),
                line_start: 1,
                line_end: 10,
                methods: vec![FunctionDef {
                    name: "login".to_string(),
                    parameters: vec![],
                    return_type: None,
                    decorators: vec![],
                    is_async: false,
                    is_static: false,
                    is_classmethod: false,
                    is_property: false,
                    docstring: None,
                    complexity: 1,
                    line_start: 2,
                    line_end: 4,
                }],
            }],
            functions: vec![],
            docstring: None,
        }
    }

    #[test]
    fn test_snapshot_is_idempotent_without_force() {
        let repo = tempfile::tempdir().expect("repo dir");
        let hash = init_repo(repo.path(), "init");
        let db_dir = tempfile::tempdir().expect("db dir");
        let mut store = Store::open_write(&db_dir.path().join("mu.db")).expect("open");
        crate::builder::build_module(&mut store, &module("v1")).expect("build");

        let first = create_snapshot(&mut store, repo.path(), None, false).expect("first snapshot");
        assert_eq!(first.commit_hash, hash);
        assert_eq!(first.nodes_added, 3); // module, class, function

        let second = create_snapshot(&mut store, repo.path(), None, false);
        assert!(matches!(second, Err(MuError::AlreadyExists { .. })));
    }

    #[test]
    fn test_snapshot_force_replaces_existing() {
        let repo = tempfile::tempdir().expect("repo dir");
        init_repo(repo.path(), "init");
        let db_dir = tempfile::tempdir().expect("db dir");
        let mut store = Store::open_write(&db_dir.path().join("mu.db")).expect("open");
        crate::builder::build_module(&mut store, &module("v1")).expect("build");
        create_snapshot(&mut store, repo.path(), None, false).expect("first snapshot");

        let replaced = create_snapshot(&mut store, repo.path(), None, true).expect("forced snapshot");
        assert_eq!(replaced.node_count, 3);
    }

    #[test]
    fn test_second_snapshot_after_change_reports_modified() {
        let repo = tempfile::tempdir().expect("repo dir");
        init_repo(repo.path(), "first commit");
        let db_dir = tempfile::tempdir().expect("db dir");
        let mut store = Store::open_write(&db_dir.path().join("mu.db")).expect("open");
        crate::builder::build_module(&mut store, &module("v1")).expect("build");
        create_snapshot(&mut store, repo.path(), None, false).expect("first snapshot");

        crate::builder::build_module(&mut store, &module("v2")).expect("rebuild");
        std::fs::write(repo.path().join("README.md"), "bye").expect("write");
        std::process::Command::new("git")
            .args(["commit", "-a", "-q", "-m", "second"])
            .current_dir(repo.path())
            .status()
            .expect("commit");

        let second = create_snapshot(&mut store, repo.path(), None, false).expect("second snapshot");
        assert_eq!(second.nodes_modified, 1); // only the class's docstring changed
        assert_eq!(second.nodes_added, 0);

        let class_id = "cls:auth.py:AuthService";
        let hist = history(&store, class_id, 10).expect("history");
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[0].change, ChangeKind::Modified);

        let blame_info = blame(&store, class_id).expect("blame");
        let docstring_blame = blame_info.get("properties.docstring").expect("docstring blame");
        assert_eq!(docstring_blame.commit_hash, second.commit_hash);
    }
}
