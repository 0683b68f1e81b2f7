//! Commit-to-commit diff, grounded on the dense per-snapshot row model: the
//! node/edge set alive at a snapshot is read directly off `node_history`/
//! `edge_history` for that `snapshot_id`, with no need to replay anything.

use std::collections::HashMap;

use rusqlite::params;

use crate::error::{MuError, MuResult};
use crate::store::Store;
use crate::temporal::models::{ChangeKind, EdgeDiff, GraphDiff, NodeDiff};

struct NodeSnapshotRow {
    name: String,
    node_type: String,
    file_path: Option<String>,
    after_hash: Option<String>,
}

struct EdgeSnapshotRow {
    source_id: String,
    target_id: String,
    edge_type: String,
}

fn snapshot_id_for_commit(store: &Store, commit: &str) -> MuResult<String> {
    store
        .connection()
        .query_row(
            "SELECT id FROM snapshots WHERE commit_hash = ?1 OR id = ?1",
            params![commit],
            |row| row.get(0),
        )
        .map_err(|_| MuError::NotFound {
            entity: format!("snapshot for commit {commit}"),
        })
}

fn nodes_at_snapshot(store: &Store, snapshot_id: &str) -> MuResult<HashMap<String, NodeSnapshotRow>> {
    let conn = store.connection();
    let mut stmt = conn.prepare(
        "SELECT nh.node_id, n.name, n.type, n.file_path, nh.after_hash \
         FROM node_history nh JOIN nodes n ON n.id = nh.node_id \
         WHERE nh.snapshot_id = ?1 AND nh.change != 'removed'",
    )?;
    let rows = stmt
        .query_map(params![snapshot_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                NodeSnapshotRow {
                    name: row.get(1)?,
                    node_type: row.get(2)?,
                    file_path: row.get(3)?,
                    after_hash: row.get(4)?,
                },
            ))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

fn edges_at_snapshot(store: &Store, snapshot_id: &str) -> MuResult<HashMap<String, EdgeSnapshotRow>> {
    let conn = store.connection();
    let mut stmt = conn.prepare(
        "SELECT eh.edge_id, e.source_id, e.target_id, e.type \
         FROM edge_history eh JOIN edges e ON e.id = eh.edge_id \
         WHERE eh.snapshot_id = ?1 AND eh.change != 'removed'",
    )?;
    let rows = stmt
        .query_map(params![snapshot_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                EdgeSnapshotRow {
                    source_id: row.get(1)?,
                    target_id: row.get(2)?,
                    edge_type: row.get(3)?,
                },
            ))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

fn diff_nodes(
    from: &HashMap<String, NodeSnapshotRow>,
    to: &HashMap<String, NodeSnapshotRow>,
) -> Vec<NodeDiff> {
    let mut out = Vec::new();

    for (id, row) in to {
        let change = match from.get(id) {
            None => ChangeKind::Added,
            Some(prev) if prev.after_hash == row.after_hash => ChangeKind::Unchanged,
            Some(_) => ChangeKind::Modified,
        };
        if change != ChangeKind::Unchanged {
            out.push(NodeDiff {
                node_id: id.clone(),
                name: row.name.clone(),
                node_type: row.node_type.clone(),
                file_path: row.file_path.clone(),
                change,
            });
        }
    }

    for (id, row) in from {
        if !to.contains_key(id) {
            out.push(NodeDiff {
                node_id: id.clone(),
                name: row.name.clone(),
                node_type: row.node_type.clone(),
                file_path: row.file_path.clone(),
                change: ChangeKind::Removed,
            });
        }
    }

    out
}

fn diff_edges(
    from: &HashMap<String, EdgeSnapshotRow>,
    to: &HashMap<String, EdgeSnapshotRow>,
) -> Vec<EdgeDiff> {
    let mut out = Vec::new();

    for (id, row) in to {
        if !from.contains_key(id) {
            out.push(EdgeDiff {
                edge_id: id.clone(),
                source_id: row.source_id.clone(),
                target_id: row.target_id.clone(),
                edge_type: row.edge_type.clone(),
                change: ChangeKind::Added,
            });
        }
    }

    for (id, row) in from {
        if !to.contains_key(id) {
            out.push(EdgeDiff {
                edge_id: id.clone(),
                source_id: row.source_id.clone(),
                target_id: row.target_id.clone(),
                edge_type: row.edge_type.clone(),
                change: ChangeKind::Removed,
            });
        }
    }

    out
}

/// Diff two snapshots identified by commit hash (or snapshot id).
pub fn diff(store: &Store, from_commit: &str, to_commit: &str) -> MuResult<GraphDiff> {
    let from_snapshot = snapshot_id_for_commit(store, from_commit)?;
    let to_snapshot = snapshot_id_for_commit(store, to_commit)?;

    let from_nodes = nodes_at_snapshot(store, &from_snapshot)?;
    let to_nodes = nodes_at_snapshot(store, &to_snapshot)?;
    let from_edges = edges_at_snapshot(store, &from_snapshot)?;
    let to_edges = edges_at_snapshot(store, &to_snapshot)?;

    let nodes = diff_nodes(&from_nodes, &to_nodes);
    let edges = diff_edges(&from_edges, &to_edges);

    Ok(GraphDiff::new(from_commit.to_string(), to_commit.to_string(), nodes, edges))
}

/// Diff a range of commits. When `include_intermediate` is false (the
/// default), returns a single combined diff between the endpoints. When
/// true, returns consecutive pairwise diffs across every snapshot whose
/// `created_at` falls within `[from_commit, to_commit]`'s timestamps,
/// falling back to a single diff when fewer than two snapshots fall in
/// range.
pub fn diff_range(
    store: &Store,
    from_commit: &str,
    to_commit: &str,
    include_intermediate: bool,
) -> MuResult<crate::temporal::models::DiffRangeResult> {
    use crate::temporal::models::DiffRangeResult;

    if !include_intermediate {
        return Ok(DiffRangeResult::Single(diff(store, from_commit, to_commit)?));
    }

    let from_snapshot = snapshot_id_for_commit(store, from_commit)?;
    let to_snapshot = snapshot_id_for_commit(store, to_commit)?;

    let conn = store.connection();
    let (from_date, to_date): (String, String) = conn.query_row(
        "SELECT MIN(a.created_at), MAX(b.created_at) FROM \
         (SELECT created_at FROM snapshots WHERE id = ?1) a, \
         (SELECT created_at FROM snapshots WHERE id = ?2) b",
        params![from_snapshot, to_snapshot],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let (lo, hi) = if from_date <= to_date {
        (from_date, to_date)
    } else {
        (to_date, from_date)
    };

    let mut stmt = conn.prepare(
        "SELECT commit_hash FROM snapshots WHERE created_at >= ?1 AND created_at <= ?2 ORDER BY created_at ASC",
    )?;
    let in_range: Vec<String> = stmt
        .query_map(params![lo, hi], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    if in_range.len() < 2 {
        return Ok(DiffRangeResult::Single(diff(store, from_commit, to_commit)?));
    }

    let mut series = Vec::with_capacity(in_range.len() - 1);
    for pair in in_range.windows(2) {
        series.push(diff(store, &pair[0], &pair[1])?);
    }
    Ok(DiffRangeResult::Series(series))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassDef, FunctionDef, ModuleDef};
    use crate::store::Store;
    use crate::temporal::create_snapshot;

    fn init_repo(dir: &std::path::Path) {
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
    }

    fn commit(dir: &std::path::Path, message: &str) -> String {
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

    fn module(with_helper: bool) -> ModuleDef {
        let mut functions = vec![];
        if with_helper {
            functions.push(FunctionDef {
                name: "helper".to_string(),
                parameters: vec![],
                return_type: None,
                decorators: vec![],
                is_async: false,
                is_static: false,
                is_classmethod: false,
                is_property: false,
                docstring: None,
                complexity: 1,
                line_start: 1,
                line_end: 2,
            });
        }
        ModuleDef {
            name: "svc".to_string(),
            path: "svc.py".to_string(),
            language: "python".to_string(),
            imports: vec![],
            classes: vec![ClassDef {
                name: "Service".to_string(),
                bases: vec![],
                decorators: vec![],
                docstring: None,
                line_start: 1,
                line_end: 5,
                methods: vec![],
            }],
            functions,
            docstring: None,
        }
    }

    #[test]
    fn test_diff_reports_added_nodes_between_commits() {
        let repo = tempfile::tempdir().expect("repo dir");
        init_repo(repo.path());
        std::fs::write(repo.path().join("README.md"), "v1").expect("write");
        let first_commit = commit(repo.path(), "first");

        let db_dir = tempfile::tempdir().expect("db dir");
        let mut store = Store::open_write(&db_dir.path().join("mu.db")).expect("open");
        crate::builder::build_module(&mut store, &module(false)).expect("build v1");
        create_snapshot(&mut store, repo.path(), None, false).expect("snapshot v1");

        crate::builder::build_module(&mut store, &module(true)).expect("build v2");
        std::fs::write(repo.path().join("README.md"), "v2").expect("write");
        let second_commit = commit(repo.path(), "second");
        create_snapshot(&mut store, repo.path(), None, false).expect("snapshot v2");

        let result = diff(&store, &first_commit, &second_commit).expect("diff");
        assert_eq!(result.nodes_added, 1);
        assert_eq!(result.nodes_removed, 0);
        assert!(result.nodes.iter().any(|n| n.name == "helper" && n.change == ChangeKind::Added));
    }

    #[test]
    fn test_diff_range_without_intermediate_returns_single() {
        let repo = tempfile::tempdir().expect("repo dir");
        init_repo(repo.path());
        std::fs::write(repo.path().join("README.md"), "v1").expect("write");
        let first_commit = commit(repo.path(), "first");

        let db_dir = tempfile::tempdir().expect("db dir");
        let mut store = Store::open_write(&db_dir.path().join("mu.db")).expect("open");
        crate::builder::build_module(&mut store, &module(false)).expect("build v1");
        create_snapshot(&mut store, repo.path(), None, false).expect("snapshot v1");

        std::fs::write(repo.path().join("README.md"), "v2").expect("write");
        let second_commit = commit(repo.path(), "second");
        create_snapshot(&mut store, repo.path(), None, false).expect("snapshot v2");

        let result = diff_range(&store, &first_commit, &second_commit, false).expect("diff_range");
        assert!(matches!(result, crate::temporal::models::DiffRangeResult::Single(_)));
    }
}
