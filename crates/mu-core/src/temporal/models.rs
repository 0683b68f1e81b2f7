//! Record types returned by the temporal subsystem.

use serde::{Deserialize, Serialize};

/// Git commit metadata stamped onto a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitMetadata {
    pub hash: String,
    pub message: String,
    pub author: String,
    /// RFC 3339 / ISO 8601 commit timestamp.
    pub timestamp: String,
}

/// How a node or edge's presence changed between two adjacent snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    /// Present at this snapshot but unchanged since the previous one.
    /// Stored so two arbitrary snapshots can be diffed directly; filtered
    /// out of [`crate::temporal::history`] and [`crate::temporal::blame`].
    Unchanged,
}

impl ChangeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
            ChangeKind::Unchanged => "unchanged",
        }
    }

    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "added" => ChangeKind::Added,
            "modified" => ChangeKind::Modified,
            "removed" => ChangeKind::Removed,
            _ => ChangeKind::Unchanged,
        }
    }
}

/// Summary row for a single snapshot, as listed by `mu kernel snapshots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub author: String,
    pub created_at: String,
    pub node_count: u64,
    pub edge_count: u64,
    pub nodes_added: u64,
    pub nodes_modified: u64,
    pub nodes_removed: u64,
}

/// One entry in a node's chronological history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub commit_hash: String,
    pub change: ChangeKind,
    pub author: String,
    pub commit_message: String,
    pub created_at: String,
}

/// The most recent snapshot that changed a single property of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlameRecord {
    pub property: String,
    pub commit_hash: String,
    pub author: String,
    pub commit_message: String,
    pub created_at: String,
}

/// One node's change between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDiff {
    pub node_id: String,
    pub name: String,
    pub node_type: String,
    pub file_path: Option<String>,
    pub change: ChangeKind,
}

/// One edge's change between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDiff {
    pub edge_id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: String,
    pub change: ChangeKind,
}

/// Node-set and edge-set differences between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDiff {
    pub from_commit: String,
    pub to_commit: String,
    pub nodes: Vec<NodeDiff>,
    pub edges: Vec<EdgeDiff>,
    pub nodes_added: usize,
    pub nodes_modified: usize,
    pub nodes_removed: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
}

impl GraphDiff {
    #[must_use]
    pub(crate) fn new(from_commit: String, to_commit: String, nodes: Vec<NodeDiff>, edges: Vec<EdgeDiff>) -> Self {
        let nodes_added = nodes.iter().filter(|n| n.change == ChangeKind::Added).count();
        let nodes_modified = nodes.iter().filter(|n| n.change == ChangeKind::Modified).count();
        let nodes_removed = nodes.iter().filter(|n| n.change == ChangeKind::Removed).count();
        let edges_added = edges.iter().filter(|e| e.change == ChangeKind::Added).count();
        let edges_removed = edges.iter().filter(|e| e.change == ChangeKind::Removed).count();
        Self {
            from_commit,
            to_commit,
            nodes,
            edges,
            nodes_added,
            nodes_modified,
            nodes_removed,
            edges_added,
            edges_removed,
        }
    }
}

/// Result of a range diff: either one combined diff or a per-adjacent-pair
/// series, depending on `include_intermediate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffRangeResult {
    Single(GraphDiff),
    Series(Vec<GraphDiff>),
}
