//! Core domain types: nodes, edges, and the records layered on top of them
//! (embeddings, snapshots, history, patterns).
//!
//! Identifiers are constructed deterministically so that rebuilding the
//! graph over unchanged source produces identical ids (invariant 4, §3).

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// A source file / module.
    Module,
    /// A class definition.
    Class,
    /// A function or method definition.
    Function,
    /// An import target outside the indexed tree.
    External,
}

impl NodeType {
    /// Short prefix used in node identifiers (`mod`, `cls`, `fn`, `ext`).
    #[must_use]
    pub fn id_prefix(self) -> &'static str {
        match self {
            NodeType::Module => "mod",
            NodeType::Class => "cls",
            NodeType::Function => "fn",
            NodeType::External => "ext",
        }
    }

    /// Parse from the lowercase string used in MUQL virtual table names.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "module" | "modules" => Some(NodeType::Module),
            "class" | "classes" => Some(NodeType::Class),
            "function" | "functions" => Some(NodeType::Function),
            "external" => Some(NodeType::External),
            _ => None,
        }
    }

    /// The string stored in `nodes.type`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Module => "module",
            NodeType::Class => "class",
            NodeType::Function => "function",
            NodeType::External => "external",
        }
    }
}

/// The kind of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Parent-to-child structural containment (module->class, class->function).
    Contains,
    /// Module-to-module or module-to-external reference.
    Imports,
    /// Class-to-class base relationship.
    Inherits,
}

impl EdgeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Contains => "contains",
            EdgeType::Imports => "imports",
            EdgeType::Inherits => "inherits",
        }
    }

    #[must_use]
    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "contains" => Some(EdgeType::Contains),
            "imports" => Some(EdgeType::Imports),
            "inherits" => Some(EdgeType::Inherits),
            _ => None,
        }
    }
}

/// A node in the mubase graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Deterministic identifier, see [`node_id`].
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
    pub qualified_name: Option<String>,
    /// Absent only for `external` nodes.
    pub file_path: Option<String>,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    /// Language-neutral property bag (bases, decorators, parameters, docstring...).
    pub properties: Json,
    pub complexity: u32,
}

/// An edge in the mubase graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Deterministic identifier, see [`edge_id`].
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub properties: Json,
}

/// Build the deterministic node id for a code node.
///
/// `mod:src/auth.py`, `fn:src/auth.py:login`, `cls:src/auth.py:AuthService`.
#[must_use]
pub fn node_id(node_type: NodeType, file_path: &str, qualified_name: Option<&str>) -> String {
    match qualified_name {
        Some(qn) if !qn.is_empty() => format!("{}:{file_path}:{qn}", node_type.id_prefix()),
        _ => format!("{}:{file_path}", node_type.id_prefix()),
    }
}

/// Build the deterministic node id for an external (unresolved import target).
#[must_use]
pub fn external_node_id(import_target: &str) -> String {
    format!("ext:{import_target}")
}

/// Build the deterministic edge id from its defining triple.
///
/// Edge ids do not need to be globally unguessable, only stable and unique
/// per `(source, target, type)` per the `UNIQUE` constraint in §4.1.
#[must_use]
pub fn edge_id(source_id: &str, target_id: &str, edge_type: EdgeType) -> String {
    format!("{}:{source_id}->{target_id}", edge_type.as_str())
}

// ---------------------------------------------------------------------------
// ModuleDef input contract (§6) — the shape external parsers deliver.
// ---------------------------------------------------------------------------

/// One parsed source file, as handed to the Incremental Builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    pub path: String,
    pub language: String,
    pub imports: Vec<ImportDef>,
    pub classes: Vec<ClassDef>,
    pub functions: Vec<FunctionDef>,
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDef {
    /// The module string being imported, e.g. `os.path` or `./utils`.
    pub module: String,
    /// Named items imported (empty for a bare `import module`).
    pub names: Vec<String>,
    pub alias: Option<String>,
    /// True for `from X import Y` style imports.
    pub is_from: bool,
    pub is_dynamic: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<String>,
    pub decorators: Vec<String>,
    pub docstring: Option<String>,
    pub line_start: u32,
    pub line_end: u32,
    pub methods: Vec<FunctionDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub decorators: Vec<String>,
    pub is_async: bool,
    pub is_static: bool,
    pub is_classmethod: bool,
    pub is_property: bool,
    pub docstring: Option<String>,
    /// AST node count of the body subtree — see SPEC_FULL.md §9 open question.
    pub complexity: u32,
    pub line_start: u32,
    pub line_end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_hint: Option<String>,
    pub default: Option<String>,
}

// ---------------------------------------------------------------------------
// Embedding, Snapshot, History
// ---------------------------------------------------------------------------

/// An embedding vector cached against a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub node_id: String,
    pub model_name: String,
    pub model_version: String,
    pub dimensions: u32,
    pub code_vector: Option<Vec<f32>>,
    pub docstring_vector: Option<Vec<f32>>,
    pub name_vector: Option<Vec<f32>>,
    pub created_at: String,
}

/// A named point in time, conventionally a VCS commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub author: String,
    pub created_at: String,
    pub node_count: u32,
    pub edge_count: u32,
}

/// The kind of change a history record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

/// Per-node change record attached to a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHistory {
    pub snapshot_id: String,
    pub node_id: String,
    pub change: ChangeKind,
    pub before_hash: Option<String>,
    pub after_hash: Option<String>,
    pub author: String,
    pub commit_message: String,
}

/// Per-edge change record attached to a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeHistory {
    pub snapshot_id: String,
    pub edge_id: String,
    pub change: ChangeKind,
    pub author: String,
    pub commit_message: String,
}

// ---------------------------------------------------------------------------
// Pattern / Memory / CodebaseStat — auxiliary, cache-like (§3).
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub description: String,
    pub category: String,
    pub file_count: u32,
    pub examples: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub note: String,
    pub created_at: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebaseStat {
    pub key: String,
    pub value: Json,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_shapes() {
        assert_eq!(
            node_id(NodeType::Module, "src/auth.py", None),
            "mod:src/auth.py"
        );
        assert_eq!(
            node_id(NodeType::Function, "src/auth.py", Some("AuthService.login")),
            "fn:src/auth.py:AuthService.login"
        );
        assert_eq!(external_node_id("os.path"), "ext:os.path");
    }

    #[test]
    fn test_node_id_stable_across_calls() {
        let a = node_id(NodeType::Class, "src/auth.py", Some("AuthService"));
        let b = node_id(NodeType::Class, "src/auth.py", Some("AuthService"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_edge_id_unique_per_triple() {
        let a = edge_id("mod:a.py", "mod:b.py", EdgeType::Imports);
        let b = edge_id("mod:a.py", "mod:b.py", EdgeType::Inherits);
        assert_ne!(a, b);
    }

    #[test]
    fn test_node_type_roundtrip() {
        for t in [
            NodeType::Module,
            NodeType::Class,
            NodeType::Function,
            NodeType::External,
        ] {
            assert_eq!(NodeType::from_str_lossy(t.as_str()), Some(t));
        }
    }
}
