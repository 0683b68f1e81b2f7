//! Content hashing for change detection, grounded on `pipeline::compute_file_hash`'s
//! SHA-256-over-bytes idiom.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use serde_json::Value as Json;

use crate::model::Node;

fn hash_str(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Per-property content hashes for a node: its identity fields plus every
/// top-level key in its `properties` bag, each under a `properties.` prefix.
/// A `BTreeMap` keeps iteration order (and therefore [`content_hash`])
/// deterministic across runs.
#[must_use]
pub fn property_hashes(node: &Node) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), hash_str(&node.name));
    if let Some(qn) = &node.qualified_name {
        map.insert("qualified_name".to_string(), hash_str(qn));
    }
    if let Some(path) = &node.file_path {
        map.insert("file_path".to_string(), hash_str(path));
    }
    map.insert("complexity".to_string(), hash_str(&node.complexity.to_string()));

    if let Json::Object(obj) = &node.properties {
        for (key, value) in obj {
            map.insert(format!("properties.{key}"), hash_str(&value.to_string()));
        }
    }

    map
}

/// Whole-node content hash: the hash of every property hash, concatenated
/// in sorted key order. Two nodes with identical content hash the same
/// regardless of which snapshot produced them.
#[must_use]
pub fn content_hash(node: &Node) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in property_hashes(node) {
        hasher.update(key.as_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;
    use serde_json::json;

    fn node(docstring: &str) -> Node {
        Node {
            id: "cls:a.py:A".to_string(),
            node_type: NodeType::Class,
            name: "A".to_string(),
            qualified_name: Some("a.A".to_string()),
            file_path: Some("a.py".to_string()),
            line_start: Some(1),
            line_end: Some(10),
            properties: json!({ "docstring": docstring, "bases": [] }),
            complexity: 2,
        }
    }

    #[test]
    fn test_content_hash_stable_for_identical_nodes() {
        assert_eq!(content_hash(&node("hello")), content_hash(&node("hello")));
    }

    #[test]
    fn test_content_hash_changes_with_docstring() {
        assert_ne!(content_hash(&node("hello")), content_hash(&node("goodbye")));
    }

    #[test]
    fn test_property_hashes_isolates_changed_key() {
        let a = property_hashes(&node("hello"));
        let b = property_hashes(&node("goodbye"));
        assert_eq!(a.get("name"), b.get("name"));
        assert_ne!(a.get("properties.docstring"), b.get("properties.docstring"));
    }
}
