//! The Incremental Builder: turns a parsed [`ModuleDef`] into node/edge
//! mutations against the [`Store`], diffing against whatever that file
//! previously contributed so that unrelated parts of the graph are left
//! untouched (§4.3).
//!
//! Import targets are resolved by name against nodes already in the
//! store; an unresolved import becomes an `external` node rather than a
//! dangling reference. Base-class targets are resolved the same way, but
//! an unresolved base has no module path to disambiguate it from an
//! unrelated class of the same name, so it is recorded as a property on
//! the subclass instead of synthesizing a node for it.

use std::collections::HashSet;

use serde_json::json;

use crate::error::MuResult;
use crate::model::{
    edge_id, external_node_id, node_id, ClassDef, Edge, EdgeType, FunctionDef, ModuleDef, Node,
    NodeType,
};
use crate::store::Store;

/// Outcome of building (or rebuilding) a single file.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BuildStats {
    pub nodes_added: usize,
    pub nodes_removed: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
}

/// Parse a [`ModuleDef`] into the node/edge set it contributes, diff that
/// against what the store already has for `module.path`, and commit the
/// difference in one transaction.
///
/// Idempotent: rebuilding over an unchanged `ModuleDef` upserts identical
/// rows and removes nothing (§8's rebuild-is-a-no-op property).
pub fn build_module(store: &mut Store, module: &ModuleDef) -> MuResult<BuildStats> {
    let (new_nodes, new_edges) = derive(store, module)?;

    let previous_nodes = store.nodes_in_file(&module.path)?;
    let previous_ids: HashSet<String> = previous_nodes.iter().map(|n| n.id.clone()).collect();
    let new_ids: HashSet<String> = new_nodes.iter().map(|n| n.id.clone()).collect();

    let mut previous_edges = Vec::new();
    for node in &previous_nodes {
        previous_edges.extend(store.edges_touching(&node.id)?);
    }
    let previous_edge_ids: HashSet<String> = previous_edges
        .iter()
        .filter(|e| previous_ids.contains(&e.source_id))
        .map(|e| e.id.clone())
        .collect();
    let new_edge_ids: HashSet<String> = new_edges.iter().map(|e| e.id.clone()).collect();

    let removed_node_ids: Vec<String> = previous_ids.difference(&new_ids).cloned().collect();
    let removed_edge_ids: Vec<String> = previous_edge_ids
        .difference(&new_edge_ids)
        .cloned()
        .collect();

    let stats = BuildStats {
        nodes_added: new_ids.difference(&previous_ids).count(),
        nodes_removed: removed_node_ids.len(),
        edges_added: new_edge_ids.difference(&previous_edge_ids).count(),
        edges_removed: removed_edge_ids.len(),
    };

    store.transaction(|tx| {
        for id in &removed_edge_ids {
            tx.execute("DELETE FROM edges WHERE id = ?1", rusqlite::params![id])?;
        }
        for id in &removed_node_ids {
            tx.execute(
                "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
                rusqlite::params![id],
            )?;
            tx.execute("DELETE FROM nodes WHERE id = ?1", rusqlite::params![id])?;
        }
        for node in &new_nodes {
            upsert_node(tx, node)?;
        }
        for edge in &new_edges {
            upsert_edge(tx, edge)?;
        }
        Ok(())
    })?;

    store.gc_unreferenced_externals()?;
    Ok(stats)
}

/// Remove every node this file previously contributed, e.g. when the file
/// itself was deleted from disk.
pub fn remove_module(store: &mut Store, path: &str) -> MuResult<BuildStats> {
    let previous_nodes = store.nodes_in_file(path)?;
    let removed_node_ids: Vec<String> = previous_nodes.iter().map(|n| n.id.clone()).collect();
    let mut removed_edges = 0usize;

    store.transaction(|tx| {
        for id in &removed_node_ids {
            removed_edges += tx.execute(
                "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
                rusqlite::params![id],
            )?;
            tx.execute("DELETE FROM nodes WHERE id = ?1", rusqlite::params![id])?;
        }
        Ok(())
    })?;

    store.gc_unreferenced_externals()?;
    Ok(BuildStats {
        nodes_removed: removed_node_ids.len(),
        edges_removed: removed_edges,
        ..Default::default()
    })
}

fn derive(store: &Store, module: &ModuleDef) -> MuResult<(Vec<Node>, Vec<Edge>)> {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    let module_id = node_id(NodeType::Module, &module.path, None);
    nodes.push(Node {
        id: module_id.clone(),
        node_type: NodeType::Module,
        name: module.name.clone(),
        qualified_name: None,
        file_path: Some(module.path.clone()),
        line_start: None,
        line_end: None,
        properties: json!({ "language": module.language, "docstring": module.docstring }),
        complexity: 0,
    });

    for import in &module.imports {
        let target_id = resolve_import_target(store, &import.module)?;
        edges.push(Edge {
            id: edge_id(&module_id, &target_id, EdgeType::Imports),
            source_id: module_id.clone(),
            target_id,
            edge_type: EdgeType::Imports,
            properties: json!({
                "names": import.names,
                "alias": import.alias,
                "is_from": import.is_from,
                "is_dynamic": import.is_dynamic,
                "line": import.line,
            }),
        });
    }

    for class in &module.classes {
        add_class(store, module, &module_id, class, &mut nodes, &mut edges)?;
    }

    for function in &module.functions {
        add_function(&module_id, &module.path, None, function, &mut nodes, &mut edges);
    }

    Ok((nodes, edges))
}

fn add_class(
    store: &Store,
    module: &ModuleDef,
    module_id: &str,
    class: &ClassDef,
    nodes: &mut Vec<Node>,
    edges: &mut Vec<Edge>,
) -> MuResult<()> {
    let class_id = node_id(NodeType::Class, &module.path, Some(&class.name));

    let mut unresolved_bases = Vec::new();
    let mut base_edges = Vec::new();
    for base in &class.bases {
        match resolve_class_name(store, base)? {
            Some(base_id) => base_edges.push(Edge {
                id: edge_id(&class_id, &base_id, EdgeType::Inherits),
                source_id: class_id.clone(),
                target_id: base_id,
                edge_type: EdgeType::Inherits,
                properties: json!({}),
            }),
            None => unresolved_bases.push(base.clone()),
        }
    }

    nodes.push(Node {
        id: class_id.clone(),
        node_type: NodeType::Class,
        name: class.name.clone(),
        qualified_name: Some(class.name.clone()),
        file_path: Some(module.path.clone()),
        line_start: Some(class.line_start),
        line_end: Some(class.line_end),
        properties: json!({
            "bases": class.bases,
            "decorators": class.decorators,
            "docstring": class.docstring,
            "unresolved_bases": unresolved_bases,
        }),
        complexity: 0,
    });
    edges.push(Edge {
        id: edge_id(module_id, &class_id, EdgeType::Contains),
        source_id: module_id.to_string(),
        target_id: class_id.clone(),
        edge_type: EdgeType::Contains,
        properties: json!({}),
    });
    edges.extend(base_edges);

    for method in &class.methods {
        add_function(
            module_id,
            &module.path,
            Some((&class_id, &class.name)),
            method,
            nodes,
            edges,
        );
    }

    Ok(())
}

fn add_function(
    _module_id: &str,
    file_path: &str,
    owner: Option<(&str, &str)>,
    function: &FunctionDef,
    nodes: &mut Vec<Node>,
    edges: &mut Vec<Edge>,
) {
    let qualified_name = match owner {
        Some((_, owner_name)) => format!("{owner_name}.{}", function.name),
        None => function.name.clone(),
    };
    let fn_id = node_id(NodeType::Function, file_path, Some(&qualified_name));

    nodes.push(Node {
        id: fn_id.clone(),
        node_type: NodeType::Function,
        name: function.name.clone(),
        qualified_name: Some(qualified_name),
        file_path: Some(file_path.to_string()),
        line_start: Some(function.line_start),
        line_end: Some(function.line_end),
        properties: json!({
            "parameters": function.parameters,
            "return_type": function.return_type,
            "decorators": function.decorators,
            "is_async": function.is_async,
            "is_static": function.is_static,
            "is_classmethod": function.is_classmethod,
            "is_property": function.is_property,
            "docstring": function.docstring,
        }),
        complexity: function.complexity,
    });

    let owner_id = match owner {
        Some((class_id, _)) => class_id.to_string(),
        None => node_id(NodeType::Module, file_path, None),
    };
    edges.push(Edge {
        id: edge_id(&owner_id, &fn_id, EdgeType::Contains),
        source_id: owner_id,
        target_id: fn_id,
        edge_type: EdgeType::Contains,
        properties: json!({}),
    });
}

/// Resolve an import's module string to an existing module node by name,
/// falling back to an `external` node for anything outside the indexed tree.
fn resolve_import_target(store: &Store, module_path: &str) -> MuResult<String> {
    if let Some(node) = store.find_node_by_name(module_path)? {
        if node.node_type == NodeType::Module {
            return Ok(node.id);
        }
    }
    Ok(external_node_id(module_path))
}

/// Resolve a base class name to an existing class node. Returns `None` when
/// the base is defined outside the indexed tree (stdlib, third-party) --
/// unresolved bases are recorded as a property on the subclass rather than
/// synthesizing an external node, since a bare name carries no module path
/// to disambiguate it from an unrelated class of the same name elsewhere.
fn resolve_class_name(store: &Store, name: &str) -> MuResult<Option<String>> {
    if let Some(node) = store.find_node_by_name(name)? {
        if node.node_type == NodeType::Class {
            return Ok(Some(node.id));
        }
    }
    Ok(None)
}

fn upsert_node(tx: &rusqlite::Transaction<'_>, node: &Node) -> MuResult<()> {
    tx.execute(
        "INSERT INTO nodes (id, type, name, qualified_name, file_path, line_start, line_end, \
         properties, complexity) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         ON CONFLICT(id) DO UPDATE SET \
         type=excluded.type, name=excluded.name, qualified_name=excluded.qualified_name, \
         file_path=excluded.file_path, line_start=excluded.line_start, \
         line_end=excluded.line_end, properties=excluded.properties, \
         complexity=excluded.complexity",
        rusqlite::params![
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

fn upsert_edge(tx: &rusqlite::Transaction<'_>, edge: &Edge) -> MuResult<()> {
    tx.execute(
        "INSERT INTO edges (id, source_id, target_id, type, properties) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(id) DO UPDATE SET properties=excluded.properties",
        rusqlite::params![
            edge.id,
            edge.source_id,
            edge.target_id,
            edge.edge_type.as_str(),
            edge.properties.to_string(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImportDef, Parameter};

    fn sample_module() -> ModuleDef {
        ModuleDef {
            name: "auth".to_string(),
            path: "src/auth.py".to_string(),
            language: "python".to_string(),
            imports: vec![ImportDef {
                module: "os.path".to_string(),
                names: vec![],
                alias: None,
                is_from: false,
                is_dynamic: false,
                line: 1,
            }],
            classes: vec![ClassDef {
                name: "AuthService".to_string(),
                bases: vec!["BaseService".to_string()],
                decorators: vec![],
                docstring: Some("Handles login.".to_string()),
                line_start: 3,
                line_end: 20,
                methods: vec![FunctionDef {
                    name: "login".to_string(),
                    parameters: vec![Parameter {
                        name: "self".to_string(),
                        type_hint: None,
                        default: None,
                    }],
                    return_type: Some("bool".to_string()),
                    decorators: vec![],
                    is_async: false,
                    is_static: false,
                    is_classmethod: false,
                    is_property: false,
                    docstring: None,
                    complexity: 4,
                    line_start: 5,
                    line_end: 10,
                }],
            }],
            functions: vec![],
            docstring: Some("Auth module.".to_string()),
        }
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open_write(&dir.path().join("t.mubase")).expect("open");
        (dir, store)
    }

    #[test]
    fn test_build_creates_expected_nodes() {
        let (_dir, mut store) = temp_store();
        let module = sample_module();
        let stats = build_module(&mut store, &module).expect("build");

        assert_eq!(stats.nodes_added, 3); // module, class, method
        assert!(store
            .has_node(&node_id(NodeType::Module, "src/auth.py", None))
            .expect("has_node"));
        assert!(store
            .has_node(&node_id(NodeType::Class, "src/auth.py", Some("AuthService")))
            .expect("has_node"));
        assert!(store
            .has_node(&node_id(
                NodeType::Function,
                "src/auth.py",
                Some("AuthService.login")
            ))
            .expect("has_node"));
    }

    #[test]
    fn test_unresolved_import_becomes_external() {
        let (_dir, mut store) = temp_store();
        build_module(&mut store, &sample_module()).expect("build");
        assert!(store.has_node("ext:os.path").expect("has_node"));
    }

    #[test]
    fn test_unresolved_base_recorded_as_property() {
        let (_dir, mut store) = temp_store();
        build_module(&mut store, &sample_module()).expect("build");
        assert!(!store.has_node("ext:BaseService").expect("has_node"));

        let class_id = node_id(NodeType::Class, "src/auth.py", Some("AuthService"));
        let node = store.get_node(&class_id).expect("get_node").expect("class node exists");
        let unresolved = node.properties["unresolved_bases"].as_array().expect("unresolved_bases array");
        assert_eq!(unresolved, &vec![serde_json::json!("BaseService")]);
    }

    #[test]
    fn test_rebuild_unchanged_is_a_noop() {
        let (_dir, mut store) = temp_store();
        let module = sample_module();
        build_module(&mut store, &module).expect("first build");
        let before_nodes = store.node_count().expect("count");
        let before_edges = store.edge_count().expect("count");

        let stats = build_module(&mut store, &module).expect("rebuild");
        assert_eq!(stats.nodes_added, 0);
        assert_eq!(stats.nodes_removed, 0);
        assert_eq!(stats.edges_added, 0);
        assert_eq!(stats.edges_removed, 0);
        assert_eq!(store.node_count().expect("count"), before_nodes);
        assert_eq!(store.edge_count().expect("count"), before_edges);
    }

    #[test]
    fn test_rebuild_removes_deleted_function() {
        let (_dir, mut store) = temp_store();
        let mut module = sample_module();
        build_module(&mut store, &module).expect("first build");

        module.classes[0].methods.clear();
        let stats = build_module(&mut store, &module).expect("rebuild");

        assert_eq!(stats.nodes_removed, 1);
        assert!(!store
            .has_node(&node_id(
                NodeType::Function,
                "src/auth.py",
                Some("AuthService.login")
            ))
            .expect("has_node"));
    }

    #[test]
    fn test_remove_module_clears_all_its_nodes() {
        let (_dir, mut store) = temp_store();
        let module = sample_module();
        build_module(&mut store, &module).expect("build");

        let stats = remove_module(&mut store, &module.path).expect("remove");
        assert_eq!(stats.nodes_removed, 3);
        assert_eq!(store.nodes_in_file(&module.path).expect("nodes").len(), 0);
    }
}
