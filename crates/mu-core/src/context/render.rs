//! Renders selected nodes into an MU-text document using the fixed sigil
//! scheme: `!name` modules, `$Name < Base1, Base2` classes, `#name(params)
//! -> T` functions, `@deps [...]` / `@attrs [...]` lists, `:: line`
//! annotations.

use crate::context::models::ExportConfig;
use crate::error::MuResult;
use crate::model::{Node, NodeType};
use crate::store::Store;

/// Render a parent-before-child ordered node list into MU-text.
pub fn render(nodes: &[Node], store: &Store, config: &ExportConfig) -> MuResult<String> {
    let mut out = String::new();
    for node in nodes {
        render_node(node, store, config, &mut out)?;
    }
    Ok(out)
}

fn render_node(node: &Node, store: &Store, config: &ExportConfig, out: &mut String) -> MuResult<()> {
    match node.node_type {
        NodeType::Module => render_module(node, store, config, out)?,
        NodeType::Class => render_class(node, config, out),
        NodeType::Function => render_function(node, config, out),
        NodeType::External => render_external(node, out),
    }
    Ok(())
}

fn render_module(node: &Node, store: &Store, config: &ExportConfig, out: &mut String) -> MuResult<()> {
    out.push('!');
    out.push_str(&node.name);
    if config.include_language {
        if let Some(lang) = node.properties.get("language").and_then(|v| v.as_str()) {
            out.push_str(" (");
            out.push_str(lang);
            out.push(')');
        }
    }
    out.push('\n');

    let edges = store.edges_touching(&node.id)?;
    let deps: Vec<String> = edges
        .into_iter()
        .filter(|e| e.source_id == node.id && e.edge_type == crate::model::EdgeType::Imports)
        .filter_map(|e| store.get_node(&e.target_id).ok().flatten())
        .filter(|dep| config.include_internal_imports || dep.node_type == NodeType::External)
        .map(|dep| dep.name)
        .collect();
    if !deps.is_empty() {
        out.push_str(&format!("@deps [{}]\n", deps.join(", ")));
    }

    push_annotation(node, config, out);
    out.push('\n');
    Ok(())
}

fn render_class(node: &Node, config: &ExportConfig, out: &mut String) {
    out.push('$');
    out.push_str(&node.name);
    let bases: Vec<String> = node
        .properties
        .get("bases")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|b| b.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if !bases.is_empty() {
        out.push_str(" < ");
        out.push_str(&bases.join(", "));
    }
    out.push('\n');

    let attrs: Vec<String> = node
        .properties
        .get("attributes")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|a| a.as_str().map(str::to_string))
                .take(config.max_attributes)
                .collect()
        })
        .unwrap_or_default();
    if !attrs.is_empty() {
        out.push_str(&format!("@attrs [{}]\n", attrs.join(", ")));
    }

    push_annotation(node, config, out);
    out.push('\n');
}

fn render_function(node: &Node, config: &ExportConfig, out: &mut String) {
    out.push('#');
    out.push_str(&node.name);
    out.push('(');
    let params: Vec<String> = node
        .properties
        .get("parameters")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().map(render_param).collect())
        .unwrap_or_default();
    out.push_str(&params.join(", "));
    out.push(')');
    if let Some(ret) = node.properties.get("return_type").and_then(|v| v.as_str()) {
        out.push_str(" -> ");
        out.push_str(ret);
    }
    out.push('\n');

    push_annotation(node, config, out);
    out.push('\n');
}

fn render_param(param: &serde_json::Value) -> String {
    let name = param.get("name").and_then(|v| v.as_str()).unwrap_or("?");
    match param.get("type_hint").and_then(|v| v.as_str()) {
        Some(hint) => format!("{name}: {hint}"),
        None => name.to_string(),
    }
}

fn render_external(node: &Node, out: &mut String) {
    out.push_str(&format!("@{}\n\n", node.name));
}

fn push_annotation(node: &Node, config: &ExportConfig, out: &mut String) {
    let mut parts: Vec<String> = Vec::new();

    if config.include_qualified_names {
        if let Some(qn) = &node.qualified_name {
            parts.push(qn.clone());
        }
    }

    if config.include_line_numbers {
        if let (Some(start), Some(end)) = (node.line_start, node.line_end) {
            parts.push(format!("L{start}-{end}"));
        }
    }

    if node.complexity >= config.min_complexity_to_show && node.complexity > 0 {
        parts.push(format!("complexity={}", node.complexity));
    }

    if config.include_docstrings {
        if let Some(doc) = node.properties.get("docstring").and_then(|v| v.as_str()) {
            if !doc.trim().is_empty() {
                parts.push(truncate_docstring(doc, config));
            }
        }
    }

    if !parts.is_empty() {
        out.push_str(":: ");
        out.push_str(&parts.join(" | "));
        out.push('\n');
    }
}

fn truncate_docstring(doc: &str, config: &ExportConfig) -> String {
    let lines: Vec<&str> = doc.lines().collect();
    let max = config.max_docstring_lines as usize;
    if lines.len() <= max {
        return doc.trim().to_string();
    }
    let mut truncated = lines[..max].join(" ").trim().to_string();
    if config.truncate_docstring {
        truncated.push_str(" ...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn seeded() -> (tempfile::TempDir, Store) {
        let dir = tempdir().expect("tempdir");
        let store = Store::open_write(&dir.path().join("mu.db")).expect("open");
        (dir, store)
    }

    fn class_node() -> Node {
        Node {
            id: "cls:a.py:Dog".to_string(),
            node_type: NodeType::Class,
            name: "Dog".to_string(),
            qualified_name: Some("Dog".to_string()),
            file_path: Some("a.py".to_string()),
            line_start: Some(1),
            line_end: Some(10),
            properties: json!({ "bases": ["Animal"], "decorators": [], "docstring": "A dog." }),
            complexity: 0,
        }
    }

    fn function_node() -> Node {
        Node {
            id: "fn:a.py:Dog.bark".to_string(),
            node_type: NodeType::Function,
            name: "bark".to_string(),
            qualified_name: Some("Dog.bark".to_string()),
            file_path: Some("a.py".to_string()),
            line_start: Some(2),
            line_end: Some(3),
            properties: json!({
                "parameters": [{"name": "self", "type_hint": null, "default": null}],
                "return_type": "str",
                "is_async": false,
                "docstring": null,
            }),
            complexity: 4,
        }
    }

    #[test]
    fn test_render_class_with_base() {
        let (_dir, store) = seeded();
        let out = render(&[class_node()], &store, &ExportConfig::default()).unwrap();
        assert!(out.starts_with("$Dog < Animal\n"));
    }

    #[test]
    fn test_render_function_signature() {
        let (_dir, store) = seeded();
        let out = render(&[function_node()], &store, &ExportConfig::default()).unwrap();
        assert!(out.contains("#bark(self) -> str"));
        assert!(out.contains("complexity=4"));
    }

    #[test]
    fn test_docstring_truncated() {
        let mut node = class_node();
        node.properties = json!({ "bases": [], "docstring": "one\ntwo\nthree\nfour\nfive\nsix\nseven" });
        let (_dir, store) = seeded();
        let config = ExportConfig { max_docstring_lines: 2, ..ExportConfig::default() };
        let out = render(&[node], &store, &config).unwrap();
        assert!(out.contains("one two ..."));
    }

    #[test]
    fn test_no_annotation_line_when_nothing_to_show() {
        let node = Node {
            id: "cls:a.py:Empty".to_string(),
            node_type: NodeType::Class,
            name: "Empty".to_string(),
            qualified_name: Some("Empty".to_string()),
            file_path: Some("a.py".to_string()),
            line_start: Some(1),
            line_end: Some(2),
            properties: json!({ "bases": [], "docstring": null }),
            complexity: 0,
        };
        let (_dir, store) = seeded();
        let out = render(&[node], &store, &ExportConfig::default()).unwrap();
        assert!(!out.contains("::"));
    }
}
