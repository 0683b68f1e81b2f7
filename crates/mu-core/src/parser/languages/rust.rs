//! Rust structural extractor.
//!
//! Maps structs/enums/traits onto [`ClassDef`], attaching methods found in
//! matching `impl` blocks by type name; trait impls contribute the trait
//! name as a base so the Incremental Builder can emit an `Inherits` edge.
//! Free functions become top-level [`FunctionDef`]s.
//!
//! ## Rust AST Node Types (tree-sitter-rust)
//!
//! - `struct_item` / `enum_item` / `trait_item` -> class-equivalent
//! - `impl_item` -> attaches methods (and, for trait impls, a base) to the
//!   class-equivalent matching its `type` field
//! - `function_item` at module level -> function
//! - `use_declaration` -> imports
//! - `const_item`, `static_item`, `type_item`, `mod_item` -> no `NodeType`
//!   counterpart, dropped

use std::collections::HashMap;
use std::path::Path;

use crate::model::{ClassDef, FunctionDef, ImportDef, ModuleDef, Parameter};
use crate::parser::LanguageAnalyzer;

pub struct RustAnalyzer;

impl LanguageAnalyzer for RustAnalyzer {
    fn language_id(&self) -> &str {
        "rust"
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn extract_module(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> ModuleDef {
        let root = tree.root_node();
        let name = crate::parser::module_name_from_path(file_path);

        let mut classes = Vec::new();
        let mut class_index: HashMap<String, usize> = HashMap::new();
        let mut functions = Vec::new();
        let mut impls = Vec::new();

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "struct_item" | "enum_item" => {
                    if let Some(class) = extract_type_def(child, source) {
                        class_index.insert(class.name.clone(), classes.len());
                        classes.push(class);
                    }
                }
                "trait_item" => {
                    if let Some(class) = extract_trait(child, source) {
                        class_index.insert(class.name.clone(), classes.len());
                        classes.push(class);
                    }
                }
                "impl_item" => impls.push(child),
                "function_item" => functions.push(extract_function(child, source)),
                _ => {}
            }
        }

        for impl_node in impls {
            attach_impl(impl_node, source, &mut classes, &mut class_index);
        }

        ModuleDef {
            name,
            path: file_path.display().to_string(),
            language: "rust".to_string(),
            imports: extract_imports(root, source),
            classes,
            functions,
            docstring: module_doc_comment(root, source),
        }
    }
}

/// Extract a `struct` or `enum` as a class-equivalent with no methods yet;
/// methods are attached later from matching `impl` blocks.
fn extract_type_def(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<ClassDef> {
    let name_node = node.child_by_field_name("name")?;
    Some(ClassDef {
        name: node_text(name_node, source).to_string(),
        bases: Vec::new(),
        decorators: extract_attributes(node, source),
        docstring: extract_doc_comment(node, source),
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
        methods: Vec::new(),
    })
}

/// Extract a `trait` as a class-equivalent, its signatures (with or without
/// a default body) surfaced directly as methods.
fn extract_trait(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<ClassDef> {
    let name_node = node.child_by_field_name("name")?;
    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if child.kind() == "function_item" || child.kind() == "function_signature_item" {
                methods.push(extract_function(child, source));
            }
        }
    }

    Some(ClassDef {
        name: node_text(name_node, source).to_string(),
        bases: Vec::new(),
        decorators: extract_attributes(node, source),
        docstring: extract_doc_comment(node, source),
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
        methods,
    })
}

/// Attach an `impl` block's methods (and, for a trait impl, the trait name
/// as a base) to the class-equivalent matching its `type` field. An `impl`
/// for a type with no matching struct/enum/trait in this file (e.g. a
/// blanket or foreign-type impl) is silently skipped -- it has no node to
/// attach to.
fn attach_impl(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    classes: &mut [ClassDef],
    class_index: &HashMap<String, usize>,
) {
    let Some(type_node) = node.child_by_field_name("type") else {
        return;
    };
    let type_name = base_type_name(node_text(type_node, source));
    let Some(&idx) = class_index.get(&type_name) else {
        return;
    };

    if let Some(trait_node) = node.child_by_field_name("trait") {
        let trait_name = base_type_name(node_text(trait_node, source));
        classes[idx].bases.push(trait_name);
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if child.kind() == "function_item" {
                classes[idx].methods.push(extract_function(child, source));
            }
        }
    }
}

/// Strip generic arguments and leading `&`/lifetimes from a type reference,
/// e.g. `Box<dyn Handler>` -> `Handler`, `&'a Config` -> `Config`.
fn base_type_name(text: &str) -> String {
    let text = text.trim().trim_start_matches('&');
    let text = text.split('<').next().unwrap_or(text);
    text.trim().to_string()
}

fn extract_function(node: tree_sitter::Node<'_>, source: &[u8]) -> FunctionDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();

    let is_async = {
        let mut cursor = node.walk();
        node.children(&mut cursor).any(|c| c.kind() == "async")
    };

    let mut parameters = Vec::new();
    let mut is_static = true;
    if let Some(params_node) = node.child_by_field_name("parameters") {
        let mut cursor = params_node.walk();
        for child in params_node.named_children(&mut cursor) {
            match child.kind() {
                "self_parameter" => {
                    is_static = false;
                    parameters.push(Parameter {
                        name: "self".to_string(),
                        type_hint: None,
                        default: None,
                    });
                }
                "parameter" => {
                    let pattern = child.child_by_field_name("pattern");
                    let name = pattern
                        .map(|p| node_text(p, source).to_string())
                        .unwrap_or_default();
                    let type_hint = child
                        .child_by_field_name("type")
                        .map(|t| node_text(t, source).to_string());
                    parameters.push(Parameter {
                        name,
                        type_hint,
                        default: None,
                    });
                }
                "variadic_parameter" => {
                    parameters.push(Parameter {
                        name: node_text(child, source).to_string(),
                        type_hint: None,
                        default: None,
                    });
                }
                _ => {}
            }
        }
    }

    let return_type = node
        .child_by_field_name("return_type")
        .map(|n| node_text(n, source).to_string());

    let attributes = extract_attributes(node, source);
    let has_test_attr = attributes.iter().any(|a| a == "test");

    let body = node.child_by_field_name("body");
    let complexity = body.map(count_nodes).unwrap_or(0);

    FunctionDef {
        name,
        parameters,
        return_type,
        decorators: attributes,
        is_async,
        is_static,
        is_classmethod: false,
        is_property: has_test_attr,
        docstring: extract_doc_comment(node, source),
        complexity,
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
    }
}

/// Collect top-level `use` declarations, flattening grouped/aliased/glob
/// forms into one [`ImportDef`] per leaf path.
fn extract_imports(root: tree_sitter::Node<'_>, source: &[u8]) -> Vec<ImportDef> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() == "use_declaration" {
            let line = child.start_position().row as u32 + 1;
            if let Some(argument) = child.named_child(0) {
                collect_use_tree(argument, source, "", line, &mut imports);
            }
        }
    }
    imports
}

fn collect_use_tree(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    prefix: &str,
    line: u32,
    out: &mut Vec<ImportDef>,
) {
    match node.kind() {
        "scoped_use_list" => {
            let path_prefix = node
                .child_by_field_name("path")
                .map(|p| join_path(prefix, node_text(p, source)))
                .unwrap_or_else(|| prefix.to_string());
            if let Some(list) = node.child_by_field_name("list") {
                let mut cursor = list.walk();
                for child in list.named_children(&mut cursor) {
                    collect_use_tree(child, source, &path_prefix, line, out);
                }
            }
        }
        "use_as_clause" => {
            let path_text = node
                .child_by_field_name("path")
                .map(|p| node_text(p, source).to_string())
                .unwrap_or_default();
            let alias = node
                .child_by_field_name("alias")
                .map(|a| node_text(a, source).to_string());
            out.push(ImportDef {
                module: join_path(prefix, &path_text),
                names: Vec::new(),
                alias,
                is_from: false,
                is_dynamic: false,
                line,
            });
        }
        "use_wildcard" => {
            let path_text = node
                .named_child(0)
                .map(|p| node_text(p, source).to_string())
                .unwrap_or_default();
            out.push(ImportDef {
                module: join_path(prefix, &path_text),
                names: vec!["*".to_string()],
                alias: None,
                is_from: false,
                is_dynamic: false,
                line,
            });
        }
        "scoped_identifier" | "identifier" | "crate" | "self" | "super" => {
            out.push(ImportDef {
                module: join_path(prefix, node_text(node, source)),
                names: Vec::new(),
                alias: None,
                is_from: false,
                is_dynamic: false,
                line,
            });
        }
        _ => {
            out.push(ImportDef {
                module: join_path(prefix, node_text(node, source)),
                names: Vec::new(),
                alias: None,
                is_from: false,
                is_dynamic: false,
                line,
            });
        }
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}::{segment}")
    }
}

/// Extract `///`/`//!` doc comments immediately preceding a node, skipping
/// over attribute lines between them and the item.
fn extract_doc_comment(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let mut doc_lines = Vec::new();
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        let text = node_text(sibling, source).trim();
        if let Some(line) = text.strip_prefix("///") {
            doc_lines.push(line.trim().to_string());
            current = sibling.prev_sibling();
        } else if let Some(line) = text.strip_prefix("//!") {
            doc_lines.push(line.trim().to_string());
            current = sibling.prev_sibling();
        } else if sibling.kind() == "attribute_item" {
            current = sibling.prev_sibling();
        } else {
            break;
        }
    }

    if doc_lines.is_empty() {
        return None;
    }
    doc_lines.reverse();
    Some(doc_lines.join("\n"))
}

/// Leading `//!` inner doc comments at the very start of the file.
fn module_doc_comment(root: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let mut doc_lines = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        let text = node_text(child, source).trim();
        if let Some(line) = text.strip_prefix("//!") {
            doc_lines.push(line.trim().to_string());
        } else {
            break;
        }
    }
    if doc_lines.is_empty() {
        None
    } else {
        Some(doc_lines.join("\n"))
    }
}

fn extract_attributes(node: tree_sitter::Node<'_>, source: &[u8]) -> Vec<String> {
    let mut attrs = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        if sibling.kind() == "attribute_item" {
            let text = node_text(sibling, source);
            attrs.push(text.trim().to_string());
            current = sibling.prev_sibling();
        } else if sibling.kind() == "line_comment" {
            current = sibling.prev_sibling();
        } else {
            break;
        }
    }
    attrs.reverse();
    attrs
        .into_iter()
        .map(|a| {
            a.trim_start_matches("#[")
                .trim_end_matches(']')
                .split('(')
                .next()
                .unwrap_or("")
                .trim()
                .to_string()
        })
        .collect()
}

fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

fn count_nodes(node: tree_sitter::Node<'_>) -> u32 {
    let mut count = 1;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count += count_nodes(child);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::types::Language;

    fn parse_rust(source: &str) -> ModuleDef {
        parse_file(Path::new("test.rs"), source.as_bytes(), Language::Rust).expect("parse")
    }

    #[test]
    fn test_free_function() {
        let module = parse_rust("fn hello(name: &str) -> String {\n    name.to_string()\n}\n");
        assert_eq!(module.functions[0].name, "hello");
        assert!(!module.functions[0].is_async);
    }

    #[test]
    fn test_async_function() {
        let module = parse_rust("async fn fetch() -> u32 {\n    42\n}\n");
        assert!(module.functions[0].is_async);
    }

    #[test]
    fn test_struct_with_impl_methods() {
        let src = r#"
/// A configuration object.
pub struct Config {
    pub name: String,
}

impl Config {
    pub fn new() -> Self {
        Config { name: String::new() }
    }

    fn validate(&self) -> bool {
        true
    }
}
"#;
        let module = parse_rust(src);
        let class = module
            .classes
            .iter()
            .find(|c| c.name == "Config")
            .expect("Config class");
        assert_eq!(class.docstring.as_deref(), Some("A configuration object."));
        assert_eq!(class.methods.len(), 2);

        let new_fn = class.methods.iter().find(|m| m.name == "new").expect("new");
        assert!(new_fn.is_static);

        let validate_fn = class
            .methods
            .iter()
            .find(|m| m.name == "validate")
            .expect("validate");
        assert!(!validate_fn.is_static);
    }

    #[test]
    fn test_trait_impl_becomes_base() {
        let src = r#"
pub trait Drawable {
    fn draw(&self);
}

pub struct Shape;

impl Drawable for Shape {
    fn draw(&self) {}
}
"#;
        let module = parse_rust(src);
        let shape = module
            .classes
            .iter()
            .find(|c| c.name == "Shape")
            .expect("Shape class");
        assert_eq!(shape.bases, vec!["Drawable".to_string()]);
        assert_eq!(shape.methods.len(), 1);

        let drawable = module
            .classes
            .iter()
            .find(|c| c.name == "Drawable")
            .expect("Drawable class");
        assert_eq!(drawable.methods.len(), 1);
    }

    #[test]
    fn test_enum_as_class() {
        let module = parse_rust("pub enum Color {\n    Red,\n    Green,\n}\n");
        assert!(module.classes.iter().any(|c| c.name == "Color"));
    }

    #[test]
    fn test_plain_use_import() {
        let module = parse_rust("use std::collections::HashMap;\n");
        assert_eq!(module.imports[0].module, "std::collections::HashMap");
    }

    #[test]
    fn test_grouped_use_import() {
        let module = parse_rust("use std::{fs, io};\n");
        let modules: Vec<&str> = module.imports.iter().map(|i| i.module.as_str()).collect();
        assert!(modules.contains(&"std::fs"));
        assert!(modules.contains(&"std::io"));
    }

    #[test]
    fn test_aliased_use_import() {
        let module = parse_rust("use std::io::Result as IoResult;\n");
        assert_eq!(module.imports[0].module, "std::io::Result");
        assert_eq!(module.imports[0].alias.as_deref(), Some("IoResult"));
    }

    #[test]
    fn test_wildcard_use_import() {
        let module = parse_rust("use std::prelude::*;\n");
        assert_eq!(module.imports[0].names, vec!["*".to_string()]);
    }

    #[test]
    fn test_test_attribute_function() {
        let src = "#[test]\nfn test_addition() {\n    assert_eq!(1 + 1, 2);\n}\n";
        let module = parse_rust(src);
        assert!(module.functions[0].decorators.contains(&"test".to_string()));
    }

    #[test]
    fn test_empty_file() {
        let module = parse_rust("");
        assert!(module.functions.is_empty());
        assert!(module.classes.is_empty());
        assert!(module.imports.is_empty());
    }

    #[test]
    fn test_multiline_doc_comment() {
        let src = r#"
/// Perform the computation.
///
/// Doubles the input.
pub fn compute(x: i32) -> i32 {
    x * 2
}
"#;
        let module = parse_rust(src);
        let doc = module.functions[0].docstring.as_ref().expect("doc");
        assert!(doc.contains("Perform the computation"));
        assert!(doc.contains("Doubles"));
    }
}
