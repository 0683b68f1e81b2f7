//! Go structural extractor.
//!
//! Go has no classes, so `struct`/`interface` type declarations become the
//! class-equivalent; methods are attached to the struct or interface named
//! by their receiver type. Go uses capitalization for visibility, which has
//! no counterpart in [`FunctionDef`]/[`ClassDef`] and is not surfaced.
//!
//! ## Go AST Node Types (tree-sitter-go)
//!
//! - `function_declaration` -> function
//! - `method_declaration` -> method, attached via its receiver type
//! - `type_declaration` > `type_spec` with `struct_type`/`interface_type` ->
//!   class-equivalent
//! - `import_declaration` -> imports
//! - `const_declaration`, `var_declaration` -> no `NodeType` counterpart,
//!   dropped

use std::collections::HashMap;
use std::path::Path;

use crate::model::{ClassDef, FunctionDef, ImportDef, ModuleDef, Parameter};
use crate::parser::LanguageAnalyzer;

pub struct GoAnalyzer;

impl LanguageAnalyzer for GoAnalyzer {
    fn language_id(&self) -> &str {
        "go"
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
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
        let mut methods_by_receiver: Vec<(String, FunctionDef)> = Vec::new();

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "type_declaration" => {
                    collect_type_specs(child, source, &mut classes, &mut class_index)
                }
                "function_declaration" => {
                    if let Some(func) = extract_function(child, source) {
                        functions.push(func);
                    }
                }
                "method_declaration" => {
                    if let Some((receiver, method)) = extract_method(child, source) {
                        methods_by_receiver.push((receiver, method));
                    }
                }
                _ => {}
            }
        }

        for (receiver, method) in methods_by_receiver {
            if let Some(&idx) = class_index.get(&receiver) {
                classes[idx].methods.push(method);
            }
        }

        ModuleDef {
            name,
            path: file_path.display().to_string(),
            language: "go".to_string(),
            imports: extract_imports(root, source),
            classes,
            functions,
            docstring: None,
        }
    }
}

fn collect_type_specs(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    classes: &mut Vec<ClassDef>,
    class_index: &mut HashMap<String, usize>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "type_spec" {
            continue;
        }
        let Some(name_node) = child.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, source).to_string();

        let bases = child
            .child_by_field_name("type")
            .filter(|t| t.kind() == "interface_type")
            .map(|t| interface_embedded_types(t, source))
            .unwrap_or_default();

        class_index.insert(name.clone(), classes.len());
        classes.push(ClassDef {
            name,
            bases,
            decorators: Vec::new(),
            docstring: extract_go_doc(node, source),
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            methods: Vec::new(),
        });
    }
}

/// An interface can embed other interfaces; surface those as bases so the
/// Incremental Builder emits `Inherits` edges for them.
fn interface_embedded_types(node: tree_sitter::Node<'_>, source: &[u8]) -> Vec<String> {
    let mut bases = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "type_identifier" || child.kind() == "qualified_type" {
            bases.push(node_text(child, source).to_string());
        }
    }
    bases
}

fn extract_function(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<FunctionDef> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source).to_string();
    Some(build_function_def(node, source, name, None))
}

/// Returns the receiver's base type name alongside the extracted method,
/// e.g. `func (c *Config) Validate()` -> `("Config", FunctionDef{name: "Validate", ...})`.
fn extract_method(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<(String, FunctionDef)> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source).to_string();

    let receiver_node = node.child_by_field_name("receiver")?;
    let receiver_text = node_text(receiver_node, source);
    let receiver_type = receiver_text
        .trim_matches(|c: char| c == '(' || c == ')')
        .split_whitespace()
        .last()
        .unwrap_or("")
        .trim_start_matches('*')
        .to_string();
    if receiver_type.is_empty() {
        return None;
    }

    Some((
        receiver_type.clone(),
        build_function_def(node, source, name, Some(receiver_type)),
    ))
}

fn build_function_def(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    name: String,
    receiver_type: Option<String>,
) -> FunctionDef {
    let mut parameters = Vec::new();
    if let Some(receiver) = node.child_by_field_name("receiver") {
        parameters.extend(extract_parameters(receiver, source));
    }
    if let Some(params_node) = node.child_by_field_name("parameters") {
        parameters.extend(extract_parameters(params_node, source));
    }

    let return_type = node
        .child_by_field_name("result")
        .map(|n| node_text(n, source).to_string());

    let is_test = receiver_type.is_none() && (name.starts_with("Test") || name.starts_with("Benchmark"));

    let body = node.child_by_field_name("body");
    let complexity = body.map(count_nodes).unwrap_or(0);

    FunctionDef {
        name,
        parameters,
        return_type,
        decorators: Vec::new(),
        is_async: false,
        is_static: receiver_type.is_none(),
        is_classmethod: false,
        is_property: is_test,
        docstring: extract_go_doc(node, source),
        complexity,
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
    }
}

fn extract_parameters(params_node: tree_sitter::Node<'_>, source: &[u8]) -> Vec<Parameter> {
    let mut parameters = Vec::new();
    let mut cursor = params_node.walk();
    for child in params_node.named_children(&mut cursor) {
        if child.kind() != "parameter_declaration" && child.kind() != "variadic_parameter_declaration"
        {
            continue;
        }
        let type_hint = child
            .child_by_field_name("type")
            .map(|t| node_text(t, source).to_string());
        let name_nodes: Vec<tree_sitter::Node<'_>> = {
            let mut inner = child.walk();
            child
                .children_by_field_name("name", &mut inner)
                .collect()
        };
        if name_nodes.is_empty() {
            parameters.push(Parameter {
                name: type_hint.clone().unwrap_or_default(),
                type_hint,
                default: None,
            });
        } else {
            for name_node in name_nodes {
                parameters.push(Parameter {
                    name: node_text(name_node, source).to_string(),
                    type_hint: type_hint.clone(),
                    default: None,
                });
            }
        }
    }
    parameters
}

fn extract_imports(root: tree_sitter::Node<'_>, source: &[u8]) -> Vec<ImportDef> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() == "import_declaration" {
            collect_import_specs(child, source, &mut imports);
        }
    }
    imports
}

fn collect_import_specs(node: tree_sitter::Node<'_>, source: &[u8], out: &mut Vec<ImportDef>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_spec" => {
                let line = child.start_position().row as u32 + 1;
                let Some(path_node) = child.child_by_field_name("path") else {
                    continue;
                };
                let path = node_text(path_node, source).trim_matches('"').to_string();
                if path.is_empty() {
                    continue;
                }
                let alias = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string());
                out.push(ImportDef {
                    module: path,
                    names: Vec::new(),
                    alias,
                    is_from: false,
                    is_dynamic: false,
                    line,
                });
            }
            "interpreted_string_literal" => {
                let line = child.start_position().row as u32 + 1;
                let path = node_text(child, source).trim_matches('"').to_string();
                if !path.is_empty() {
                    out.push(ImportDef {
                        module: path,
                        names: Vec::new(),
                        alias: None,
                        is_from: false,
                        is_dynamic: false,
                        line,
                    });
                }
            }
            _ if child.child_count() > 0 => collect_import_specs(child, source, out),
            _ => {}
        }
    }
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

/// Consecutive `//` line comments immediately preceding a declaration.
fn extract_go_doc(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let mut doc_lines = Vec::new();
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        if sibling.kind() != "comment" {
            break;
        }
        let text = node_text(sibling, source).trim();
        let Some(line) = text.strip_prefix("//") else {
            break;
        };
        doc_lines.push(line.trim().to_string());
        current = sibling.prev_sibling();
    }

    if doc_lines.is_empty() {
        return None;
    }
    doc_lines.reverse();
    Some(doc_lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::types::Language;

    fn parse_go(source: &str) -> ModuleDef {
        parse_file(Path::new("main.go"), source.as_bytes(), Language::Go).expect("parse")
    }

    #[test]
    fn test_go_function() {
        let src = "package main\n\nfunc hello(name string) string {\n\treturn \"Hello, \" + name\n}\n";
        let module = parse_go(src);
        assert_eq!(module.functions[0].name, "hello");
        assert_eq!(module.functions[0].parameters[0].name, "name");
    }

    #[test]
    fn test_go_struct_with_method() {
        let src = "package main\n\ntype Config struct {\n\tName string\n}\n\nfunc (c *Config) Validate() bool {\n\treturn true\n}\n";
        let module = parse_go(src);
        let class = module
            .classes
            .iter()
            .find(|c| c.name == "Config")
            .expect("Config class");
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name, "Validate");
    }

    #[test]
    fn test_go_interface() {
        let src = "package main\n\ntype Reader interface {\n\tRead(p []byte) (n int, err error)\n}\n";
        let module = parse_go(src);
        assert!(module.classes.iter().any(|c| c.name == "Reader"));
    }

    #[test]
    fn test_go_test_function_marked_property() {
        let src = "package main\n\nfunc TestAdd(t *testing.T) {\n}\n";
        let module = parse_go(src);
        assert!(module.functions[0].is_property);
    }

    #[test]
    fn test_go_doc_comment() {
        let src = "package main\n\n// Hello greets someone.\nfunc Hello(name string) string {\n\treturn name\n}\n";
        let module = parse_go(src);
        assert_eq!(
            module.functions[0].docstring.as_deref(),
            Some("Hello greets someone.")
        );
    }

    #[test]
    fn test_go_single_import() {
        let src = "package main\n\nimport \"fmt\"\n\nfunc main() {}\n";
        let module = parse_go(src);
        assert_eq!(module.imports[0].module, "fmt");
    }

    #[test]
    fn test_go_grouped_imports() {
        let src = "package main\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n\nfunc main() {}\n";
        let module = parse_go(src);
        let modules: Vec<&str> = module.imports.iter().map(|i| i.module.as_str()).collect();
        assert!(modules.contains(&"fmt"));
        assert!(modules.contains(&"os"));
    }

    #[test]
    fn test_go_empty_file() {
        let module = parse_go("package main\n");
        assert!(module.functions.is_empty());
        assert!(module.classes.is_empty());
    }
}
