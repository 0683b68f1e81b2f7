//! TypeScript structural extractor.
//!
//! Extracts functions, arrow functions, classes, JSDoc comments and
//! imports from TypeScript source using tree-sitter, emitting a
//! [`ModuleDef`] directly. Interfaces and type aliases have no
//! counterpart in the node model and are not emitted.

use std::path::Path;

use crate::model::{ClassDef, FunctionDef, ImportDef, ModuleDef, Parameter};
use crate::parser::LanguageAnalyzer;

pub struct TypeScriptAnalyzer;

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn language_id(&self) -> &str {
        "typescript"
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }

    fn extract_module(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> ModuleDef {
        extract_ts_module(tree, source, file_path, "typescript")
    }
}

pub(crate) fn extract_ts_module(
    tree: &tree_sitter::Tree,
    source: &[u8],
    file_path: &Path,
    language: &str,
) -> ModuleDef {
    let root = tree.root_node();
    let mut classes = Vec::new();
    let mut functions = Vec::new();
    collect_top_level(root, source, &mut classes, &mut functions);

    ModuleDef {
        name: crate::parser::module_name_from_path(file_path),
        path: file_path.display().to_string(),
        language: language.to_string(),
        imports: collect_ts_imports(root, source),
        classes,
        functions,
        docstring: None,
    }
}

/// Walk top-level statements (unwrapping `export_statement`), collecting
/// direct function/class declarations. JS/TS is a subset of the same
/// grammar shapes, so this walker serves both.
fn collect_top_level(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    classes: &mut Vec<ClassDef>,
    functions: &mut Vec<FunctionDef>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_declaration" => functions.push(extract_function(child, source, false)),
            "class_declaration" => classes.push(extract_class(child, source)),
            "lexical_declaration" => {
                collect_arrow_functions(child, source, functions);
            }
            "export_statement" => {
                let mut inner = child.walk();
                for grandchild in child.children(&mut inner) {
                    match grandchild.kind() {
                        "function_declaration" => {
                            functions.push(extract_function(grandchild, source, true));
                        }
                        "class_declaration" => classes.push(extract_class(grandchild, source)),
                        "lexical_declaration" => {
                            collect_arrow_functions(grandchild, source, functions);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn collect_arrow_functions(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    functions: &mut Vec<FunctionDef>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = child.child_by_field_name("name") else {
            continue;
        };
        let Some(value) = child.child_by_field_name("value") else {
            continue;
        };
        if value.kind() != "arrow_function" && value.kind() != "function" {
            continue;
        }

        let name = node_text(name_node, source).to_string();
        let parameters = value
            .child_by_field_name("parameters")
            .map(|p| extract_parameters(p, source))
            .unwrap_or_default();
        let is_async = value
            .child(0)
            .map(|c| c.kind() == "async")
            .unwrap_or(false);

        functions.push(FunctionDef {
            name,
            parameters,
            return_type: value
                .child_by_field_name("return_type")
                .map(|n| node_text(n, source).to_string()),
            decorators: Vec::new(),
            is_async,
            is_static: false,
            is_classmethod: false,
            is_property: false,
            docstring: extract_jsdoc(node, source),
            complexity: value
                .child_by_field_name("body")
                .map(count_nodes)
                .unwrap_or(1),
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
        });
    }
}

fn extract_function(node: tree_sitter::Node<'_>, source: &[u8], exported: bool) -> FunctionDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();
    let parameters = node
        .child_by_field_name("parameters")
        .map(|p| extract_parameters(p, source))
        .unwrap_or_default();
    let is_async = node
        .child(0)
        .map(|c| c.kind() == "async")
        .unwrap_or(false);

    FunctionDef {
        name,
        parameters,
        return_type: node
            .child_by_field_name("return_type")
            .map(|n| node_text(n, source).to_string()),
        decorators: if exported {
            vec!["export".to_string()]
        } else {
            Vec::new()
        },
        is_async,
        is_static: false,
        is_classmethod: false,
        is_property: false,
        docstring: extract_jsdoc(node, source),
        complexity: node
            .child_by_field_name("body")
            .map(count_nodes)
            .unwrap_or(1),
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
    }
}

fn extract_class(node: tree_sitter::Node<'_>, source: &[u8]) -> ClassDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();

    let mut bases = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "class_heritage" {
            let heritage_text = node_text(child, source);
            for part in heritage_text.split_whitespace() {
                if part != "extends" && part != "implements" {
                    let clean = part.trim_end_matches(',');
                    if !clean.is_empty() {
                        bases.push(clean.to_string());
                    }
                }
            }
        }
    }

    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if child.kind() == "method_definition" {
                methods.push(extract_method(child, source));
            }
        }
    }

    ClassDef {
        name,
        bases,
        decorators: Vec::new(),
        docstring: extract_jsdoc(node, source),
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
        methods,
    }
}

fn extract_method(node: tree_sitter::Node<'_>, source: &[u8]) -> FunctionDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();
    let parameters = node
        .child_by_field_name("parameters")
        .map(|p| extract_parameters(p, source))
        .unwrap_or_default();

    let is_static = {
        let mut cursor = node.walk();
        node.children(&mut cursor).any(|c| c.kind() == "static")
    };
    let is_property = name == "get" || node_text(node, source).trim_start().starts_with("get ");

    FunctionDef {
        name,
        parameters,
        return_type: node
            .child_by_field_name("return_type")
            .map(|n| node_text(n, source).to_string()),
        decorators: Vec::new(),
        is_async: node
            .child(0)
            .map(|c| c.kind() == "async")
            .unwrap_or(false),
        is_static,
        is_classmethod: false,
        is_property,
        docstring: extract_jsdoc(node, source),
        complexity: node
            .child_by_field_name("body")
            .map(count_nodes)
            .unwrap_or(1),
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
    }
}

fn extract_parameters(node: tree_sitter::Node<'_>, source: &[u8]) -> Vec<Parameter> {
    let mut params = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" | "required_parameter" | "optional_parameter" => {
                let name_node = child
                    .child_by_field_name("pattern")
                    .unwrap_or(child);
                let name = node_text(name_node, source).to_string();
                let type_hint = child
                    .child_by_field_name("type")
                    .map(|n| node_text(n, source).to_string());
                if !name.is_empty() && name != "(" && name != ")" {
                    params.push(Parameter {
                        name,
                        type_hint,
                        default: child
                            .child_by_field_name("value")
                            .map(|n| node_text(n, source).to_string()),
                    });
                }
            }
            _ => {}
        }
    }
    params
}

/// Collect ES6 import/export statements.
pub(crate) fn collect_ts_imports(root: tree_sitter::Node<'_>, source: &[u8]) -> Vec<ImportDef> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();

    for child in root.children(&mut cursor) {
        let line = child.start_position().row as u32 + 1;

        match child.kind() {
            "import_statement" => {
                let module = child
                    .child_by_field_name("source")
                    .map(|n| node_text(n, source).trim_matches(|c| c == '\'' || c == '"').to_string())
                    .unwrap_or_default();
                if module.is_empty() {
                    continue;
                }

                let mut names = Vec::new();
                let mut inner = child.walk();
                for import_child in child.children(&mut inner) {
                    if import_child.kind() == "import_clause" {
                        collect_import_names(import_child, source, &mut names);
                    }
                }

                imports.push(ImportDef {
                    module,
                    names,
                    alias: None,
                    is_from: true,
                    is_dynamic: false,
                    line,
                });
            }
            "export_statement" => {
                if let Some(src_node) = child.child_by_field_name("source") {
                    let module = node_text(src_node, source)
                        .trim_matches(|c| c == '\'' || c == '"')
                        .to_string();
                    if !module.is_empty() {
                        imports.push(ImportDef {
                            module,
                            names: vec![],
                            alias: None,
                            is_from: true,
                            is_dynamic: false,
                            line,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    imports
}

fn collect_import_names(node: tree_sitter::Node<'_>, source: &[u8], names: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" => names.push(node_text(child, source).to_string()),
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() == "import_specifier" {
                        if let Some(name_node) = spec.child_by_field_name("name") {
                            names.push(node_text(name_node, source).to_string());
                        }
                    }
                }
            }
            "namespace_import" => names.push("*".to_string()),
            _ => {
                if child.child_count() > 0 {
                    collect_import_names(child, source, names);
                }
            }
        }
    }
}

pub(crate) fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

fn count_nodes(node: tree_sitter::Node<'_>) -> u32 {
    let mut count = 1u32;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count += count_nodes(child);
    }
    count
}

/// Extract a JSDoc comment (`/** ... */`) immediately preceding a node.
pub(crate) fn extract_jsdoc(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let prev = node.prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }

    let text = node_text(prev, source).trim();
    if !text.starts_with("/**") {
        return None;
    }

    let stripped = text
        .strip_prefix("/**")
        .unwrap_or(text)
        .strip_suffix("*/")
        .unwrap_or(text)
        .trim();

    let cleaned: Vec<&str> = stripped
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("* ")
                .or_else(|| trimmed.strip_prefix('*'))
                .unwrap_or(trimmed)
        })
        .collect();

    let result = cleaned.join("\n").trim().to_string();
    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::types::Language;

    fn parse_ts(source: &str) -> ModuleDef {
        parse_file(Path::new("test.ts"), source.as_bytes(), Language::TypeScript)
            .expect("parse should succeed")
    }

    #[test]
    fn test_ts_function() {
        let src = "function greet(name: string): string {\n  return name;\n}\n";
        let module = parse_ts(src);
        assert_eq!(module.functions[0].name, "greet");
        assert_eq!(module.functions[0].parameters[0].name, "name");
        assert_eq!(
            module.functions[0].parameters[0].type_hint.as_deref(),
            Some(": string")
        );
    }

    #[test]
    fn test_ts_class_with_methods_and_heritage() {
        let src = r#"
class AdminUser extends User {
    constructor(private db: Database) {}
    getRole(): string {
        return "admin";
    }
}
"#;
        let module = parse_ts(src);
        assert_eq!(module.classes.len(), 1);
        let class = &module.classes[0];
        assert_eq!(class.name, "AdminUser");
        assert_eq!(class.bases, vec!["User"]);
        assert_eq!(class.methods.len(), 2);
    }

    #[test]
    fn test_ts_exported_function_marked() {
        let src = "export function api(): void { }\n";
        let module = parse_ts(src);
        assert!(module.functions[0].decorators.contains(&"export".to_string()));
    }

    #[test]
    fn test_ts_arrow_function() {
        let src = "const add = (a: number, b: number): number => a + b;\n";
        let module = parse_ts(src);
        assert_eq!(module.functions[0].name, "add");
    }

    #[test]
    fn test_ts_jsdoc() {
        let src = "/**\n * Adds two numbers.\n */\nfunction add(a: number, b: number) {\n  return a + b;\n}\n";
        let module = parse_ts(src);
        assert_eq!(module.functions[0].docstring.as_deref(), Some("Adds two numbers."));
    }

    #[test]
    fn test_ts_imports() {
        let src = "import { Foo, Bar } from './module';\n";
        let module = parse_ts(src);
        assert_eq!(module.imports[0].module, "./module");
        assert_eq!(module.imports[0].names, vec!["Foo".to_string(), "Bar".to_string()]);
    }

    #[test]
    fn test_ts_empty_file() {
        let module = parse_ts("");
        assert!(module.functions.is_empty());
        assert!(module.classes.is_empty());
    }
}
