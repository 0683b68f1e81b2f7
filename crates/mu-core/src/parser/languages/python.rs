//! Python structural extractor.
//!
//! Extracts functions, classes, methods, decorators, imports and
//! docstrings from Python source using tree-sitter, emitting a
//! [`ModuleDef`] directly.
//!
//! ## Python AST Node Types (tree-sitter-python)
//!
//! - `function_definition` -> function/method
//! - `class_definition` -> class
//! - `decorated_definition` -> wraps function/class with decorators
//! - `import_statement`, `import_from_statement` -> imports
//! - `expression_statement > string` (first child of body) -> docstring

use std::path::Path;

use crate::model::{ClassDef, FunctionDef, ImportDef, ModuleDef, Parameter};
use crate::parser::LanguageAnalyzer;

pub struct PythonAnalyzer;

impl LanguageAnalyzer for PythonAnalyzer {
    fn language_id(&self) -> &str {
        "python"
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract_module(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> ModuleDef {
        let root = tree.root_node();
        let name = crate::parser::module_name_from_path(file_path);
        let docstring = module_docstring(root, source);

        let mut classes = Vec::new();
        let mut functions = Vec::new();
        collect_definitions(root, source, &mut classes, &mut functions);

        ModuleDef {
            name,
            path: file_path.display().to_string(),
            language: "python".to_string(),
            imports: extract_imports(root, source),
            classes,
            functions,
            docstring,
        }
    }
}

fn module_docstring(root: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let first = root.child(0)?;
    extract_docstring_statement(first, source)
}

/// Walk top-level statements, descending through `decorated_definition`
/// wrappers, collecting direct classes and functions. Nested definitions
/// inside function bodies are not surfaced as separate graph nodes.
fn collect_definitions(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    classes: &mut Vec<ClassDef>,
    functions: &mut Vec<FunctionDef>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_definition" => functions.push(extract_function(child, source, &[])),
            "class_definition" => classes.push(extract_class(child, source)),
            "decorated_definition" => {
                let decorators = extract_decorators(child, source);
                let mut inner = child.walk();
                for grandchild in child.children(&mut inner) {
                    match grandchild.kind() {
                        "function_definition" => {
                            functions.push(extract_function(grandchild, source, &decorators));
                        }
                        "class_definition" => classes.push(extract_class(grandchild, source)),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn extract_function(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    decorators: &[String],
) -> FunctionDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();

    let is_async = node
        .child(0)
        .map(|c| c.kind() == "async")
        .unwrap_or(false);

    let parameters = node
        .child_by_field_name("parameters")
        .map(|p| extract_parameters(p, source))
        .unwrap_or_default();

    let return_type = node
        .child_by_field_name("return_type")
        .map(|n| node_text(n, source).to_string());

    let is_static = decorators.iter().any(|d| d == "staticmethod");
    let is_classmethod = decorators.iter().any(|d| d == "classmethod");
    let is_property = decorators.iter().any(|d| d == "property");

    let line_start = node.start_position().row as u32 + 1;
    let line_end = node.end_position().row as u32 + 1;
    let docstring = node
        .child_by_field_name("body")
        .and_then(|body| body.child(0))
        .and_then(|first| extract_docstring_statement(first, source));
    let complexity = node
        .child_by_field_name("body")
        .map(|b| count_nodes(b))
        .unwrap_or(1);

    FunctionDef {
        name,
        parameters,
        return_type,
        decorators: decorators.to_vec(),
        is_async,
        is_static,
        is_classmethod,
        is_property,
        docstring,
        complexity,
        line_start,
        line_end,
    }
}

fn extract_class(node: tree_sitter::Node<'_>, source: &[u8]) -> ClassDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default();

    let mut bases = Vec::new();
    if let Some(args) = node.child_by_field_name("superclasses") {
        let mut cursor = args.walk();
        for child in args.children(&mut cursor) {
            if child.kind() == "identifier" || child.kind() == "attribute" {
                bases.push(node_text(child, source).to_string());
            }
        }
    }

    let docstring = node
        .child_by_field_name("body")
        .and_then(|body| body.child(0))
        .and_then(|first| extract_docstring_statement(first, source));

    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            match child.kind() {
                "function_definition" => methods.push(extract_function(child, source, &[])),
                "decorated_definition" => {
                    let decorators = extract_decorators(child, source);
                    let mut inner = child.walk();
                    for grandchild in child.children(&mut inner) {
                        if grandchild.kind() == "function_definition" {
                            methods.push(extract_function(grandchild, source, &decorators));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    ClassDef {
        name,
        bases,
        decorators: Vec::new(),
        docstring,
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
        methods,
    }
}

fn extract_parameters(node: tree_sitter::Node<'_>, source: &[u8]) -> Vec<Parameter> {
    let mut params = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let param = match child.kind() {
            "identifier" => Some(Parameter {
                name: node_text(child, source).to_string(),
                type_hint: None,
                default: None,
            }),
            "typed_parameter" => {
                let name = child
                    .child(0)
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                let type_hint = child
                    .child_by_field_name("type")
                    .map(|n| node_text(n, source).to_string());
                Some(Parameter {
                    name,
                    type_hint,
                    default: None,
                })
            }
            "default_parameter" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                let default = child
                    .child_by_field_name("value")
                    .map(|n| node_text(n, source).to_string());
                Some(Parameter {
                    name,
                    type_hint: None,
                    default,
                })
            }
            "typed_default_parameter" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                let type_hint = child
                    .child_by_field_name("type")
                    .map(|n| node_text(n, source).to_string());
                let default = child
                    .child_by_field_name("value")
                    .map(|n| node_text(n, source).to_string());
                Some(Parameter {
                    name,
                    type_hint,
                    default,
                })
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => Some(Parameter {
                name: node_text(child, source).to_string(),
                type_hint: None,
                default: None,
            }),
            _ => None,
        };
        if let Some(p) = param {
            if !p.name.is_empty() {
                params.push(p);
            }
        }
    }
    params
}

fn extract_decorators(node: tree_sitter::Node<'_>, source: &[u8]) -> Vec<String> {
    let mut decorators = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "decorator" {
            let text = node_text(child, source);
            let name = text
                .strip_prefix('@')
                .unwrap_or(text)
                .split('(')
                .next()
                .unwrap_or(text)
                .trim();
            decorators.push(name.to_string());
        }
    }
    decorators
}

fn extract_docstring_statement(first_stmt: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    if first_stmt.kind() != "expression_statement" {
        return None;
    }
    let expr = first_stmt.child(0)?;
    if expr.kind() != "string" && expr.kind() != "concatenated_string" {
        return None;
    }
    Some(clean_docstring(node_text(expr, source)))
}

fn extract_imports(root: tree_sitter::Node<'_>, source: &[u8]) -> Vec<ImportDef> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();

    for child in root.children(&mut cursor) {
        let line = child.start_position().row as u32 + 1;

        match child.kind() {
            "import_statement" => {
                let mut inner = child.walk();
                for name_node in child.children(&mut inner) {
                    match name_node.kind() {
                        "dotted_name" => {
                            imports.push(ImportDef {
                                module: node_text(name_node, source).to_string(),
                                names: vec![],
                                alias: None,
                                is_from: false,
                                is_dynamic: false,
                                line,
                            });
                        }
                        "aliased_import" => {
                            let module = name_node
                                .child_by_field_name("name")
                                .map(|n| node_text(n, source).to_string())
                                .unwrap_or_default();
                            let alias = name_node
                                .child_by_field_name("alias")
                                .map(|n| node_text(n, source).to_string());
                            if !module.is_empty() {
                                imports.push(ImportDef {
                                    module,
                                    names: vec![],
                                    alias,
                                    is_from: false,
                                    is_dynamic: false,
                                    line,
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            "import_from_statement" => {
                let module_field = child.child_by_field_name("module_name");
                let module = module_field
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                if module.is_empty() {
                    continue;
                }

                let mut names = Vec::new();
                let mut inner = child.walk();
                for name_node in child.children(&mut inner) {
                    if Some(name_node) == module_field {
                        continue;
                    }
                    match name_node.kind() {
                        "dotted_name" | "identifier" => {
                            names.push(node_text(name_node, source).to_string());
                        }
                        "aliased_import" => {
                            if let Some(n) = name_node.child_by_field_name("name") {
                                names.push(node_text(n, source).to_string());
                            }
                        }
                        "wildcard_import" => names.push("*".to_string()),
                        _ => {}
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
            _ => {}
        }
    }

    imports
}

fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
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

fn clean_docstring(raw: &str) -> String {
    let stripped = raw
        .trim()
        .strip_prefix("\"\"\"")
        .or_else(|| raw.trim().strip_prefix("'''"))
        .unwrap_or(raw);
    let stripped = stripped
        .strip_suffix("\"\"\"")
        .or_else(|| stripped.strip_suffix("'''"))
        .unwrap_or(stripped);
    stripped.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::types::Language;
    use std::path::Path;

    fn parse_python(source: &str) -> ModuleDef {
        parse_file(Path::new("test.py"), source.as_bytes(), Language::Python)
            .expect("parse should succeed")
    }

    #[test]
    fn test_simple_function() {
        let src = "def hello(name):\n    \"\"\"Greet someone.\"\"\"\n    print(f\"Hello, {name}!\")\n";
        let module = parse_python(src);
        assert_eq!(module.functions.len(), 1);

        let func = &module.functions[0];
        assert_eq!(func.name, "hello");
        assert_eq!(func.docstring.as_deref(), Some("Greet someone."));
        assert_eq!(func.parameters.len(), 1);
        assert_eq!(func.parameters[0].name, "name");
    }

    #[test]
    fn test_class_with_methods() {
        let src = r#"
class UserService:
    """Service for managing users."""

    def __init__(self, db):
        self.db = db

    def get_user(self, user_id):
        """Retrieve a user by ID."""
        return self.db.find(user_id)
"#;
        let module = parse_python(src);
        assert_eq!(module.classes.len(), 1);
        let class = &module.classes[0];
        assert_eq!(class.name, "UserService");
        assert_eq!(
            class.docstring.as_deref(),
            Some("Service for managing users.")
        );
        assert_eq!(class.methods.len(), 2);
        assert_eq!(class.methods[1].name, "get_user");
        assert_eq!(
            class.methods[1].docstring.as_deref(),
            Some("Retrieve a user by ID.")
        );
    }

    #[test]
    fn test_decorated_static_and_classmethod() {
        let src = r#"
class Config:
    @staticmethod
    def default():
        return Config()

    @classmethod
    def from_env(cls):
        return cls()
"#;
        let module = parse_python(src);
        let class = &module.classes[0];
        assert!(class.methods.iter().find(|m| m.name == "default").expect("default").is_static);
        assert!(class
            .methods
            .iter()
            .find(|m| m.name == "from_env")
            .expect("from_env")
            .is_classmethod);
    }

    #[test]
    fn test_class_inheritance() {
        let src = "class ServiceError(ValueError, CustomMixin):\n    pass\n";
        let module = parse_python(src);
        let class = &module.classes[0];
        assert_eq!(class.bases, vec!["ValueError", "CustomMixin"]);
    }

    #[test]
    fn test_imports_plain_and_from() {
        let src = "import os.path\nfrom typing import Optional, List\n";
        let module = parse_python(src);
        assert_eq!(module.imports.len(), 2);
        assert_eq!(module.imports[0].module, "os.path");
        assert!(!module.imports[0].is_from);
        assert_eq!(module.imports[1].module, "typing");
        assert!(module.imports[1].is_from);
        assert_eq!(
            module.imports[1].names,
            vec!["Optional".to_string(), "List".to_string()]
        );
    }

    #[test]
    fn test_wildcard_import() {
        let src = "from os import *\n";
        let module = parse_python(src);
        assert_eq!(module.imports[0].names, vec!["*".to_string()]);
    }

    #[test]
    fn test_async_function() {
        let src = "async def fetch():\n    pass\n";
        let module = parse_python(src);
        assert!(module.functions[0].is_async);
    }

    #[test]
    fn test_multiline_docstring() {
        let src = "def f():\n    \"\"\"\n    Line one.\n\n    Line two.\n    \"\"\"\n    pass\n";
        let module = parse_python(src);
        let doc = module.functions[0].docstring.as_ref().expect("docstring");
        assert!(doc.contains("Line one."));
        assert!(doc.contains("Line two."));
    }

    #[test]
    fn test_line_numbers() {
        let src = "def first():\n    pass\n\ndef second():\n    pass\n";
        let module = parse_python(src);
        assert_eq!(module.functions[0].line_start, 1);
        assert_eq!(module.functions[1].line_start, 4);
    }

    #[test]
    fn test_empty_file() {
        let module = parse_python("");
        assert!(module.functions.is_empty());
        assert!(module.classes.is_empty());
    }

    #[test]
    fn test_comments_only_file() {
        let module = parse_python("# just a comment\n");
        assert!(module.functions.is_empty());
    }

    #[test]
    fn test_clean_docstring() {
        assert_eq!(clean_docstring(r#""""hello""""#), "hello");
        assert_eq!(clean_docstring("'''hello'''"), "hello");
    }
}
