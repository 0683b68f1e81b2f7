//! JavaScript structural extractor.
//!
//! Shares all traversal logic with the TypeScript analyzer but loads the
//! JavaScript grammar (no type annotations, no interfaces/type aliases).

use std::path::Path;

use crate::model::ModuleDef;
use crate::parser::LanguageAnalyzer;

pub struct JavaScriptAnalyzer;

impl LanguageAnalyzer for JavaScriptAnalyzer {
    fn language_id(&self) -> &str {
        "javascript"
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_javascript::LANGUAGE.into()
    }

    fn extract_module(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> ModuleDef {
        super::typescript::extract_ts_module(tree, source, file_path, "javascript")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::types::Language;
    use std::path::Path;

    fn parse_js(source: &str) -> ModuleDef {
        parse_file(Path::new("test.js"), source.as_bytes(), Language::JavaScript)
            .expect("parse should succeed")
    }

    #[test]
    fn test_js_function() {
        let src = "function greet(name) {\n  return `Hello, ${name}`;\n}\n";
        let module = parse_js(src);
        assert_eq!(module.functions[0].name, "greet");
    }

    #[test]
    fn test_js_class() {
        let src = r#"
class Animal {
    constructor(name) {
        this.name = name;
    }
    speak() {
        console.log(this.name);
    }
}
"#;
        let module = parse_js(src);
        assert_eq!(module.classes[0].name, "Animal");
        assert_eq!(module.classes[0].methods.len(), 2);
    }

    #[test]
    fn test_js_arrow_function() {
        let src = "const double = (x) => x * 2;\n";
        let module = parse_js(src);
        assert_eq!(module.functions[0].name, "double");
    }

    #[test]
    fn test_js_exported() {
        let src = "export function handler(req, res) { }\n";
        let module = parse_js(src);
        assert_eq!(module.functions[0].name, "handler");
        assert!(module.functions[0]
            .decorators
            .contains(&"export".to_string()));
    }
}
