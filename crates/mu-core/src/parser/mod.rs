//! AST parsing subsystem using tree-sitter.
//!
//! Language-agnostic AST parsing with per-language structural extractors.
//! Each supported language registers an analyzer that maps a tree-sitter
//! CST directly onto a [`ModuleDef`](crate::model::ModuleDef) -- the
//! contract the Incremental Builder consumes.
//!
//! ```text
//! Source File -> Language Detection -> tree-sitter Grammar
//!            -> Incremental Parse -> CST
//!            -> Structural Extraction -> ModuleDef
//! ```
//!
//! The parser is stateless and can be invoked from multiple threads via
//! `spawn_blocking`.

pub mod registry;
pub mod languages;

use std::path::Path;

use crate::error::{MuError, MuResult};
use crate::model::ModuleDef;
use crate::types::Language;

/// Trait that each language analyzer must implement.
pub trait LanguageAnalyzer: Send + Sync {
    /// Returns the language identifier (e.g., "python", "rust").
    fn language_id(&self) -> &str;

    /// Returns the tree-sitter `Language` for this analyzer.
    fn tree_sitter_language(&self) -> tree_sitter::Language;

    /// Extract a full `ModuleDef` from a parsed tree.
    fn extract_module(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> ModuleDef;
}

/// Derive a module name from its file path: strips the extension and
/// any leading path components, e.g. `src/auth/service.py` -> `service`.
#[must_use]
pub fn module_name_from_path(file_path: &Path) -> String {
    file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string()
}

/// Parse a source file into its `ModuleDef`.
///
/// 1. Detects the language from the file extension
/// 2. Loads the appropriate tree-sitter grammar
/// 3. Parses the source code
/// 4. Extracts the module definition via the language analyzer
pub fn parse_file(file_path: &Path, source: &[u8], language: Language) -> MuResult<ModuleDef> {
    let registry = registry::global_registry();

    let analyzer = registry.get(language).ok_or_else(|| MuError::Parse {
        path: file_path.to_path_buf(),
        message: format!("no analyzer registered for language: {language}"),
    })?;

    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&analyzer.tree_sitter_language())
        .map_err(|e| MuError::Parse {
            path: file_path.to_path_buf(),
            message: format!("failed to set tree-sitter language: {e}"),
        })?;

    let tree = parser.parse(source, None).ok_or_else(|| MuError::Parse {
        path: file_path.to_path_buf(),
        message: "tree-sitter returned None (parse timeout or cancellation)".into(),
    })?;

    Ok(analyzer.extract_module(&tree, source, file_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_unknown_language_returns_error() {
        let result = parse_file(Path::new("test.xyz"), b"hello world", Language::Unknown);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_file_python_smoke() {
        let module = parse_file(
            Path::new("a.py"),
            b"def greet(name):\n    return name\n",
            Language::Python,
        )
        .expect("parse");
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].name, "greet");
    }
}
