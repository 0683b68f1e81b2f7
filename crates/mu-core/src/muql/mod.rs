//! MUQL: the mixed relational/graph query language for exploring a mubase.
//!
//! Five query forms from spec.md §4.4 (`SELECT`, `SHOW`, `FIND`, `PATH`,
//! `ANALYZE`) plus `DESCRIBE`/`BLAME`/`HISTORY OF`, supplemented from the
//! original implementation's temporal tooling (§4.6). A query passes through
//! four stages: [`lexer`] -> [`parser`] -> [`planner`] -> [`executor`],
//! with [`formatter`] rendering the result for display.

pub mod ast;
pub mod executor;
pub mod formatter;
pub mod lexer;
pub mod parser;
pub mod planner;

use crate::error::MuResult;
use crate::graph::GraphEngine;
use crate::muql::executor::QueryResult;
use crate::muql::formatter::OutputFormat;
use crate::muql::planner::ExecutionPlan;
use crate::store::Store;

/// High-level entry point: parses, plans, executes, and formats MUQL
/// queries against a loaded [`Store`]/[`GraphEngine`] pair.
pub struct MuqlEngine<'a> {
    store: &'a Store,
    graph: &'a GraphEngine,
}

impl<'a> MuqlEngine<'a> {
    #[must_use]
    pub fn new(store: &'a Store, graph: &'a GraphEngine) -> Self {
        Self { store, graph }
    }

    /// Parse and plan without executing. `MuError::Syntax` propagates with
    /// the offending line/column; there is nothing semantic to fail on at
    /// this stage since no name resolution has happened yet.
    pub fn plan(&self, query: &str) -> MuResult<ExecutionPlan> {
        let ast = parser::parse(query)?;
        Ok(planner::plan_query(ast))
    }

    /// Run a query to completion. Syntax errors propagate as `Err`; semantic
    /// errors (unknown node name, unsupported call-graph form) surface as
    /// `QueryResult.warning` with an empty rectangle, never an `Err`.
    pub fn execute(&self, query: &str) -> MuResult<QueryResult> {
        let plan = self.plan(query)?;
        executor::execute_plan(&plan, self.store, self.graph)
    }

    /// Execute and render in one step.
    pub fn query(&self, query: &str, format: OutputFormat) -> MuResult<String> {
        let result = self.execute(query)?;
        Ok(formatter::format_result(&result, format))
    }

    /// Render the execution plan a query would run, without running it.
    /// Surfaced as `mu query --explain` rather than an HTTP route, since
    /// spec.md's HTTP surface (§6) is closed.
    pub fn explain(&self, query: &str) -> MuResult<String> {
        let plan = self.plan(query)?;
        Ok(format!("{plan:#?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassDef, ModuleDef};

    fn seeded() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open_write(&dir.path().join("mu.db")).expect("open");
        let module = ModuleDef {
            name: "zoo".to_string(),
            path: "zoo.py".to_string(),
            language: "python".to_string(),
            imports: vec![],
            classes: vec![ClassDef {
                name: "Animal".to_string(),
                bases: vec![],
                decorators: vec![],
                docstring: None,
                line_start: 1,
                line_end: 3,
                methods: vec![],
            }],
            functions: vec![],
            docstring: None,
        };
        crate::builder::build_module(&mut store, &module).expect("build");
        (dir, store)
    }

    #[test]
    fn test_execute_select_returns_row() {
        let (_dir, store) = seeded();
        let graph = GraphEngine::new();
        graph.load(&store).unwrap();
        let engine = MuqlEngine::new(&store, &graph);
        let result = engine.execute("SELECT * FROM classes").unwrap();
        assert_eq!(result.row_count, 1);
    }

    #[test]
    fn test_execute_propagates_syntax_error() {
        let (_dir, store) = seeded();
        let graph = GraphEngine::new();
        graph.load(&store).unwrap();
        let engine = MuqlEngine::new(&store, &graph);
        let err = engine.execute("SELECT * FROM bogus").unwrap_err();
        assert!(matches!(err, crate::error::MuError::Syntax { .. }));
    }

    #[test]
    fn test_explain_renders_plan_without_executing() {
        let (_dir, store) = seeded();
        let graph = GraphEngine::new();
        graph.load(&store).unwrap();
        let engine = MuqlEngine::new(&store, &graph);
        let explanation = engine.explain("SELECT * FROM classes").unwrap();
        assert!(explanation.contains("Sql"));
    }

    #[test]
    fn test_query_formats_as_json() {
        let (_dir, store) = seeded();
        let graph = GraphEngine::new();
        graph.load(&store).unwrap();
        let engine = MuqlEngine::new(&store, &graph);
        let rendered = engine.query("SELECT * FROM classes", OutputFormat::Json).unwrap();
        assert!(rendered.contains("\"row_count\":1"));
    }
}
