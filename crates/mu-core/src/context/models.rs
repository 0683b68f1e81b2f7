//! Configuration, intermediate, and result types for context extraction.

use serde::{Deserialize, Serialize};

use crate::model::Node;

/// Tunables for the extraction pipeline: budgets, weights, expansion caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_tokens: u32,
    pub include_imports: bool,
    pub include_parent: bool,
    pub expand_depth: u32,
    pub entity_weight: f64,
    pub vector_weight: f64,
    pub proximity_weight: f64,
    pub min_relevance: f64,
    pub exclude_tests: bool,
    pub vector_search_limit: usize,
    pub max_expansion_nodes: usize,
    pub include_docstrings: bool,
    pub include_line_numbers: bool,
    pub min_complexity_to_show: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            include_imports: true,
            include_parent: true,
            expand_depth: 1,
            entity_weight: 1.0,
            vector_weight: 0.7,
            proximity_weight: 0.3,
            min_relevance: 0.1,
            exclude_tests: false,
            vector_search_limit: 20,
            max_expansion_nodes: 100,
            include_docstrings: true,
            include_line_numbers: false,
            min_complexity_to_show: 0,
        }
    }
}

/// Knobs governing MU-text rendering, distinct from scoring/selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub include_docstrings: bool,
    pub max_docstring_lines: u32,
    pub truncate_docstring: bool,
    pub min_complexity_to_show: u32,
    pub include_line_numbers: bool,
    pub include_internal_imports: bool,
    pub include_import_aliases: bool,
    pub max_attributes: usize,
    pub include_language: bool,
    pub include_qualified_names: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_docstrings: true,
            max_docstring_lines: 5,
            truncate_docstring: true,
            min_complexity_to_show: 0,
            include_line_numbers: false,
            include_internal_imports: true,
            include_import_aliases: false,
            max_attributes: 15,
            include_language: false,
            include_qualified_names: false,
        }
    }
}

/// How an [`ExtractedEntity`] was pulled out of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    CamelCase,
    SnakeCase,
    Quoted,
    DottedPath,
}

/// A code-identifier-shaped token pulled out of a natural language question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub confidence: f64,
    pub extraction_method: ExtractionMethod,
    pub is_known: bool,
}

/// A candidate node together with its scoring breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNode {
    pub node: Node,
    pub score: f64,
    pub entity_score: f64,
    pub vector_score: f64,
    pub proximity_score: f64,
    pub estimated_tokens: u32,
}

/// Output of a single [`crate::context::SmartContextExtractor::extract`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResult {
    pub mu_text: String,
    pub nodes: Vec<Node>,
    pub token_count: u32,
    pub relevance_scores: std::collections::HashMap<String, f64>,
    pub extraction_stats: ExtractionStats,
    pub intent: String,
    pub intent_confidence: f64,
    pub strategy_used: String,
}

/// Debug/metrics info surfaced alongside a [`ContextResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub entities_found: usize,
    pub vector_matches: usize,
    pub candidates_before_expansion: usize,
    pub candidates_after_expansion: usize,
    pub nodes_selected: usize,
    pub budget_utilization: f64,
}
