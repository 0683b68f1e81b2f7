//! Smart Context Extractor: turns a natural-language question into a
//! token-budgeted MU-text document.
//!
//! Pipeline: [`intent`] classification -> [`entity`] extraction ->
//! candidate selection (name match + optional vector similarity) -> graph
//! expansion via [`crate::graph::GraphEngine`] -> [`scorer`] relevance
//! ranking -> [`budgeter`] token selection -> [`render`] MU-text output.

pub mod budgeter;
pub mod entity;
pub mod intent;
pub mod models;
pub mod render;
pub mod scorer;

use std::collections::{HashMap, HashSet};

use crate::error::MuResult;
use crate::graph::{GraphEngine, TraversalDirection};
use crate::model::{EdgeType, Node, NodeType};
use crate::store::Store;

pub use models::{
    ContextResult, ExportConfig, ExtractedEntity, ExtractionConfig, ExtractionStats, ScoredNode,
};

/// Supplies embedding similarity scores for a question, keyed by node id.
/// Implemented once `mu-core::embeddings` exists; extraction degrades
/// gracefully (vector weight contributes zero) without one.
pub trait VectorScorer {
    /// # Errors
    /// Propagates whatever the backing similarity search reports.
    fn similar(&self, question: &str, limit: usize) -> MuResult<HashMap<String, f64>>;
}

/// Orchestrates the full extraction pipeline against a loaded store/graph.
pub struct SmartContextExtractor<'a> {
    store: &'a Store,
    graph: &'a GraphEngine,
}

impl<'a> SmartContextExtractor<'a> {
    #[must_use]
    pub fn new(store: &'a Store, graph: &'a GraphEngine) -> Self {
        Self { store, graph }
    }

    /// Run the full pipeline for `question` under `config`.
    pub fn extract(
        &self,
        question: &str,
        config: &ExtractionConfig,
        vector_scorer: Option<&dyn VectorScorer>,
    ) -> MuResult<ContextResult> {
        let classified = intent::Intent::classify(question);
        let overrides = classified.intent.strategy();
        let mut config = config.clone();
        if let Some(depth) = overrides.expand_depth {
            config.expand_depth = depth;
        }
        if let Some(exclude_tests) = overrides.exclude_tests {
            config.exclude_tests = exclude_tests;
        }
        if let Some(include_parent) = overrides.include_parent {
            config.include_parent = include_parent;
        }

        let mut entities = entity::extract_entities(question);
        let (candidates, seed_ids) = self.select_candidates(&mut entities, &config)?;
        let candidates_before_expansion = candidates.len();

        let expanded = self.expand_graph(&candidates, &seed_ids, &config)?;
        let candidates_after_expansion = expanded.len();

        let filtered: Vec<Node> = if config.exclude_tests {
            expanded.into_iter().filter(|n| !is_test_node(n)).collect()
        } else {
            expanded
        };

        let vector_scores = match vector_scorer {
            Some(scorer) => scorer.similar(question, config.vector_search_limit)?,
            None => HashMap::new(),
        };
        let vector_matches = vector_scores.len();

        let scorer = scorer::RelevanceScorer::new(&config, self.store);
        let scored = scorer.score_nodes(&filtered, &entities, &seed_ids, &vector_scores);

        let export_config = ExportConfig::default();
        let mut budgeter = budgeter::TokenBudgeter::new(config.max_tokens, export_config.clone())?;
        let selected = budgeter.fit_to_budget(scored, self.store, config.include_parent)?;

        let ordered_nodes: Vec<Node> = selected.iter().map(|s| s.node.clone()).collect();
        let relevance_scores: HashMap<String, f64> = selected
            .iter()
            .map(|s| (s.node.id.clone(), s.score))
            .collect();

        let mu_text = render::render(&ordered_nodes, self.store, &export_config)?;
        let token_count = budgeter.count_tokens(&mu_text);

        let stats = ExtractionStats {
            entities_found: entities.len(),
            vector_matches,
            candidates_before_expansion,
            candidates_after_expansion,
            nodes_selected: ordered_nodes.len(),
            budget_utilization: f64::from(token_count) / f64::from(config.max_tokens.max(1)),
        };

        Ok(ContextResult {
            mu_text,
            nodes: ordered_nodes,
            token_count,
            relevance_scores,
            extraction_stats: stats,
            intent: classified.intent.as_str().to_string(),
            intent_confidence: classified.confidence,
            strategy_used: classified.intent.as_str().to_string(),
        })
    }

    /// Name-match candidate selection: exact matches by extracted entity,
    /// capped at `max_expansion_nodes` (the pack's single explosion-prevention
    /// knob, reused here since no dedicated name-match limit is specified).
    fn select_candidates(
        &self,
        entities: &mut [ExtractedEntity],
        config: &ExtractionConfig,
    ) -> MuResult<(Vec<Node>, HashSet<String>)> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<Node> = Vec::new();
        let mut seed_ids: HashSet<String> = HashSet::new();

        for entity in entities.iter_mut() {
            if let Some(node) = self.store.find_node_by_name(&entity.name)? {
                entity.is_known = true;
                if seen.insert(node.id.clone()) {
                    seed_ids.insert(node.id.clone());
                    candidates.push(node);
                }
            }
        }

        if candidates.len() < config.max_expansion_nodes {
            let entity_names: Vec<String> = entities.iter().map(|e| e.name.to_lowercase()).collect();
            if !entity_names.is_empty() {
                for node in self.store.all_nodes()? {
                    if candidates.len() >= config.max_expansion_nodes {
                        break;
                    }
                    if seen.contains(&node.id) {
                        continue;
                    }
                    let name_lower = node.name.to_lowercase();
                    if entity_names.iter().any(|e| name_lower.contains(e.as_str())) {
                        seen.insert(node.id.clone());
                        seed_ids.insert(node.id.clone());
                        candidates.push(node);
                    }
                }
            }
        }

        Ok((candidates, seed_ids))
    }

    /// Bounded BFS expansion around the candidate set via the graph engine.
    fn expand_graph(
        &self,
        candidates: &[Node],
        seed_ids: &HashSet<String>,
        config: &ExtractionConfig,
    ) -> MuResult<Vec<Node>> {
        let mut by_id: HashMap<String, Node> = candidates
            .iter()
            .cloned()
            .map(|n| (n.id.clone(), n))
            .collect();

        if config.expand_depth > 0 {
            for seed_id in seed_ids {
                let Ok(neighbor_ids) = self.graph.neighbors(
                    seed_id,
                    TraversalDirection::Both,
                    config.expand_depth as usize,
                    None,
                ) else {
                    continue;
                };
                for neighbor_id in neighbor_ids {
                    if by_id.len() >= config.max_expansion_nodes {
                        break;
                    }
                    if by_id.contains_key(&neighbor_id) {
                        continue;
                    }
                    if let Some(node) = self.store.get_node(&neighbor_id)? {
                        by_id.insert(neighbor_id, node);
                    }
                }
            }
        }

        Ok(by_id.into_values().collect())
    }
}

/// True when a node looks like test code: file path under a `tests`/`test`
/// directory or named `test_*`/`*_test`, or (Rust/Go) a function whose
/// `is_property` flag was repurposed by the parser to mark `#[test]` /
/// `Test*` functions.
#[must_use]
pub fn is_test_node(node: &Node) -> bool {
    if node.node_type == NodeType::Function
        && node
            .properties
            .get("is_property")
            .and_then(|v| v.as_bool())
            == Some(true)
        && matches!(
            node.properties.get("language").and_then(|v| v.as_str()),
            Some("rust" | "go")
        )
    {
        return true;
    }

    let Some(path) = &node.file_path else {
        return false;
    };
    let lower = path.to_lowercase();
    lower.contains("/test/")
        || lower.contains("/tests/")
        || lower.split('/').next_back().is_some_and(|base| {
            base.starts_with("test_") || base.ends_with("_test.py") || base.ends_with("_test.go")
        })
}

/// The node whose incoming `Contains` edge points at `node`, if any.
pub(crate) fn find_parent(store: &Store, node: &Node) -> MuResult<Option<Node>> {
    let edges = store.edges_touching(&node.id)?;
    for edge in edges {
        if edge.target_id == node.id && edge.edge_type == EdgeType::Contains {
            return store.get_node(&edge.source_id);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassDef, FunctionDef, ImportDef, ModuleDef, Parameter};

    fn seeded() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open_write(&dir.path().join("mu.db")).expect("open");
        let module = ModuleDef {
            name: "auth".to_string(),
            path: "auth.py".to_string(),
            language: "python".to_string(),
            imports: vec![ImportDef {
                module: "os".to_string(),
                names: vec![],
                alias: None,
                is_from: false,
                is_dynamic: false,
                line: 1,
            }],
            classes: vec![ClassDef {
                name: "AuthService".to_string(),
                bases: vec![],
                decorators: vec![],
                docstring: Some("Handles authentication.".to_string()),
                line_start: 1,
                line_end: 20,
                methods: vec![FunctionDef {
                    name: "login".to_string(),
                    parameters: vec![Parameter {
                        name: "username".to_string(),
                        type_hint: Some("str".to_string()),
                        default: None,
                    }],
                    return_type: Some("bool".to_string()),
                    decorators: vec![],
                    is_async: false,
                    is_static: false,
                    is_classmethod: false,
                    is_property: false,
                    docstring: Some("Logs a user in.".to_string()),
                    complexity: 3,
                    line_start: 2,
                    line_end: 5,
                }],
            }],
            functions: vec![],
            docstring: Some("Auth module.".to_string()),
        };
        crate::builder::build_module(&mut store, &module).expect("build");
        (dir, store)
    }

    #[test]
    fn test_extract_finds_seed_by_entity_name() {
        let (_dir, store) = seeded();
        let graph = GraphEngine::new();
        graph.load(&store).unwrap();
        let extractor = SmartContextExtractor::new(&store, &graph);
        let result = extractor
            .extract("how does AuthService work?", &ExtractionConfig::default(), None)
            .unwrap();
        assert!(result.nodes.iter().any(|n| n.name == "AuthService"));
        assert_eq!(result.intent, "explain");
    }

    #[test]
    fn test_extract_includes_parent_class_for_method() {
        let (_dir, store) = seeded();
        let graph = GraphEngine::new();
        graph.load(&store).unwrap();
        let extractor = SmartContextExtractor::new(&store, &graph);
        let result = extractor
            .extract("how does 'login' work?", &ExtractionConfig::default(), None)
            .unwrap();
        assert!(result.nodes.iter().any(|n| n.name == "AuthService"));
        assert!(result.nodes.iter().any(|n| n.name == "login"));
    }

    #[test]
    fn test_mu_text_contains_sigils() {
        let (_dir, store) = seeded();
        let graph = GraphEngine::new();
        graph.load(&store).unwrap();
        let extractor = SmartContextExtractor::new(&store, &graph);
        let result = extractor
            .extract("explain AuthService", &ExtractionConfig::default(), None)
            .unwrap();
        assert!(result.mu_text.contains('$'));
    }

    #[test]
    fn test_unknown_entity_yields_empty_but_no_error() {
        let (_dir, store) = seeded();
        let graph = GraphEngine::new();
        graph.load(&store).unwrap();
        let extractor = SmartContextExtractor::new(&store, &graph);
        let result = extractor
            .extract("how does Nonexistent work?", &ExtractionConfig::default(), None)
            .unwrap();
        assert_eq!(result.extraction_stats.candidates_before_expansion, 0);
    }

    #[test]
    fn test_is_test_node_by_path() {
        let node = Node {
            id: "mod:tests/test_auth.py".to_string(),
            node_type: NodeType::Module,
            name: "test_auth".to_string(),
            qualified_name: None,
            file_path: Some("tests/test_auth.py".to_string()),
            line_start: None,
            line_end: None,
            properties: serde_json::json!({}),
            complexity: 0,
        };
        assert!(is_test_node(&node));
    }
}
