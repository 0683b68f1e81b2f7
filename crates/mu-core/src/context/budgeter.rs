//! Token budgeting: estimate per-node cost, then greedily select nodes
//! (parent classes included) within a token budget.

use std::collections::{HashMap, HashSet};

use tiktoken_rs::CoreBPE;

use crate::context::models::{ExportConfig, ScoredNode};
use crate::error::MuResult;
use crate::model::{Node, NodeType};
use crate::store::Store;

fn base_tokens(node_type: NodeType) -> u32 {
    match node_type {
        NodeType::Module => 15,
        NodeType::Class => 25,
        NodeType::Function => 20,
        NodeType::External => 5,
    }
}

const TOKENS_PER_PARAM: u32 = 5;
const TOKENS_PER_BASE: u32 = 3;

/// Selects nodes to fit within a token budget using `cl100k_base` token
/// counting and greedy selection by relevance score.
pub struct TokenBudgeter {
    max_tokens: u32,
    encoder: CoreBPE,
    export_config: ExportConfig,
    cache: HashMap<String, u32>,
}

impl TokenBudgeter {
    /// # Errors
    /// Returns an error if the `cl100k_base` encoder tables fail to load.
    pub fn new(max_tokens: u32, export_config: ExportConfig) -> MuResult<Self> {
        let encoder = tiktoken_rs::cl100k_base()
            .map_err(|e| crate::error::MuError::Internal(format!("tiktoken load failed: {e}")))?;
        Ok(Self {
            max_tokens,
            encoder,
            export_config,
            cache: HashMap::new(),
        })
    }

    /// Exact token count for rendered text, used to report the actual
    /// `token_count` of a finished MU-text document.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> u32 {
        self.encoder.encode_with_special_tokens(text).len() as u32
    }

    /// Estimated token cost of a node before it's rendered, cached per id.
    pub fn estimate_node_tokens(&mut self, node: &Node) -> u32 {
        if let Some(&cached) = self.cache.get(&node.id) {
            return cached;
        }

        let mut tokens = base_tokens(node.node_type)
            + node.name.split('_').count() as u32
            + node.name.split('.').count() as u32;

        match node.node_type {
            NodeType::Function => {
                let params = node
                    .properties
                    .get("parameters")
                    .and_then(|v| v.as_array())
                    .map_or(0, Vec::len) as u32;
                tokens += params * TOKENS_PER_PARAM;
                if node
                    .properties
                    .get("return_type")
                    .is_some_and(|v| !v.is_null())
                {
                    tokens += 3;
                }
                if node.properties.get("is_async").and_then(|v| v.as_bool()) == Some(true) {
                    tokens += 1;
                }
                let is_static_or_classmethod = node
                    .properties
                    .get("is_static")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
                    || node
                        .properties
                        .get("is_classmethod")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                if is_static_or_classmethod {
                    tokens += 1;
                }
            }
            NodeType::Class => {
                let bases = node
                    .properties
                    .get("bases")
                    .and_then(|v| v.as_array())
                    .map_or(0, Vec::len) as u32;
                tokens += bases * TOKENS_PER_BASE;
            }
            NodeType::Module => {
                if let Some(path) = &node.file_path {
                    tokens += path.split('/').count() as u32 * 2;
                }
            }
            NodeType::External => {}
        }

        if self.export_config.include_docstrings {
            if let Some(doc) = node.properties.get("docstring").and_then(|v| v.as_str()) {
                tokens += (doc.len() as u32 / 4).min(50);
            }
        }

        if self.export_config.include_line_numbers {
            tokens += 5;
        }

        self.cache.insert(node.id.clone(), tokens);
        tokens
    }

    /// Greedily select nodes by score, stopping once the budget is
    /// exhausted. When a method is selected and `include_parent` is set,
    /// its owning class is pulled in immediately before it at 90% of the
    /// child's score, charged against the same budget.
    pub fn fit_to_budget(
        &mut self,
        scored_nodes: Vec<ScoredNode>,
        store: &Store,
        include_parent: bool,
    ) -> MuResult<Vec<ScoredNode>> {
        let mut selected: Vec<ScoredNode> = Vec::new();
        let mut selected_ids: HashSet<String> = HashSet::new();
        let mut used_tokens: u32 = 0;
        let mut needed_parents: HashMap<String, ScoredNode> = HashMap::new();

        for mut scored in scored_nodes {
            let estimated = self.estimate_node_tokens(&scored.node);

            let mut parent_tokens = 0;
            let mut parent_node: Option<Node> = None;
            if include_parent && scored.node.node_type == NodeType::Function {
                if let Some(parent) = super::find_parent(store, &scored.node)? {
                    if parent.node_type == NodeType::Class && !selected_ids.contains(&parent.id) {
                        parent_tokens = self.estimate_node_tokens(&parent);
                        parent_node = Some(parent);
                    }
                }
            }

            let total_new = estimated + parent_tokens;
            if used_tokens + total_new > self.max_tokens {
                if used_tokens >= self.max_tokens {
                    break;
                }
                continue;
            }

            if let Some(parent) = parent_node {
                let parent_scored = ScoredNode {
                    score: scored.score * 0.9,
                    entity_score: 0.0,
                    vector_score: 0.0,
                    proximity_score: 1.0,
                    estimated_tokens: parent_tokens,
                    node: parent.clone(),
                };
                needed_parents.insert(parent.id.clone(), parent_scored);
                selected_ids.insert(parent.id);
                used_tokens += parent_tokens;
            }

            scored.estimated_tokens = estimated;
            selected_ids.insert(scored.node.id.clone());
            used_tokens += estimated;
            selected.push(scored);
        }

        let mut final_selected = Vec::with_capacity(selected.len() + needed_parents.len());
        for scored in selected {
            if let Some(parent) = super::find_parent(store, &scored.node)? {
                if let Some(parent_scored) = needed_parents.remove(&parent.id) {
                    final_selected.push(parent_scored);
                }
            }
            final_selected.push(scored);
        }
        final_selected.extend(needed_parents.into_values());

        Ok(final_selected)
    }
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

    fn function_node(id: &str, params: usize) -> Node {
        Node {
            id: id.to_string(),
            node_type: NodeType::Function,
            name: "login".to_string(),
            qualified_name: Some("AuthService.login".to_string()),
            file_path: Some("auth.py".to_string()),
            line_start: Some(1),
            line_end: Some(5),
            properties: json!({
                "parameters": vec![json!({}); params],
                "return_type": null,
                "is_async": false,
                "is_static": false,
                "is_classmethod": false,
                "docstring": "Logs a user in.",
            }),
            complexity: 2,
        }
    }

    #[test]
    fn test_estimate_scales_with_parameters() {
        let mut budgeter = TokenBudgeter::new(8000, ExportConfig::default()).unwrap();
        let few = function_node("fn:a", 1);
        let many = function_node("fn:b", 5);
        assert!(budgeter.estimate_node_tokens(&many) > budgeter.estimate_node_tokens(&few));
    }

    #[test]
    fn test_estimate_is_cached() {
        let mut budgeter = TokenBudgeter::new(8000, ExportConfig::default()).unwrap();
        let node = function_node("fn:a", 2);
        let first = budgeter.estimate_node_tokens(&node);
        let second = budgeter.estimate_node_tokens(&node);
        assert_eq!(first, second);
    }

    #[test]
    fn test_fit_to_budget_stops_when_exhausted() {
        let (_dir, store) = seeded();
        let mut budgeter = TokenBudgeter::new(10, ExportConfig::default()).unwrap();
        let scored = vec![
            ScoredNode {
                node: function_node("fn:a", 0),
                score: 1.0,
                entity_score: 1.0,
                vector_score: 0.0,
                proximity_score: 0.0,
                estimated_tokens: 0,
            },
            ScoredNode {
                node: function_node("fn:b", 0),
                score: 0.9,
                entity_score: 0.9,
                vector_score: 0.0,
                proximity_score: 0.0,
                estimated_tokens: 0,
            },
        ];
        let selected = budgeter.fit_to_budget(scored, &store, false).unwrap();
        assert!(selected.len() <= 1);
    }
}
