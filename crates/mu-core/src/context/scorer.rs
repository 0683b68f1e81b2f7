//! Relevance scoring: entity match + vector similarity + graph proximity.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::context::models::{ExtractedEntity, ExtractionConfig, ScoredNode};
use crate::model::Node;
use crate::store::Store;

/// Scores candidate nodes against a question's extracted entities, optional
/// vector similarities, and graph distance from a seed set.
pub struct RelevanceScorer<'a> {
    config: &'a ExtractionConfig,
    store: &'a Store,
}

impl<'a> RelevanceScorer<'a> {
    #[must_use]
    pub fn new(config: &'a ExtractionConfig, store: &'a Store) -> Self {
        Self { config, store }
    }

    /// Score every candidate, dropping anything below `min_relevance`.
    /// Returned list is sorted by combined score descending.
    pub fn score_nodes(
        &self,
        nodes: &[Node],
        entities: &[ExtractedEntity],
        seed_node_ids: &HashSet<String>,
        vector_scores: &HashMap<String, f64>,
    ) -> Vec<ScoredNode> {
        let distances = self.compute_distances(seed_node_ids, nodes);

        let mut scored: Vec<ScoredNode> = nodes
            .iter()
            .filter_map(|node| {
                let entity_score = score_entity_match(node, entities);
                let vector_score = vector_scores.get(&node.id).copied().unwrap_or(0.0);
                let proximity_score = distances
                    .get(&node.id)
                    .map_or(0.0, |&d| 1.0 / (1.0 + d as f64));

                let combined = self.config.entity_weight * entity_score
                    + self.config.vector_weight * vector_score
                    + self.config.proximity_weight * proximity_score;

                if combined < self.config.min_relevance {
                    return None;
                }

                Some(ScoredNode {
                    node: node.clone(),
                    score: combined,
                    entity_score,
                    vector_score,
                    proximity_score,
                    estimated_tokens: 0,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Simultaneous multi-source BFS from every seed node, capped at
    /// `expand_depth + 1` hops, over both edge directions.
    fn compute_distances(
        &self,
        seed_node_ids: &HashSet<String>,
        candidate_nodes: &[Node],
    ) -> HashMap<String, u32> {
        if seed_node_ids.is_empty() {
            return HashMap::new();
        }

        let target_ids: HashSet<&str> = candidate_nodes.iter().map(|n| n.id.as_str()).collect();
        let max_depth = self.config.expand_depth + 1;

        let mut distances = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();

        for seed_id in seed_node_ids {
            if visited.insert(seed_id.clone()) {
                if target_ids.contains(seed_id.as_str()) {
                    distances.insert(seed_id.clone(), 0);
                }
                queue.push_back((seed_id.clone(), 0));
            }
        }

        while let Some((node_id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Ok(neighbor_ids) = self.neighbor_ids(&node_id) else {
                continue;
            };
            for neighbor_id in neighbor_ids {
                if visited.insert(neighbor_id.clone()) {
                    let new_depth = depth + 1;
                    if target_ids.contains(neighbor_id.as_str()) {
                        distances.insert(neighbor_id.clone(), new_depth);
                    }
                    queue.push_back((neighbor_id, new_depth));
                }
            }
        }

        distances
    }

    fn neighbor_ids(&self, node_id: &str) -> crate::error::MuResult<Vec<String>> {
        let edges = self.store.edges_touching(node_id)?;
        Ok(edges
            .into_iter()
            .map(|edge| {
                if edge.source_id == node_id {
                    edge.target_id
                } else {
                    edge.source_id
                }
            })
            .collect())
    }
}

/// Tiered name-match score, each tier multiplied by the entity's own
/// confidence. First matching tier per entity wins; the max across entities
/// is the node's entity score.
#[must_use]
pub fn score_entity_match(node: &Node, entities: &[ExtractedEntity]) -> f64 {
    if entities.is_empty() {
        return 0.0;
    }

    let node_name = node.name.as_str();
    let node_name_lower = node_name.to_lowercase();
    let qualified_lower = node
        .qualified_name
        .as_deref()
        .unwrap_or("")
        .to_lowercase();

    let mut max_score = 0.0_f64;
    for entity in entities {
        let entity_lower = entity.name.to_lowercase();

        let tier = if node_name == entity.name {
            Some(1.0)
        } else if node_name_lower == entity_lower {
            Some(0.8)
        } else if node_name.ends_with(&entity.name) || node_name_lower.ends_with(&entity_lower) {
            Some(0.6)
        } else if node_name.starts_with(&entity.name) || node_name_lower.starts_with(&entity_lower)
        {
            Some(0.5)
        } else if !qualified_lower.is_empty() && qualified_lower.contains(&entity_lower) {
            Some(0.4)
        } else if node_name_lower.contains(&entity_lower) {
            Some(0.3)
        } else {
            None
        };

        if let Some(tier) = tier {
            max_score = max_score.max(tier * entity.confidence);
        }
    }

    max_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::ExtractionMethod;
    use crate::model::NodeType;
    use serde_json::json;

    fn node(name: &str, qualified: &str) -> Node {
        Node {
            id: format!("fn:test.py:{name}"),
            node_type: NodeType::Function,
            name: name.to_string(),
            qualified_name: Some(qualified.to_string()),
            file_path: Some("test.py".to_string()),
            line_start: Some(1),
            line_end: Some(2),
            properties: json!({}),
            complexity: 1,
        }
    }

    fn entity(name: &str, confidence: f64) -> ExtractedEntity {
        ExtractedEntity {
            name: name.to_string(),
            confidence,
            extraction_method: ExtractionMethod::CamelCase,
            is_known: false,
        }
    }

    #[test]
    fn test_exact_match_scores_full_confidence() {
        let n = node("AuthService", "auth.AuthService");
        let score = score_entity_match(&n, &[entity("AuthService", 1.0)]);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_case_insensitive_match_scores_point_eight() {
        let n = node("authservice", "auth.authservice");
        let score = score_entity_match(&n, &[entity("AuthService", 1.0)]);
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_suffix_match_scores_point_six() {
        let n = node("AuthService", "auth.AuthService");
        let score = score_entity_match(&n, &[entity("Service", 1.0)]);
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_match_scores_point_five() {
        let n = node("AuthService", "auth.AuthService");
        let score = score_entity_match(&n, &[entity("Auth", 1.0)]);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_match_scores_zero() {
        let n = node("Unrelated", "x.Unrelated");
        let score = score_entity_match(&n, &[entity("AuthService", 1.0)]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_confidence_scales_tier() {
        let n = node("AuthService", "auth.AuthService");
        let score = score_entity_match(&n, &[entity("AuthService", 0.5)]);
        assert!((score - 0.5).abs() < 1e-9);
    }
}
