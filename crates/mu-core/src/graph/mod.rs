//! The Graph Engine: an in-memory directed multigraph reloaded on demand
//! from the [`Store`](crate::store::Store).
//!
//! Loaded by bulk-reading `(id)` for nodes and `(source, target, type)` for
//! edges, preserving parallel edges of distinct types. Refuses to answer
//! until `load()` has been called at least once (§4.2); reloading after a
//! write is the caller's responsibility.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{MuError, MuResult};
use crate::model::EdgeType;
use crate::store::Store;

/// Aggregate counts returned by [`GraphEngine::stats`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub edge_types: Vec<String>,
}

struct GraphInner {
    graph: DiGraph<String, EdgeType>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl GraphInner {
    fn empty() -> Self {
        Self {
            graph: DiGraph::new(),
            id_to_index: HashMap::new(),
        }
    }
}

/// Thread-safe, reload-on-demand dependency/reachability graph.
pub struct GraphEngine {
    inner: RwLock<Option<GraphInner>>,
}

impl GraphEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// True once `load()` has succeeded at least once.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Hydrate the in-memory graph from the store. Replaces any prior state.
    pub fn load(&self, store: &Store) -> MuResult<GraphStats> {
        let nodes = store.all_nodes()?;
        let edges = store.all_edges()?;

        let mut built = GraphInner::empty();
        for node in &nodes {
            let idx = built.graph.add_node(node.id.clone());
            built.id_to_index.insert(node.id.clone(), idx);
        }

        let mut edge_type_set = std::collections::HashSet::new();
        for edge in &edges {
            let source = *built
                .id_to_index
                .entry(edge.source_id.clone())
                .or_insert_with(|| built.graph.add_node(edge.source_id.clone()));
            let target = *built
                .id_to_index
                .entry(edge.target_id.clone())
                .or_insert_with(|| built.graph.add_node(edge.target_id.clone()));
            built.graph.add_edge(source, target, edge.edge_type);
            edge_type_set.insert(edge.edge_type.as_str().to_string());
        }

        let stats = GraphStats {
            node_count: built.graph.node_count(),
            edge_count: built.graph.edge_count(),
            edge_types: {
                let mut v: Vec<String> = edge_type_set.into_iter().collect();
                v.sort();
                v
            },
        };

        *self.inner.write() = Some(built);
        Ok(stats)
    }

    /// Drop the loaded graph, forcing the next query to fail with
    /// [`MuError::GraphNotLoaded`] until `load()` runs again.
    pub fn unload(&self) {
        *self.inner.write() = None;
    }

    fn with_loaded<T>(&self, f: impl FnOnce(&GraphInner) -> MuResult<T>) -> MuResult<T> {
        let guard = self.inner.read();
        match guard.as_ref() {
            Some(inner) => f(inner),
            None => Err(MuError::GraphNotLoaded),
        }
    }

    #[must_use]
    pub fn has_node(&self, id: &str) -> bool {
        self.inner
            .read()
            .as_ref()
            .is_some_and(|i| i.id_to_index.contains_key(id))
    }

    pub fn stats(&self) -> MuResult<GraphStats> {
        self.with_loaded(|inner| {
            let mut edge_type_set = std::collections::HashSet::new();
            for e in inner.graph.edge_references_kinds() {
                edge_type_set.insert(e.as_str().to_string());
            }
            let mut edge_types: Vec<String> = edge_type_set.into_iter().collect();
            edge_types.sort();
            Ok(GraphStats {
                node_count: inner.graph.node_count(),
                edge_count: inner.graph.edge_count(),
                edge_types,
            })
        })
    }

    /// Strongly-connected components of size > 1, optionally filtered by
    /// edge type. Deterministic order: components sorted by their
    /// lexicographically smallest member, smallest member first within.
    pub fn find_cycles(&self, edge_types: Option<&[EdgeType]>) -> MuResult<Vec<Vec<String>>> {
        self.with_loaded(|inner| {
            let filtered = filtered_subgraph(inner, edge_types);
            let sccs = petgraph::algo::tarjan_scc(&filtered);
            let mut cycles: Vec<Vec<String>> = sccs
                .into_iter()
                .filter(|scc| scc.len() > 1)
                .map(|scc| {
                    let mut ids: Vec<String> =
                        scc.into_iter().map(|n| filtered[n].clone()).collect();
                    ids.sort();
                    ids
                })
                .collect();
            cycles.sort();
            Ok(cycles)
        })
    }

    /// BFS of outgoing reachability, excluding the start node.
    pub fn impact(&self, node_id: &str, edge_types: Option<&[EdgeType]>) -> MuResult<Vec<String>> {
        self.with_loaded(|inner| {
            let Some(&start) = inner.id_to_index.get(node_id) else {
                return Err(MuError::NotFound {
                    entity: node_id.to_string(),
                });
            };
            Ok(bfs_reachable(inner, start, Direction::Outgoing, edge_types))
        })
    }

    /// BFS of incoming reachability, excluding the start node.
    pub fn ancestors(&self, node_id: &str, edge_types: Option<&[EdgeType]>) -> MuResult<Vec<String>> {
        self.with_loaded(|inner| {
            let Some(&start) = inner.id_to_index.get(node_id) else {
                return Err(MuError::NotFound {
                    entity: node_id.to_string(),
                });
            };
            Ok(bfs_reachable(inner, start, Direction::Incoming, edge_types))
        })
    }

    /// Unweighted shortest path, or `None` if unreachable.
    pub fn shortest_path(
        &self,
        from: &str,
        to: &str,
        edge_types: Option<&[EdgeType]>,
    ) -> MuResult<Option<Vec<String>>> {
        self.with_loaded(|inner| {
            let (Some(&from_idx), Some(&to_idx)) =
                (inner.id_to_index.get(from), inner.id_to_index.get(to))
            else {
                return Err(MuError::NotFound {
                    entity: format!("{from} or {to}"),
                });
            };

            let mut visited = HashMap::new();
            let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
            let mut queue = VecDeque::new();
            visited.insert(from_idx, true);
            queue.push_back(from_idx);

            while let Some(current) = queue.pop_front() {
                if current == to_idx {
                    let mut path = vec![inner.graph[current].clone()];
                    let mut cur = current;
                    while let Some(&p) = parent.get(&cur) {
                        path.push(inner.graph[p].clone());
                        cur = p;
                    }
                    path.reverse();
                    return Ok(Some(path));
                }
                for neighbor in inner.graph.neighbors_directed(current, Direction::Outgoing) {
                    if !edge_allowed(inner, current, neighbor, Direction::Outgoing, edge_types) {
                        continue;
                    }
                    if visited.insert(neighbor, true).is_none() {
                        parent.insert(neighbor, current);
                        queue.push_back(neighbor);
                    }
                }
            }
            Ok(None)
        })
    }

    /// Bounded BFS in `direction`, up to `depth` hops (depth >= 1).
    pub fn neighbors(
        &self,
        node_id: &str,
        direction: TraversalDirection,
        depth: usize,
        edge_types: Option<&[EdgeType]>,
    ) -> MuResult<Vec<String>> {
        self.with_loaded(|inner| {
            let Some(&start) = inner.id_to_index.get(node_id) else {
                return Err(MuError::NotFound {
                    entity: node_id.to_string(),
                });
            };
            let depth = depth.max(1);
            let mut visited = std::collections::HashSet::new();
            let mut frontier = vec![start];
            visited.insert(start);

            for _ in 0..depth {
                let mut next = Vec::new();
                for &n in &frontier {
                    for dir in direction.petgraph_directions() {
                        for neighbor in inner.graph.neighbors_directed(n, dir) {
                            if !edge_allowed(inner, n, neighbor, dir, edge_types) {
                                continue;
                            }
                            if visited.insert(neighbor) {
                                next.push(neighbor);
                            }
                        }
                    }
                }
                frontier = next;
            }

            visited.remove(&start);
            let mut ids: Vec<String> = visited.into_iter().map(|n| inner.graph[n].clone()).collect();
            ids.sort();
            Ok(ids)
        })
    }
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Direction for [`GraphEngine::neighbors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    Out,
    In,
    Both,
}

impl TraversalDirection {
    fn petgraph_directions(self) -> Vec<Direction> {
        match self {
            TraversalDirection::Out => vec![Direction::Outgoing],
            TraversalDirection::In => vec![Direction::Incoming],
            TraversalDirection::Both => vec![Direction::Outgoing, Direction::Incoming],
        }
    }
}

fn edge_allowed(
    inner: &GraphInner,
    from: NodeIndex,
    to: NodeIndex,
    direction: Direction,
    edge_types: Option<&[EdgeType]>,
) -> bool {
    let Some(types) = edge_types else { return true };
    let (a, b) = match direction {
        Direction::Outgoing => (from, to),
        Direction::Incoming => (to, from),
    };
    inner
        .graph
        .edges_connecting(a, b)
        .any(|e| types.contains(e.weight()))
}

fn bfs_reachable(
    inner: &GraphInner,
    start: NodeIndex,
    direction: Direction,
    edge_types: Option<&[EdgeType]>,
) -> Vec<String> {
    let mut visited = std::collections::HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for neighbor in inner.graph.neighbors_directed(current, direction) {
            if !edge_allowed(inner, current, neighbor, direction, edge_types) {
                continue;
            }
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }
    visited.remove(&start);
    let mut ids: Vec<String> = visited.into_iter().map(|n| inner.graph[n].clone()).collect();
    ids.sort();
    ids
}

fn filtered_subgraph(
    inner: &GraphInner,
    edge_types: Option<&[EdgeType]>,
) -> DiGraph<String, EdgeType> {
    match edge_types {
        None => inner.graph.clone(),
        Some(types) => inner.graph.filter_map(
            |_, n| Some(n.clone()),
            |_, w| if types.contains(w) { Some(*w) } else { None },
        ),
    }
}

trait EdgeKinds {
    fn edge_references_kinds(&self) -> Vec<EdgeType>;
}

impl EdgeKinds for DiGraph<String, EdgeType> {
    fn edge_references_kinds(&self) -> Vec<EdgeType> {
        self.edge_indices().map(|e| self[e]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node, NodeType};
    use serde_json::json;

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            node_type: NodeType::Module,
            name: id.to_string(),
            qualified_name: None,
            file_path: Some(format!("{id}.py")),
            line_start: None,
            line_end: None,
            properties: json!({}),
            complexity: 0,
        }
    }

    fn edge(source: &str, target: &str, edge_type: EdgeType) -> Edge {
        Edge {
            id: crate::model::edge_id(source, target, edge_type),
            source_id: source.to_string(),
            target_id: target.to_string(),
            edge_type,
            properties: json!({}),
        }
    }

    fn seeded_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open_write(&dir.path().join("t.mubase")).expect("open");
        store
            .upsert_nodes(&[node("a"), node("b"), node("c")])
            .expect("nodes");
        store
            .upsert_edges(&[
                edge("a", "b", EdgeType::Imports),
                edge("b", "c", EdgeType::Imports),
            ])
            .expect("edges");
        (dir, store)
    }

    #[test]
    fn test_not_loaded_errors() {
        let engine = GraphEngine::new();
        assert!(matches!(
            engine.impact("a", None),
            Err(MuError::GraphNotLoaded)
        ));
    }

    #[test]
    fn test_load_and_impact_ancestors() {
        let (_dir, store) = seeded_store();
        let engine = GraphEngine::new();
        engine.load(&store).expect("load");

        assert_eq!(engine.impact("a", None).expect("impact"), vec!["b", "c"]);
        assert_eq!(
            engine.ancestors("c", None).expect("ancestors"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_no_cycle_in_dag() {
        let (_dir, store) = seeded_store();
        let engine = GraphEngine::new();
        engine.load(&store).expect("load");
        assert!(engine.find_cycles(None).expect("cycles").is_empty());
    }

    #[test]
    fn test_cycle_detection_deterministic_order() {
        let (_dir, mut store) = seeded_store();
        store
            .upsert_edges(&[edge("c", "a", EdgeType::Imports)])
            .expect("closing edge");
        let engine = GraphEngine::new();
        engine.load(&store).expect("load");

        let cycles = engine.find_cycles(None).expect("cycles");
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a", "b", "c"]);
    }

    #[test]
    fn test_shortest_path() {
        let (_dir, store) = seeded_store();
        let engine = GraphEngine::new();
        engine.load(&store).expect("load");
        assert_eq!(
            engine.shortest_path("a", "c", None).expect("path"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_shortest_path_unreachable() {
        let (_dir, mut store) = seeded_store();
        store.upsert_nodes(&[node("d")]).expect("node d");
        let engine = GraphEngine::new();
        engine.load(&store).expect("load");
        assert_eq!(engine.shortest_path("d", "a", None).expect("path"), None);
    }

    #[test]
    fn test_neighbors_both_directions() {
        let (_dir, store) = seeded_store();
        let engine = GraphEngine::new();
        engine.load(&store).expect("load");
        let neighbors = engine
            .neighbors("b", TraversalDirection::Both, 1, None)
            .expect("neighbors");
        assert_eq!(neighbors, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_edge_type_filter_excludes() {
        let (_dir, mut store) = seeded_store();
        store
            .upsert_edges(&[edge("a", "c", EdgeType::Inherits)])
            .expect("extra edge");
        let engine = GraphEngine::new();
        engine.load(&store).expect("load");

        let impact_imports = engine
            .impact("a", Some(&[EdgeType::Imports]))
            .expect("impact filtered");
        assert_eq!(impact_imports, vec!["b", "c"]);

        let impact_inherits = engine
            .impact("a", Some(&[EdgeType::Inherits]))
            .expect("impact filtered");
        assert_eq!(impact_inherits, vec!["c"]);
    }

    #[test]
    fn test_has_node() {
        let (_dir, store) = seeded_store();
        let engine = GraphEngine::new();
        engine.load(&store).expect("load");
        assert!(engine.has_node("a"));
        assert!(!engine.has_node("zzz"));
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = seeded_store();
        let engine = GraphEngine::new();
        let stats = engine.load(&store).expect("load");
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 2);
        assert_eq!(stats.edge_types, vec!["imports".to_string()]);
    }
}
