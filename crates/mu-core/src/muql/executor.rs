//! Plan executor: runs an [`ExecutionPlan`] against the [`Store`] and
//! [`GraphEngine`], producing a rectangular [`QueryResult`].
//!
//! Per spec.md §4.4, identifiers used to build SQL are checked against a
//! fixed whitelist before touching the query string; values are always bound
//! as parameters. Unknown tables/columns are a *syntax* error. Unknown node
//! names (and query forms this graph has no edges to answer, see
//! `FindCondition::Calling`/`CalledBy` below) degrade to an empty result
//! with a warning rather than an exception.

use std::time::Instant;

use rusqlite::types::Value as SqlValue;
use serde_json::Value as Json;

use crate::error::{MuError, MuResult};
use crate::graph::{GraphEngine, TraversalDirection};
use crate::model::{EdgeType, Node, NodeType};
use crate::muql::ast::{ComparisonOperator, FindCondition, Literal, NodeTable, OrderBy, Predicate, SelectFields, ShowKind};
use crate::muql::planner::{AnalysisPlan, ExecutionPlan, GraphPlan, SqlPlan, TemporalPlan};
use crate::store::Store;

/// A rectangular query result: column names plus heterogeneous scalar rows.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Json>>,
    pub row_count: usize,
    pub elapsed_ms: f64,
    /// Set instead of an error for semantic failures (unknown name, or a
    /// query form this graph schema cannot answer).
    pub warning: Option<String>,
}

impl QueryResult {
    fn empty(columns: Vec<String>, warning: impl Into<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            row_count: 0,
            elapsed_ms: 0.0,
            warning: Some(warning.into()),
        }
    }

    fn timed(columns: Vec<String>, rows: Vec<Vec<Json>>, started: Instant) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            warning: None,
        }
    }
}

/// Node columns queryable through `SELECT`/`FIND`, in the fixed order the
/// `*` wildcard expands to.
const NODE_COLUMNS: &[&str] = &[
    "id",
    "type",
    "name",
    "qualified_name",
    "file_path",
    "line_start",
    "line_end",
    "properties",
    "complexity",
];

/// Edge columns queryable through `SELECT * FROM edges`.
const EDGE_COLUMNS: &[&str] = &["id", "source_id", "target_id", "type", "properties"];

fn column_whitelist(table: NodeTable) -> &'static [&'static str] {
    if table.is_edge_table() {
        EDGE_COLUMNS
    } else {
        NODE_COLUMNS
    }
}

pub fn execute_plan(plan: &ExecutionPlan, store: &Store, graph: &GraphEngine) -> MuResult<QueryResult> {
    let started = Instant::now();
    match plan {
        ExecutionPlan::Sql(sql_plan) => execute_sql(sql_plan, store, started),
        ExecutionPlan::Graph(graph_plan) => execute_graph(graph_plan, store, graph, started),
        ExecutionPlan::Analysis(analysis_plan) => execute_analysis(analysis_plan, store, graph, started),
        ExecutionPlan::Temporal(temporal_plan) => execute_temporal(temporal_plan, store, started),
    }
}

// ---------------------------------------------------------------------
// Relational plan
// ---------------------------------------------------------------------

fn execute_sql(plan: &SqlPlan, store: &Store, started: Instant) -> MuResult<QueryResult> {
    let whitelist = column_whitelist(plan.table);

    let columns: Vec<String> = match &plan.fields {
        SelectFields::All => whitelist.iter().map(|s| s.to_string()).collect(),
        SelectFields::Named(names) => {
            for name in names {
                if !whitelist.contains(&name.as_str()) {
                    return Err(MuError::Syntax {
                        message: format!(
                            "unknown column '{name}' for table '{}'",
                            plan.table.as_str()
                        ),
                        line: 0,
                        column: 0,
                    });
                }
            }
            names.clone()
        }
    };

    let mut params: Vec<SqlValue> = Vec::new();
    let mut sql = format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        if plan.table.is_edge_table() { "edges" } else { "nodes" }
    );

    let mut clauses = Vec::new();
    if let Some(node_type) = fixed_type_filter(plan.table) {
        clauses.push("type = ?".to_string());
        params.push(SqlValue::Text(node_type.as_str().to_string()));
    }
    if let Some(predicate) = &plan.predicate {
        push_predicate_clauses(predicate, whitelist, &mut clauses, &mut params)?;
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if let Some(order) = &plan.order_by {
        validate_order_by(order, whitelist)?;
        sql.push_str(&format!(
            " ORDER BY {} {}",
            order.field,
            if order.descending { "DESC" } else { "ASC" }
        ));
    }

    if let Some(limit) = plan.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let conn = store.connection();
    let mut stmt = conn.prepare(&sql)?;
    let column_count = columns.len();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            let mut values = Vec::with_capacity(column_count);
            for (i, name) in columns.iter().enumerate() {
                values.push(sql_value_to_json(row.get_ref(i)?, name == "properties"));
            }
            Ok(values)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QueryResult::timed(columns, rows, started))
}

fn fixed_type_filter(table: NodeTable) -> Option<NodeType> {
    match table {
        NodeTable::Modules => Some(NodeType::Module),
        NodeTable::Classes => Some(NodeType::Class),
        NodeTable::Functions => Some(NodeType::Function),
        NodeTable::External => Some(NodeType::External),
        NodeTable::Nodes | NodeTable::Edges => None,
    }
}

fn validate_order_by(order: &OrderBy, whitelist: &[&str]) -> MuResult<()> {
    if whitelist.contains(&order.field.as_str()) {
        Ok(())
    } else {
        Err(MuError::Syntax {
            message: format!("unknown column '{}' in ORDER BY", order.field),
            line: 0,
            column: 0,
        })
    }
}

fn push_predicate_clauses(
    predicate: &Predicate,
    whitelist: &[&str],
    clauses: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
) -> MuResult<()> {
    for comparison in &predicate.conjuncts {
        if !whitelist.contains(&comparison.field.as_str()) {
            return Err(MuError::Syntax {
                message: format!("unknown column '{}' in WHERE", comparison.field),
                line: 0,
                column: 0,
            });
        }
        let op = match comparison.op {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::Ne => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::Like => "LIKE",
        };
        clauses.push(format!("{} {op} ?", comparison.field));
        params.push(literal_to_sql(&comparison.value));
    }
    Ok(())
}

fn literal_to_sql(literal: &Literal) -> SqlValue {
    match literal {
        Literal::Str(s) => SqlValue::Text(s.clone()),
        Literal::Num(n) => SqlValue::Real(*n),
        Literal::Bool(b) => SqlValue::Integer(i64::from(*b)),
    }
}

fn sql_value_to_json(value: rusqlite::types::ValueRef<'_>, parse_as_json: bool) -> Json {
    match value {
        rusqlite::types::ValueRef::Null => Json::Null,
        rusqlite::types::ValueRef::Integer(i) => Json::from(i),
        rusqlite::types::ValueRef::Real(f) => {
            serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number)
        }
        rusqlite::types::ValueRef::Text(t) => {
            let text = String::from_utf8_lossy(t).to_string();
            // Only `properties` stores JSON text; every other text column
            // (name, file_path, ...) is surfaced verbatim so a value that
            // happens to read as a JSON literal (e.g. a node named "null")
            // isn't silently reinterpreted.
            if parse_as_json {
                serde_json::from_str(&text).unwrap_or(Json::String(text))
            } else {
                Json::String(text)
            }
        }
        rusqlite::types::ValueRef::Blob(b) => Json::String(format!("<{} bytes>", b.len())),
    }
}

// ---------------------------------------------------------------------
// Graph plan
// ---------------------------------------------------------------------

const NODE_ROW_COLUMNS: &[&str] = &["id", "name", "type", "file_path", "complexity"];

fn node_row(node: &Node) -> Vec<Json> {
    vec![
        Json::String(node.id.clone()),
        Json::String(node.name.clone()),
        Json::String(node.node_type.as_str().to_string()),
        node.file_path.clone().map_or(Json::Null, Json::String),
        Json::from(node.complexity),
    ]
}

fn hydrate_ids(store: &Store, ids: &[String]) -> MuResult<Vec<Vec<Json>>> {
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(node) = store.get_node(id)? {
            rows.push(node_row(&node));
        }
    }
    Ok(rows)
}

/// Resolve a MUQL target (name or raw node id) to a node. Node ids already
/// contain a `:` prefix (`fn:`, `cls:`, ...) so are tried first.
fn resolve_target(store: &Store, target: &str) -> MuResult<Node> {
    if let Some(node) = store.get_node(target)? {
        return Ok(node);
    }
    store
        .find_node_by_name(target)?
        .ok_or_else(|| MuError::NotFound {
            entity: target.to_string(),
        })
}

fn execute_graph(
    plan: &GraphPlan,
    store: &Store,
    graph: &GraphEngine,
    started: Instant,
) -> MuResult<QueryResult> {
    match plan {
        GraphPlan::Neighbors { kind, target, depth } => {
            execute_show(*kind, target, *depth, store, graph, started)
        }
        GraphPlan::Find {
            table,
            condition,
            value,
        } => execute_find(*table, *condition, value, store, graph, started),
        GraphPlan::Path {
            from,
            to,
            max_depth,
        } => execute_path(from, to, *max_depth, store, graph, started),
    }
}

fn execute_show(
    kind: ShowKind,
    target: &str,
    depth: u32,
    store: &Store,
    graph: &GraphEngine,
    started: Instant,
) -> MuResult<QueryResult> {
    let columns: Vec<String> = NODE_ROW_COLUMNS.iter().map(|s| s.to_string()).collect();

    match kind {
        ShowKind::Callers | ShowKind::Callees => {
            return Ok(QueryResult::empty(
                columns,
                "call-graph edges are not tracked; only contains/imports/inherits \
                 relationships are indexed, so SHOW callers/callees cannot be answered",
            ));
        }
        ShowKind::Dependencies | ShowKind::Dependents => {}
    }

    let node = match resolve_target(store, target) {
        Ok(node) => node,
        Err(MuError::NotFound { entity }) => {
            return Ok(QueryResult::empty(columns, format!("node not found: {entity}")))
        }
        Err(e) => return Err(e),
    };

    let direction = match kind {
        ShowKind::Dependencies => TraversalDirection::Out,
        ShowKind::Dependents => TraversalDirection::In,
        ShowKind::Callers | ShowKind::Callees => unreachable!(),
    };
    let edge_types = [EdgeType::Imports, EdgeType::Inherits];
    let ids = graph.neighbors(&node.id, direction, depth as usize, Some(&edge_types))?;
    let rows = hydrate_ids(store, &ids)?;
    Ok(QueryResult::timed(columns, rows, started))
}

fn execute_find(
    table: NodeTable,
    condition: FindCondition,
    value: &str,
    store: &Store,
    graph: &GraphEngine,
    started: Instant,
) -> MuResult<QueryResult> {
    let columns: Vec<String> = NODE_ROW_COLUMNS.iter().map(|s| s.to_string()).collect();

    match condition {
        FindCondition::Calling | FindCondition::CalledBy => {
            return Ok(QueryResult::empty(
                columns,
                "call-graph edges are not tracked; only contains/imports/inherits \
                 relationships are indexed, so FIND ... CALLING/CALLED BY cannot be answered",
            ));
        }
        FindCondition::InheritingFrom | FindCondition::Implementing => {
            let node = match resolve_target(store, value) {
                Ok(node) => node,
                Err(MuError::NotFound { entity }) => {
                    return Ok(QueryResult::empty(columns, format!("node not found: {entity}")))
                }
                Err(e) => return Err(e),
            };
            let ids = graph.neighbors(
                &node.id,
                TraversalDirection::In,
                1,
                Some(&[EdgeType::Inherits]),
            )?;
            let rows = filter_rows_by_table(store, &ids, table)?;
            Ok(QueryResult::timed(columns, rows, started))
        }
        FindCondition::WithDecorator => {
            let wanted = fixed_type_filter(table);
            let mut rows = Vec::new();
            for node in store.all_nodes()? {
                if wanted.is_some_and(|t| t != node.node_type) {
                    continue;
                }
                let has_it = node
                    .properties
                    .get("decorators")
                    .and_then(Json::as_array)
                    .is_some_and(|decorators| {
                        decorators.iter().any(|d| d.as_str() == Some(value))
                    });
                if has_it {
                    rows.push(node_row(&node));
                }
            }
            Ok(QueryResult::timed(columns, rows, started))
        }
    }
}

fn filter_rows_by_table(store: &Store, ids: &[String], table: NodeTable) -> MuResult<Vec<Vec<Json>>> {
    let wanted = fixed_type_filter(table);
    let mut rows = Vec::new();
    for id in ids {
        if let Some(node) = store.get_node(id)? {
            if wanted.is_some_and(|t| t != node.node_type) {
                continue;
            }
            rows.push(node_row(&node));
        }
    }
    Ok(rows)
}

fn execute_path(
    from: &str,
    to: &str,
    max_depth: u32,
    store: &Store,
    graph: &GraphEngine,
    started: Instant,
) -> MuResult<QueryResult> {
    let columns = vec!["id".to_string(), "name".to_string()];

    let (from_node, to_node) = match (resolve_target(store, from), resolve_target(store, to)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(MuError::NotFound { entity }), _) | (_, Err(MuError::NotFound { entity })) => {
            return Ok(QueryResult::empty(columns, format!("node not found: {entity}")))
        }
        (Err(e), _) | (_, Err(e)) => return Err(e),
    };

    let path = graph.shortest_path(&from_node.id, &to_node.id, None)?;
    match path {
        Some(ids) if (ids.len() as u32).saturating_sub(1) <= max_depth => {
            let rows = hydrate_ids(store, &ids)?
                .into_iter()
                .map(|row| vec![row[0].clone(), row[1].clone()])
                .collect();
            Ok(QueryResult::timed(columns, rows, started))
        }
        Some(ids) => Ok(QueryResult::empty(
            columns,
            format!(
                "shortest path has {} hops, which exceeds MAX DEPTH {max_depth}",
                ids.len().saturating_sub(1)
            ),
        )),
        None => Ok(QueryResult::empty(
            columns,
            format!("no path from '{from}' to '{to}'"),
        )),
    }
}

// ---------------------------------------------------------------------
// Analysis plan
// ---------------------------------------------------------------------

fn execute_analysis(
    plan: &AnalysisPlan,
    store: &Store,
    graph: &GraphEngine,
    started: Instant,
) -> MuResult<QueryResult> {
    match plan {
        AnalysisPlan::Circular => execute_circular(graph, started),
        AnalysisPlan::Complexity { threshold } => execute_complexity(store, *threshold, started),
        AnalysisPlan::Coupling => execute_coupling(store, started),
        AnalysisPlan::Unused => execute_unused(store, started),
        AnalysisPlan::Hotspots { threshold } => execute_hotspots(store, *threshold, started),
    }
}

fn execute_circular(graph: &GraphEngine, started: Instant) -> MuResult<QueryResult> {
    let columns = vec!["cycle".to_string(), "length".to_string()];
    let cycles = graph.find_cycles(None)?;
    let rows = cycles
        .into_iter()
        .map(|cycle| {
            let len = cycle.len();
            vec![
                Json::Array(cycle.into_iter().map(Json::String).collect()),
                Json::from(len),
            ]
        })
        .collect();
    Ok(QueryResult::timed(columns, rows, started))
}

fn execute_complexity(store: &Store, threshold: Option<u32>, started: Instant) -> MuResult<QueryResult> {
    let columns = vec![
        "name".to_string(),
        "file_path".to_string(),
        "complexity".to_string(),
    ];
    let conn = store.connection();
    let limit = threshold.unwrap_or(20);
    let mut stmt = conn.prepare(
        "SELECT name, file_path, complexity FROM nodes WHERE type IN ('function', 'class') \
         ORDER BY complexity DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![limit], |row| {
            Ok(vec![
                Json::String(row.get::<_, String>(0)?),
                row.get::<_, Option<String>>(1)?.map_or(Json::Null, Json::String),
                Json::from(row.get::<_, i64>(2)?),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryResult::timed(columns, rows, started))
}

fn execute_coupling(store: &Store, started: Instant) -> MuResult<QueryResult> {
    let columns = vec!["name".to_string(), "file_path".to_string(), "degree".to_string()];
    let conn = store.connection();
    let mut stmt = conn.prepare(
        "SELECT name, file_path, \
         (SELECT COUNT(*) FROM edges WHERE source_id = nodes.id OR target_id = nodes.id) AS degree \
         FROM nodes WHERE type = 'module' ORDER BY degree DESC LIMIT 20",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(vec![
                Json::String(row.get::<_, String>(0)?),
                row.get::<_, Option<String>>(1)?.map_or(Json::Null, Json::String),
                Json::from(row.get::<_, i64>(2)?),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryResult::timed(columns, rows, started))
}

fn execute_unused(store: &Store, started: Instant) -> MuResult<QueryResult> {
    let columns = vec!["name".to_string(), "file_path".to_string(), "type".to_string()];
    let conn = store.connection();
    let mut stmt = conn.prepare(
        "SELECT name, file_path, type FROM nodes WHERE type IN ('function', 'class') \
         AND id NOT IN (SELECT target_id FROM edges WHERE type IN ('imports', 'inherits')) \
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(vec![
                Json::String(row.get::<_, String>(0)?),
                row.get::<_, Option<String>>(1)?.map_or(Json::Null, Json::String),
                Json::String(row.get::<_, String>(2)?),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryResult::timed(columns, rows, started))
}

fn execute_hotspots(store: &Store, threshold: Option<u32>, started: Instant) -> MuResult<QueryResult> {
    let columns = vec![
        "name".to_string(),
        "file_path".to_string(),
        "complexity".to_string(),
        "degree".to_string(),
    ];
    let conn = store.connection();
    let min_complexity = threshold.unwrap_or(0);
    let mut stmt = conn.prepare(
        "SELECT name, file_path, complexity, \
         (SELECT COUNT(*) FROM edges WHERE source_id = nodes.id OR target_id = nodes.id) AS degree \
         FROM nodes WHERE type IN ('function', 'class') AND complexity >= ?1 \
         ORDER BY complexity * ( \
           (SELECT COUNT(*) FROM edges WHERE source_id = nodes.id OR target_id = nodes.id) + 1 \
         ) DESC LIMIT 20",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![min_complexity], |row| {
            Ok(vec![
                Json::String(row.get::<_, String>(0)?),
                row.get::<_, Option<String>>(1)?.map_or(Json::Null, Json::String),
                Json::from(row.get::<_, i64>(2)?),
                Json::from(row.get::<_, i64>(3)?),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryResult::timed(columns, rows, started))
}

// ---------------------------------------------------------------------
// Temporal plan (DESCRIBE / BLAME / HISTORY OF)
// ---------------------------------------------------------------------

fn execute_temporal(plan: &TemporalPlan, store: &Store, started: Instant) -> MuResult<QueryResult> {
    match plan {
        TemporalPlan::Describe { target } => execute_describe(target, store, started),
        TemporalPlan::Blame { target } => execute_blame(target, store, started),
        TemporalPlan::History { target, limit } => execute_history(target, *limit, store, started),
    }
}

fn execute_describe(target: &str, store: &Store, started: Instant) -> MuResult<QueryResult> {
    let columns: Vec<String> = NODE_COLUMNS.iter().map(|s| s.to_string()).collect();
    let node = match resolve_target(store, target) {
        Ok(node) => node,
        Err(MuError::NotFound { entity }) => {
            return Ok(QueryResult::empty(columns, format!("node not found: {entity}")))
        }
        Err(e) => return Err(e),
    };
    let row = vec![
        Json::String(node.id.clone()),
        Json::String(node.node_type.as_str().to_string()),
        Json::String(node.name.clone()),
        node.qualified_name.clone().map_or(Json::Null, Json::String),
        node.file_path.clone().map_or(Json::Null, Json::String),
        node.line_start.map_or(Json::Null, Json::from),
        node.line_end.map_or(Json::Null, Json::from),
        node.properties.clone(),
        Json::from(node.complexity),
    ];
    Ok(QueryResult::timed(columns, vec![row], started))
}

/// A read-only mubase opened against a file written before `node_history`/
/// `snapshots` existed in the schema has neither table; treat that as a
/// semantic "no history yet" rather than a hard database error.
fn is_missing_table(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("no such table"))
}

fn execute_blame(target: &str, store: &Store, started: Instant) -> MuResult<QueryResult> {
    let columns = vec![
        "commit_hash".to_string(),
        "author".to_string(),
        "commit_message".to_string(),
        "created_at".to_string(),
    ];
    let node = match resolve_target(store, target) {
        Ok(node) => node,
        Err(MuError::NotFound { entity }) => {
            return Ok(QueryResult::empty(columns, format!("node not found: {entity}")))
        }
        Err(e) => return Err(e),
    };

    let conn = store.connection();
    let query = conn.prepare(
        "SELECT s.commit_hash, h.author, h.commit_message, s.created_at \
         FROM node_history h JOIN snapshots s ON h.snapshot_id = s.id \
         WHERE h.node_id = ?1 AND h.change != 'unchanged' \
         ORDER BY s.created_at DESC LIMIT 1",
    );
    let mut stmt = match query {
        Ok(stmt) => stmt,
        Err(e) if is_missing_table(&e) => {
            return Ok(QueryResult::empty(columns, "no commit history has been indexed yet"))
        }
        Err(e) => return Err(e.into()),
    };
    let mut rows = stmt
        .query_map(rusqlite::params![node.id], |row| {
            Ok(vec![
                Json::String(row.get::<_, String>(0)?),
                Json::String(row.get::<_, String>(1)?),
                Json::String(row.get::<_, String>(2)?),
                Json::String(row.get::<_, String>(3)?),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        return Ok(QueryResult::empty(columns, format!("no history recorded for '{target}'")));
    }
    Ok(QueryResult::timed(columns, std::mem::take(&mut rows), started))
}

fn execute_history(target: &str, limit: u32, store: &Store, started: Instant) -> MuResult<QueryResult> {
    let columns = vec![
        "commit_hash".to_string(),
        "change".to_string(),
        "author".to_string(),
        "commit_message".to_string(),
        "created_at".to_string(),
    ];
    let node = match resolve_target(store, target) {
        Ok(node) => node,
        Err(MuError::NotFound { entity }) => {
            return Ok(QueryResult::empty(columns, format!("node not found: {entity}")))
        }
        Err(e) => return Err(e),
    };

    let conn = store.connection();
    let query = conn.prepare(
        "SELECT s.commit_hash, h.change, h.author, h.commit_message, s.created_at \
         FROM node_history h JOIN snapshots s ON h.snapshot_id = s.id \
         WHERE h.node_id = ?1 AND h.change != 'unchanged' \
         ORDER BY s.created_at DESC LIMIT ?2",
    );
    let mut stmt = match query {
        Ok(stmt) => stmt,
        Err(e) if is_missing_table(&e) => {
            return Ok(QueryResult::empty(columns, "no commit history has been indexed yet"))
        }
        Err(e) => return Err(e.into()),
    };
    let rows = stmt
        .query_map(rusqlite::params![node.id, limit], |row| {
            Ok(vec![
                Json::String(row.get::<_, String>(0)?),
                Json::String(row.get::<_, String>(1)?),
                Json::String(row.get::<_, String>(2)?),
                Json::String(row.get::<_, String>(3)?),
                Json::String(row.get::<_, String>(4)?),
            ])
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QueryResult::timed(columns, rows, started))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{edge_id, node_id, Edge, EdgeType as ET, Node as Nd, NodeType as NT};
    use crate::muql::parser::parse;
    use crate::muql::planner::plan_query;
    use serde_json::json;

    fn seeded_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = Store::open_write(&dir.path().join("mu.db")).expect("open");

        let animal = Nd {
            id: node_id(NT::Class, "zoo.py", Some("Animal")),
            node_type: NT::Class,
            name: "Animal".to_string(),
            qualified_name: Some("Animal".to_string()),
            file_path: Some("zoo.py".to_string()),
            line_start: Some(1),
            line_end: Some(5),
            properties: json!({"bases": [], "decorators": [], "docstring": null}),
            complexity: 0,
        };
        let dog = Nd {
            id: node_id(NT::Class, "zoo.py", Some("Dog")),
            node_type: NT::Class,
            name: "Dog".to_string(),
            qualified_name: Some("Dog".to_string()),
            file_path: Some("zoo.py".to_string()),
            line_start: Some(7),
            line_end: Some(10),
            properties: json!({"bases": ["Animal"], "decorators": [], "docstring": null}),
            complexity: 0,
        };
        let speak = Nd {
            id: node_id(NT::Function, "zoo.py", Some("Dog.speak")),
            node_type: NT::Function,
            name: "speak".to_string(),
            qualified_name: Some("Dog.speak".to_string()),
            file_path: Some("zoo.py".to_string()),
            line_start: Some(8),
            line_end: Some(9),
            properties: json!({"decorators": ["override"], "parameters": []}),
            complexity: 12,
        };
        store.upsert_nodes(&[animal.clone(), dog.clone(), speak.clone()]).unwrap();
        store
            .upsert_edges(&[Edge {
                id: edge_id(&dog.id, &animal.id, ET::Inherits),
                source_id: dog.id.clone(),
                target_id: animal.id.clone(),
                edge_type: ET::Inherits,
                properties: json!({}),
            }])
            .unwrap();
        (dir, store)
    }

    fn loaded_graph(store: &Store) -> GraphEngine {
        let graph = GraphEngine::new();
        graph.load(store).unwrap();
        graph
    }

    #[test]
    fn test_select_star_from_classes() {
        let (_dir, store) = seeded_store();
        let plan = plan_query(parse("SELECT * FROM classes").unwrap());
        let result = execute_plan(&plan, &store, &GraphEngine::new()).unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(result.columns, NODE_COLUMNS);
    }

    #[test]
    fn test_select_named_fields_with_where() {
        let (_dir, store) = seeded_store();
        let plan = plan_query(parse("SELECT name, complexity FROM functions WHERE complexity > 10").unwrap());
        let result = execute_plan(&plan, &store, &GraphEngine::new()).unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][0], Json::String("speak".to_string()));
    }

    #[test]
    fn test_select_unknown_column_is_syntax_error() {
        let (_dir, store) = seeded_store();
        let plan = plan_query(parse("SELECT bogus FROM functions").unwrap());
        let err = execute_plan(&plan, &store, &GraphEngine::new()).unwrap_err();
        assert!(matches!(err, MuError::Syntax { .. }));
    }

    #[test]
    fn test_find_inheriting_from() {
        let (_dir, store) = seeded_store();
        let graph = loaded_graph(&store);
        let plan = plan_query(parse("FIND classes INHERITING FROM Animal").unwrap());
        let result = execute_plan(&plan, &store, &graph).unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][1], Json::String("Dog".to_string()));
    }

    #[test]
    fn test_find_with_decorator() {
        let (_dir, store) = seeded_store();
        let plan = plan_query(parse("FIND functions WITH DECORATOR override").unwrap());
        let result = execute_plan(&plan, &store, &GraphEngine::new()).unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][1], Json::String("speak".to_string()));
    }

    #[test]
    fn test_find_calling_is_semantic_warning_not_error() {
        let (_dir, store) = seeded_store();
        let plan = plan_query(parse("FIND functions CALLING speak").unwrap());
        let result = execute_plan(&plan, &store, &GraphEngine::new()).unwrap();
        assert_eq!(result.row_count, 0);
        assert!(result.warning.is_some());
    }

    #[test]
    fn test_show_dependents_of_animal() {
        let (_dir, store) = seeded_store();
        let graph = loaded_graph(&store);
        let plan = plan_query(parse("SHOW dependents OF Animal").unwrap());
        let result = execute_plan(&plan, &store, &graph).unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][1], Json::String("Dog".to_string()));
    }

    #[test]
    fn test_show_unknown_node_is_empty_with_warning() {
        let (_dir, store) = seeded_store();
        let graph = loaded_graph(&store);
        let plan = plan_query(parse("SHOW dependencies OF Nonexistent").unwrap());
        let result = execute_plan(&plan, &store, &graph).unwrap();
        assert_eq!(result.row_count, 0);
        assert!(result.warning.is_some());
    }

    #[test]
    fn test_path_from_dog_to_animal() {
        let (_dir, store) = seeded_store();
        let graph = loaded_graph(&store);
        let plan = plan_query(parse("PATH FROM Dog TO Animal").unwrap());
        let result = execute_plan(&plan, &store, &graph).unwrap();
        assert_eq!(result.row_count, 2);
    }

    #[test]
    fn test_analyze_complexity() {
        let (_dir, store) = seeded_store();
        let plan = plan_query(parse("ANALYZE complexity").unwrap());
        let result = execute_plan(&plan, &store, &GraphEngine::new()).unwrap();
        assert_eq!(result.rows[0][0], Json::String("speak".to_string()));
    }

    #[test]
    fn test_analyze_circular_none_found() {
        let (_dir, store) = seeded_store();
        let graph = loaded_graph(&store);
        let plan = plan_query(parse("ANALYZE circular").unwrap());
        let result = execute_plan(&plan, &store, &graph).unwrap();
        assert_eq!(result.row_count, 0);
    }

    #[test]
    fn test_describe_hydrates_full_row() {
        let (_dir, store) = seeded_store();
        let plan = plan_query(parse("DESCRIBE Animal").unwrap());
        let result = execute_plan(&plan, &store, &GraphEngine::new()).unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][2], Json::String("Animal".to_string()));
    }

    #[test]
    fn test_blame_without_history_table_is_warning() {
        let (_dir, store) = seeded_store();
        let plan = plan_query(parse("BLAME Animal").unwrap());
        let result = execute_plan(&plan, &store, &GraphEngine::new()).unwrap();
        assert_eq!(result.row_count, 0);
        assert!(result.warning.is_some());
    }
}
