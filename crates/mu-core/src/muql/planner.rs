//! Query planner: AST -> [`ExecutionPlan`].
//!
//! Classifies each parsed query into one of three plan kinds per spec.md
//! §4.4, plus a fourth `Temporal` kind supplemented from the original's
//! `DESCRIBE`/`BLAME`/`HISTORY OF` commands (§4.6).

use crate::muql::ast::*;

/// The default traversal depth when a `SHOW`/`PATH` clause omits one.
pub const DEFAULT_DEPTH: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionPlan {
    Sql(SqlPlan),
    Graph(GraphPlan),
    Analysis(AnalysisPlan),
    Temporal(TemporalPlan),
}

/// Pure `SELECT` over node/edge projections, translated to parameterised SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPlan {
    pub table: NodeTable,
    pub fields: SelectFields,
    pub predicate: Option<Predicate>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
}

/// `SHOW`, `PATH`, `FIND` forms delegated to the graph engine, with name->id
/// resolution and result hydration happening in the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphPlan {
    Neighbors {
        kind: ShowKind,
        target: String,
        depth: u32,
    },
    Find {
        table: NodeTable,
        condition: FindCondition,
        value: String,
    },
    Path {
        from: String,
        to: String,
        max_depth: u32,
    },
}

/// `ANALYZE` forms: fixed compositions of graph and relational calls.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPlan {
    Circular,
    Complexity { threshold: Option<u32> },
    Coupling,
    Unused,
    Hotspots { threshold: Option<u32> },
}

/// `DESCRIBE`/`BLAME`/`HISTORY OF`, supplemented from the original
/// implementation and bound to the snapshot/history tables of §4.6.
#[derive(Debug, Clone, PartialEq)]
pub enum TemporalPlan {
    Describe { target: String },
    Blame { target: String },
    History { target: String, limit: u32 },
}

/// The default row cap for `HISTORY OF` when no `LIMIT` is given.
const DEFAULT_HISTORY_LIMIT: u32 = 20;

#[must_use]
pub fn plan_query(query: Query) -> ExecutionPlan {
    match query {
        Query::Select(select) => ExecutionPlan::Sql(SqlPlan {
            table: select.table,
            fields: select.fields,
            predicate: select.predicate,
            order_by: select.order_by,
            limit: select.limit,
        }),
        Query::Show(show) => ExecutionPlan::Graph(GraphPlan::Neighbors {
            kind: show.kind,
            target: show.target,
            depth: show.depth.unwrap_or(DEFAULT_DEPTH),
        }),
        Query::Find(find) => ExecutionPlan::Graph(GraphPlan::Find {
            table: find.table,
            condition: find.condition,
            value: find.value,
        }),
        Query::Path(path) => ExecutionPlan::Graph(GraphPlan::Path {
            from: path.from,
            to: path.to,
            max_depth: path.max_depth.unwrap_or(DEFAULT_DEPTH),
        }),
        Query::Analyze(analyze) => ExecutionPlan::Analysis(match analyze.kind {
            AnalysisType::Circular => AnalysisPlan::Circular,
            AnalysisType::Complexity => AnalysisPlan::Complexity {
                threshold: analyze.threshold,
            },
            AnalysisType::Coupling => AnalysisPlan::Coupling,
            AnalysisType::Unused => AnalysisPlan::Unused,
            AnalysisType::Hotspots => AnalysisPlan::Hotspots {
                threshold: analyze.threshold,
            },
        }),
        Query::Describe(d) => ExecutionPlan::Temporal(TemporalPlan::Describe { target: d.target }),
        Query::Blame(b) => ExecutionPlan::Temporal(TemporalPlan::Blame { target: b.target }),
        Query::History(h) => ExecutionPlan::Temporal(TemporalPlan::History {
            target: h.target,
            limit: h.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muql::parser::parse;

    #[test]
    fn test_select_plans_to_sql() {
        let plan = plan_query(parse("SELECT * FROM functions WHERE complexity > 20").unwrap());
        assert!(matches!(plan, ExecutionPlan::Sql(_)));
    }

    #[test]
    fn test_show_plans_to_graph_with_default_depth() {
        let plan = plan_query(parse("SHOW dependencies OF AuthService").unwrap());
        match plan {
            ExecutionPlan::Graph(GraphPlan::Neighbors { depth, .. }) => {
                assert_eq!(depth, DEFAULT_DEPTH);
            }
            other => panic!("expected graph plan, got {other:?}"),
        }
    }

    #[test]
    fn test_find_plans_to_graph() {
        let plan = plan_query(parse("FIND classes INHERITING FROM Animal").unwrap());
        assert!(matches!(plan, ExecutionPlan::Graph(GraphPlan::Find { .. })));
    }

    #[test]
    fn test_path_plans_to_graph_with_default_max_depth() {
        let plan = plan_query(parse("PATH FROM a TO b").unwrap());
        match plan {
            ExecutionPlan::Graph(GraphPlan::Path { max_depth, .. }) => {
                assert_eq!(max_depth, DEFAULT_DEPTH);
            }
            other => panic!("expected graph plan, got {other:?}"),
        }
    }

    #[test]
    fn test_analyze_complexity_plans_to_analysis() {
        let plan = plan_query(parse("ANALYZE complexity THRESHOLD 15").unwrap());
        match plan {
            ExecutionPlan::Analysis(AnalysisPlan::Complexity { threshold }) => {
                assert_eq!(threshold, Some(15));
            }
            other => panic!("expected analysis plan, got {other:?}"),
        }
    }

    #[test]
    fn test_history_plans_to_temporal_with_default_limit() {
        let plan = plan_query(parse("HISTORY OF AuthService").unwrap());
        match plan {
            ExecutionPlan::Temporal(TemporalPlan::History { limit, .. }) => {
                assert_eq!(limit, DEFAULT_HISTORY_LIMIT);
            }
            other => panic!("expected temporal plan, got {other:?}"),
        }
    }
}
