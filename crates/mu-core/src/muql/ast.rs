//! MUQL abstract syntax tree.
//!
//! One variant of [`Query`] per grammar form in SPEC_FULL.md §4.4, plus the
//! `DESCRIBE`/`BLAME`/`HISTORY OF` forms folded in from the original
//! implementation's temporal tooling.

/// A fully parsed MUQL query, ready for the planner.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(SelectQuery),
    Show(ShowQuery),
    Find(FindQuery),
    Path(PathQuery),
    Analyze(AnalyzeQuery),
    Describe(DescribeQuery),
    Blame(BlameQuery),
    History(HistoryQuery),
}

/// The virtual table a `SELECT`/`FIND` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTable {
    Modules,
    Classes,
    Functions,
    External,
    Nodes,
    Edges,
}

impl NodeTable {
    #[must_use]
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "modules" => Some(Self::Modules),
            "classes" => Some(Self::Classes),
            "functions" => Some(Self::Functions),
            "external" => Some(Self::External),
            "nodes" => Some(Self::Nodes),
            "edges" => Some(Self::Edges),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Modules => "modules",
            Self::Classes => "classes",
            Self::Functions => "functions",
            Self::External => "external",
            Self::Nodes => "nodes",
            Self::Edges => "edges",
        }
    }

    /// Whether rows from this table come from the `edges` relation rather
    /// than `nodes`.
    #[must_use]
    pub fn is_edge_table(self) -> bool {
        matches!(self, Self::Edges)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectFields {
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub fields: SelectFields,
    pub table: NodeTable,
    pub predicate: Option<Predicate>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// A conjunction of comparisons. MUQL's `WHERE` clause does not support `OR`
/// or parenthesized groups, matching spec.md's "design-level, not literal"
/// grammar note.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub conjuncts: Vec<Comparison>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub op: ComparisonOperator,
    pub value: Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// `LIKE`, substring match against text columns.
    Like,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowKind {
    Dependencies,
    Dependents,
    Callers,
    Callees,
}

impl ShowKind {
    #[must_use]
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dependencies" => Some(Self::Dependencies),
            "dependents" => Some(Self::Dependents),
            "callers" => Some(Self::Callers),
            "callees" => Some(Self::Callees),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowQuery {
    pub kind: ShowKind,
    pub target: String,
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindCondition {
    Calling,
    CalledBy,
    Implementing,
    InheritingFrom,
    WithDecorator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub table: NodeTable,
    pub condition: FindCondition,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathQuery {
    pub from: String,
    pub to: String,
    pub max_depth: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    Circular,
    Complexity,
    Coupling,
    Unused,
    Hotspots,
}

impl AnalysisType {
    #[must_use]
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "circular" => Some(Self::Circular),
            "complexity" => Some(Self::Complexity),
            "coupling" => Some(Self::Coupling),
            "unused" => Some(Self::Unused),
            "hotspots" => Some(Self::Hotspots),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeQuery {
    pub kind: AnalysisType,
    pub threshold: Option<u32>,
}

/// Supplemented from the original's `DESCRIBE <name>` command: a single-node
/// detail dump (properties, neighbor counts, docstring).
#[derive(Debug, Clone, PartialEq)]
pub struct DescribeQuery {
    pub target: String,
}

/// Supplemented from the original's `BLAME <name>`: the commit that last
/// touched a node, per §4.6 temporal history.
#[derive(Debug, Clone, PartialEq)]
pub struct BlameQuery {
    pub target: String,
}

/// Supplemented from the original's `HISTORY OF <name>`: the change log for
/// a node across snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub target: String,
    pub limit: Option<u32>,
}
