//! Recursive-descent parser: tokens -> [`Query`].
//!
//! Keywords are matched case-insensitively per spec.md §4.4; everything
//! else (field names, identifiers, literals) is taken verbatim.

use crate::error::{MuError, MuResult};
use crate::muql::ast::*;
use crate::muql::lexer::{Lexer, Token, TokenKind};

/// Parse a single MUQL statement.
pub fn parse(query: &str) -> MuResult<Query> {
    let tokens = Lexer::new(query).tokenize()?;
    Parser::new(tokens).parse_query()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> MuError {
        let tok = self.peek();
        MuError::Syntax {
            message: message.into(),
            line: tok.line,
            column: tok.column,
        }
    }

    /// True and consumes if the next token is the given keyword (case-insensitive).
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> MuResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{keyword}'")))
        }
    }

    fn expect_ident(&mut self) -> MuResult<String> {
        match self.advance().kind {
            TokenKind::Ident(s) => Ok(s),
            _ => Err(self.error("expected an identifier")),
        }
    }

    fn expect_u32(&mut self) -> MuResult<u32> {
        match self.advance().kind {
            TokenKind::Num(n) => Ok(n as u32),
            _ => Err(self.error("expected a number")),
        }
    }

    fn expect_u64(&mut self) -> MuResult<u64> {
        match self.advance().kind {
            TokenKind::Num(n) => Ok(n as u64),
            _ => Err(self.error("expected a number")),
        }
    }

    fn expect_eof(&mut self) -> MuResult<()> {
        match &self.peek().kind {
            TokenKind::Eof => Ok(()),
            _ => Err(self.error("unexpected trailing input")),
        }
    }

    fn parse_query(&mut self) -> MuResult<Query> {
        let leading = self.expect_ident()?;
        let query = match leading.to_ascii_uppercase().as_str() {
            "SELECT" => Query::Select(self.parse_select()?),
            "SHOW" => Query::Show(self.parse_show()?),
            "FIND" => Query::Find(self.parse_find()?),
            "PATH" => Query::Path(self.parse_path()?),
            "ANALYZE" => Query::Analyze(self.parse_analyze()?),
            "DESCRIBE" => Query::Describe(DescribeQuery {
                target: self.parse_target_name()?,
            }),
            "BLAME" => Query::Blame(BlameQuery {
                target: self.parse_target_name()?,
            }),
            "HISTORY" => Query::History(self.parse_history()?),
            other => {
                return Err(self.error(format!(
                    "unknown query form '{other}', expected one of SELECT, SHOW, FIND, PATH, ANALYZE, DESCRIBE, BLAME, HISTORY"
                )))
            }
        };
        self.expect_eof()?;
        Ok(query)
    }

    /// A bare target name: identifier or quoted string.
    fn parse_target_name(&mut self) -> MuResult<String> {
        match self.advance().kind {
            TokenKind::Ident(s) => Ok(s),
            TokenKind::Str(s) => Ok(s),
            _ => Err(self.error("expected a node name")),
        }
    }

    fn parse_select(&mut self) -> MuResult<SelectQuery> {
        let fields = if matches!(self.peek().kind, TokenKind::Star) {
            self.advance();
            SelectFields::All
        } else {
            let mut names = vec![self.expect_ident()?];
            while matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
                names.push(self.expect_ident()?);
            }
            SelectFields::Named(names)
        };

        self.expect_keyword("FROM")?;
        let table_name = self.expect_ident()?;
        let table = NodeTable::from_keyword(&table_name).ok_or_else(|| {
            self.error(format!(
                "unknown table '{table_name}', expected one of modules, classes, functions, external, nodes, edges"
            ))
        })?;

        let predicate = if self.eat_keyword("WHERE") {
            Some(self.parse_predicate()?)
        } else {
            None
        };

        let order_by = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let field = self.expect_ident()?;
            let descending = if self.eat_keyword("DESC") {
                true
            } else {
                self.eat_keyword("ASC");
                false
            };
            Some(OrderBy { field, descending })
        } else {
            None
        };

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.expect_u64()?)
        } else {
            None
        };

        Ok(SelectQuery {
            fields,
            table,
            predicate,
            order_by,
            limit,
        })
    }

    fn parse_predicate(&mut self) -> MuResult<Predicate> {
        let mut conjuncts = vec![self.parse_comparison()?];
        while self.eat_keyword("AND") {
            conjuncts.push(self.parse_comparison()?);
        }
        Ok(Predicate { conjuncts })
    }

    fn parse_comparison(&mut self) -> MuResult<Comparison> {
        let field = self.expect_ident()?;
        let op = if self.eat_keyword("LIKE") {
            ComparisonOperator::Like
        } else {
            match self.advance().kind {
                TokenKind::Eq => ComparisonOperator::Eq,
                TokenKind::Ne => ComparisonOperator::Ne,
                TokenKind::Gt => ComparisonOperator::Gt,
                TokenKind::Ge => ComparisonOperator::Ge,
                TokenKind::Lt => ComparisonOperator::Lt,
                TokenKind::Le => ComparisonOperator::Le,
                _ => return Err(self.error("expected a comparison operator")),
            }
        };
        let value = self.parse_literal()?;
        Ok(Comparison { field, op, value })
    }

    fn parse_literal(&mut self) -> MuResult<Literal> {
        match self.advance().kind {
            TokenKind::Str(s) => Ok(Literal::Str(s)),
            TokenKind::Num(n) => Ok(Literal::Num(n)),
            TokenKind::Ident(s) if s.eq_ignore_ascii_case("true") => Ok(Literal::Bool(true)),
            TokenKind::Ident(s) if s.eq_ignore_ascii_case("false") => Ok(Literal::Bool(false)),
            TokenKind::Ident(s) => Ok(Literal::Str(s)),
            _ => Err(self.error("expected a value")),
        }
    }

    fn parse_show(&mut self) -> MuResult<ShowQuery> {
        let kind_name = self.expect_ident()?;
        let kind = ShowKind::from_keyword(&kind_name).ok_or_else(|| {
            self.error(format!(
                "unknown SHOW kind '{kind_name}', expected one of dependencies, dependents, callers, callees"
            ))
        })?;
        self.expect_keyword("OF")?;
        let target = self.parse_target_name()?;
        let depth = if self.eat_keyword("DEPTH") {
            Some(self.expect_u32()?)
        } else {
            None
        };
        Ok(ShowQuery { kind, target, depth })
    }

    fn parse_find(&mut self) -> MuResult<FindQuery> {
        let table_name = self.expect_ident()?;
        let table = NodeTable::from_keyword(&table_name).ok_or_else(|| {
            self.error(format!("unknown table '{table_name}' in FIND"))
        })?;

        let condition = if self.eat_keyword("CALLING") {
            FindCondition::Calling
        } else if self.eat_keyword("CALLED") {
            self.expect_keyword("BY")?;
            FindCondition::CalledBy
        } else if self.eat_keyword("IMPLEMENTING") {
            FindCondition::Implementing
        } else if self.eat_keyword("INHERITING") {
            self.expect_keyword("FROM")?;
            FindCondition::InheritingFrom
        } else if self.eat_keyword("WITH") {
            self.expect_keyword("DECORATOR")?;
            FindCondition::WithDecorator
        } else {
            return Err(self.error(
                "expected CALLING, CALLED BY, IMPLEMENTING, INHERITING FROM, or WITH DECORATOR",
            ));
        };

        let value = self.parse_target_name()?;
        Ok(FindQuery {
            table,
            condition,
            value,
        })
    }

    fn parse_path(&mut self) -> MuResult<PathQuery> {
        self.expect_keyword("FROM")?;
        let from = self.parse_target_name()?;
        self.expect_keyword("TO")?;
        let to = self.parse_target_name()?;
        let max_depth = if self.eat_keyword("MAX") {
            self.expect_keyword("DEPTH")?;
            Some(self.expect_u32()?)
        } else {
            None
        };
        Ok(PathQuery {
            from,
            to,
            max_depth,
        })
    }

    fn parse_analyze(&mut self) -> MuResult<AnalyzeQuery> {
        let kind_name = self.expect_ident()?;
        let kind = AnalysisType::from_keyword(&kind_name).ok_or_else(|| {
            self.error(format!(
                "unknown ANALYZE kind '{kind_name}', expected one of circular, complexity, coupling, unused, hotspots"
            ))
        })?;
        let threshold = if self.eat_keyword("THRESHOLD") {
            Some(self.expect_u32()?)
        } else {
            None
        };
        Ok(AnalyzeQuery { kind, threshold })
    }

    fn parse_history(&mut self) -> MuResult<HistoryQuery> {
        self.expect_keyword("OF")?;
        let target = self.parse_target_name()?;
        let limit = if self.eat_keyword("LIMIT") {
            Some(self.expect_u32()?)
        } else {
            None
        };
        Ok(HistoryQuery { target, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_star_from_functions() {
        let q = parse("SELECT * FROM functions WHERE complexity > 20").unwrap();
        let Query::Select(sel) = q else { panic!("expected select") };
        assert_eq!(sel.fields, SelectFields::All);
        assert_eq!(sel.table, NodeTable::Functions);
        let pred = sel.predicate.unwrap();
        assert_eq!(pred.conjuncts.len(), 1);
        assert_eq!(pred.conjuncts[0].field, "complexity");
        assert_eq!(pred.conjuncts[0].op, ComparisonOperator::Gt);
        assert_eq!(pred.conjuncts[0].value, Literal::Num(20.0));
    }

    #[test]
    fn test_select_named_fields_order_limit() {
        let q = parse("SELECT name, complexity FROM functions ORDER BY complexity DESC LIMIT 10")
            .unwrap();
        let Query::Select(sel) = q else { panic!("expected select") };
        assert_eq!(
            sel.fields,
            SelectFields::Named(vec!["name".to_string(), "complexity".to_string()])
        );
        let order = sel.order_by.unwrap();
        assert_eq!(order.field, "complexity");
        assert!(order.descending);
        assert_eq!(sel.limit, Some(10));
    }

    #[test]
    fn test_select_with_and_predicate() {
        let q = parse("SELECT * FROM classes WHERE name = 'AuthService' AND complexity > 5")
            .unwrap();
        let Query::Select(sel) = q else { panic!("expected select") };
        let pred = sel.predicate.unwrap();
        assert_eq!(pred.conjuncts.len(), 2);
        assert_eq!(pred.conjuncts[0].value, Literal::Str("AuthService".to_string()));
    }

    #[test]
    fn test_show_dependencies() {
        let q = parse("SHOW dependencies OF AuthService DEPTH 2").unwrap();
        let Query::Show(show) = q else { panic!("expected show") };
        assert_eq!(show.kind, ShowKind::Dependencies);
        assert_eq!(show.target, "AuthService");
        assert_eq!(show.depth, Some(2));
    }

    #[test]
    fn test_find_inheriting_from() {
        let q = parse("FIND classes INHERITING FROM Animal").unwrap();
        let Query::Find(find) = q else { panic!("expected find") };
        assert_eq!(find.table, NodeTable::Classes);
        assert_eq!(find.condition, FindCondition::InheritingFrom);
        assert_eq!(find.value, "Animal");
    }

    #[test]
    fn test_find_called_by() {
        let q = parse("FIND functions CALLED BY main").unwrap();
        let Query::Find(find) = q else { panic!("expected find") };
        assert_eq!(find.condition, FindCondition::CalledBy);
    }

    #[test]
    fn test_path_from_to_max_depth() {
        let q = parse("PATH FROM login TO database MAX DEPTH 5").unwrap();
        let Query::Path(path) = q else { panic!("expected path") };
        assert_eq!(path.from, "login");
        assert_eq!(path.to, "database");
        assert_eq!(path.max_depth, Some(5));
    }

    #[test]
    fn test_analyze_circular() {
        let q = parse("ANALYZE circular").unwrap();
        let Query::Analyze(a) = q else { panic!("expected analyze") };
        assert_eq!(a.kind, AnalysisType::Circular);
        assert_eq!(a.threshold, None);
    }

    #[test]
    fn test_analyze_hotspots_with_threshold() {
        let q = parse("ANALYZE hotspots THRESHOLD 10").unwrap();
        let Query::Analyze(a) = q else { panic!("expected analyze") };
        assert_eq!(a.kind, AnalysisType::Hotspots);
        assert_eq!(a.threshold, Some(10));
    }

    #[test]
    fn test_describe() {
        let q = parse("DESCRIBE AuthService").unwrap();
        assert!(matches!(q, Query::Describe(d) if d.target == "AuthService"));
    }

    #[test]
    fn test_blame() {
        let q = parse("BLAME AuthService").unwrap();
        assert!(matches!(q, Query::Blame(b) if b.target == "AuthService"));
    }

    #[test]
    fn test_history_of_with_limit() {
        let q = parse("HISTORY OF AuthService LIMIT 5").unwrap();
        let Query::History(h) = q else { panic!("expected history") };
        assert_eq!(h.target, "AuthService");
        assert_eq!(h.limit, Some(5));
    }

    #[test]
    fn test_case_insensitive_keywords() {
        let q = parse("select * from Functions where complexity > 1").unwrap();
        assert!(matches!(q, Query::Select(_)));
    }

    #[test]
    fn test_unknown_table_is_syntax_error_with_position() {
        let err = parse("SELECT * FROM bogus").unwrap_err();
        match err {
            MuError::Syntax { line, column, .. } => {
                assert_eq!(line, 1);
                assert!(column > 1);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_form_is_syntax_error() {
        let err = parse("DROP TABLE functions").unwrap_err();
        assert!(matches!(err, MuError::Syntax { .. }));
    }

    #[test]
    fn test_trailing_garbage_is_syntax_error() {
        let err = parse("ANALYZE circular EXTRA").unwrap_err();
        assert!(matches!(err, MuError::Syntax { .. }));
    }
}
