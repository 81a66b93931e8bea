//! Conversion from `sqlparser` syntax trees into the planner's [`Statement`] model.

use std::collections::HashMap;

use rill_common::{NodeLocation, PlannerConfig, Result, RillError};
use rill_sql::{Envelope, Identifier, ParsedStatement, WindowSpec};
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, DuplicateTreatment, Expr as SqlExpr, FunctionArg,
    FunctionArgExpr, FunctionArguments, GroupByExpr, Ident, JoinConstraint, JoinOperator,
    ObjectName, Query as SqlQuery, SelectItem as SqlSelectItem, SetExpr, TableFactor,
    TableWithJoins, UnaryOperator, Value,
};
use tracing::trace;

use crate::ast::{
    ArithmeticOp, ColumnRef, ComparisonOp, Expression, ExpressionKind, JoinClause, JoinType, Literal,
    LogicalOp, PreparedStatement, Query, Relation, SelectItem, SinkKind, Statement, TableRef,
    UnaryOp, WindowExpression,
};
use crate::catalog::parse_type_name;

/// Parse a SQL script into prepared statements, in source order.
pub fn parse_statements(sql: &str, config: &PlannerConfig) -> Result<Vec<PreparedStatement>> {
    rill_sql::parse_sql(sql, config.max_expression_depth)?
        .into_iter()
        .map(|parsed| {
            let statement = convert_statement(&parsed, config.max_expression_depth)
                .map_err(|e| e.in_statement(parsed.text.as_str()))?;
            Ok(PreparedStatement {
                text: parsed.text,
                statement,
            })
        })
        .collect()
}

/// Convert one parsed statement; `max_depth` bounds expression nesting.
pub fn convert_statement(parsed: &ParsedStatement, max_depth: usize) -> Result<Statement> {
    let mut conv = Converter {
        locator: Locator::new(&parsed.identifiers),
        max_depth,
    };
    let mut query = conv.query(&parsed.query)?;
    query.window = parsed.window.map(window_expression);

    let statement = match &parsed.envelope {
        Envelope::Query => Statement::Query(query),
        Envelope::CreateAsSelect {
            kind,
            name,
            properties,
        } => Statement::CreateAsSelect {
            kind: match kind {
                rill_sql::SinkKind::Stream => SinkKind::Stream,
                rill_sql::SinkKind::Table => SinkKind::Table,
            },
            name: name.clone(),
            properties: properties.clone(),
            query,
        },
        Envelope::InsertInto { target } => Statement::InsertInto {
            target: target.clone(),
            query,
        },
    };
    trace!(text = %parsed.text, "converted statement");
    Ok(statement)
}

fn window_expression(spec: WindowSpec) -> WindowExpression {
    match spec {
        WindowSpec::Tumbling { size } => WindowExpression::Tumbling { size },
        WindowSpec::Hopping { size, advance } => WindowExpression::Hopping { size, advance },
        WindowSpec::Session { gap } => WindowExpression::Session { gap },
    }
}

/// Finds where identifiers occur in a statement.
///
/// The parser does not record spans, so the n-th lookup of a name maps to the
/// n-th word token spelled that way. Conversion visits clauses in source
/// order, which keeps the two in step for ordinary statements.
struct Locator<'a> {
    words: &'a [Identifier],
    seen: HashMap<String, usize>,
}

impl<'a> Locator<'a> {
    fn new(words: &'a [Identifier]) -> Self {
        Self {
            words,
            seen: HashMap::new(),
        }
    }

    fn locate(&mut self, ident: &str) -> Option<NodeLocation> {
        let mut matches = self
            .words
            .iter()
            .filter(|w| w.value.eq_ignore_ascii_case(ident));
        let nth = self.seen.entry(ident.to_ascii_lowercase()).or_insert(0);
        let found = matches.clone().nth(*nth).or_else(|| matches.next_back())?;
        *nth += 1;
        Some(found.location)
    }
}

struct Converter<'a> {
    locator: Locator<'a>,
    max_depth: usize,
}

impl Converter<'_> {
    fn query(&mut self, q: &SqlQuery) -> Result<Query> {
        if q.with.is_some() {
            return Err(RillError::Unsupported(
                "WITH clauses are not supported".to_string(),
            ));
        }
        if q.offset.is_some() {
            return Err(RillError::Unsupported("OFFSET is not supported".to_string()));
        }
        let select = match &*q.body {
            SetExpr::Select(s) => s.as_ref(),
            _ => {
                return Err(RillError::Unsupported(
                    "only simple SELECT is supported (no UNION/EXCEPT/INTERSECT)".to_string(),
                ))
            }
        };
        if select.distinct.is_some() {
            return Err(RillError::Unsupported("SELECT DISTINCT is not supported".to_string()));
        }

        let mut items = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            items.push(match item {
                SqlSelectItem::UnnamedExpr(e) => SelectItem::Expression {
                    expr: self.expr(e, 1)?,
                    alias: None,
                },
                SqlSelectItem::ExprWithAlias { expr, alias } => SelectItem::Expression {
                    expr: self.expr(expr, 1)?,
                    alias: Some(alias.value.clone()),
                },
                SqlSelectItem::Wildcard(_) => SelectItem::Wildcard {
                    qualifier: None,
                    location: None,
                },
                SqlSelectItem::QualifiedWildcard(name, _) => {
                    let qualifier = object_name_to_string(name);
                    let location = self.locator.locate(&qualifier);
                    SelectItem::Wildcard {
                        qualifier: Some(qualifier),
                        location,
                    }
                }
            });
        }

        let from = self.relation(&select.from)?;
        let filter = match &select.selection {
            Some(e) => Some(self.expr(e, 1)?),
            None => None,
        };
        let group_by = match &select.group_by {
            GroupByExpr::Expressions(es, _) => es
                .iter()
                .map(|e| self.expr(e, 1))
                .collect::<Result<Vec<_>>>()?,
            GroupByExpr::All(_) => {
                return Err(RillError::Unsupported("GROUP BY ALL is not supported".to_string()))
            }
        };
        let having = match &select.having {
            Some(e) => Some(self.expr(e, 1)?),
            None => None,
        };
        let limit = match &q.limit {
            Some(e) => Some(limit_value(e)?),
            None => None,
        };

        Ok(Query {
            select: items,
            from,
            window: None,
            filter,
            group_by,
            having,
            limit,
        })
    }

    fn relation(&mut self, from: &[TableWithJoins]) -> Result<Relation> {
        let [twj] = from else {
            return Err(RillError::Unsupported(
                "exactly one FROM relation is required".to_string(),
            ));
        };
        let left = self.table_ref(&twj.relation)?;
        let join = match twj.joins.as_slice() {
            [] => return Ok(Relation::Table(left)),
            [join] => join,
            _ => {
                return Err(RillError::UnsupportedJoin {
                    reason: "only a single join between two relations is supported".to_string(),
                })
            }
        };

        let right = self.table_ref(&join.relation)?;
        let (join_type, constraint) = match &join.join_operator {
            JoinOperator::Inner(c) => (JoinType::Inner, c),
            JoinOperator::LeftOuter(c) => (JoinType::Left, c),
            JoinOperator::FullOuter(c) => (JoinType::Outer, c),
            other => {
                return Err(RillError::UnsupportedJoin {
                    reason: format!("join operator {other:?} is not supported"),
                })
            }
        };
        let criteria = match constraint {
            JoinConstraint::On(e) => self.expr(e, 1)?,
            _ => {
                return Err(RillError::UnsupportedJoin {
                    reason: "joins require an ON clause".to_string(),
                })
            }
        };
        Ok(Relation::Join(Box::new(JoinClause {
            join_type,
            left,
            right,
            criteria,
        })))
    }

    fn table_ref(&mut self, tf: &TableFactor) -> Result<TableRef> {
        match tf {
            TableFactor::Table { name, alias, .. } => {
                let name = object_name_to_string(name);
                let location = self.locator.locate(&name);
                Ok(TableRef {
                    name,
                    alias: alias.as_ref().map(|a| a.name.value.clone()),
                    location,
                })
            }
            _ => Err(RillError::Unsupported(
                "only simple stream/table names are supported in FROM".to_string(),
            )),
        }
    }

    fn located(&mut self, kind: ExpressionKind, ident: &str) -> Expression {
        let location = self.locator.locate(ident);
        Expression::new(kind).with_location(location)
    }

    fn expr(&mut self, e: &SqlExpr, depth: usize) -> Result<Expression> {
        if depth > self.max_depth {
            return Err(RillError::ExpressionTooDeep {
                limit: self.max_depth,
            });
        }
        let next = depth + 1;
        let kind = match e {
            SqlExpr::Identifier(id) => {
                return Ok(self.located(
                    ExpressionKind::Column(ColumnRef {
                        qualifier: None,
                        name: id.value.clone(),
                    }),
                    &id.value,
                ))
            }
            SqlExpr::CompoundIdentifier(parts) => {
                let [qualifier, name] = parts.as_slice() else {
                    return Err(RillError::Unsupported(format!(
                        "column references take at most one qualifier: {}",
                        compound_ident_to_string(parts)
                    )));
                };
                return Ok(self.located(
                    ExpressionKind::Column(ColumnRef {
                        qualifier: Some(qualifier.value.clone()),
                        name: name.value.clone(),
                    }),
                    &qualifier.value,
                ));
            }
            SqlExpr::Value(v) => ExpressionKind::Literal(literal(v, false)?),
            SqlExpr::Nested(inner) => return self.expr(inner, next),
            SqlExpr::UnaryOp { op, expr } => match (op, expr.as_ref()) {
                (UnaryOperator::Minus, SqlExpr::Value(v @ Value::Number(..))) => {
                    ExpressionKind::Literal(literal(v, true)?)
                }
                (UnaryOperator::Minus, inner) => ExpressionKind::Unary {
                    op: UnaryOp::Minus,
                    expr: Box::new(self.expr(inner, next)?),
                },
                (UnaryOperator::Plus, inner) => ExpressionKind::Unary {
                    op: UnaryOp::Plus,
                    expr: Box::new(self.expr(inner, next)?),
                },
                (UnaryOperator::Not, inner) => ExpressionKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(self.expr(inner, next)?),
                },
                (other, _) => {
                    return Err(RillError::Unsupported(format!(
                        "unsupported unary operator: {other}"
                    )))
                }
            },
            SqlExpr::BinaryOp { left, op, right } => {
                let form = binary_form(op)?;
                let left = Box::new(self.expr(left, next)?);
                let right = Box::new(self.expr(right, next)?);
                match form {
                    BinaryForm::Arithmetic(op) => ExpressionKind::Arithmetic { left, op, right },
                    BinaryForm::Comparison(op) => ExpressionKind::Comparison { left, op, right },
                    BinaryForm::Logical(op) => ExpressionKind::Logical { left, op, right },
                    BinaryForm::Concat => ExpressionKind::Function {
                        name: "CONCAT".to_string(),
                        args: vec![*left, *right],
                        distinct: false,
                    },
                }
            }
            SqlExpr::Function(f) => {
                if f.over.is_some() {
                    return Err(RillError::Unsupported(
                        "OVER (...) window functions are not supported; use WINDOW".to_string(),
                    ));
                }
                if f.filter.is_some() {
                    return Err(RillError::Unsupported(
                        "FILTER on aggregate calls is not supported".to_string(),
                    ));
                }
                let raw_name = object_name_to_string(&f.name);
                let location = self.locator.locate(&raw_name);
                let name = raw_name.to_ascii_uppercase();
                let (args, distinct) = match &f.args {
                    FunctionArguments::None => (vec![], false),
                    FunctionArguments::List(list) => {
                        let mut args = Vec::with_capacity(list.args.len());
                        for a in &list.args {
                            args.push(self.function_arg(a, next)?);
                        }
                        let distinct =
                            matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct));
                        (args, distinct)
                    }
                    FunctionArguments::Subquery(_) => {
                        return Err(RillError::Unsupported(
                            "subquery function arguments are not supported".to_string(),
                        ))
                    }
                };

                let kind = if name == "NULLIF" {
                    let [first, second]: [Expression; 2] = args.try_into().map_err(|a: Vec<_>| {
                        RillError::Planning(format!("NULLIF expects 2 arguments, got {}", a.len()))
                    })?;
                    ExpressionKind::NullIf {
                        first: Box::new(first),
                        second: Box::new(second),
                    }
                } else {
                    ExpressionKind::Function {
                        name,
                        args,
                        distinct,
                    }
                };
                return Ok(Expression::new(kind).with_location(location));
            }
            SqlExpr::Case {
                operand,
                conditions,
                results,
                else_result,
                ..
            } => {
                let operand = match operand {
                    Some(op) => Some(Box::new(self.expr(op, next)?)),
                    None => None,
                };
                let mut branches = Vec::with_capacity(conditions.len());
                for (when, then) in conditions.iter().zip(results.iter()) {
                    let when = self.expr(when, next)?;
                    let then = self.expr(then, next)?;
                    branches.push((when, then));
                }
                let else_result = match else_result {
                    Some(e) => Some(Box::new(self.expr(e, next)?)),
                    None => None,
                };
                ExpressionKind::Case {
                    operand,
                    branches,
                    else_result,
                }
            }
            SqlExpr::Cast {
                expr, data_type, ..
            } => {
                let data_type = parse_type_name(&data_type.to_string()).map_err(|_| {
                    RillError::Unsupported(format!("unsupported CAST target type: {data_type}"))
                })?;
                ExpressionKind::Cast {
                    expr: Box::new(self.expr(expr, next)?),
                    data_type,
                }
            }
            SqlExpr::IsNull(inner) => ExpressionKind::IsNull {
                expr: Box::new(self.expr(inner, next)?),
                negated: false,
            },
            SqlExpr::IsNotNull(inner) => ExpressionKind::IsNull {
                expr: Box::new(self.expr(inner, next)?),
                negated: true,
            },
            SqlExpr::Between {
                expr,
                negated,
                low,
                high,
            } => ExpressionKind::Between {
                expr: Box::new(self.expr(expr, next)?),
                low: Box::new(self.expr(low, next)?),
                high: Box::new(self.expr(high, next)?),
                negated: *negated,
            },
            SqlExpr::Like {
                negated,
                expr,
                pattern,
                ..
            } => ExpressionKind::Like {
                expr: Box::new(self.expr(expr, next)?),
                pattern: Box::new(self.expr(pattern, next)?),
                negated: *negated,
            },
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = Box::new(self.expr(expr, next)?);
                let list = list
                    .iter()
                    .map(|item| self.expr(item, next))
                    .collect::<Result<Vec<_>>>()?;
                ExpressionKind::InList {
                    expr,
                    list,
                    negated: *negated,
                }
            }
            _ => {
                return Err(RillError::Unsupported(format!(
                    "unsupported SQL expression: {e}"
                )))
            }
        };
        Ok(Expression::new(kind))
    }

    fn function_arg(&mut self, a: &FunctionArg, depth: usize) -> Result<Expression> {
        match a {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => self.expr(e, depth),
            FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
                Ok(Expression::new(ExpressionKind::Wildcard))
            }
            _ => Err(RillError::Unsupported(
                "only positional function arguments are supported".to_string(),
            )),
        }
    }
}

enum BinaryForm {
    Arithmetic(ArithmeticOp),
    Comparison(ComparisonOp),
    Logical(LogicalOp),
    Concat,
}

fn binary_form(op: &SqlBinaryOp) -> Result<BinaryForm> {
    Ok(match op {
        SqlBinaryOp::Plus => BinaryForm::Arithmetic(ArithmeticOp::Add),
        SqlBinaryOp::Minus => BinaryForm::Arithmetic(ArithmeticOp::Subtract),
        SqlBinaryOp::Multiply => BinaryForm::Arithmetic(ArithmeticOp::Multiply),
        SqlBinaryOp::Divide => BinaryForm::Arithmetic(ArithmeticOp::Divide),
        SqlBinaryOp::Modulo => BinaryForm::Arithmetic(ArithmeticOp::Modulo),
        SqlBinaryOp::Eq => BinaryForm::Comparison(ComparisonOp::Eq),
        SqlBinaryOp::NotEq => BinaryForm::Comparison(ComparisonOp::NotEq),
        SqlBinaryOp::Lt => BinaryForm::Comparison(ComparisonOp::Lt),
        SqlBinaryOp::LtEq => BinaryForm::Comparison(ComparisonOp::LtEq),
        SqlBinaryOp::Gt => BinaryForm::Comparison(ComparisonOp::Gt),
        SqlBinaryOp::GtEq => BinaryForm::Comparison(ComparisonOp::GtEq),
        SqlBinaryOp::And => BinaryForm::Logical(LogicalOp::And),
        SqlBinaryOp::Or => BinaryForm::Logical(LogicalOp::Or),
        SqlBinaryOp::StringConcat => BinaryForm::Concat,
        other => {
            return Err(RillError::Unsupported(format!(
                "unsupported binary operator: {other}"
            )))
        }
    })
}

fn literal(v: &Value, negate: bool) -> Result<Literal> {
    match v {
        Value::Number(s, _) => {
            let text = if negate { format!("-{s}") } else { s.clone() };
            if text.contains(['.', 'e', 'E']) {
                let f: f64 = text
                    .parse()
                    .map_err(|_| RillError::Parse(format!("bad number: {text}")))?;
                return Ok(Literal::Double(f));
            }
            let i: i64 = text
                .parse()
                .map_err(|_| RillError::Parse(format!("bad number: {text}")))?;
            Ok(match i32::try_from(i) {
                Ok(small) => Literal::Integer(small),
                Err(_) => Literal::BigInt(i),
            })
        }
        Value::SingleQuotedString(s) => Ok(Literal::String(s.clone())),
        Value::Boolean(b) => Ok(Literal::Boolean(*b)),
        Value::Null => Ok(Literal::Null),
        _ => Err(RillError::Unsupported(format!("unsupported SQL literal: {v}"))),
    }
}

fn limit_value(e: &SqlExpr) -> Result<u64> {
    match e {
        SqlExpr::Value(Value::Number(s, _)) => s
            .parse::<u64>()
            .map_err(|_| RillError::Planning(format!("LIMIT must be a non-negative integer, got {s}"))),
        other => Err(RillError::Planning(format!(
            "LIMIT must be a literal integer, got {other}"
        ))),
    }
}

fn object_name_to_string(n: &ObjectName) -> String {
    n.0.iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn compound_ident_to_string(parts: &[Ident]) -> String {
    parts
        .iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}
