//! Statement and expression tree produced by the SQL front-end.
//!
//! Expressions are immutable, exclusively owned trees. Equality and hashing are
//! structural and ignore source locations, so two independently built trees of
//! the same shape compare equal. `Display` renders the canonical text form used
//! for aggregate deduplication and EXPLAIN output.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use arrow_schema::DataType;
use rill_common::NodeLocation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    String(String),
}

impl Literal {
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Null => DataType::Null,
            Literal::Boolean(_) => DataType::Boolean,
            Literal::Integer(_) => DataType::Int32,
            Literal::BigInt(_) => DataType::Int64,
            Literal::Double(_) => DataType::Float64,
            Literal::String(_) => DataType::Utf8,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }
}

// Doubles compare by bit pattern so that Eq and Hash agree.
impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Null, Literal::Null) => true,
            (Literal::Boolean(a), Literal::Boolean(b)) => a == b,
            (Literal::Integer(a), Literal::Integer(b)) => a == b,
            (Literal::BigInt(a), Literal::BigInt(b)) => a == b,
            (Literal::Double(a), Literal::Double(b)) => a.to_bits() == b.to_bits(),
            (Literal::String(a), Literal::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::Null => {}
            Literal::Boolean(b) => b.hash(state),
            Literal::Integer(i) => i.hash(state),
            Literal::BigInt(i) => i.hash(state),
            Literal::Double(d) => d.to_bits().hash(state),
            Literal::String(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("NULL"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::BigInt(i) => write!(f, "{i}"),
            Literal::Double(d) => write!(f, "{d:?}"),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Modulo => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// Column reference, optionally qualified by a relation name or alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionKind {
    Literal(Literal),
    Column(ColumnRef),
    /// `*`, only meaningful as a function argument (`COUNT(*)`).
    Wildcard,
    Function {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expression>,
    },
    Arithmetic {
        left: Box<Expression>,
        op: ArithmeticOp,
        right: Box<Expression>,
    },
    Comparison {
        left: Box<Expression>,
        op: ComparisonOp,
        right: Box<Expression>,
    },
    Logical {
        left: Box<Expression>,
        op: LogicalOp,
        right: Box<Expression>,
    },
    /// `NULLIF(first, second)`: `CASE WHEN first = second THEN NULL ELSE first END`.
    NullIf {
        first: Box<Expression>,
        second: Box<Expression>,
    },
    /// Searched (`operand == None`) or simple CASE.
    Case {
        operand: Option<Box<Expression>>,
        branches: Vec<(Expression, Expression)>,
        else_result: Option<Box<Expression>>,
    },
    Cast {
        expr: Box<Expression>,
        data_type: DataType,
    },
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    Like {
        expr: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
    },
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
}

/// Expression node: a variant plus the position it was parsed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    kind: ExpressionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<NodeLocation>,
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Expression {}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl From<ExpressionKind> for Expression {
    fn from(kind: ExpressionKind) -> Self {
        Self::new(kind)
    }
}

impl Expression {
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<NodeLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn kind(&self) -> &ExpressionKind {
        &self.kind
    }

    pub fn into_kind(self) -> ExpressionKind {
        self.kind
    }

    /// Where the node was parsed from; [`NodeLocation::unknown`] for synthetic nodes.
    pub fn location(&self) -> NodeLocation {
        self.location.unwrap_or_default()
    }

    pub(crate) fn raw_location(&self) -> Option<NodeLocation> {
        self.location
    }

    pub fn literal(value: Literal) -> Self {
        Self::new(ExpressionKind::Literal(value))
    }

    pub fn null() -> Self {
        Self::literal(Literal::Null)
    }

    pub fn column(name: impl Into<String>) -> Self {
        Self::new(ExpressionKind::Column(ColumnRef {
            qualifier: None,
            name: name.into(),
        }))
    }

    pub fn qualified_column(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ExpressionKind::Column(ColumnRef {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::Function {
            name: name.into().to_ascii_uppercase(),
            args,
            distinct: false,
        })
    }

    pub fn count_star() -> Self {
        Self::function("COUNT", vec![Self::new(ExpressionKind::Wildcard)])
    }

    pub fn unary(op: UnaryOp, expr: Expression) -> Self {
        Self::new(ExpressionKind::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    pub fn arithmetic(left: Expression, op: ArithmeticOp, right: Expression) -> Self {
        Self::new(ExpressionKind::Arithmetic {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn comparison(left: Expression, op: ComparisonOp, right: Expression) -> Self {
        Self::new(ExpressionKind::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn logical(left: Expression, op: LogicalOp, right: Expression) -> Self {
        Self::new(ExpressionKind::Logical {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn nullif(first: Expression, second: Expression) -> Self {
        Self::new(ExpressionKind::NullIf {
            first: Box::new(first),
            second: Box::new(second),
        })
    }

    pub fn searched_case(
        branches: Vec<(Expression, Expression)>,
        else_result: Option<Expression>,
    ) -> Self {
        Self::new(ExpressionKind::Case {
            operand: None,
            branches,
            else_result: else_result.map(Box::new),
        })
    }

    pub fn cast(expr: Expression, data_type: DataType) -> Self {
        Self::new(ExpressionKind::Cast {
            expr: Box::new(expr),
            data_type,
        })
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match &self.kind {
            ExpressionKind::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExpressionKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Function name when this node is a call.
    pub fn function_name(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Function { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// SQL spelling of a column type, as used by CAST and EXPLAIN.
pub fn type_name(dt: &DataType) -> String {
    match dt {
        DataType::Utf8 | DataType::LargeUtf8 => "STRING".to_string(),
        DataType::Int32 => "INTEGER".to_string(),
        DataType::Int64 => "BIGINT".to_string(),
        DataType::Float64 => "DOUBLE".to_string(),
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Null => "NULL".to_string(),
        other => format!("{other:?}"),
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, e) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{e}")?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpressionKind::Literal(v) => write!(f, "{v}"),
            ExpressionKind::Column(c) => write!(f, "{c}"),
            ExpressionKind::Wildcard => f.write_str("*"),
            ExpressionKind::Function {
                name,
                args,
                distinct,
            } => {
                write!(f, "{name}(")?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                write_list(f, args)?;
                f.write_str(")")
            }
            ExpressionKind::Unary { op, expr } => match op {
                UnaryOp::Minus => write!(f, "(-{expr})"),
                UnaryOp::Plus => write!(f, "(+{expr})"),
                UnaryOp::Not => write!(f, "(NOT {expr})"),
            },
            ExpressionKind::Arithmetic { left, op, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            ExpressionKind::Comparison { left, op, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            ExpressionKind::Logical { left, op, right } => match op {
                LogicalOp::And => write!(f, "({left} AND {right})"),
                LogicalOp::Or => write!(f, "({left} OR {right})"),
            },
            ExpressionKind::NullIf { first, second } => write!(f, "NULLIF({first}, {second})"),
            ExpressionKind::Case {
                operand,
                branches,
                else_result,
            } => {
                f.write_str("CASE")?;
                if let Some(op) = operand {
                    write!(f, " {op}")?;
                }
                for (when, then) in branches {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(e) = else_result {
                    write!(f, " ELSE {e}")?;
                }
                f.write_str(" END")
            }
            ExpressionKind::Cast { expr, data_type } => {
                write!(f, "CAST({expr} AS {})", type_name(data_type))
            }
            ExpressionKind::IsNull { expr, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "({expr} IS{not} NULL)")
            }
            ExpressionKind::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "({expr}{not} BETWEEN {low} AND {high})")
            }
            ExpressionKind::Like {
                expr,
                pattern,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "({expr}{not} LIKE {pattern})")
            }
            ExpressionKind::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "({expr}{not} IN (")?;
                write_list(f, list)?;
                f.write_str("))")
            }
        }
    }
}

// -------------------------
// Statements
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectItem {
    Expression {
        expr: Expression,
        alias: Option<String>,
    },
    /// `*` or `alias.*`.
    Wildcard {
        qualifier: Option<String>,
        location: Option<NodeLocation>,
    },
}

/// A relation named in FROM/JOIN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    pub location: Option<NodeLocation>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            location: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name columns of this relation are qualified with.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Outer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub left: TableRef,
    pub right: TableRef,
    pub criteria: Expression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Table(TableRef),
    Join(Box<JoinClause>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowExpression {
    Tumbling { size: Duration },
    Hopping { size: Duration, advance: Duration },
    Session { gap: Duration },
}

fn fmt_duration(d: &Duration) -> String {
    if d.subsec_millis() != 0 || d.as_secs() == 0 {
        format!("{} MILLISECONDS", d.as_millis())
    } else {
        format!("{} SECONDS", d.as_secs())
    }
}

impl fmt::Display for WindowExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowExpression::Tumbling { size } => {
                write!(f, "TUMBLING (SIZE {})", fmt_duration(size))
            }
            WindowExpression::Hopping { size, advance } => write!(
                f,
                "HOPPING (SIZE {}, ADVANCE BY {})",
                fmt_duration(size),
                fmt_duration(advance)
            ),
            WindowExpression::Session { gap } => write!(f, "SESSION ({})", fmt_duration(gap)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub select: Vec<SelectItem>,
    pub from: Relation,
    pub window: Option<WindowExpression>,
    pub filter: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub limit: Option<u64>,
}

impl Query {
    /// `SELECT <items> FROM <relation>` with no other clauses.
    pub fn new(select: Vec<SelectItem>, from: Relation) -> Self {
        Self {
            select,
            from,
            window: None,
            filter: None,
            group_by: vec![],
            having: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SinkKind {
    Stream,
    Table,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    Query(Query),
    /// `CREATE STREAM|TABLE name [WITH (...)] AS SELECT ...`
    CreateAsSelect {
        kind: SinkKind,
        name: String,
        properties: Vec<(String, String)>,
        query: Query,
    },
    /// `INSERT INTO name SELECT ...`
    InsertInto { target: String, query: Query },
}

impl Statement {
    pub fn query(&self) -> &Query {
        match self {
            Statement::Query(q) => q,
            Statement::CreateAsSelect { query, .. } => query,
            Statement::InsertInto { query, .. } => query,
        }
    }
}

/// A statement together with the text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub text: String,
    pub statement: Statement,
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(e: &Expression) -> u64 {
        let mut h = DefaultHasher::new();
        e.hash(&mut h);
        h.finish()
    }

    #[test]
    fn equality_is_structural_and_ignores_location() {
        let a = Expression::nullif(Expression::column("a"), Expression::literal(Literal::Integer(1)))
            .with_location(Some(NodeLocation::new(1, 8)));
        let b = Expression::nullif(Expression::column("a"), Expression::literal(Literal::Integer(1)));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = Expression::nullif(Expression::column("a"), Expression::literal(Literal::Integer(2)));
        assert_ne!(a, c);
    }

    #[test]
    fn missing_location_reports_unknown() {
        let e = Expression::column("a");
        assert_eq!(e.location().to_string(), "unknown location");
    }

    #[test]
    fn canonical_text() {
        let e = Expression::arithmetic(
            Expression::function("sum", vec![Expression::qualified_column("o", "amount")]),
            ArithmeticOp::Divide,
            Expression::count_star(),
        );
        assert_eq!(e.to_string(), "(SUM(o.amount) / COUNT(*))");

        let case = Expression::searched_case(
            vec![(
                Expression::comparison(
                    Expression::column("a"),
                    ComparisonOp::Gt,
                    Expression::literal(Literal::Integer(1)),
                ),
                Expression::literal(Literal::String("it's".to_string())),
            )],
            Some(Expression::null()),
        );
        assert_eq!(case.to_string(), "CASE WHEN (a > 1) THEN 'it''s' ELSE NULL END");
        assert_eq!(
            Expression::cast(Expression::column("a"), DataType::Int64).to_string(),
            "CAST(a AS BIGINT)"
        );
    }

    #[test]
    fn double_literals_hash_consistently() {
        let a = Expression::literal(Literal::Double(1.5));
        let b = Expression::literal(Literal::Double(1.5));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn window_renders_in_sql_units() {
        let w = WindowExpression::Hopping {
            size: Duration::from_secs(60),
            advance: Duration::from_millis(1500),
        };
        assert_eq!(
            w.to_string(),
            "HOPPING (SIZE 60 SECONDS, ADVANCE BY 1500 MILLISECONDS)"
        );
    }
}
