//! Literal-only constant folding.
//!
//! Only sub-trees whose inputs are all literals are evaluated; anything that
//! depends on a column or a function call is kept as written. `NULLIF` is
//! desugared to its `CASE` form first, so it folds like any other CASE.

use std::cmp::Ordering;

use rill_common::{Result, RillError};

use crate::ast::{ArithmeticOp, ComparisonOp, Expression, ExpressionKind, Literal, LogicalOp, UnaryOp};

/// Fold literal sub-expressions of `expr`, bounded by `max_depth`.
pub fn simplify(expr: &Expression, max_depth: usize) -> Result<Expression> {
    fold(expr, 1, max_depth)
}

/// `NULLIF(first, second)` as `CASE WHEN first = second THEN NULL ELSE first END`.
pub fn desugar_nullif(first: &Expression, second: &Expression) -> Expression {
    Expression::searched_case(
        vec![(
            Expression::comparison(first.clone(), ComparisonOp::Eq, second.clone()),
            Expression::null(),
        )],
        Some(first.clone()),
    )
}

fn fold(expr: &Expression, depth: usize, limit: usize) -> Result<Expression> {
    if depth > limit {
        return Err(RillError::ExpressionTooDeep { limit });
    }
    if let ExpressionKind::NullIf { first, second } = expr.kind() {
        let case = desugar_nullif(first, second).with_location(expr.raw_location());
        return fold(&case, depth, limit);
    }
    let folded = expr.map_children(|c| fold(c, depth + 1, limit))?;
    Ok(fold_node(folded))
}

fn fold_node(e: Expression) -> Expression {
    let replacement = match e.kind() {
        ExpressionKind::Unary { op, expr } => expr.as_literal().and_then(|v| eval_unary(*op, v)).map(Expression::literal),
        ExpressionKind::Arithmetic { left, op, right } => match (left.as_literal(), right.as_literal()) {
            (Some(l), Some(r)) => eval_arith(l, *op, r).map(Expression::literal),
            _ => None,
        },
        ExpressionKind::Comparison { left, op, right } => match (left.as_literal(), right.as_literal()) {
            (Some(l), Some(r)) => eval_compare(l, *op, r).map(Expression::literal),
            _ => None,
        },
        ExpressionKind::Logical { left, op, right } => fold_logical(left, *op, right),
        ExpressionKind::Case {
            operand: None,
            branches,
            else_result,
        } => fold_searched_case(branches, else_result.as_deref()),
        ExpressionKind::IsNull { expr, negated } => expr
            .as_literal()
            .map(|v| Expression::literal(Literal::Boolean(v.is_null() != *negated))),
        _ => None,
    };
    match replacement {
        Some(r) => r.with_location(e.raw_location()),
        None => e,
    }
}

fn fold_logical(left: &Expression, op: LogicalOp, right: &Expression) -> Option<Expression> {
    let (absorbing, identity) = match op {
        LogicalOp::And => (false, true),
        LogicalOp::Or => (true, false),
    };
    match (left.as_literal(), right.as_literal()) {
        (Some(Literal::Boolean(b)), _) | (_, Some(Literal::Boolean(b))) if *b == absorbing => {
            Some(Expression::literal(Literal::Boolean(absorbing)))
        }
        (Some(Literal::Boolean(b)), _) if *b == identity => Some(right.clone()),
        (_, Some(Literal::Boolean(b))) if *b == identity => Some(left.clone()),
        (Some(Literal::Null), Some(Literal::Null)) => Some(Expression::null()),
        _ => None,
    }
}

fn fold_searched_case(
    branches: &[(Expression, Expression)],
    else_result: Option<&Expression>,
) -> Option<Expression> {
    let mut kept = vec![];
    for (when, then) in branches {
        match when.as_literal() {
            Some(Literal::Boolean(true)) if kept.is_empty() => return Some(then.clone()),
            Some(Literal::Boolean(false)) | Some(Literal::Null) => continue,
            _ => kept.push((when.clone(), then.clone())),
        }
    }
    if kept.is_empty() {
        return Some(else_result.cloned().unwrap_or_else(Expression::null));
    }
    if kept.len() < branches.len() {
        return Some(Expression::searched_case(kept, else_result.cloned()));
    }
    None
}

#[derive(Debug, Clone, Copy)]
enum Num {
    /// Integer value and whether it came from a 32-bit literal.
    Int(i64, bool),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i, _) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn num(v: &Literal) -> Option<Num> {
    match v {
        Literal::Integer(i) => Some(Num::Int(i64::from(*i), true)),
        Literal::BigInt(i) => Some(Num::Int(*i, false)),
        Literal::Double(d) => Some(Num::Float(*d)),
        _ => None,
    }
}

fn eval_unary(op: UnaryOp, v: &Literal) -> Option<Literal> {
    match (op, v) {
        (_, Literal::Null) => Some(Literal::Null),
        (UnaryOp::Not, Literal::Boolean(b)) => Some(Literal::Boolean(!b)),
        (UnaryOp::Minus, Literal::Integer(i)) => i.checked_neg().map(Literal::Integer),
        (UnaryOp::Minus, Literal::BigInt(i)) => i.checked_neg().map(Literal::BigInt),
        (UnaryOp::Minus, Literal::Double(d)) => Some(Literal::Double(-d)),
        (UnaryOp::Plus, Literal::Integer(_) | Literal::BigInt(_) | Literal::Double(_)) => {
            Some(v.clone())
        }
        _ => None,
    }
}

fn eval_arith(l: &Literal, op: ArithmeticOp, r: &Literal) -> Option<Literal> {
    match (l, r) {
        (Literal::Null, _) | (_, Literal::Null) => return Some(Literal::Null),
        (Literal::String(a), Literal::String(b)) if op == ArithmeticOp::Add => {
            return Some(Literal::String(format!("{a}{b}")))
        }
        _ => {}
    }
    match (num(l)?, num(r)?) {
        (Num::Int(a, a32), Num::Int(b, b32)) => {
            let v = match op {
                ArithmeticOp::Add => a.checked_add(b),
                ArithmeticOp::Subtract => a.checked_sub(b),
                ArithmeticOp::Multiply => a.checked_mul(b),
                ArithmeticOp::Divide => a.checked_div(b),
                ArithmeticOp::Modulo => a.checked_rem(b),
            }?;
            if a32 && b32 {
                i32::try_from(v).ok().map(Literal::Integer)
            } else {
                Some(Literal::BigInt(v))
            }
        }
        (x, y) => {
            let (a, b) = (x.as_f64(), y.as_f64());
            if matches!(op, ArithmeticOp::Divide | ArithmeticOp::Modulo) && b == 0.0 {
                return None;
            }
            Some(Literal::Double(match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Subtract => a - b,
                ArithmeticOp::Multiply => a * b,
                ArithmeticOp::Divide => a / b,
                ArithmeticOp::Modulo => a % b,
            }))
        }
    }
}

fn eval_compare(l: &Literal, op: ComparisonOp, r: &Literal) -> Option<Literal> {
    let ord = match (l, r) {
        (Literal::Null, _) | (_, Literal::Null) => return Some(Literal::Null),
        (Literal::String(a), Literal::String(b)) => a.cmp(b),
        (Literal::Boolean(a), Literal::Boolean(b)) => a.cmp(b),
        _ => match (num(l)?, num(r)?) {
            (Num::Int(a, _), Num::Int(b, _)) => a.cmp(&b),
            (x, y) => x.as_f64().partial_cmp(&y.as_f64())?,
        },
    };
    Some(Literal::Boolean(match op {
        ComparisonOp::Eq => ord == Ordering::Equal,
        ComparisonOp::NotEq => ord != Ordering::Equal,
        ComparisonOp::Lt => ord == Ordering::Less,
        ComparisonOp::LtEq => ord != Ordering::Greater,
        ComparisonOp::Gt => ord == Ordering::Greater,
        ComparisonOp::GtEq => ord != Ordering::Less,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i32) -> Expression {
        Expression::literal(Literal::Integer(i))
    }

    fn fold_text(e: &Expression) -> String {
        simplify(e, 64).expect("simplify").to_string()
    }

    #[test]
    fn nullif_of_equal_values_is_null() {
        assert_eq!(fold_text(&Expression::nullif(int(5), int(5))), "NULL");
    }

    #[test]
    fn nullif_of_different_values_is_first() {
        assert_eq!(fold_text(&Expression::nullif(int(5), int(3))), "5");
        assert_eq!(fold_text(&Expression::nullif(Expression::null(), int(1))), "NULL");
    }

    #[test]
    fn nullif_over_columns_becomes_case() {
        let e = Expression::nullif(Expression::column("a"), int(0));
        assert_eq!(fold_text(&e), "CASE WHEN (a = 0) THEN NULL ELSE a END");
    }

    #[test]
    fn arithmetic_and_logic_fold() {
        let e = Expression::logical(
            Expression::comparison(
                Expression::arithmetic(int(2), ArithmeticOp::Multiply, int(3)),
                ComparisonOp::Eq,
                int(6),
            ),
            LogicalOp::And,
            Expression::column("flag"),
        );
        assert_eq!(fold_text(&e), "flag");

        let e = Expression::logical(Expression::column("flag"), LogicalOp::Or, Expression::literal(Literal::Boolean(true)));
        assert_eq!(fold_text(&e), "true");
    }

    #[test]
    fn overflow_and_division_by_zero_are_left_alone() {
        let e = Expression::arithmetic(int(i32::MAX), ArithmeticOp::Add, int(1));
        assert_eq!(fold_text(&e), "(2147483647 + 1)");
        let e = Expression::arithmetic(int(1), ArithmeticOp::Divide, int(0));
        assert_eq!(fold_text(&e), "(1 / 0)");
    }

    #[test]
    fn mixed_numeric_literals_widen() {
        let e = Expression::arithmetic(int(1), ArithmeticOp::Add, Expression::literal(Literal::Double(0.5)));
        assert_eq!(fold_text(&e), "1.5");
        let e = Expression::arithmetic(int(1), ArithmeticOp::Add, Expression::literal(Literal::BigInt(2)));
        assert_eq!(simplify(&e, 64).expect("fold"), Expression::literal(Literal::BigInt(3)));
    }
}
