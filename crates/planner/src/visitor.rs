//! Generic traversal over [`Expression`] trees.
//!
//! Passes are written as [`ExpressionVisitor`] (read-only walk) or
//! [`ExpressionRewriter`] (produces a new tree) implementations; node types
//! never need to change to add a pass. Every walk is depth-bounded and fails
//! with [`RillError::ExpressionTooDeep`] instead of overflowing the stack.

use rill_common::{NodeLocation, Result, RillError, DEFAULT_MAX_EXPRESSION_DEPTH};

use crate::ast::{ColumnRef, Expression, ExpressionKind};

/// Whether a walk should descend into the children of the current node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recursion {
    Continue,
    Skip,
}

pub trait ExpressionVisitor {
    /// Called before the children of `expr` are visited.
    fn pre_visit(&mut self, expr: &Expression) -> Result<Recursion>;

    /// Called after the children of `expr` (even when they were skipped).
    fn post_visit(&mut self, _expr: &Expression) -> Result<()> {
        Ok(())
    }

    fn max_depth(&self) -> usize {
        DEFAULT_MAX_EXPRESSION_DEPTH
    }
}

pub trait ExpressionRewriter {
    /// Replacement for `expr`, or `None` to keep the node and rewrite its children.
    fn rewrite(&mut self, expr: &Expression) -> Result<Option<Expression>>;

    fn max_depth(&self) -> usize {
        DEFAULT_MAX_EXPRESSION_DEPTH
    }
}

impl Expression {
    /// Direct sub-expressions in source order.
    pub fn children(&self) -> Vec<&Expression> {
        match self.kind() {
            ExpressionKind::Literal(_) | ExpressionKind::Column(_) | ExpressionKind::Wildcard => {
                vec![]
            }
            ExpressionKind::Function { args, .. } => args.iter().collect(),
            ExpressionKind::Unary { expr, .. }
            | ExpressionKind::Cast { expr, .. }
            | ExpressionKind::IsNull { expr, .. } => vec![expr.as_ref()],
            ExpressionKind::Arithmetic { left, right, .. }
            | ExpressionKind::Comparison { left, right, .. }
            | ExpressionKind::Logical { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExpressionKind::NullIf { first, second } => vec![first.as_ref(), second.as_ref()],
            ExpressionKind::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut out = vec![];
                if let Some(op) = operand {
                    out.push(op.as_ref());
                }
                for (when, then) in branches {
                    out.push(when);
                    out.push(then);
                }
                if let Some(e) = else_result {
                    out.push(e.as_ref());
                }
                out
            }
            ExpressionKind::Between {
                expr, low, high, ..
            } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
            ExpressionKind::Like { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
            ExpressionKind::InList { expr, list, .. } => {
                let mut out = vec![expr.as_ref()];
                out.extend(list.iter());
                out
            }
        }
    }

    /// Rebuild this node with every direct child replaced by `f(child)`.
    ///
    /// The node's own location is kept.
    pub fn map_children<F>(&self, mut f: F) -> Result<Expression>
    where
        F: FnMut(&Expression) -> Result<Expression>,
    {
        let mut boxed = |e: &Expression| -> Result<Box<Expression>> { Ok(Box::new(f(e)?)) };
        let kind = match self.kind() {
            ExpressionKind::Literal(_) | ExpressionKind::Column(_) | ExpressionKind::Wildcard => {
                self.kind().clone()
            }
            ExpressionKind::Function {
                name,
                args,
                distinct,
            } => ExpressionKind::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| boxed(a).map(|b| *b))
                    .collect::<Result<Vec<_>>>()?,
                distinct: *distinct,
            },
            ExpressionKind::Unary { op, expr } => ExpressionKind::Unary {
                op: *op,
                expr: boxed(expr)?,
            },
            ExpressionKind::Arithmetic { left, op, right } => ExpressionKind::Arithmetic {
                left: boxed(left)?,
                op: *op,
                right: boxed(right)?,
            },
            ExpressionKind::Comparison { left, op, right } => ExpressionKind::Comparison {
                left: boxed(left)?,
                op: *op,
                right: boxed(right)?,
            },
            ExpressionKind::Logical { left, op, right } => ExpressionKind::Logical {
                left: boxed(left)?,
                op: *op,
                right: boxed(right)?,
            },
            ExpressionKind::NullIf { first, second } => ExpressionKind::NullIf {
                first: boxed(first)?,
                second: boxed(second)?,
            },
            ExpressionKind::Case {
                operand,
                branches,
                else_result,
            } => {
                let operand = match operand {
                    Some(op) => Some(boxed(op)?),
                    None => None,
                };
                let mut new_branches = Vec::with_capacity(branches.len());
                for (when, then) in branches {
                    let when = *boxed(when)?;
                    let then = *boxed(then)?;
                    new_branches.push((when, then));
                }
                let else_result = match else_result {
                    Some(e) => Some(boxed(e)?),
                    None => None,
                };
                ExpressionKind::Case {
                    operand,
                    branches: new_branches,
                    else_result,
                }
            }
            ExpressionKind::Cast { expr, data_type } => ExpressionKind::Cast {
                expr: boxed(expr)?,
                data_type: data_type.clone(),
            },
            ExpressionKind::IsNull { expr, negated } => ExpressionKind::IsNull {
                expr: boxed(expr)?,
                negated: *negated,
            },
            ExpressionKind::Between {
                expr,
                low,
                high,
                negated,
            } => ExpressionKind::Between {
                expr: boxed(expr)?,
                low: boxed(low)?,
                high: boxed(high)?,
                negated: *negated,
            },
            ExpressionKind::Like {
                expr,
                pattern,
                negated,
            } => ExpressionKind::Like {
                expr: boxed(expr)?,
                pattern: boxed(pattern)?,
                negated: *negated,
            },
            ExpressionKind::InList {
                expr,
                list,
                negated,
            } => ExpressionKind::InList {
                expr: boxed(expr)?,
                list: list
                    .iter()
                    .map(|a| boxed(a).map(|b| *b))
                    .collect::<Result<Vec<_>>>()?,
                negated: *negated,
            },
        };
        Ok(Expression::new(kind).with_location(self.raw_location()))
    }

    /// Walk this tree with `visitor`, pre-order with a post hook.
    pub fn accept<V: ExpressionVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        let limit = visitor.max_depth();
        self.accept_at(visitor, 1, limit)
    }

    fn accept_at<V: ExpressionVisitor + ?Sized>(
        &self,
        visitor: &mut V,
        depth: usize,
        limit: usize,
    ) -> Result<()> {
        if depth > limit {
            return Err(RillError::ExpressionTooDeep { limit });
        }
        if visitor.pre_visit(self)? == Recursion::Continue {
            for child in self.children() {
                child.accept_at(visitor, depth + 1, limit)?;
            }
        }
        visitor.post_visit(self)
    }

    /// Produce a rewritten copy of this tree; `self` is left untouched.
    pub fn rewrite_with<R: ExpressionRewriter + ?Sized>(&self, rewriter: &mut R) -> Result<Expression> {
        let limit = rewriter.max_depth();
        self.rewrite_at(rewriter, 1, limit)
    }

    fn rewrite_at<R: ExpressionRewriter + ?Sized>(
        &self,
        rewriter: &mut R,
        depth: usize,
        limit: usize,
    ) -> Result<Expression> {
        if depth > limit {
            return Err(RillError::ExpressionTooDeep { limit });
        }
        if let Some(replacement) = rewriter.rewrite(self)? {
            return Ok(replacement);
        }
        self.map_children(|child| child.rewrite_at(rewriter, depth + 1, limit))
    }
}

struct ColumnCollector {
    limit: usize,
    columns: Vec<(ColumnRef, NodeLocation)>,
}

impl ExpressionVisitor for ColumnCollector {
    fn pre_visit(&mut self, expr: &Expression) -> Result<Recursion> {
        if let Some(c) = expr.as_column() {
            self.columns.push((c.clone(), expr.location()));
        }
        Ok(Recursion::Continue)
    }

    fn max_depth(&self) -> usize {
        self.limit
    }
}

/// Every column reference in `expr`, in pre-order, with its location.
pub fn collect_columns(
    expr: &Expression,
    max_depth: usize,
) -> Result<Vec<(ColumnRef, NodeLocation)>> {
    let mut collector = ColumnCollector {
        limit: max_depth,
        columns: vec![],
    };
    expr.accept(&mut collector)?;
    Ok(collector.columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ArithmeticOp, Literal};

    struct Counter {
        pre: usize,
        post: usize,
    }

    impl ExpressionVisitor for Counter {
        fn pre_visit(&mut self, expr: &Expression) -> Result<Recursion> {
            self.pre += 1;
            if expr.function_name().is_some() {
                return Ok(Recursion::Skip);
            }
            Ok(Recursion::Continue)
        }

        fn post_visit(&mut self, _expr: &Expression) -> Result<()> {
            self.post += 1;
            Ok(())
        }
    }

    struct RenameColumns;

    impl ExpressionRewriter for RenameColumns {
        fn rewrite(&mut self, expr: &Expression) -> Result<Option<Expression>> {
            Ok(expr
                .as_column()
                .map(|c| Expression::column(c.name.to_uppercase())))
        }
    }

    fn sample() -> Expression {
        Expression::arithmetic(
            Expression::column("a"),
            ArithmeticOp::Add,
            Expression::function("ABS", vec![Expression::column("b")]),
        )
    }

    #[test]
    fn skip_prunes_children_but_still_calls_post() {
        let mut v = Counter { pre: 0, post: 0 };
        sample().accept(&mut v).expect("visit");
        // arithmetic, a, ABS (children of ABS skipped)
        assert_eq!(v.pre, 3);
        assert_eq!(v.post, 3);
    }

    #[test]
    fn rewrite_leaves_input_untouched() {
        let input = sample();
        let before = input.clone();
        let out = input.rewrite_with(&mut RenameColumns).expect("rewrite");
        assert_eq!(input, before);
        assert_eq!(out.to_string(), "(A + ABS(B))");
    }

    #[test]
    fn deep_trees_fail_with_expression_too_deep() {
        let mut e = Expression::literal(Literal::Integer(1));
        for _ in 0..DEFAULT_MAX_EXPRESSION_DEPTH + 5 {
            e = Expression::arithmetic(e, ArithmeticOp::Add, Expression::literal(Literal::Integer(1)));
        }
        let err = e
            .accept(&mut Counter { pre: 0, post: 0 })
            .expect_err("too deep");
        assert!(matches!(err, RillError::ExpressionTooDeep { .. }), "{err}");
        let err = e.rewrite_with(&mut RenameColumns).expect_err("too deep");
        assert!(matches!(err, RillError::ExpressionTooDeep { .. }), "{err}");
    }

    #[test]
    fn collects_columns_in_pre_order() {
        let cols = collect_columns(&sample(), 16).expect("collect");
        let names: Vec<_> = cols.iter().map(|(c, _)| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
