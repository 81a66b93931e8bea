use rill_common::{PlannerConfig, Result, RillError};

use crate::aggregate_analyzer::{is_aggregate_call, AggregateAnalysis};
use crate::ast::Expression;
use crate::functions::FunctionRegistry;
use crate::visitor::ExpressionRewriter;

/// Replaces aggregate calls with references to their intermediate columns.
///
/// The input tree is never modified. Trees without aggregate calls come back
/// structurally equal, so rewriting an already rewritten tree is a no-op.
pub struct AggregateExpressionRewriter<'a> {
    registry: &'a dyn FunctionRegistry,
    aggregates: &'a AggregateAnalysis,
    config: &'a PlannerConfig,
}

impl<'a> AggregateExpressionRewriter<'a> {
    pub fn new(
        registry: &'a dyn FunctionRegistry,
        aggregates: &'a AggregateAnalysis,
        config: &'a PlannerConfig,
    ) -> Self {
        Self {
            registry,
            aggregates,
            config,
        }
    }

    pub fn rewrite(mut self, expr: &Expression) -> Result<Expression> {
        expr.rewrite_with(&mut self)
    }
}

impl ExpressionRewriter for AggregateExpressionRewriter<'_> {
    fn rewrite(&mut self, expr: &Expression) -> Result<Option<Expression>> {
        if !is_aggregate_call(self.registry, expr)? {
            return Ok(None);
        }
        let column = self.aggregates.aggregate_column_for(expr).ok_or_else(|| {
            RillError::Planning(format!("aggregate call {expr} has no intermediate column"))
        })?;
        Ok(Some(
            Expression::column(column).with_location(expr.raw_location()),
        ))
    }

    fn max_depth(&self) -> usize {
        self.config.max_expression_depth
    }
}
