use rill_common::{PlannerConfig, Result, RillError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analyzer::Analysis;
use crate::ast::{Expression, ExpressionKind};
use crate::functions::FunctionRegistry;
use crate::rewriter::AggregateExpressionRewriter;
use crate::visitor::{ExpressionVisitor, Recursion};

/// An aggregate call and the intermediate column holding its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateCall {
    pub call: Expression,
    pub column: String,
}

/// Aggregate calls found in one expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateScan {
    pub contains_aggregate: bool,
    /// Outermost aggregate calls, in pre-order.
    pub calls: Vec<Expression>,
}

/// How a query's select list splits into aggregate and non-aggregate parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateAnalysis {
    non_aggregate_columns: Vec<Expression>,
    aggregate_calls: Vec<AggregateCall>,
    final_select_expressions: Vec<Expression>,
    having: Option<Expression>,
}

impl AggregateAnalysis {
    /// Select expressions that contain no aggregate call, in select order.
    pub fn non_aggregate_columns(&self) -> &[Expression] {
        &self.non_aggregate_columns
    }

    /// Distinct aggregate calls (by canonical text), in discovery order.
    pub fn aggregate_calls(&self) -> &[AggregateCall] {
        &self.aggregate_calls
    }

    /// Select expressions with aggregate calls replaced by intermediate columns.
    pub fn final_select_expressions(&self) -> &[Expression] {
        &self.final_select_expressions
    }

    /// HAVING predicate with aggregate calls replaced by intermediate columns.
    pub fn having(&self) -> Option<&Expression> {
        self.having.as_ref()
    }

    pub fn has_aggregates(&self) -> bool {
        !self.aggregate_calls.is_empty()
    }

    /// Intermediate column that holds the result of `call`.
    pub fn aggregate_column_for(&self, call: &Expression) -> Option<&str> {
        let key = call.to_string();
        self.aggregate_calls
            .iter()
            .find(|a| a.call.to_string() == key)
            .map(|a| a.column.as_str())
    }

    pub fn is_aggregate_column(&self, name: &str) -> bool {
        self.aggregate_calls
            .iter()
            .any(|a| a.column.eq_ignore_ascii_case(name))
    }

    pub(crate) fn add_aggregate_call(&mut self, call: &Expression, config: &PlannerConfig) {
        if self.aggregate_column_for(call).is_some() {
            return;
        }
        let column = config.aggregate_column_name(self.aggregate_calls.len());
        self.aggregate_calls.push(AggregateCall {
            call: call.clone(),
            column,
        });
    }
}

/// Partitions select expressions into aggregate and non-aggregate parts.
pub struct AggregateAnalyzer<'a> {
    registry: &'a dyn FunctionRegistry,
    config: &'a PlannerConfig,
}

impl<'a> AggregateAnalyzer<'a> {
    pub fn new(registry: &'a dyn FunctionRegistry, config: &'a PlannerConfig) -> Self {
        Self { registry, config }
    }

    /// Find the aggregate calls in `expr`.
    ///
    /// Arguments of an aggregate call are not searched, so an aggregate nested
    /// inside another is carried along as part of the outer call.
    pub fn scan(&self, expr: &Expression) -> Result<AggregateScan> {
        let mut finder = AggregateFinder {
            registry: self.registry,
            max_depth: self.config.max_expression_depth,
            scan: AggregateScan::default(),
        };
        expr.accept(&mut finder)?;
        Ok(finder.scan)
    }

    pub fn analyze(&self, analysis: &Analysis) -> Result<AggregateAnalysis> {
        let mut out = AggregateAnalysis::default();

        for expr in analysis.select_expressions() {
            let scan = self.scan(expr)?;
            for call in &scan.calls {
                out.add_aggregate_call(call, self.config);
            }
            if !scan.contains_aggregate {
                out.non_aggregate_columns.push(expr.clone());
            }
            let rewritten =
                AggregateExpressionRewriter::new(self.registry, &out, self.config).rewrite(expr)?;
            out.final_select_expressions.push(rewritten);
        }

        if let Some(having) = analysis.having() {
            let scan = self.scan(having)?;
            for call in &scan.calls {
                out.add_aggregate_call(call, self.config);
            }
            let rewritten =
                AggregateExpressionRewriter::new(self.registry, &out, self.config).rewrite(having)?;
            out.having = Some(rewritten);
        }

        debug!(
            aggregates = out.aggregate_calls.len(),
            non_aggregate = out.non_aggregate_columns.len(),
            "aggregate analysis complete"
        );
        Ok(out)
    }
}

struct AggregateFinder<'a> {
    registry: &'a dyn FunctionRegistry,
    max_depth: usize,
    scan: AggregateScan,
}

impl ExpressionVisitor for AggregateFinder<'_> {
    fn pre_visit(&mut self, expr: &Expression) -> Result<Recursion> {
        if is_aggregate_call(self.registry, expr)? {
            self.scan.contains_aggregate = true;
            self.scan.calls.push(expr.clone());
            return Ok(Recursion::Skip);
        }
        Ok(Recursion::Continue)
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Whether `expr` is a call to a registered aggregate function.
///
/// Calls to unregistered functions fail with `UnknownFunction`.
pub(crate) fn is_aggregate_call(registry: &dyn FunctionRegistry, expr: &Expression) -> Result<bool> {
    let ExpressionKind::Function { name, .. } = expr.kind() else {
        return Ok(false);
    };
    let sig = registry
        .lookup(name)
        .ok_or_else(|| RillError::UnknownFunction {
            name: name.clone(),
            location: expr.location(),
        })?;
    Ok(sig.is_aggregate())
}
