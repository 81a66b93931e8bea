use std::collections::HashSet;

use rill_common::{NodeLocation, PlannerConfig, Result, RillError};
use tracing::debug;

use crate::aggregate_analyzer::{AggregateAnalysis, AggregateAnalyzer};
use crate::analyzer::{Analysis, JoinInfo, ResolvedSource, SinkTarget};
use crate::ast::{ComparisonOp, Expression, ExpressionKind, SinkKind};
use crate::catalog::Catalog;
use crate::functions::FunctionRegistry;
use crate::logical_plan::PlanNode;
use crate::schema::{PlanField, PlanSchema};
use crate::simplify::simplify;
use crate::types::{insert_type_compatible, types_compatible_for_equality, TypeChecker};
use crate::visitor::collect_columns;

/// Builds a [`PlanNode`] tree from the analyzer outputs.
///
/// Nodes are stacked bottom-up: source(s), join, filter, aggregate, having
/// filter, projection, limit, sink. Each wrap takes ownership of the subtree
/// built so far.
pub struct LogicalPlanner<'a> {
    catalog: &'a dyn Catalog,
    registry: &'a dyn FunctionRegistry,
    config: &'a PlannerConfig,
}

impl<'a> LogicalPlanner<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        registry: &'a dyn FunctionRegistry,
        config: &'a PlannerConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            config,
        }
    }

    /// Build the logical plan for one analyzed statement.
    ///
    /// Error taxonomy:
    /// - `UnsupportedJoin`: join criteria other than one equi key pair across both sides
    /// - `NonAggregateColumnNotInGroupBy`: select/HAVING column outside the grouping keys
    /// - `Planning`: type errors, aggregates in WHERE/GROUP BY, HAVING or WINDOW
    ///   without aggregation, INSERT shape mismatch
    pub fn build_plan(&self, analysis: &Analysis, aggregates: &AggregateAnalysis) -> Result<PlanNode> {
        let types = TypeChecker::new(self.registry, self.config.max_expression_depth);

        let mut plan = match (analysis.sources(), analysis.join()) {
            ([source], None) => source_node(source),
            ([left, right], Some(join)) => self.build_join(join, left, right, &types)?,
            _ => {
                return Err(RillError::Planning(format!(
                    "unexpected relation shape: {} source(s)",
                    analysis.sources().len()
                )))
            }
        };

        if let Some(predicate) = analysis.filter() {
            if self.contains_aggregate(predicate)? {
                return Err(RillError::Planning(format!(
                    "aggregate functions are not allowed in WHERE: {predicate}"
                )));
            }
            types.infer_predicate(predicate, plan.output_schema(), "WHERE")?;
            let predicate = self.maybe_fold(predicate)?;
            let schema = plan.output_schema().clone();
            plan = PlanNode::Filter {
                predicate,
                input: Box::new(plan),
                schema,
            };
        }

        let aggregating = aggregates.has_aggregates() || !analysis.group_by().is_empty();
        if aggregating {
            plan = self.build_aggregate(analysis, aggregates, plan, &types)?;
            if let Some(having) = aggregates.having() {
                types.infer_predicate(having, plan.output_schema(), "HAVING")?;
                let schema = plan.output_schema().clone();
                plan = PlanNode::Filter {
                    predicate: having.clone(),
                    input: Box::new(plan),
                    schema,
                };
            }
        } else if analysis.having().is_some() {
            return Err(RillError::Planning(
                "HAVING requires GROUP BY or aggregate functions".to_string(),
            ));
        } else if let Some(window) = analysis.window() {
            return Err(RillError::Planning(format!(
                "WINDOW {window} requires GROUP BY or aggregate functions"
            )));
        }

        let select = if aggregating {
            aggregates.final_select_expressions()
        } else {
            analysis.select_expressions()
        };
        plan = self.build_project(select, analysis.select_names(), plan, &types)?;

        if let Some(n) = analysis.limit() {
            let schema = plan.output_schema().clone();
            plan = PlanNode::Limit {
                n,
                input: Box::new(plan),
                schema,
            };
        }

        if let Some(sink) = analysis.sink() {
            plan = self.build_sink(sink, plan)?;
        }

        debug!(root = plan.name(), columns = plan.output_schema().len(), "logical plan built");
        Ok(plan)
    }

    fn build_join(
        &self,
        join: &JoinInfo,
        left: &ResolvedSource,
        right: &ResolvedSource,
        types: &TypeChecker<'_>,
    ) -> Result<PlanNode> {
        let left = source_node(left);
        let right = source_node(right);
        let schema = PlanSchema::join(left.output_schema(), right.output_schema());

        let (a, b) = match join.criteria.kind() {
            ExpressionKind::Comparison {
                left: a,
                op: ComparisonOp::Eq,
                right: b,
            } => (a.as_ref(), b.as_ref()),
            _ => {
                return Err(RillError::UnsupportedJoin {
                    reason: format!(
                        "join criteria must be a single equality between two columns, got {}",
                        join.criteria
                    ),
                })
            }
        };
        let (Some(ca), Some(cb)) = (a.as_column(), b.as_column()) else {
            return Err(RillError::UnsupportedJoin {
                reason: format!(
                    "join keys must be column references, got {}",
                    join.criteria
                ),
            });
        };

        let left_width = left.output_schema().len();
        let ia = schema.resolve(ca, a.location())?;
        let ib = schema.resolve(cb, b.location())?;
        let (left_key, right_key) = match (ia < left_width, ib < left_width) {
            (true, false) => (a, b),
            (false, true) => (b, a),
            _ => {
                return Err(RillError::UnsupportedJoin {
                    reason: format!(
                        "join keys must refer to different sides of the join, got {}",
                        join.criteria
                    ),
                })
            }
        };

        let lt = types.infer(left_key, &schema)?;
        let rt = types.infer(right_key, &schema)?;
        if !types_compatible_for_equality(&lt, &rt) {
            return Err(RillError::Planning(format!(
                "join key types are not comparable: {left_key} is {lt:?}, {right_key} is {rt:?}"
            )));
        }

        Ok(PlanNode::Join {
            join_type: join.join_type,
            left_key: left_key.clone(),
            right_key: right_key.clone(),
            left: Box::new(left),
            right: Box::new(right),
            schema,
        })
    }

    fn build_aggregate(
        &self,
        analysis: &Analysis,
        aggregates: &AggregateAnalysis,
        input: PlanNode,
        types: &TypeChecker<'_>,
    ) -> Result<PlanNode> {
        let input_schema = input.output_schema();

        for key in analysis.group_by() {
            if self.contains_aggregate(key)? {
                return Err(RillError::Planning(format!(
                    "aggregate functions are not allowed in GROUP BY: {key}"
                )));
            }
            types.infer(key, input_schema)?;
        }
        self.check_group_by_covariance(analysis, aggregates, input_schema)?;

        let mut fields = input_schema.fields().to_vec();
        for agg in aggregates.aggregate_calls() {
            let dt = types.infer(&agg.call, input_schema)?;
            fields.push(PlanField::new(None, agg.column.clone(), dt));
        }

        Ok(PlanNode::Aggregate {
            group_keys: analysis.group_by().to_vec(),
            aggregates: aggregates.aggregate_calls().to_vec(),
            window: analysis.window().copied(),
            input: Box::new(input),
            schema: PlanSchema::new(fields),
        })
    }

    /// Every column the aggregated query reads after grouping must be a
    /// grouping key, unless the whole select item equals a key expression.
    fn check_group_by_covariance(
        &self,
        analysis: &Analysis,
        aggregates: &AggregateAnalysis,
        input_schema: &PlanSchema,
    ) -> Result<()> {
        let group_by = analysis.group_by();
        let mut key_columns = HashSet::new();
        for key in group_by {
            if let Some(c) = key.as_column() {
                key_columns.insert(input_schema.resolve(c, key.location())?);
            }
        }

        let checked = aggregates
            .final_select_expressions()
            .iter()
            .chain(aggregates.having());
        for expr in checked {
            if group_by.contains(expr) {
                continue;
            }
            for (column, location) in collect_columns(expr, self.config.max_expression_depth)? {
                if column.qualifier.is_none() && aggregates.is_aggregate_column(&column.name) {
                    continue;
                }
                let idx = input_schema.resolve(&column, location)?;
                if !key_columns.contains(&idx) {
                    return Err(RillError::NonAggregateColumnNotInGroupBy {
                        column: column.to_string(),
                        location,
                    });
                }
            }
        }
        Ok(())
    }

    fn build_project(
        &self,
        exprs: &[Expression],
        names: &[String],
        input: PlanNode,
        types: &TypeChecker<'_>,
    ) -> Result<PlanNode> {
        if exprs.len() != names.len() {
            return Err(RillError::Planning(format!(
                "select list has {} expressions but {} names",
                exprs.len(),
                names.len()
            )));
        }
        let input_schema = input.output_schema();
        let mut projected = Vec::with_capacity(exprs.len());
        let mut fields = Vec::with_capacity(exprs.len());
        for (expr, name) in exprs.iter().zip(names) {
            let dt = types.infer(expr, input_schema)?;
            projected.push((self.maybe_fold(expr)?, name.clone()));
            fields.push(PlanField::new(None, name.clone(), dt));
        }
        Ok(PlanNode::Project {
            exprs: projected,
            input: Box::new(input),
            schema: PlanSchema::new(fields),
        })
    }

    fn build_sink(&self, sink: &SinkTarget, input: PlanNode) -> Result<PlanNode> {
        match sink {
            SinkTarget::Create {
                kind,
                name,
                properties,
            } => {
                let schema = input.output_schema().clone();
                Ok(PlanNode::Sink {
                    target: name.clone(),
                    kind: *kind,
                    creates_target: true,
                    properties: properties.clone(),
                    input: Box::new(input),
                    schema,
                })
            }
            SinkTarget::Insert { name } => {
                let target = self.catalog.lookup(name).ok_or_else(|| RillError::UnknownRelation {
                    name: name.clone(),
                    location: NodeLocation::unknown(),
                })?;
                let produced = input.output_schema();
                if produced.len() != target.fields().len() {
                    return Err(RillError::Planning(format!(
                        "INSERT column count mismatch: query produces {}, '{name}' has {}",
                        produced.len(),
                        target.fields().len()
                    )));
                }
                for (src, dst) in produced.fields().iter().zip(target.fields().iter()) {
                    if !insert_type_compatible(&src.data_type, dst.data_type()) {
                        return Err(RillError::Planning(format!(
                            "INSERT type mismatch for column '{}': {:?} cannot be written to {:?}",
                            dst.name(),
                            src.data_type,
                            dst.data_type()
                        )));
                    }
                }
                Ok(PlanNode::Sink {
                    target: name.clone(),
                    kind: SinkKind::Stream,
                    creates_target: false,
                    properties: vec![],
                    input: Box::new(input),
                    schema: PlanSchema::from_relation(name, &target),
                })
            }
        }
    }

    fn contains_aggregate(&self, expr: &Expression) -> Result<bool> {
        Ok(AggregateAnalyzer::new(self.registry, self.config)
            .scan(expr)?
            .contains_aggregate)
    }

    fn maybe_fold(&self, expr: &Expression) -> Result<Expression> {
        if self.config.fold_constants {
            simplify(expr, self.config.max_expression_depth)
        } else {
            Ok(expr.clone())
        }
    }
}

fn source_node(source: &ResolvedSource) -> PlanNode {
    PlanNode::Source {
        name: source.name.clone(),
        alias: source.alias.clone(),
        schema: PlanSchema::from_relation(source.qualifier(), &source.schema),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};

    use super::*;
    use crate::analyzer::Analyzer;
    use crate::catalog::MemoryCatalog;
    use crate::functions::BuiltinFunctionRegistry;
    use crate::sql_frontend::parse_statements;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new().with_relation(
            "stream1",
            Arc::new(Schema::new(vec![
                Field::new("col1", DataType::Utf8, true),
                Field::new("col2", DataType::Int32, true),
                Field::new("col3", DataType::Float64, true),
            ])),
        )
    }

    fn plan_with(sql: &str, config: &PlannerConfig) -> Result<PlanNode> {
        let cat = catalog();
        let reg = BuiltinFunctionRegistry::new();
        let stmts = parse_statements(sql, config)?;
        let analysis = Analyzer::new(&cat, config).analyze(&stmts[0].statement)?;
        let aggregates = AggregateAnalyzer::new(&reg, config).analyze(&analysis)?;
        LogicalPlanner::new(&cat, &reg, config).build_plan(&analysis, &aggregates)
    }

    fn plan(sql: &str) -> Result<PlanNode> {
        plan_with(sql, &PlannerConfig::default())
    }

    #[test]
    fn group_by_expression_key_covers_matching_select_item() {
        let p = plan("SELECT col2 + 1, COUNT(*) FROM stream1 GROUP BY col2 + 1").expect("plan");
        assert_eq!(p.name(), "Project");
    }

    #[test]
    fn group_by_key_matches_select_item_regardless_of_case() {
        let p = plan("SELECT ucase(COL1), COUNT(*) FROM stream1 GROUP BY UCASE(col1)").expect("plan");
        let PlanNode::Project { exprs, .. } = &p else {
            panic!("expected project, got {}", p.name());
        };
        assert_eq!(exprs[0].0.to_string(), "UCASE(col1)");

        plan("SELECT Col2 + 1, SUM(col3) FROM stream1 GROUP BY col2 + 1").expect("plan");
    }

    #[test]
    fn column_outside_group_by_is_rejected() {
        let err = plan("SELECT col1, col2, COUNT(*) FROM stream1 GROUP BY col1").expect_err("covariance");
        assert!(
            matches!(&err, RillError::NonAggregateColumnNotInGroupBy { column, .. } if column == "col2"),
            "{err}"
        );

        let err = plan("SELECT col2 + SUM(col3) FROM stream1 GROUP BY col1").expect_err("covariance");
        assert!(matches!(err, RillError::NonAggregateColumnNotInGroupBy { .. }), "{err}");
    }

    #[test]
    fn aggregate_in_where_is_rejected() {
        let err = plan("SELECT col1 FROM stream1 WHERE COUNT(*) > 1").expect_err("where");
        assert!(err.to_string().contains("not allowed in WHERE"), "err={err}");
    }

    #[test]
    fn where_must_be_boolean() {
        let err = plan("SELECT col1 FROM stream1 WHERE col2 + 1").expect_err("non-boolean");
        assert!(err.to_string().contains("WHERE predicate must be boolean"), "err={err}");
    }

    #[test]
    fn having_and_window_need_aggregation() {
        let err = plan("SELECT col1 FROM stream1 HAVING col2 > 1").expect_err("having");
        assert!(err.to_string().contains("HAVING requires"), "err={err}");

        let err = plan("SELECT col1 FROM stream1 WINDOW TUMBLING (SIZE 10 SECONDS)").expect_err("window");
        assert!(err.to_string().contains("requires GROUP BY"), "err={err}");
    }

    #[test]
    fn having_becomes_filter_over_aggregate() {
        let p = plan("SELECT col1, COUNT(*) FROM stream1 GROUP BY col1 HAVING COUNT(*) > 1").expect("plan");
        let PlanNode::Project { input, .. } = &p else {
            panic!("expected project, got {}", p.name());
        };
        let PlanNode::Filter { predicate, input, .. } = input.as_ref() else {
            panic!("expected filter");
        };
        assert_eq!(predicate.to_string(), "(KSQL_AGG_VARIABLE_0 > 1)");
        assert_eq!(input.name(), "Aggregate");
    }

    #[test]
    fn constant_folding_is_opt_in() {
        let config = PlannerConfig {
            fold_constants: true,
            ..PlannerConfig::default()
        };
        let p = plan_with("SELECT NULLIF(5, 5) AS a, 1 + 2 AS b FROM stream1", &config).expect("plan");
        let PlanNode::Project { exprs, schema, .. } = &p else {
            panic!("expected project");
        };
        assert_eq!(exprs[0].0.to_string(), "NULL");
        assert_eq!(exprs[1].0.to_string(), "3");
        assert_eq!(schema.fields()[1].data_type, DataType::Int32);

        let p = plan("SELECT 1 + 2 AS b FROM stream1").expect("plan");
        let PlanNode::Project { exprs, .. } = &p else {
            panic!("expected project");
        };
        assert_eq!(exprs[0].0.to_string(), "(1 + 2)");
    }
}
