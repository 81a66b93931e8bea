use std::sync::Arc;

use rill_common::{PlannerConfig, Result, RillError};
use tracing::info;

use crate::aggregate_analyzer::{AggregateAnalysis, AggregateAnalyzer};
use crate::analyzer::{Analysis, Analyzer};
use crate::ast::PreparedStatement;
use crate::catalog::Catalog;
use crate::explain::explain_plan;
use crate::functions::FunctionRegistry;
use crate::logical_plan::PlanNode;
use crate::logical_planner::LogicalPlanner;
use crate::sql_frontend::parse_statements;

/// Every intermediate product of planning one statement.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    pub text: String,
    pub analysis: Analysis,
    pub aggregates: AggregateAnalysis,
    pub plan: PlanNode,
}

/// SQL text in, logical plans out.
///
/// Runs parse, analysis, aggregate analysis and logical planning in order.
/// Errors from any stage are tagged with the statement text.
pub struct PlanBuilder {
    catalog: Arc<dyn Catalog>,
    registry: Arc<dyn FunctionRegistry>,
    config: PlannerConfig,
}

impl PlanBuilder {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        registry: Arc<dyn FunctionRegistry>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan the first statement of `sql`.
    pub fn build_logical_plan(&self, sql: &str) -> Result<PlanNode> {
        let stmts = parse_statements(sql, &self.config)?;
        let first = stmts
            .first()
            .ok_or_else(|| RillError::Parse("no statement to plan".to_string()))?;
        Ok(self.plan_statement(first)?.plan)
    }

    /// Plan every statement of a script, stopping at the first failure.
    pub fn compile(&self, sql: &str) -> Result<Vec<CompiledStatement>> {
        parse_statements(sql, &self.config)?
            .iter()
            .map(|stmt| self.plan_statement(stmt))
            .collect()
    }

    pub fn plan_statement(&self, stmt: &PreparedStatement) -> Result<CompiledStatement> {
        self.run_stages(stmt)
            .map_err(|e| e.in_statement(stmt.text.as_str()))
    }

    /// `EXPLAIN`-style text for the first statement of `sql`.
    pub fn explain(&self, sql: &str) -> Result<String> {
        Ok(explain_plan(&self.build_logical_plan(sql)?))
    }

    fn run_stages(&self, stmt: &PreparedStatement) -> Result<CompiledStatement> {
        let analysis = Analyzer::new(self.catalog.as_ref(), &self.config).analyze(&stmt.statement)?;
        let aggregates =
            AggregateAnalyzer::new(self.registry.as_ref(), &self.config).analyze(&analysis)?;
        let plan = LogicalPlanner::new(self.catalog.as_ref(), self.registry.as_ref(), &self.config)
            .build_plan(&analysis, &aggregates)?;
        info!(
            root = plan.name(),
            columns = plan.output_schema().len(),
            "statement planned"
        );
        Ok(CompiledStatement {
            text: stmt.text.clone(),
            analysis,
            aggregates,
            plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::{DataType, Field, Schema};

    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::functions::BuiltinFunctionRegistry;

    fn builder() -> PlanBuilder {
        let catalog = MemoryCatalog::new().with_relation(
            "stream1",
            Arc::new(Schema::new(vec![
                Field::new("col1", DataType::Utf8, true),
                Field::new("col2", DataType::Int32, true),
            ])),
        );
        PlanBuilder::new(
            Arc::new(catalog),
            Arc::new(BuiltinFunctionRegistry::new()),
            PlannerConfig::default(),
        )
    }

    #[test]
    fn compiles_each_statement_of_a_script() {
        let out = builder()
            .compile("SELECT col1 FROM stream1; SELECT COUNT(*) FROM stream1;")
            .expect("compile");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].plan.name(), "Project");
        assert!(out[1].aggregates.has_aggregates());
    }

    #[test]
    fn errors_carry_statement_text() {
        let err = builder()
            .compile("SELECT col1 FROM stream1; SELECT nosuchcol FROM stream1")
            .expect_err("unknown column");
        assert!(matches!(err.kind(), RillError::UnknownColumn { .. }), "{err}");
        assert!(
            err.statement().is_some_and(|s| s.contains("nosuchcol")),
            "err={err}"
        );
    }
}
