//! Semantic analysis and logical planning for streaming SQL.
//!
//! Architecture role:
//! - converts parsed statements into the planner's expression/statement model
//! - resolves relations and columns against a [`Catalog`]
//! - splits aggregate queries into grouped computation plus final projection
//! - builds the [`PlanNode`] tree handed to execution layers
//!
//! Key modules:
//! - [`ast`] / [`visitor`]
//! - [`analyzer`]
//! - [`aggregate_analyzer`] / [`rewriter`]
//! - [`logical_planner`]
//! - [`builder`]
//!
//! Pipeline: [`sql_frontend`] -> [`Analyzer`] -> [`AggregateAnalyzer`]
//! -> [`LogicalPlanner`] -> [`PlanNode`]. [`PlanBuilder`] runs all stages.

pub mod aggregate_analyzer;
pub mod analyzer;
pub mod ast;
pub mod builder;
pub mod catalog;
pub mod explain;
pub mod functions;
pub mod logical_plan;
pub mod logical_planner;
pub mod rewriter;
pub mod schema;
pub mod simplify;
pub mod sql_frontend;
pub mod types;
pub mod visitor;

pub use aggregate_analyzer::{AggregateAnalysis, AggregateAnalyzer, AggregateCall, AggregateScan};
pub use analyzer::{Analysis, Analyzer, JoinInfo, ResolvedSource, SinkTarget};
pub use ast::*;
pub use builder::{CompiledStatement, PlanBuilder};
pub use catalog::{Catalog, MemoryCatalog};
pub use explain::explain_plan;
pub use functions::{BuiltinFunctionRegistry, FunctionKind, FunctionRegistry, FunctionSignature, ReturnType};
pub use logical_plan::PlanNode;
pub use logical_planner::LogicalPlanner;
pub use rewriter::AggregateExpressionRewriter;
pub use schema::{PlanField, PlanSchema};
pub use simplify::simplify;
pub use sql_frontend::parse_statements;
pub use types::TypeChecker;
pub use visitor::{collect_columns, ExpressionRewriter, ExpressionVisitor, Recursion};
