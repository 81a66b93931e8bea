use serde::{Deserialize, Serialize};

use crate::aggregate_analyzer::AggregateCall;
use crate::ast::{Expression, JoinType, SinkKind, WindowExpression};
use crate::schema::PlanSchema;

/// Logical plan tree for one statement.
///
/// Every node owns its children and carries the schema of the rows it emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    /// Reads a catalog stream or table.
    Source {
        name: String,
        alias: Option<String>,
        schema: PlanSchema,
    },
    Filter {
        predicate: Expression,
        input: Box<PlanNode>,
        schema: PlanSchema,
    },
    /// Groups rows by `group_keys` and computes `aggregates`, optionally per window.
    ///
    /// Emits the input columns followed by one column per aggregate call.
    Aggregate {
        group_keys: Vec<Expression>,
        aggregates: Vec<AggregateCall>,
        window: Option<WindowExpression>,
        input: Box<PlanNode>,
        schema: PlanSchema,
    },
    Project {
        exprs: Vec<(Expression, String)>,
        input: Box<PlanNode>,
        schema: PlanSchema,
    },
    /// Equi-join on one key pair; `left_key` refers to `left`, `right_key` to `right`.
    Join {
        join_type: JoinType,
        left_key: Expression,
        right_key: Expression,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        schema: PlanSchema,
    },
    Limit {
        n: u64,
        input: Box<PlanNode>,
        schema: PlanSchema,
    },
    /// Writes the input into a stream/table.
    Sink {
        target: String,
        kind: SinkKind,
        /// `false` for `INSERT INTO` an existing relation.
        creates_target: bool,
        properties: Vec<(String, String)>,
        input: Box<PlanNode>,
        schema: PlanSchema,
    },
}

impl PlanNode {
    pub fn output_schema(&self) -> &PlanSchema {
        match self {
            PlanNode::Source { schema, .. }
            | PlanNode::Filter { schema, .. }
            | PlanNode::Aggregate { schema, .. }
            | PlanNode::Project { schema, .. }
            | PlanNode::Join { schema, .. }
            | PlanNode::Limit { schema, .. }
            | PlanNode::Sink { schema, .. } => schema,
        }
    }

    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::Source { .. } => vec![],
            PlanNode::Filter { input, .. }
            | PlanNode::Aggregate { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Limit { input, .. }
            | PlanNode::Sink { input, .. } => vec![input.as_ref()],
            PlanNode::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlanNode::Source { .. } => "Source",
            PlanNode::Filter { .. } => "Filter",
            PlanNode::Aggregate { .. } => "Aggregate",
            PlanNode::Project { .. } => "Project",
            PlanNode::Join { .. } => "Join",
            PlanNode::Limit { .. } => "Limit",
            PlanNode::Sink { .. } => "Sink",
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    #[test]
    fn children_and_schema_accessors() {
        let schema = PlanSchema::from_relation(
            "s",
            &Schema::new(vec![Field::new("a", DataType::Int32, true)]),
        );
        let source = PlanNode::Source {
            name: "s".to_string(),
            alias: None,
            schema: schema.clone(),
        };
        let limit = PlanNode::Limit {
            n: 10,
            input: Box::new(source),
            schema: schema.clone(),
        };
        assert_eq!(limit.name(), "Limit");
        assert_eq!(limit.children().len(), 1);
        assert_eq!(limit.children()[0].name(), "Source");
        assert_eq!(limit.output_schema(), &schema);
    }
}
