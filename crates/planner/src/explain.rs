use crate::ast::{JoinType, SinkKind};
use crate::logical_plan::PlanNode;
use crate::schema::PlanSchema;

/// Render a logical plan as indented multiline text, one node per line.
pub fn explain_plan(plan: &PlanNode) -> String {
    let mut s = String::new();
    fmt_node(plan, 0, &mut s);
    s
}

fn fmt_node(plan: &PlanNode, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        PlanNode::Source { name, alias, schema } => {
            match alias {
                Some(a) => out.push_str(&format!("{pad}Source {name} AS {a}")),
                None => out.push_str(&format!("{pad}Source {name}")),
            }
            out.push_str(&format!(" {}\n", fmt_columns(schema)));
        }
        PlanNode::Filter { predicate, input, .. } => {
            out.push_str(&format!("{pad}Filter {predicate}\n"));
            fmt_node(input, indent + 1, out);
        }
        PlanNode::Aggregate {
            group_keys,
            aggregates,
            window,
            input,
            ..
        } => {
            match window {
                Some(w) => out.push_str(&format!("{pad}Aggregate window={w}\n")),
                None => out.push_str(&format!("{pad}Aggregate\n")),
            }
            out.push_str(&format!("{pad}  group_by={}\n", group_keys.len()));
            for k in group_keys {
                out.push_str(&format!("{pad}    {k}\n"));
            }
            out.push_str(&format!("{pad}  aggregates={}\n", aggregates.len()));
            for a in aggregates {
                out.push_str(&format!("{pad}    {} := {}\n", a.column, a.call));
            }
            fmt_node(input, indent + 1, out);
        }
        PlanNode::Project { exprs, input, .. } => {
            out.push_str(&format!("{pad}Project\n"));
            for (e, name) in exprs {
                out.push_str(&format!("{pad}  {name} := {e}\n"));
            }
            fmt_node(input, indent + 1, out);
        }
        PlanNode::Join {
            join_type,
            left_key,
            right_key,
            left,
            right,
            ..
        } => {
            out.push_str(&format!(
                "{pad}Join type={} on={left_key} = {right_key}\n",
                fmt_join_type(*join_type)
            ));
            out.push_str(&format!("{pad}  left:\n"));
            fmt_node(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_node(right, indent + 2, out);
        }
        PlanNode::Limit { n, input, .. } => {
            out.push_str(&format!("{pad}Limit n={n}\n"));
            fmt_node(input, indent + 1, out);
        }
        PlanNode::Sink {
            target,
            kind,
            creates_target,
            properties,
            input,
            ..
        } => {
            let verb = if *creates_target { "create" } else { "insert" };
            out.push_str(&format!(
                "{pad}Sink {verb} {} {target}\n",
                fmt_sink_kind(*kind)
            ));
            for (k, v) in properties {
                out.push_str(&format!("{pad}  {k}={v}\n"));
            }
            fmt_node(input, indent + 1, out);
        }
    }
}

fn fmt_columns(schema: &PlanSchema) -> String {
    let cols: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
    format!("[{}]", cols.join(", "))
}

fn fmt_join_type(t: JoinType) -> &'static str {
    match t {
        JoinType::Inner => "inner",
        JoinType::Left => "left",
        JoinType::Outer => "outer",
    }
}

fn fmt_sink_kind(k: SinkKind) -> &'static str {
    match k {
        SinkKind::Stream => "stream",
        SinkKind::Table => "table",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};
    use rill_common::PlannerConfig;

    use super::*;
    use crate::builder::PlanBuilder;
    use crate::catalog::MemoryCatalog;
    use crate::functions::BuiltinFunctionRegistry;

    fn builder() -> PlanBuilder {
        let catalog = MemoryCatalog::new()
            .with_relation(
                "orders",
                Arc::new(Schema::new(vec![
                    Field::new("id", DataType::Int64, false),
                    Field::new("user_id", DataType::Int64, true),
                    Field::new("amount", DataType::Float64, true),
                ])),
            )
            .with_relation(
                "users",
                Arc::new(Schema::new(vec![
                    Field::new("id", DataType::Int64, false),
                    Field::new("name", DataType::Utf8, true),
                ])),
            );
        PlanBuilder::new(
            Arc::new(catalog),
            Arc::new(BuiltinFunctionRegistry::new()),
            PlannerConfig::default(),
        )
    }

    #[test]
    fn explains_windowed_aggregate() {
        let plan = builder()
            .build_logical_plan(
                "SELECT user_id, SUM(amount) AS total FROM orders WINDOW TUMBLING (SIZE 30 SECONDS) \
                 WHERE amount > 0 GROUP BY user_id",
            )
            .expect("plan");
        let expected = "\
Project
  user_id := user_id
  total := KSQL_AGG_VARIABLE_0
  Aggregate window=TUMBLING (SIZE 30 SECONDS)
    group_by=1
      user_id
    aggregates=1
      KSQL_AGG_VARIABLE_0 := SUM(amount)
    Filter (amount > 0)
      Source orders [id, user_id, amount]
";
        assert_eq!(explain_plan(&plan), expected);
    }

    #[test]
    fn explains_join_and_sink() {
        let plan = builder()
            .build_logical_plan(
                "CREATE STREAM enriched AS SELECT o.id, u.name FROM orders o \
                 JOIN users u ON u.id = o.user_id LIMIT 5",
            )
            .expect("plan");
        let expected = "\
Sink create stream enriched
  Limit n=5
    Project
      o_id := o.id
      u_name := u.name
      Join type=inner on=o.user_id = u.id
        left:
          Source orders AS o [id, user_id, amount]
        right:
          Source users AS u [id, name]
";
        assert_eq!(explain_plan(&plan), expected);
    }
}
