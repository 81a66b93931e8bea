//! Result-type inference for expressions over a [`PlanSchema`].

use arrow_schema::DataType;
use rill_common::{Result, RillError};

use crate::ast::{Expression, ExpressionKind, LogicalOp, UnaryOp};
use crate::functions::{check_string_arg, FunctionRegistry};
use crate::schema::PlanSchema;

pub struct TypeChecker<'a> {
    registry: &'a dyn FunctionRegistry,
    max_depth: usize,
}

impl<'a> TypeChecker<'a> {
    pub fn new(registry: &'a dyn FunctionRegistry, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
        }
    }

    /// Type of `expr` when evaluated against rows of `schema`.
    pub fn infer(&self, expr: &Expression, schema: &PlanSchema) -> Result<DataType> {
        self.infer_at(expr, schema, 1)
    }

    /// Like [`TypeChecker::infer`], but the result must be boolean (or NULL).
    pub fn infer_predicate(&self, expr: &Expression, schema: &PlanSchema, clause: &str) -> Result<()> {
        match self.infer(expr, schema)? {
            DataType::Boolean | DataType::Null => Ok(()),
            other => Err(RillError::Planning(format!(
                "{clause} predicate must be boolean, got {other:?}: {expr}"
            ))),
        }
    }

    fn infer_at(&self, expr: &Expression, schema: &PlanSchema, depth: usize) -> Result<DataType> {
        if depth > self.max_depth {
            return Err(RillError::ExpressionTooDeep {
                limit: self.max_depth,
            });
        }
        let sub = |e: &Expression| self.infer_at(e, schema, depth + 1);

        match expr.kind() {
            ExpressionKind::Literal(v) => Ok(v.data_type()),
            ExpressionKind::Column(c) => {
                let idx = schema.resolve(c, expr.location())?;
                schema
                    .field(idx)
                    .map(|f| f.data_type.clone())
                    .ok_or_else(|| RillError::Planning(format!("column index out of range: {idx}")))
            }
            ExpressionKind::Wildcard => Err(RillError::Planning(
                "'*' is only valid as a function argument".to_string(),
            )),
            ExpressionKind::Function { name, args, .. } => {
                let sig = self
                    .registry
                    .lookup(name)
                    .ok_or_else(|| RillError::UnknownFunction {
                        name: name.clone(),
                        location: expr.location(),
                    })?;
                let mut arg_types = Vec::with_capacity(args.len());
                for a in args {
                    if matches!(a.kind(), ExpressionKind::Wildcard) {
                        if !sig.accepts_wildcard || args.len() != 1 {
                            return Err(RillError::Planning(format!(
                                "{name}() does not accept '*'"
                            )));
                        }
                        arg_types.push(DataType::Null);
                    } else {
                        arg_types.push(sub(a)?);
                    }
                }
                check_string_arg(sig, &arg_types)?;
                sig.resolve_return_type(&arg_types)
            }
            ExpressionKind::Unary { op, expr: inner } => {
                let dt = sub(inner)?;
                match op {
                    UnaryOp::Not => {
                        expect_boolean(&dt, "NOT")?;
                        Ok(DataType::Boolean)
                    }
                    UnaryOp::Minus | UnaryOp::Plus => {
                        if dt != DataType::Null && !is_numeric(&dt) {
                            return Err(RillError::Planning(format!(
                                "unary {} requires a numeric operand, got {dt:?}",
                                if *op == UnaryOp::Minus { "-" } else { "+" }
                            )));
                        }
                        Ok(dt)
                    }
                }
            }
            ExpressionKind::Arithmetic { left, op, right } => {
                let ldt = sub(left)?;
                let rdt = sub(right)?;
                arithmetic_type(&ldt, &rdt).ok_or_else(|| {
                    RillError::Planning(format!(
                        "arithmetic '{}' requires numeric operands, got {ldt:?} and {rdt:?}",
                        op.symbol()
                    ))
                })
            }
            ExpressionKind::Comparison { left, right, .. } => {
                let ldt = sub(left)?;
                let rdt = sub(right)?;
                comparable(&ldt, &rdt)?;
                Ok(DataType::Boolean)
            }
            ExpressionKind::Logical { left, op, right } => {
                let name = match op {
                    LogicalOp::And => "AND",
                    LogicalOp::Or => "OR",
                };
                expect_boolean(&sub(left)?, name)?;
                expect_boolean(&sub(right)?, name)?;
                Ok(DataType::Boolean)
            }
            ExpressionKind::NullIf { first, second } => {
                let fdt = sub(first)?;
                let sdt = sub(second)?;
                comparable(&fdt, &sdt)?;
                Ok(fdt)
            }
            ExpressionKind::Case {
                operand,
                branches,
                else_result,
            } => {
                let operand_type = match operand {
                    Some(op) => Some(sub(op)?),
                    None => None,
                };
                let mut result_types = Vec::with_capacity(branches.len() + 1);
                for (when, then) in branches {
                    let wdt = sub(when)?;
                    match &operand_type {
                        Some(odt) => comparable(odt, &wdt)?,
                        None => expect_boolean(&wdt, "CASE WHEN")?,
                    }
                    result_types.push(sub(then)?);
                }
                if let Some(e) = else_result {
                    result_types.push(sub(e)?);
                }
                coerce_case_result_type(&result_types)
            }
            ExpressionKind::Cast { expr: inner, data_type } => {
                sub(inner)?;
                Ok(data_type.clone())
            }
            ExpressionKind::IsNull { expr: inner, .. } => {
                sub(inner)?;
                Ok(DataType::Boolean)
            }
            ExpressionKind::Between {
                expr: inner,
                low,
                high,
                ..
            } => {
                let dt = sub(inner)?;
                comparable(&dt, &sub(low)?)?;
                comparable(&dt, &sub(high)?)?;
                Ok(DataType::Boolean)
            }
            ExpressionKind::Like {
                expr: inner,
                pattern,
                ..
            } => {
                for (side, dt) in [("value", sub(inner)?), ("pattern", sub(pattern)?)] {
                    if dt != DataType::Null && !is_string(&dt) {
                        return Err(RillError::Planning(format!(
                            "LIKE {side} must be a string, got {dt:?}"
                        )));
                    }
                }
                Ok(DataType::Boolean)
            }
            ExpressionKind::InList {
                expr: inner, list, ..
            } => {
                let dt = sub(inner)?;
                for item in list {
                    comparable(&dt, &sub(item)?)?;
                }
                Ok(DataType::Boolean)
            }
        }
    }
}

fn expect_boolean(dt: &DataType, context: &str) -> Result<()> {
    match dt {
        DataType::Boolean | DataType::Null => Ok(()),
        other => Err(RillError::Planning(format!(
            "{context} requires boolean operands, got {other:?}"
        ))),
    }
}

pub(crate) fn is_numeric(dt: &DataType) -> bool {
    numeric_rank(dt).is_some()
}

pub(crate) fn is_string(dt: &DataType) -> bool {
    matches!(dt, DataType::Utf8 | DataType::LargeUtf8)
}

fn numeric_rank(dt: &DataType) -> Option<u8> {
    Some(match dt {
        DataType::Int8 | DataType::UInt8 => 1,
        DataType::Int16 | DataType::UInt16 => 2,
        DataType::Int32 | DataType::UInt32 => 3,
        DataType::Int64 | DataType::UInt64 => 4,
        DataType::Float32 => 5,
        DataType::Float64 => 6,
        _ => return None,
    })
}

pub(crate) fn wider_numeric(a: &DataType, b: &DataType) -> Option<DataType> {
    let ra = numeric_rank(a)?;
    let rb = numeric_rank(b)?;
    if ra >= rb {
        Some(a.clone())
    } else {
        Some(b.clone())
    }
}

/// Result type of `+ - * / %`; strings concatenate with `+`.
fn arithmetic_type(ldt: &DataType, rdt: &DataType) -> Option<DataType> {
    match (ldt, rdt) {
        (DataType::Null, other) | (other, DataType::Null) if is_numeric(other) => Some(other.clone()),
        (DataType::Null, DataType::Null) => Some(DataType::Null),
        (l, r) if is_string(l) && is_string(r) => Some(DataType::Utf8),
        (l, r) => wider_numeric(l, r),
    }
}

/// Values of the two types can be compared with `=`/`<` and friends.
pub(crate) fn comparable(ldt: &DataType, rdt: &DataType) -> Result<()> {
    if types_compatible_for_equality(ldt, rdt) || *ldt == DataType::Null || *rdt == DataType::Null {
        return Ok(());
    }
    Err(RillError::Planning(format!(
        "cannot compare types {ldt:?} and {rdt:?}"
    )))
}

pub(crate) fn types_compatible_for_equality(a: &DataType, b: &DataType) -> bool {
    a == b || (is_numeric(a) && is_numeric(b)) || (is_string(a) && is_string(b))
}

fn coerce_case_result_type(types: &[DataType]) -> Result<DataType> {
    let mut target: Option<DataType> = None;
    for dt in types {
        if *dt == DataType::Null {
            continue;
        }
        target = Some(match target {
            None => dt.clone(),
            Some(t) if t == *dt => t,
            Some(t) if is_numeric(&t) && is_numeric(dt) => wider_numeric(&t, dt).ok_or_else(|| {
                RillError::Planning("failed to determine CASE numeric widening type".to_string())
            })?,
            Some(t) if is_string(&t) && is_string(dt) => DataType::Utf8,
            Some(t) => {
                return Err(RillError::Planning(format!(
                    "CASE branch type mismatch: cannot unify {t:?} and {dt:?}"
                )));
            }
        });
    }
    Ok(target.unwrap_or(DataType::Null))
}

/// A value of type `src` may be written into a column of type `dst`.
pub(crate) fn insert_type_compatible(src: &DataType, dst: &DataType) -> bool {
    src == dst
        || *src == DataType::Null
        || (is_string(src) && is_string(dst))
        || matches!(
            (src, dst),
            (DataType::Int32, DataType::Int64)
                | (DataType::Int32 | DataType::Int64, DataType::Float64)
                | (DataType::Float64, DataType::Int64)
        )
}

#[cfg(test)]
mod tests {
    use arrow_schema::{Field, Schema};

    use super::*;
    use crate::ast::{ArithmeticOp, ComparisonOp, Literal};
    use crate::functions::BuiltinFunctionRegistry;

    fn schema() -> PlanSchema {
        PlanSchema::from_relation(
            "s",
            &Schema::new(vec![
                Field::new("name", DataType::Utf8, true),
                Field::new("qty", DataType::Int32, true),
                Field::new("price", DataType::Float64, true),
            ]),
        )
    }

    #[test]
    fn arithmetic_widens_numeric_operands() {
        let reg = BuiltinFunctionRegistry::new();
        let tc = TypeChecker::new(&reg, 32);
        let e = Expression::arithmetic(
            Expression::column("qty"),
            ArithmeticOp::Multiply,
            Expression::column("price"),
        );
        assert_eq!(tc.infer(&e, &schema()).expect("type"), DataType::Float64);

        let bad = Expression::arithmetic(
            Expression::column("name"),
            ArithmeticOp::Subtract,
            Expression::column("qty"),
        );
        let err = tc.infer(&bad, &schema()).expect_err("string minus int");
        assert!(err.to_string().contains("requires numeric operands"), "err={err}");
    }

    #[test]
    fn nullif_takes_type_of_first_argument() {
        let reg = BuiltinFunctionRegistry::new();
        let tc = TypeChecker::new(&reg, 32);
        let e = Expression::nullif(Expression::column("qty"), Expression::literal(Literal::Integer(0)));
        assert_eq!(tc.infer(&e, &schema()).expect("type"), DataType::Int32);
    }

    #[test]
    fn case_branches_unify() {
        let reg = BuiltinFunctionRegistry::new();
        let tc = TypeChecker::new(&reg, 32);
        let e = Expression::searched_case(
            vec![(
                Expression::comparison(
                    Expression::column("qty"),
                    ComparisonOp::Gt,
                    Expression::literal(Literal::Integer(1)),
                ),
                Expression::column("qty"),
            )],
            Some(Expression::column("price")),
        );
        assert_eq!(tc.infer(&e, &schema()).expect("type"), DataType::Float64);
    }

    #[test]
    fn unknown_function_is_reported() {
        let reg = BuiltinFunctionRegistry::new();
        let tc = TypeChecker::new(&reg, 32);
        let e = Expression::function("frobnicate", vec![Expression::column("qty")]);
        let err = tc.infer(&e, &schema()).expect_err("unknown");
        assert!(matches!(err, RillError::UnknownFunction { ref name, .. } if name == "FROBNICATE"), "{err}");
    }

    #[test]
    fn wildcard_only_inside_count() {
        let reg = BuiltinFunctionRegistry::new();
        let tc = TypeChecker::new(&reg, 32);
        assert_eq!(tc.infer(&Expression::count_star(), &schema()).expect("count"), DataType::Int64);
        let e = Expression::function("SUM", vec![Expression::new(ExpressionKind::Wildcard)]);
        let err = tc.infer(&e, &schema()).expect_err("sum(*)");
        assert!(err.to_string().contains("does not accept '*'"), "err={err}");
    }
}
