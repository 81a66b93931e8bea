use std::collections::HashMap;

use arrow_schema::DataType;
use rill_common::{Result, RillError};

use crate::types::{is_numeric, is_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
}

/// How a function's result type follows from its argument types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Fixed(DataType),
    /// Same type as the first argument (MIN, MAX, ABS).
    FirstArg,
    /// First argument widened to its 64-bit numeric family (SUM, ROUND).
    WidenedFirstArg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub kind: FunctionKind,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    /// Whether `*` is accepted as the sole argument (`COUNT(*)`).
    pub accepts_wildcard: bool,
    pub return_type: ReturnType,
}

impl FunctionSignature {
    pub fn scalar(name: &str, min_args: usize, max_args: Option<usize>, return_type: ReturnType) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            kind: FunctionKind::Scalar,
            min_args,
            max_args,
            accepts_wildcard: false,
            return_type,
        }
    }

    pub fn aggregate(name: &str, return_type: ReturnType) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            kind: FunctionKind::Aggregate,
            min_args: 1,
            max_args: Some(1),
            accepts_wildcard: false,
            return_type,
        }
    }

    pub fn with_wildcard(mut self) -> Self {
        self.accepts_wildcard = true;
        self
    }

    pub fn is_aggregate(&self) -> bool {
        self.kind == FunctionKind::Aggregate
    }

    /// Check arity and derive the result type for the given argument types.
    ///
    /// A wildcard argument is passed as `DataType::Null`.
    pub fn resolve_return_type(&self, args: &[DataType]) -> Result<DataType> {
        let n = args.len();
        if n < self.min_args || self.max_args.is_some_and(|max| n > max) {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => format!("{max}"),
                Some(max) => format!("{}..{max}", self.min_args),
                None => format!("at least {}", self.min_args),
            };
            return Err(RillError::Planning(format!(
                "{}() expects {expected} argument(s), got {n}",
                self.name
            )));
        }
        match &self.return_type {
            ReturnType::Fixed(dt) => Ok(dt.clone()),
            ReturnType::FirstArg => Ok(args.first().cloned().unwrap_or(DataType::Null)),
            ReturnType::WidenedFirstArg => match args.first() {
                Some(DataType::Null) | None => Ok(DataType::Null),
                Some(DataType::Float32 | DataType::Float64) => Ok(DataType::Float64),
                Some(dt) if is_numeric(dt) => Ok(DataType::Int64),
                Some(dt) => Err(RillError::Planning(format!(
                    "{}() requires numeric input, got {dt:?}",
                    self.name
                ))),
            },
        }
    }
}

/// Read-only view of the functions a statement may call.
///
/// Lookups are case-insensitive.
pub trait FunctionRegistry {
    fn lookup(&self, name: &str) -> Option<&FunctionSignature>;
}

/// Registry preloaded with the built-in scalar and aggregate functions.
#[derive(Debug, Clone)]
pub struct BuiltinFunctionRegistry {
    functions: HashMap<String, FunctionSignature>,
}

impl Default for BuiltinFunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinFunctionRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            functions: HashMap::new(),
        };
        reg.register(FunctionSignature::aggregate("COUNT", ReturnType::Fixed(DataType::Int64)).with_wildcard());
        reg.register(FunctionSignature::aggregate("SUM", ReturnType::WidenedFirstArg));
        reg.register(FunctionSignature::aggregate("MIN", ReturnType::FirstArg));
        reg.register(FunctionSignature::aggregate("MAX", ReturnType::FirstArg));
        reg.register(FunctionSignature::aggregate("AVG", ReturnType::Fixed(DataType::Float64)));

        reg.register(FunctionSignature::scalar("ABS", 1, Some(1), ReturnType::FirstArg));
        reg.register(FunctionSignature::scalar("CEIL", 1, Some(1), ReturnType::FirstArg));
        reg.register(FunctionSignature::scalar("FLOOR", 1, Some(1), ReturnType::FirstArg));
        reg.register(FunctionSignature::scalar("ROUND", 1, Some(2), ReturnType::WidenedFirstArg));
        reg.register(FunctionSignature::scalar("RANDOM", 0, Some(0), ReturnType::Fixed(DataType::Float64)));
        reg.register(FunctionSignature::scalar("UCASE", 1, Some(1), ReturnType::Fixed(DataType::Utf8)));
        reg.register(FunctionSignature::scalar("LCASE", 1, Some(1), ReturnType::Fixed(DataType::Utf8)));
        reg.register(FunctionSignature::scalar("TRIM", 1, Some(1), ReturnType::Fixed(DataType::Utf8)));
        reg.register(FunctionSignature::scalar("LEN", 1, Some(1), ReturnType::Fixed(DataType::Int32)));
        reg.register(FunctionSignature::scalar("CONCAT", 1, None, ReturnType::Fixed(DataType::Utf8)));
        reg.register(FunctionSignature::scalar("SUBSTRING", 2, Some(3), ReturnType::Fixed(DataType::Utf8)));
        reg.register(FunctionSignature::scalar("IFNULL", 2, Some(2), ReturnType::FirstArg));
        reg.register(FunctionSignature::scalar("COALESCE", 1, None, ReturnType::FirstArg));
        reg
    }

    /// Register or replace a function.
    ///
    /// Returns `true` when an existing function with the same name was replaced.
    pub fn register(&mut self, sig: FunctionSignature) -> bool {
        self.functions
            .insert(sig.name.to_ascii_uppercase(), sig)
            .is_some()
    }

    /// Returns `true` when an existing function was removed.
    pub fn deregister(&mut self, name: &str) -> bool {
        self.functions.remove(&name.to_ascii_uppercase()).is_some()
    }
}

impl FunctionRegistry for BuiltinFunctionRegistry {
    fn lookup(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(&name.to_ascii_uppercase())
    }
}

/// String functions reject non-string first arguments early.
pub(crate) fn check_string_arg(sig: &FunctionSignature, args: &[DataType]) -> Result<()> {
    let string_fns = ["UCASE", "LCASE", "TRIM", "LEN", "SUBSTRING"];
    if !string_fns.contains(&sig.name.as_str()) {
        return Ok(());
    }
    match args.first() {
        Some(dt) if is_string(dt) || *dt == DataType::Null => Ok(()),
        Some(dt) => Err(RillError::Planning(format!(
            "{}() requires a string argument, got {dt:?}",
            sig.name
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_classify_aggregates() {
        let reg = BuiltinFunctionRegistry::new();
        assert!(reg.lookup("count").expect("count").is_aggregate());
        assert!(reg.lookup("Sum").expect("sum").is_aggregate());
        assert!(!reg.lookup("ucase").expect("ucase").is_aggregate());
        assert!(reg.lookup("no_such_fn").is_none());
    }

    #[test]
    fn return_types_follow_arguments() {
        let reg = BuiltinFunctionRegistry::new();
        let sum = reg.lookup("SUM").expect("sum");
        assert_eq!(sum.resolve_return_type(&[DataType::Int32]).expect("int"), DataType::Int64);
        assert_eq!(sum.resolve_return_type(&[DataType::Float64]).expect("f64"), DataType::Float64);
        let err = sum.resolve_return_type(&[DataType::Utf8]).expect_err("string sum");
        assert!(err.to_string().contains("requires numeric"), "err={err}");

        let max = reg.lookup("MAX").expect("max");
        assert_eq!(max.resolve_return_type(&[DataType::Utf8]).expect("max"), DataType::Utf8);
    }

    #[test]
    fn arity_is_checked() {
        let reg = BuiltinFunctionRegistry::new();
        let err = reg
            .lookup("SUBSTRING")
            .expect("substring")
            .resolve_return_type(&[DataType::Utf8])
            .expect_err("arity");
        assert!(err.to_string().contains("expects 2..3 argument(s), got 1"), "err={err}");
    }

    #[test]
    fn register_and_deregister_user_functions() {
        let mut reg = BuiltinFunctionRegistry::new();
        let replaced = reg.register(FunctionSignature::scalar(
            "mask",
            1,
            Some(1),
            ReturnType::Fixed(DataType::Utf8),
        ));
        assert!(!replaced);
        assert_eq!(reg.lookup("MASK").expect("mask").name, "MASK");
        assert!(reg.deregister("Mask"));
        assert!(reg.lookup("mask").is_none());
    }
}
