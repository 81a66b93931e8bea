use serde::{Deserialize, Serialize};

use crate::error::{Result, RillError};

/// Default bound on expression nesting for every planner traversal.
pub const DEFAULT_MAX_EXPRESSION_DEPTH: usize = 128;

/// Knobs shared by the parser boundary, analyzers and the logical planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Maximum expression nesting accepted by any traversal.
    pub max_expression_depth: usize,
    /// Prefix of generated names for unaliased, non-column select items.
    pub column_alias_prefix: String,
    /// Prefix of the intermediate columns produced by aggregate rewriting.
    pub aggregate_column_prefix: String,
    /// Fold literal-only sub-expressions in filter and projection expressions.
    pub fold_constants: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_expression_depth: DEFAULT_MAX_EXPRESSION_DEPTH,
            column_alias_prefix: "KSQL_COL_".to_string(),
            aggregate_column_prefix: "KSQL_AGG_VARIABLE_".to_string(),
            fold_constants: false,
        }
    }
}

impl PlannerConfig {
    /// Parse a JSON config document; missing keys fall back to defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: PlannerConfig =
            serde_json::from_str(s).map_err(|e| RillError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_expression_depth == 0 {
            return Err(RillError::InvalidConfig(
                "max_expression_depth must be > 0".to_string(),
            ));
        }
        if self.column_alias_prefix.is_empty() || self.aggregate_column_prefix.is_empty() {
            return Err(RillError::InvalidConfig(
                "generated column prefixes must not be empty".to_string(),
            ));
        }
        if self.column_alias_prefix == self.aggregate_column_prefix {
            return Err(RillError::InvalidConfig(
                "column_alias_prefix and aggregate_column_prefix must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Name of the `index`-th aggregate intermediate column.
    pub fn aggregate_column_name(&self, index: usize) -> String {
        format!("{}{index}", self.aggregate_column_prefix)
    }

    /// Generated output name for the select item at `index`.
    pub fn column_alias(&self, index: usize) -> String {
        format!("{}{index}", self.column_alias_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PlannerConfig::from_json_str(r#"{"max_expression_depth": 16}"#).expect("config");
        assert_eq!(cfg.max_expression_depth, 16);
        assert_eq!(cfg.column_alias(1), "KSQL_COL_1");
        assert_eq!(cfg.aggregate_column_name(0), "KSQL_AGG_VARIABLE_0");
        assert!(!cfg.fold_constants);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = PlannerConfig::from_json_str(r#"{"max_expression_depth": 0}"#)
            .expect_err("must reject");
        assert!(matches!(err, RillError::InvalidConfig(_)), "{err}");
    }
}
