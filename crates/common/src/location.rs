//! Source positions attached to AST nodes for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One-based line/column position of a node in the statement text.
///
/// Line `0` marks an unknown position; [`NodeLocation::unknown`] is what a node
/// without location information reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeLocation {
    /// One-based line number, `0` when unknown.
    pub line: u32,
    /// One-based column number.
    pub column: u32,
}

impl NodeLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "line {}:{}", self.line, self.column)
        } else {
            f.write_str("unknown location")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NodeLocation;

    #[test]
    fn unknown_location_renders_without_position() {
        assert_eq!(NodeLocation::unknown().to_string(), "unknown location");
        assert_eq!(NodeLocation::new(3, 14).to_string(), "line 3:14");
        assert!(!NodeLocation::default().is_known());
    }
}
