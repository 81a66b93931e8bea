use thiserror::Error;

use crate::location::NodeLocation;

/// Canonical rill error taxonomy used across crates.
///
/// Every variant rejects the whole statement; no stage produces a partial plan.
///
/// Classification guidance:
/// - resolution failures ([`RillError::UnknownRelation`], [`RillError::UnknownColumn`],
///   [`RillError::AmbiguousColumn`], [`RillError::UnknownFunction`]) come from analysis
/// - well-formedness failures ([`RillError::UnsupportedJoin`],
///   [`RillError::NonAggregateColumnNotInGroupBy`]) come from logical planning
/// - [`RillError::ExpressionTooDeep`] can be raised by any traversal
/// - [`RillError::Planning`]: type/shape issues that have no dedicated variant
#[derive(Debug, Error)]
pub enum RillError {
    /// SQL text could not be turned into statements.
    #[error("parse error: {0}")]
    Parse(String),

    /// A FROM/JOIN/INSERT relation is not present in the catalog.
    #[error("unknown relation '{name}' at {location}")]
    UnknownRelation {
        name: String,
        location: NodeLocation,
    },

    /// A column reference matched none of the statement's sources.
    #[error("unknown column '{name}' at {location}")]
    UnknownColumn {
        name: String,
        location: NodeLocation,
    },

    /// An unqualified column reference matched more than one joined source.
    #[error("ambiguous column '{name}' at {location}: candidates {candidates:?}")]
    AmbiguousColumn {
        name: String,
        candidates: Vec<String>,
        location: NodeLocation,
    },

    /// A function name that the registry does not know.
    #[error("unknown function '{name}' at {location}")]
    UnknownFunction {
        name: String,
        location: NodeLocation,
    },

    /// Join shape outside the supported grammar (single equi key pair).
    #[error("unsupported join: {reason}")]
    UnsupportedJoin { reason: String },

    /// Aggregate query projects a non-aggregate column not covered by GROUP BY.
    #[error("non-aggregate column '{column}' at {location} is not part of GROUP BY")]
    NonAggregateColumnNotInGroupBy {
        column: String,
        location: NodeLocation,
    },

    /// A traversal exceeded the configured recursion bound.
    #[error("expression nesting exceeds the maximum depth of {limit}")]
    ExpressionTooDeep { limit: usize },

    /// Query planning/analyzer failures without a dedicated variant.
    ///
    /// Examples:
    /// - WHERE predicate that is not boolean
    /// - arithmetic over non-numeric operands
    /// - duplicate output column names
    #[error("planning error: {0}")]
    Planning(String),

    /// Valid SQL shape that is intentionally not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invalid or inconsistent configuration/catalog fixture state.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error raised while compiling a specific statement.
    #[error("{source}\n  in statement: {statement}")]
    InStatement {
        statement: String,
        #[source]
        source: Box<RillError>,
    },
}

impl RillError {
    /// Attach the statement text the error was raised for.
    ///
    /// Already wrapped errors are returned unchanged.
    pub fn in_statement(self, statement: impl Into<String>) -> Self {
        match self {
            wrapped @ RillError::InStatement { .. } => wrapped,
            other => RillError::InStatement {
                statement: statement.into(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any statement wrappers removed.
    pub fn kind(&self) -> &RillError {
        match self {
            RillError::InStatement { source, .. } => source.kind(),
            other => other,
        }
    }

    /// Statement text attached by [`RillError::in_statement`], if any.
    pub fn statement(&self) -> Option<&str> {
        match self {
            RillError::InStatement { statement, .. } => Some(statement),
            _ => None,
        }
    }

    /// Source location carried by resolution and well-formedness errors.
    pub fn location(&self) -> Option<NodeLocation> {
        match self.kind() {
            RillError::UnknownRelation { location, .. }
            | RillError::UnknownColumn { location, .. }
            | RillError::AmbiguousColumn { location, .. }
            | RillError::UnknownFunction { location, .. }
            | RillError::NonAggregateColumnNotInGroupBy { location, .. } => Some(*location),
            _ => None,
        }
    }
}

/// Standard rill result alias.
pub type Result<T> = std::result::Result<T, RillError>;
