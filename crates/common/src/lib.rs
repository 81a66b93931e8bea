//! Shared configuration, error types and source locations for rill crates.
//!
//! Architecture role:
//! - defines planner configuration passed across layers
//! - provides common [`RillError`] / [`Result`] contracts
//! - hosts [`NodeLocation`] used by AST nodes and diagnostics
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`location`]

pub mod config;
pub mod error;
pub mod location;

pub use config::{PlannerConfig, DEFAULT_MAX_EXPRESSION_DEPTH};
pub use error::{Result, RillError};
pub use location::NodeLocation;
