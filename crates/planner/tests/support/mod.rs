#![allow(dead_code)]

use std::sync::{Arc, Once};

use rill_common::PlannerConfig;
use rill_planner::{BuiltinFunctionRegistry, MemoryCatalog, PlanBuilder};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn catalog() -> MemoryCatalog {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/catalog.json");
    MemoryCatalog::load_from_json(path).expect("catalog fixture")
}

pub fn builder_with(config: PlannerConfig) -> PlanBuilder {
    init_tracing();
    PlanBuilder::new(
        Arc::new(catalog()),
        Arc::new(BuiltinFunctionRegistry::new()),
        config,
    )
}

pub fn builder() -> PlanBuilder {
    builder_with(PlannerConfig::default())
}
