use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use rill_common::{Result, RillError};
use serde::{Deserialize, Serialize};

/// Read-only view of the stream/table schemas a statement may reference.
///
/// Lookups are case-insensitive.
pub trait Catalog {
    fn lookup(&self, name: &str) -> Option<SchemaRef>;
}

/// A relation as described in a JSON catalog fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// In-memory catalog, keyed by lower-cased relation name.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    relations: HashMap<String, SchemaRef>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` under `name`; returns `true` if an entry was replaced.
    pub fn register(&mut self, name: &str, schema: SchemaRef) -> bool {
        self.relations
            .insert(name.to_ascii_lowercase(), schema)
            .is_some()
    }

    pub fn with_relation(mut self, name: &str, schema: SchemaRef) -> Self {
        self.register(name, schema);
        self
    }

    pub fn relation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.relations.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn register_def(&mut self, def: &RelationDef) -> Result<()> {
        let fields = def
            .columns
            .iter()
            .map(|c| Ok(Field::new(&c.name, parse_type_name(&c.type_name)?, true)))
            .collect::<Result<Vec<_>>>()?;
        self.register(&def.name, Arc::new(Schema::new(fields)));
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let defs: Vec<RelationDef> =
            serde_json::from_str(s).map_err(|e| RillError::InvalidConfig(e.to_string()))?;
        let mut cat = MemoryCatalog::new();
        for d in &defs {
            cat.register_def(d)?;
        }
        Ok(cat)
    }

    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }
}

impl Catalog for MemoryCatalog {
    fn lookup(&self, name: &str) -> Option<SchemaRef> {
        self.relations.get(&name.to_ascii_lowercase()).cloned()
    }
}

/// Map a SQL type name (as written in fixtures and CAST) to an arrow type.
pub fn parse_type_name(name: &str) -> Result<DataType> {
    let upper = name.trim().to_ascii_uppercase();
    let base = upper.split('(').next().unwrap_or("").trim();
    match base {
        "STRING" | "VARCHAR" | "TEXT" | "CHAR" => Ok(DataType::Utf8),
        "INT" | "INTEGER" => Ok(DataType::Int32),
        "BIGINT" | "LONG" => Ok(DataType::Int64),
        "DOUBLE" | "FLOAT" | "REAL" | "DOUBLE PRECISION" => Ok(DataType::Float64),
        "BOOLEAN" | "BOOL" => Ok(DataType::Boolean),
        _ => Err(RillError::InvalidConfig(format!("unsupported column type '{name}'"))),
    }
}
