use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use rill_common::{NodeLocation, Result, RillError};
use serde::{Deserialize, Serialize};

use crate::ast::ColumnRef;

/// One output column of a plan node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanField {
    /// Relation the column came from; `None` for computed columns.
    pub qualifier: Option<String>,
    pub name: String,
    pub data_type: DataType,
}

impl PlanField {
    pub fn new(qualifier: Option<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            qualifier,
            name: name.into(),
            data_type,
        }
    }

    fn qualified_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Ordered output columns of a plan node, with the qualifiers needed to
/// resolve column references against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSchema {
    fields: Vec<PlanField>,
}

impl PlanSchema {
    pub fn new(fields: Vec<PlanField>) -> Self {
        Self { fields }
    }

    /// Columns of a catalog relation, all qualified by `qualifier`.
    pub fn from_relation(qualifier: &str, schema: &Schema) -> Self {
        Self {
            fields: schema
                .fields()
                .iter()
                .map(|f| PlanField::new(Some(qualifier.to_string()), f.name(), f.data_type().clone()))
                .collect(),
        }
    }

    /// Left columns followed by right columns.
    pub fn join(left: &PlanSchema, right: &PlanSchema) -> Self {
        let mut fields = left.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Self { fields }
    }

    pub fn fields(&self) -> &[PlanField] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Option<&PlanField> {
        self.fields.get(idx)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_qualifier(&self, qualifier: &str) -> bool {
        self.fields.iter().any(|f| {
            f.qualifier
                .as_deref()
                .is_some_and(|q| q.eq_ignore_ascii_case(qualifier))
        })
    }

    /// Index of the field `column` refers to (case-insensitive).
    ///
    /// Unknown qualifier -> `UnknownRelation`; no match -> `UnknownColumn`;
    /// several matches -> `AmbiguousColumn` listing the qualified candidates.
    pub fn resolve(&self, column: &ColumnRef, location: NodeLocation) -> Result<usize> {
        if let Some(q) = &column.qualifier {
            if !self.has_qualifier(q) {
                return Err(RillError::UnknownRelation {
                    name: q.clone(),
                    location,
                });
            }
        }

        let found: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.name.eq_ignore_ascii_case(&column.name)
                    && match &column.qualifier {
                        Some(q) => f
                            .qualifier
                            .as_deref()
                            .is_some_and(|fq| fq.eq_ignore_ascii_case(q)),
                        None => true,
                    }
            })
            .map(|(i, _)| i)
            .collect();

        match found.as_slice() {
            [] => Err(RillError::UnknownColumn {
                name: column.to_string(),
                location,
            }),
            [idx] => Ok(*idx),
            many => Err(RillError::AmbiguousColumn {
                name: column.to_string(),
                candidates: many
                    .iter()
                    .map(|i| self.fields[*i].qualified_name())
                    .collect(),
                location,
            }),
        }
    }

    pub fn to_arrow(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.fields
                .iter()
                .map(|f| Field::new(&f.name, f.data_type.clone(), true))
                .collect::<Vec<_>>(),
        ))
    }
}
