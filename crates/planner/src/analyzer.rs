use std::collections::HashSet;

use arrow_schema::SchemaRef;
use rill_common::{NodeLocation, PlannerConfig, Result, RillError};
use tracing::debug;

use crate::ast::{
    ColumnRef, Expression, ExpressionKind, JoinType, Query, Relation, SelectItem, SinkKind, Statement, TableRef,
    WindowExpression,
};
use crate::catalog::Catalog;
use crate::schema::PlanSchema;
use crate::visitor::ExpressionRewriter;

/// A FROM/JOIN relation resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub name: String,
    pub alias: Option<String>,
    pub schema: SchemaRef,
}

impl ResolvedSource {
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Join between `sources[0]` (left) and `sources[1]` (right).
#[derive(Debug, Clone, PartialEq)]
pub struct JoinInfo {
    pub join_type: JoinType,
    pub criteria: Expression,
}

/// Where the statement's result is written.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkTarget {
    /// `CREATE STREAM|TABLE name AS ...`: a new relation.
    Create {
        kind: SinkKind,
        name: String,
        properties: Vec<(String, String)>,
    },
    /// `INSERT INTO name ...`: an existing relation.
    Insert { name: String },
}

/// Facts the analyzer extracted from one statement.
///
/// Built in a single pass by [`Analyzer::analyze`] and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    sources: Vec<ResolvedSource>,
    input_schema: PlanSchema,
    select_expressions: Vec<Expression>,
    select_names: Vec<String>,
    filter: Option<Expression>,
    group_by: Vec<Expression>,
    having: Option<Expression>,
    window: Option<WindowExpression>,
    limit: Option<u64>,
    join: Option<JoinInfo>,
    sink: Option<SinkTarget>,
}

impl Analysis {
    pub fn sources(&self) -> &[ResolvedSource] {
        &self.sources
    }

    /// Columns visible to the query body (both sides of a join, left first).
    pub fn input_schema(&self) -> &PlanSchema {
        &self.input_schema
    }

    /// Select-list expressions in source order, with `*` expanded.
    pub fn select_expressions(&self) -> &[Expression] {
        &self.select_expressions
    }

    /// Output column names, parallel to [`Analysis::select_expressions`].
    pub fn select_names(&self) -> &[String] {
        &self.select_names
    }

    pub fn filter(&self) -> Option<&Expression> {
        self.filter.as_ref()
    }

    pub fn group_by(&self) -> &[Expression] {
        &self.group_by
    }

    pub fn having(&self) -> Option<&Expression> {
        self.having.as_ref()
    }

    pub fn window(&self) -> Option<&WindowExpression> {
        self.window.as_ref()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn join(&self) -> Option<&JoinInfo> {
        self.join.as_ref()
    }

    pub fn sink(&self) -> Option<&SinkTarget> {
        self.sink.as_ref()
    }
}

/// Resolves a statement's relations and columns against a catalog.
pub struct Analyzer<'a> {
    catalog: &'a dyn Catalog,
    config: &'a PlannerConfig,
}

impl<'a> Analyzer<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: &'a PlannerConfig) -> Self {
        Self { catalog, config }
    }

    /// Analyze one statement.
    ///
    /// Error taxonomy:
    /// - `UnknownRelation`: FROM/JOIN/INSERT relation or column qualifier not found
    /// - `UnknownColumn` / `AmbiguousColumn`: column resolution failures
    /// - `Planning`: duplicate output names, CREATE ... AS over an existing relation
    pub fn analyze(&self, statement: &Statement) -> Result<Analysis> {
        let mut analysis = Analysis::default();
        let query = statement.query();

        self.analyze_relation(&query.from, &mut analysis)?;
        self.analyze_select(query, &mut analysis)?;
        self.analyze_clauses(query, &mut analysis)?;
        analysis.sink = self.analyze_sink(statement)?;

        debug!(
            sources = analysis.sources.len(),
            select = analysis.select_expressions.len(),
            group_by = analysis.group_by.len(),
            windowed = analysis.window.is_some(),
            "statement analyzed"
        );
        Ok(analysis)
    }

    fn resolve_source(&self, table: &TableRef) -> Result<ResolvedSource> {
        let schema = self
            .catalog
            .lookup(&table.name)
            .ok_or_else(|| RillError::UnknownRelation {
                name: table.name.clone(),
                location: table.location.unwrap_or_default(),
            })?;
        Ok(ResolvedSource {
            name: table.name.clone(),
            alias: table.alias.clone(),
            schema,
        })
    }

    fn analyze_relation(&self, relation: &Relation, analysis: &mut Analysis) -> Result<()> {
        match relation {
            Relation::Table(t) => {
                let source = self.resolve_source(t)?;
                analysis.input_schema = PlanSchema::from_relation(source.qualifier(), &source.schema);
                analysis.sources.push(source);
            }
            Relation::Join(j) => {
                let left = self.resolve_source(&j.left)?;
                let right = self.resolve_source(&j.right)?;
                if left.qualifier().eq_ignore_ascii_case(right.qualifier()) {
                    return Err(RillError::Planning(format!(
                        "relation '{}' appears twice in the join; alias one side",
                        left.qualifier()
                    )));
                }
                analysis.input_schema = PlanSchema::join(
                    &PlanSchema::from_relation(left.qualifier(), &left.schema),
                    &PlanSchema::from_relation(right.qualifier(), &right.schema),
                );
                analysis.sources.push(left);
                analysis.sources.push(right);

                let criteria = self.resolve_columns(&j.criteria, &analysis.input_schema)?;
                analysis.join = Some(JoinInfo {
                    join_type: j.join_type,
                    criteria,
                });
            }
        }
        Ok(())
    }

    fn analyze_select(&self, query: &Query, analysis: &mut Analysis) -> Result<()> {
        let joined = analysis.join.is_some();
        let schema = &analysis.input_schema;
        let mut exprs = vec![];
        let mut names = vec![];

        for item in &query.select {
            match item {
                SelectItem::Expression { expr, alias } => {
                    let expr = self.resolve_columns(expr, schema)?;
                    let name = match (alias, expr.as_column()) {
                        (Some(a), _) => a.clone(),
                        (None, Some(c)) => {
                            let idx = schema.resolve(c, expr.location())?;
                            let field = &schema.fields()[idx];
                            match (&field.qualifier, joined) {
                                (Some(q), true) => format!("{q}_{}", field.name),
                                _ => field.name.clone(),
                            }
                        }
                        (None, None) => self.config.column_alias(exprs.len()),
                    };
                    exprs.push(expr);
                    names.push(name);
                }
                SelectItem::Wildcard {
                    qualifier,
                    location,
                } => {
                    if let Some(q) = qualifier {
                        if !schema.has_qualifier(q) {
                            return Err(RillError::UnknownRelation {
                                name: q.clone(),
                                location: location.unwrap_or_default(),
                            });
                        }
                    }
                    for field in schema.fields() {
                        let field_q = field.qualifier.as_deref().unwrap_or_default();
                        if qualifier
                            .as_deref()
                            .is_some_and(|q| !q.eq_ignore_ascii_case(field_q))
                        {
                            continue;
                        }
                        if joined {
                            exprs.push(Expression::qualified_column(field_q, &field.name));
                            names.push(format!("{field_q}_{}", field.name));
                        } else {
                            exprs.push(Expression::column(&field.name));
                            names.push(field.name.clone());
                        }
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        for n in &names {
            if !seen.insert(n.to_ascii_uppercase()) {
                return Err(RillError::Planning(format!(
                    "duplicate output column name '{n}'; use AS to rename"
                )));
            }
        }

        analysis.select_expressions = exprs;
        analysis.select_names = names;
        Ok(())
    }

    fn analyze_clauses(&self, query: &Query, analysis: &mut Analysis) -> Result<()> {
        let schema = &analysis.input_schema;
        let filter = match &query.filter {
            Some(f) => Some(self.resolve_columns(f, schema)?),
            None => None,
        };
        let group_by = query
            .group_by
            .iter()
            .map(|g| self.resolve_columns(g, schema))
            .collect::<Result<Vec<_>>>()?;
        // HAVING may only name input columns; aggregate results are reached
        // through the aggregate calls themselves.
        let having = match &query.having {
            Some(h) => Some(self.resolve_columns(h, schema)?),
            None => None,
        };

        analysis.filter = filter;
        analysis.group_by = group_by;
        analysis.having = having;
        analysis.window = query.window;
        analysis.limit = query.limit;
        Ok(())
    }

    fn analyze_sink(&self, statement: &Statement) -> Result<Option<SinkTarget>> {
        match statement {
            Statement::Query(_) => Ok(None),
            Statement::CreateAsSelect {
                kind,
                name,
                properties,
                ..
            } => {
                if self.catalog.lookup(name).is_some() {
                    return Err(RillError::Planning(format!(
                        "cannot create {}: relation '{name}' already exists",
                        match kind {
                            SinkKind::Stream => "stream",
                            SinkKind::Table => "table",
                        }
                    )));
                }
                Ok(Some(SinkTarget::Create {
                    kind: *kind,
                    name: name.clone(),
                    properties: properties.clone(),
                }))
            }
            Statement::InsertInto { target, .. } => {
                if self.catalog.lookup(target).is_none() {
                    return Err(RillError::UnknownRelation {
                        name: target.clone(),
                        location: NodeLocation::unknown(),
                    });
                }
                Ok(Some(SinkTarget::Insert {
                    name: target.clone(),
                }))
            }
        }
    }

    /// Resolve every column reference in `expr`, returning a copy spelled the
    /// way the input schema spells it.
    fn resolve_columns(&self, expr: &Expression, schema: &PlanSchema) -> Result<Expression> {
        let mut resolver = ColumnResolver {
            schema,
            max_depth: self.config.max_expression_depth,
        };
        expr.rewrite_with(&mut resolver)
    }
}

/// Checks that every column reference names exactly one input column and
/// replaces it with the schema's spelling of that column.
///
/// Unqualified references stay unqualified.
struct ColumnResolver<'s> {
    schema: &'s PlanSchema,
    max_depth: usize,
}

impl ExpressionRewriter for ColumnResolver<'_> {
    fn rewrite(&mut self, expr: &Expression) -> Result<Option<Expression>> {
        let Some(c) = expr.as_column() else {
            return Ok(None);
        };
        let idx = self.schema.resolve(c, expr.location())?;
        let field = &self.schema.fields()[idx];
        let qualifier = match (&c.qualifier, &field.qualifier) {
            (Some(_), Some(q)) => Some(q.clone()),
            (written, _) => written.clone(),
        };
        let column = ColumnRef {
            qualifier,
            name: field.name.clone(),
        };
        Ok(Some(
            Expression::new(ExpressionKind::Column(column)).with_location(expr.raw_location()),
        ))
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }
}
