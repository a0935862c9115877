//! SELECT list projection
//!
//! Each row is evaluated against the SELECT list, pruned to the selected
//! columns, and given the computed values as aliases. Grouped input, and any
//! aggregate projection, yields one flattened row per group.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::ast::{Expr, SelectField, split_column};
use crate::edgerule::sql::execution::collection::{Collection, CollectionRow, TupleRow, WindowBatch, WindowRange};
use crate::edgerule::sql::execution::expression::{
    AggregateData, ExpressionEvaluator, FunctionRegistry, MultiValuer, Valuer,
};
use crate::edgerule::sql::execution::{FieldValue, PickColumn, StreamData, StreamRecord};
use std::collections::HashSet;

/// Name of the metadata column added when metadata is sent to the sink
pub const META_FIELD: &str = "__meta";

/// Projects rows onto a SELECT list
#[derive(Debug, Clone, Default)]
pub struct ProjectOperator {
    /// Plain columns, kept from the row itself
    columns: Vec<PickColumn>,
    /// Computed fields with an alias
    alias_fields: Vec<(String, Expr)>,
    /// Computed fields without an alias, named after their expression
    expr_fields: Vec<(String, Expr)>,
    all_wildcard: bool,
    /// Streams selected with `stream.*`
    wildcard_emitters: HashSet<String>,
    /// Columns removed from a wildcard selection
    except_names: Vec<String>,
    send_meta: bool,
    send_nil: bool,
    limit: Option<usize>,
    is_agg: bool,
}

impl ProjectOperator {
    /// Build the projection of a SELECT list
    pub fn from_fields(fields: Vec<SelectField>) -> Self {
        let mut op = Self::default();
        for (index, field) in fields.into_iter().enumerate() {
            match field {
                SelectField::Column(name) => {
                    let (stream, column) = split_column(&name);
                    op.columns.push(PickColumn::new(column, stream));
                }
                SelectField::AliasedColumn { column, alias } => {
                    op.alias_fields.push((alias, Expr::Column(column)));
                }
                SelectField::Expression {
                    expr: Expr::Column(name),
                    alias: None,
                } => {
                    let (stream, column) = split_column(&name);
                    op.columns.push(PickColumn::new(column, stream));
                }
                SelectField::Expression {
                    expr,
                    alias: Some(alias),
                } => op.alias_fields.push((alias, expr)),
                SelectField::Expression { expr, alias: None } => {
                    let name = expression_name(&expr, index);
                    op.expr_fields.push((name, expr));
                }
                SelectField::Wildcard => op.all_wildcard = true,
                SelectField::QualifiedWildcard(stream) => {
                    op.wildcard_emitters.insert(stream);
                }
                SelectField::WildcardExcept(names) => {
                    op.all_wildcard = true;
                    op.except_names = names;
                }
            }
        }
        op
    }

    pub fn with_send_meta(mut self, send_meta: bool) -> Self {
        self.send_meta = send_meta;
        self
    }

    pub fn with_send_nil(mut self, send_nil: bool) -> Self {
        self.send_nil = send_nil;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Project each batch (or group) onto one row, as for `SELECT count(*) ...`
    pub fn aggregate(mut self, is_agg: bool) -> Self {
        self.is_agg = is_agg;
        self
    }

    /// Evaluate every computed field against the row before it is pruned
    fn compute(
        &self,
        registry: &FunctionRegistry,
        row: &dyn Valuer,
        aggregate: Option<&dyn AggregateData>,
        window_range: Option<&WindowRange>,
    ) -> Result<Vec<(String, FieldValue)>, SqlError> {
        let mut evaluator = ExpressionEvaluator::new(MultiValuer::for_row(row, window_range), registry);
        if let Some(data) = aggregate {
            evaluator = evaluator.with_aggregate(data);
        }
        let evaluate = |name: &str, expr: &Expr| {
            evaluator
                .evaluate(expr)
                .map_err(|e| SqlError::ExpressionError {
                    field: name.to_string(),
                    source: Box::new(e),
                })
        };

        let mut values = Vec::with_capacity(self.expr_fields.len() + self.alias_fields.len() + 1);
        for (name, expr) in &self.expr_fields {
            match evaluate(name, expr)? {
                FieldValue::Map(map) => values.extend(map),
                value => values.push((name.clone(), value)),
            }
        }
        for (alias, expr) in &self.alias_fields {
            let value = evaluate(alias, expr)?;
            if value.is_null() && !self.send_nil {
                log::trace!("Alias {} is NULL, not sent", alias);
                continue;
            }
            values.push((alias.clone(), value));
        }
        if self.send_meta && !self.is_agg {
            if let Some(meta) = row.meta("*", None) {
                values.push((META_FIELD.to_string(), meta));
            }
        }
        Ok(values)
    }

    /// Prune `row` to the selected shape and attach the computed values
    fn reshape(&self, row: &mut dyn TupleRow, values: Vec<(String, FieldValue)>) {
        if self.except_names.is_empty() {
            row.pick(self.all_wildcard, &self.columns, &self.wildcard_emitters);
        } else {
            let mut columns = self.columns.clone();
            columns.extend(
                row.to_map()
                    .into_keys()
                    .filter(|name| !name.starts_with("$$") && !self.except_names.contains(name))
                    .map(|name| PickColumn::new(&name, None)),
            );
            row.pick(false, &columns, &self.wildcard_emitters);
        }
        for (name, value) in values {
            row.append_alias(&name, value);
        }
    }

    fn project_row(
        &self,
        registry: &FunctionRegistry,
        row: &mut dyn TupleRow,
        window_range: Option<&WindowRange>,
    ) -> Result<(), SqlError> {
        let values = self.compute(registry, row.as_valuer(), None, window_range)?;
        self.reshape(row, values);
        Ok(())
    }

    /// Project a whole group onto one flat row
    fn project_group<G: CollectionRow>(
        &self,
        registry: &FunctionRegistry,
        group: &mut G,
        window_range: Option<&WindowRange>,
    ) -> Result<StreamRecord, SqlError> {
        let values = self.compute(registry, group.as_valuer(), Some(group.as_aggregate()), window_range)?;
        self.reshape(group, values);
        Ok(StreamRecord::new(group.emitter(), group.to_map()))
    }

    fn limited(&self, len: usize) -> usize {
        self.limit.map_or(len, |limit| limit.min(len))
    }

    fn project_collection(&self, registry: &FunctionRegistry, collection: &mut dyn Collection) -> Result<(), SqlError> {
        let limit = self.limited(collection.len());
        if limit < collection.len() {
            collection.filter_indices(&(0..limit).collect::<Vec<_>>());
        }
        let window_range = collection.window_range().copied();
        collection.range_mut(&mut |_, row| {
            self.project_row(registry, row, window_range.as_ref())?;
            Ok(true)
        })
    }
}

/// Output name of an unaliased computed field
fn expression_name(expr: &Expr, index: usize) -> String {
    match expr {
        Expr::Column(name) => split_column(name).1.to_string(),
        Expr::Function { name, .. } => name.clone(),
        Expr::Analytic(call) => call.name.clone(),
        Expr::Meta(name) => split_column(name).1.to_string(),
        Expr::FieldAccess { field, .. } => field.clone(),
        _ => format!("field_{}", index),
    }
}

impl Operator for ProjectOperator {
    fn name(&self) -> &str {
        "project"
    }

    fn process(
        &self,
        context: &mut ProcessorContext,
        data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        let registry = context.registry.as_ref();
        if self.limit == Some(0) {
            log::debug!("Projection limit is 0, emitting nothing");
            return Ok(match data {
                StreamData::Record(_) => None,
                StreamData::Window(batch) => Some(StreamData::Window(WindowBatch::new(
                    Vec::new(),
                    batch.window_range,
                ))),
                StreamData::Join(mut result) => {
                    result.tuples.clear();
                    Some(StreamData::Join(result))
                }
                StreamData::Grouped(mut set) => {
                    set.groups.clear();
                    Some(StreamData::Grouped(set))
                }
                error @ StreamData::Error(_) => Some(error),
            });
        }

        match data {
            StreamData::Record(mut record) if !self.is_agg => {
                self.project_row(registry, &mut record, None)?;
                Ok(Some(StreamData::Record(record)))
            }
            StreamData::Record(record) => {
                let mut batch = WindowBatch::new(vec![record], None);
                let projected = self.project_group(registry, &mut batch, None)?;
                Ok(Some(StreamData::Record(projected)))
            }
            StreamData::Window(mut batch) if self.is_agg => {
                let window_range = batch.window_range;
                let projected = self.project_group(registry, &mut batch, window_range.as_ref())?;
                Ok(Some(StreamData::Window(WindowBatch::new(vec![projected], window_range))))
            }
            StreamData::Join(mut result) if self.is_agg => {
                let window_range = result.window_range;
                let projected = self.project_group(registry, &mut result, window_range.as_ref())?;
                Ok(Some(StreamData::Window(WindowBatch::new(vec![projected], window_range))))
            }
            StreamData::Grouped(mut set) => {
                let limit = self.limited(set.groups.len());
                let mut rows = Vec::with_capacity(limit);
                for group in set.groups.iter_mut().take(limit) {
                    let window_range = group.window_range.or(set.window_range);
                    rows.push(self.project_group(registry, group, window_range.as_ref())?);
                }
                Ok(Some(StreamData::Window(WindowBatch::new(rows, set.window_range))))
            }
            StreamData::Window(mut batch) => {
                self.project_collection(registry, &mut batch)?;
                Ok(Some(StreamData::Window(batch)))
            }
            StreamData::Join(mut result) => {
                self.project_collection(registry, &mut result)?;
                Ok(Some(StreamData::Join(result)))
            }
            error @ StreamData::Error(_) => Ok(Some(error)),
        }
    }
}
