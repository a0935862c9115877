//! ORDER BY sorting
//!
//! Sorts the rows of a window batch or join result, or the groups of a grouped
//! set. Sort keys are evaluated once per row and validated before sorting, so a
//! type conflict fails the whole sort without reordering anything.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::ast::{OrderByExpr, OrderDirection};
use crate::edgerule::sql::execution::collection::{Collection, WindowRange};
use crate::edgerule::sql::execution::expression::{
    AggregateData, ExpressionEvaluator, FunctionRegistry, MultiValuer, Valuer,
};
use crate::edgerule::sql::execution::utils::FieldValueComparator;
use crate::edgerule::sql::execution::{FieldValue, StreamData};
use std::cmp::Ordering;

/// Operator for ORDER BY sorting
///
/// The sort is stable: rows with equal keys keep their arrival order.
/// NULL keys go last in both directions.
pub struct OrderOperator {
    /// ORDER BY expressions in order of priority
    sort_fields: Vec<OrderByExpr>,
}

/// Comparable type groups; every non-null key of one sort field must share one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortClass {
    Numeric,
    Boolean,
    String,
    Timestamp,
}

impl SortClass {
    /// Class of a non-null sort key, `None` for values that cannot be sorted
    fn of(value: &FieldValue) -> Option<SortClass> {
        match value {
            FieldValue::Integer(_) | FieldValue::Float(_) => Some(SortClass::Numeric),
            FieldValue::Boolean(_) => Some(SortClass::Boolean),
            FieldValue::String(_) => Some(SortClass::String),
            FieldValue::Timestamp(_) => Some(SortClass::Timestamp),
            _ => None,
        }
    }
}

impl OrderOperator {
    /// Create a sorting operator
    ///
    /// An empty `sort_fields` list makes the operator a pass-through.
    pub fn new(sort_fields: Vec<OrderByExpr>) -> Self {
        Self { sort_fields }
    }

    /// Evaluate every ORDER BY expression against one row or group
    ///
    /// # Arguments
    ///
    /// * `registry` - Functions available to the sort expressions
    /// * `row` - Row (or group representative) the expressions read from
    /// * `aggregate` - Group rows for aggregate calls, `None` for plain rows
    /// * `window_range` - Bounds of the enclosing window, if any
    ///
    /// # Returns
    ///
    /// One key per sort field, in the order of `sort_fields`
    fn sort_keys(
        &self,
        registry: &FunctionRegistry,
        row: &dyn Valuer,
        aggregate: Option<&dyn AggregateData>,
        window_range: Option<&WindowRange>,
    ) -> Result<Vec<FieldValue>, SqlError> {
        let mut evaluator = ExpressionEvaluator::new(MultiValuer::for_row(row, window_range), registry);
        if let Some(data) = aggregate {
            evaluator = evaluator.with_aggregate(data);
        }
        self.sort_fields
            .iter()
            .map(|field| evaluator.evaluate(&field.expr))
            .collect()
    }

    /// Sort keys of every row (or group) of `collection`, in order
    fn collect_keys(
        &self,
        registry: &FunctionRegistry,
        collection: &dyn Collection,
        grouped: bool,
    ) -> Result<Vec<Vec<FieldValue>>, SqlError> {
        let window_range = collection.window_range();
        let mut keys = Vec::with_capacity(collection.len());
        if grouped {
            collection.group_range(&mut |_, group| {
                keys.push(self.sort_keys(registry, group.as_valuer(), Some(group.as_aggregate()), window_range)?);
                Ok(())
            })?;
        } else {
            for_each_row(collection, &mut |row| {
                keys.push(self.sort_keys(registry, row, None, window_range)?);
                Ok(())
            })?;
        }
        Ok(keys)
    }

    /// Stable order of row indices by their sort keys
    ///
    /// Every sort field is checked for mixed types first, so an error
    /// never leaves the collection half sorted.
    ///
    /// # Returns
    ///
    /// `order[i]` is the index of the row that belongs at position `i`
    fn sorted_indices(&self, keys: &[Vec<FieldValue>]) -> Result<Vec<usize>, SqlError> {
        for field_index in 0..self.sort_fields.len() {
            validate_column(keys.iter().map(|k| &k[field_index]))?;
        }
        let mut indices: Vec<usize> = (0..keys.len()).collect();
        indices.sort_by(|&a, &b| self.compare(&keys[a], &keys[b]));
        Ok(indices)
    }

    /// Compare two key vectors field by field, applying each direction
    fn compare(&self, left: &[FieldValue], right: &[FieldValue]) -> Ordering {
        for ((field, l), r) in self.sort_fields.iter().zip(left).zip(right) {
            let ordering = match (l.is_null(), r.is_null()) {
                (true, true) => Ordering::Equal,
                // Nulls last whatever the direction
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => {
                    let ordering = compare_values(l, r);
                    match field.direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Visit every row of an ungrouped collection read-only
fn for_each_row(
    collection: &dyn Collection,
    visit: &mut dyn FnMut(&dyn Valuer) -> Result<(), SqlError>,
) -> Result<(), SqlError> {
    collection.group_range(&mut |_, group| {
        for row in group.aggregate_rows() {
            visit(row)?;
        }
        Ok(())
    })
}

/// Check that all non-null keys of one sort field belong to one class
///
/// Integers and floats share the numeric class. The first conflicting
/// value is reported as a type error against the first key seen.
fn validate_column<'a>(values: impl Iterator<Item = &'a FieldValue>) -> Result<(), SqlError> {
    let mut first: Option<(SortClass, &FieldValue)> = None;
    for value in values.filter(|v| !v.is_null()) {
        match (first, SortClass::of(value)) {
            (None, Some(class)) => first = Some((class, value)),
            (Some((expected, _)), Some(class)) if class == expected => {}
            _ => {
                let seen = first.map_or(value, |(_, v)| v);
                log::debug!(
                    "incompatible types for comparison: {} and {}",
                    seen.type_name(),
                    value.type_name()
                );
                return Err(SqlError::TypeError {
                    expected: seen.type_name().to_string(),
                    actual: value.type_name().to_string(),
                    value: Some(value.to_string()),
                });
            }
        }
    }
    Ok(())
}

/// Total order over two keys of the same class. NaN sorts after every number.
fn compare_values(left: &FieldValue, right: &FieldValue) -> Ordering {
    match (left, right) {
        (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a.cmp(b),
        _ => FieldValueComparator::ordering(left, right)
            .unwrap_or_else(|| is_nan(left).cmp(&is_nan(right))),
    }
}

fn is_nan(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Float(f) if f.is_nan())
}

/// Reorder `items` so that position `i` holds the item previously at `order[i]`
fn permute<T>(items: &mut Vec<T>, order: &[usize]) {
    let mut slots: Vec<Option<T>> = items.drain(..).map(Some).collect();
    items.extend(order.iter().filter_map(|&i| slots[i].take()));
}

impl Operator for OrderOperator {
    fn name(&self) -> &str {
        "order"
    }

    /// Sort the rows of a window or join result, or the groups of a grouped set
    ///
    /// Single records and errors pass through unchanged.
    fn process(
        &self,
        context: &mut ProcessorContext,
        mut data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        if self.sort_fields.is_empty() {
            return Ok(Some(data));
        }
        let registry = context.registry.as_ref();
        let grouped = matches!(data, StreamData::Grouped(_));
        let Some(collection) = data.as_collection() else {
            // A single record or an error has nothing to sort
            return Ok(Some(data));
        };
        let keys = self.collect_keys(registry, collection, grouped)?;
        let order = self.sorted_indices(&keys)?;
        log::trace!("Sorted order {:?}", order);
        match &mut data {
            StreamData::Window(batch) => permute(&mut batch.rows, &order),
            StreamData::Join(result) => permute(&mut result.tuples, &order),
            StreamData::Grouped(set) => permute(&mut set.groups, &order),
            StreamData::Record(_) | StreamData::Error(_) => {}
        }
        Ok(Some(data))
    }
}
