//! GROUP BY processing

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::ast::Expr;
use crate::edgerule::sql::execution::collection::{GroupedRows, GroupedSet, Row, WindowRange};
use crate::edgerule::sql::execution::expression::{ExpressionEvaluator, FunctionRegistry, MultiValuer, Valuer};
use crate::edgerule::sql::execution::StreamData;
use std::collections::HashMap;

/// Splits a window batch or join result into groups by dimension values
///
/// Groups are emitted in the order their first row arrived, and rows keep
/// their input order inside a group.
pub struct AggregateOperator {
    /// GROUP BY expressions; may reference the window range
    dimensions: Vec<Expr>,
}

impl AggregateOperator {
    /// Create a grouping operator; no dimensions means pass-through
    pub fn new(dimensions: Vec<Expr>) -> Self {
        Self { dimensions }
    }

    /// Group key of one row: the string form of every dimension value, in order
    ///
    /// Values stay separate so that a comma inside one value cannot merge
    /// two different groups.
    fn group_key(
        &self,
        registry: &FunctionRegistry,
        row: &dyn Valuer,
        window_range: Option<&WindowRange>,
    ) -> Result<Vec<String>, SqlError> {
        let evaluator = ExpressionEvaluator::new(MultiValuer::for_row(row, window_range), registry);
        self.dimensions
            .iter()
            .map(|dimension| evaluator.evaluate(dimension).map(|value| value.to_string()))
            .collect()
    }

    /// Partition `rows` by group key
    ///
    /// # Arguments
    ///
    /// * `registry` - Functions available to the dimension expressions
    /// * `rows` - Records or join tuples in arrival order
    /// * `window_range` - Bounds copied onto the set and every group
    ///
    /// # Returns
    ///
    /// The grouped set, or the first dimension evaluation error
    fn group(
        &self,
        registry: &FunctionRegistry,
        rows: Vec<Row>,
        window_range: Option<WindowRange>,
    ) -> Result<GroupedSet, SqlError> {
        let mut groups: Vec<GroupedRows> = Vec::new();
        let mut positions: HashMap<Vec<String>, usize> = HashMap::new();
        for row in rows {
            let key = self.group_key(registry, &row, window_range.as_ref())?;
            log::trace!("Row grouped under key {:?}", key);
            match positions.get(&key) {
                Some(&position) => groups[position].rows.push(row),
                None => {
                    positions.insert(key, groups.len());
                    groups.push(GroupedRows {
                        rows: vec![row],
                        window_range,
                        ..GroupedRows::default()
                    });
                }
            }
        }
        Ok(GroupedSet {
            groups,
            window_range,
        })
    }
}

impl Operator for AggregateOperator {
    fn name(&self) -> &str {
        "aggregate"
    }

    /// Group a window batch or join result into a grouped set
    ///
    /// An empty input produces no output.
    fn process(
        &self,
        context: &mut ProcessorContext,
        data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        if self.dimensions.is_empty() {
            return Ok(Some(data));
        }
        let (rows, window_range) = match data {
            StreamData::Window(batch) => (
                batch.rows.into_iter().map(Row::Record).collect::<Vec<_>>(),
                batch.window_range,
            ),
            StreamData::Join(result) => (
                result.tuples.into_iter().map(Row::Join).collect(),
                result.window_range,
            ),
            other => {
                return Err(SqlError::structural(format!(
                    "group by is only supported on a window batch or join result, received a {}",
                    other.kind()
                )));
            }
        };
        if rows.is_empty() {
            return Ok(None);
        }
        let set = self.group(context.registry.as_ref(), rows, window_range)?;
        log::debug!("Grouped into {} groups", set.groups.len());
        Ok(Some(StreamData::Grouped(set)))
    }
}
