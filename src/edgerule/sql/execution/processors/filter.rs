//! WHERE clause filtering
//!
//! Evaluates the rule's condition against every row of the incoming data.
//! Single records pass or disappear; collections are filtered in place.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::ast::Expr;
use crate::edgerule::sql::execution::StreamData;
use crate::edgerule::sql::execution::collection::Collection;
use crate::edgerule::sql::execution::expression::{ExpressionEvaluator, MultiValuer};

/// Drops rows for which the condition is not true
///
/// A NULL condition counts as false. A condition that evaluates to a
/// non-boolean value is a type error, not a silent drop.
pub struct FilterOperator {
    /// Boolean expression from the WHERE clause
    condition: Expr,
}

impl FilterOperator {
    /// Create a filter for the given WHERE condition
    pub fn new(condition: Expr) -> Self {
        Self { condition }
    }

    /// Keep the rows of `collection` that satisfy the condition
    ///
    /// # Arguments
    ///
    /// * `context` - Processor context holding the function registry
    /// * `collection` - Window or join result, filtered in place
    ///
    /// # Returns
    ///
    /// The first evaluation error, if any row fails to evaluate
    fn filter_collection(
        &self,
        context: &ProcessorContext,
        collection: &mut dyn Collection,
    ) -> Result<(), SqlError> {
        let registry = context.registry.as_ref();
        let window_range = collection.window_range().copied();
        collection.range_mut(&mut |index, row| {
            let evaluator = ExpressionEvaluator::new(
                MultiValuer::for_row(row.as_valuer(), window_range.as_ref()),
                registry,
            );
            let keep = evaluator.evaluate_condition(&self.condition)?;
            log::trace!("Filter row {} kept: {}", index, keep);
            Ok(keep)
        })
    }
}

impl Operator for FilterOperator {
    fn name(&self) -> &str {
        "filter"
    }

    /// Filter a record, window or join result
    ///
    /// Windows are forwarded even when every row is dropped. A failing
    /// record, or a join result left empty, produces no output.
    fn process(
        &self,
        context: &mut ProcessorContext,
        data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        match data {
            StreamData::Record(record) => {
                let evaluator = ExpressionEvaluator::new(
                    MultiValuer::for_row(&record, None),
                    context.registry.as_ref(),
                );
                if evaluator.evaluate_condition(&self.condition)? {
                    Ok(Some(StreamData::Record(record)))
                } else {
                    Ok(None)
                }
            }
            StreamData::Window(mut batch) => {
                self.filter_collection(context, &mut batch)?;
                // An empty window still closes, so downstream sees it
                Ok(Some(StreamData::Window(batch)))
            }
            StreamData::Join(mut result) => {
                self.filter_collection(context, &mut result)?;
                if result.is_empty() {
                    return Ok(None);
                }
                Ok(Some(StreamData::Join(result)))
            }
            other @ (StreamData::Grouped(_) | StreamData::Error(_)) => Err(SqlError::structural(
                format!("filter cannot be applied to a {}", other.kind()),
            )),
        }
    }
}
