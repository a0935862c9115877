//! HAVING clause filtering
//!
//! In the default mode the condition is evaluated once per group, with
//! aggregate calls reading the group's rows. In incremental mode aggregates
//! are running values already calculated on each row, so the condition is
//! evaluated per row instead.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::ast::Expr;
use crate::edgerule::sql::execution::collection::{Collection, CollectionRow};
use crate::edgerule::sql::execution::expression::{ExpressionEvaluator, FunctionRegistry, MultiValuer};
use crate::edgerule::sql::execution::StreamData;

/// Filters groups on a condition over their aggregates
pub struct HavingOperator {
    /// Boolean expression from the HAVING clause
    condition: Expr,
    /// Expressions run once per pass after the condition
    triggers: Vec<Expr>,
    /// Evaluate the condition per row instead of per group
    incremental: bool,
}

impl HavingOperator {
    /// Create a group-mode HAVING filter without triggers
    pub fn new(condition: Expr) -> Self {
        Self {
            condition,
            triggers: Vec::new(),
            incremental: false,
        }
    }

    /// Attach expressions evaluated for their side effects after the condition
    pub fn with_triggers(mut self, triggers: Vec<Expr>) -> Self {
        self.triggers = triggers;
        self
    }

    /// Switch between per-group and per-row evaluation
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    fn group_evaluator<'a>(
        registry: &'a FunctionRegistry,
        group: &'a dyn CollectionRow,
        collection: &'a dyn Collection,
    ) -> ExpressionEvaluator<'a> {
        ExpressionEvaluator::new(
            MultiValuer::for_row(group.as_valuer(), collection.window_range()),
            registry,
        )
        .with_aggregate(group.as_aggregate())
    }

    /// Indices of the groups whose condition holds
    fn passing_groups(
        &self,
        registry: &FunctionRegistry,
        collection: &dyn Collection,
    ) -> Result<Vec<usize>, SqlError> {
        let mut passing = Vec::new();
        collection.group_range(&mut |index, group| {
            let evaluator = Self::group_evaluator(registry, group, collection);
            if evaluator.evaluate_condition(&self.condition)? {
                passing.push(index);
            }
            Ok(())
        })?;
        Ok(passing)
    }

    /// Evaluate every trigger against the first group only
    fn run_triggers(&self, registry: &FunctionRegistry, collection: &dyn Collection) -> Result<(), SqlError> {
        if self.triggers.is_empty() {
            return Ok(());
        }
        let mut ran = false;
        collection.group_range(&mut |_, group| {
            if ran {
                return Ok(());
            }
            ran = true;
            let evaluator = Self::group_evaluator(registry, group, collection);
            for trigger in &self.triggers {
                evaluator.evaluate(trigger)?;
            }
            Ok(())
        })
    }

    fn filter_rows(&self, registry: &FunctionRegistry, collection: &mut dyn Collection) -> Result<(), SqlError> {
        let window_range = collection.window_range().copied();
        collection.range_mut(&mut |_, row| {
            let evaluator = ExpressionEvaluator::new(
                MultiValuer::for_row(row.as_valuer(), window_range.as_ref()),
                registry,
            );
            evaluator.evaluate_condition(&self.condition)
        })
    }
}

impl Operator for HavingOperator {
    fn name(&self) -> &str {
        "having"
    }

    /// Filter a record, window, join result or grouped set
    ///
    /// A window or join result without grouping is a single group: it passes
    /// or disappears as a whole. Output that ends up empty is dropped.
    fn process(
        &self,
        context: &mut ProcessorContext,
        mut data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        let registry = context.registry.as_ref();
        if let StreamData::Record(record) = &data {
            let keep = ExpressionEvaluator::new(MultiValuer::for_row(record, None), registry)
                .evaluate_condition(&self.condition)?;
            return Ok(keep.then_some(data));
        }
        let kind = data.kind();
        let grouped = matches!(data, StreamData::Grouped(_));
        let Some(collection) = data.as_collection_mut() else {
            return Err(SqlError::structural(format!(
                "having cannot be applied to a {}",
                kind
            )));
        };

        if self.incremental {
            self.filter_rows(registry, collection)?;
            self.run_triggers(registry, collection)?;
        } else {
            let passing = self.passing_groups(registry, collection)?;
            log::trace!("Having kept groups {:?}", passing);
            self.run_triggers(registry, collection)?;
            if grouped {
                collection.filter_indices(&passing);
            } else if passing.is_empty() {
                // An ungrouped collection is a single group
                return Ok(None);
            }
        }

        if collection.is_empty() {
            return Ok(None);
        }
        Ok(Some(data))
    }
}
