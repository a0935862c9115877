//! Windowed joins between streams
//!
//! The input is a [`WindowBatch`] holding the rows of every joined stream. The
//! first clause pairs rows of two streams; every later clause joins the tuples
//! accumulated so far with the rows of one more stream.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::ast::{DEFAULT_STREAM, JoinClause, JoinType};
use crate::edgerule::sql::execution::collection::{JoinResult, JoinTuple, WindowBatch, WindowRange};
use crate::edgerule::sql::execution::expression::{ExpressionEvaluator, FunctionRegistry, MultiValuer};
use crate::edgerule::sql::execution::{FieldValue, StreamData, StreamRecord};
use std::collections::HashSet;

/// Joins the streams of a window batch
pub struct JoinOperator {
    /// Name (or alias) of the FROM stream
    from: String,
    /// Clauses applied left to right
    joins: Vec<JoinClause>,
}

impl JoinOperator {
    /// Create a join of `from` with the streams named by `joins`
    pub fn new(from: &str, joins: Vec<JoinClause>) -> Self {
        Self {
            from: from.to_string(),
            joins,
        }
    }

    /// Left and right stream of the first clause.
    ///
    /// Exactly two stream qualifiers in the condition name the streams in order
    /// of appearance; otherwise FROM is the left side and the clause's stream the right.
    fn stream_names(&self, clause: &JoinClause) -> (String, String) {
        if clause.join_type != JoinType::Cross {
            if let Some(condition) = &clause.condition {
                let qualifiers: Vec<String> = condition
                    .stream_qualifiers()
                    .into_iter()
                    .filter(|q| q != DEFAULT_STREAM)
                    .collect();
                if let [left, right] = qualifiers.as_slice() {
                    return (left.clone(), right.clone());
                }
            }
        }
        (self.from.clone(), clause.right_name().to_string())
    }

    /// Run every clause over the rows of `batch`
    ///
    /// # Returns
    ///
    /// The joined tuples, each holding one row per stream that contributed,
    /// or the first condition error
    fn join(&self, registry: &FunctionRegistry, batch: &WindowBatch) -> Result<Vec<JoinTuple>, SqlError> {
        let mut tuples = Vec::new();
        for (index, clause) in self.joins.iter().enumerate() {
            let ctx = ClauseContext {
                clause,
                registry,
                window_range: batch.window_range.as_ref(),
            };
            if index == 0 {
                let (left_stream, right_stream) = self.stream_names(clause);
                log::trace!(
                    "Joining {} with {} as {:?}",
                    left_stream,
                    right_stream,
                    clause.join_type
                );
                let lefts: Vec<JoinTuple> = batch
                    .rows_by_emitter(&left_stream)
                    .into_iter()
                    .map(|row| JoinTuple::new(vec![row.clone()]))
                    .collect();
                let rights = batch.rows_by_emitter(&right_stream);
                tuples = ctx.join_sets(&lefts, &rights)?;
            } else {
                let rights = batch.rows_by_emitter(clause.right_name());
                tuples = ctx.join_sets(&tuples, &rights)?;
            }
        }
        Ok(tuples)
    }
}

/// Evaluation inputs of one clause
struct ClauseContext<'a> {
    clause: &'a JoinClause,
    registry: &'a FunctionRegistry,
    window_range: Option<&'a WindowRange>,
}

impl ClauseContext<'_> {
    fn join_sets(&self, lefts: &[JoinTuple], rights: &[&StreamRecord]) -> Result<Vec<JoinTuple>, SqlError> {
        match self.clause.join_type {
            JoinType::Cross => Ok(lefts
                .iter()
                .flat_map(|left| rights.iter().map(move |right| combine(left, right)))
                .collect()),
            JoinType::Right => self.right_pass(lefts, rights),
            JoinType::Inner | JoinType::Left => Ok(self.left_pass(lefts, rights)?.0),
            JoinType::FullOuter => {
                let (mut tuples, matched) = self.left_pass(lefts, rights)?;
                tuples.extend(
                    rights
                        .iter()
                        .enumerate()
                        .filter(|(index, _)| !matched.contains(index))
                        .map(|(_, right)| JoinTuple::new(vec![(*right).clone()])),
                );
                Ok(tuples)
            }
        }
    }

    /// Left-driven pass; also returns the indices of right rows that matched anything
    fn left_pass(
        &self,
        lefts: &[JoinTuple],
        rights: &[&StreamRecord],
    ) -> Result<(Vec<JoinTuple>, HashSet<usize>), SqlError> {
        let keep_unmatched = self.clause.join_type != JoinType::Inner;
        let mut tuples = Vec::new();
        let mut matched_rights = HashSet::new();
        for left in lefts {
            let mut joined = false;
            for (index, right) in rights.iter().enumerate() {
                let candidate = combine(left, right);
                if self.matches(&candidate)? {
                    joined = true;
                    matched_rights.insert(index);
                    tuples.push(candidate);
                }
            }
            if !joined && keep_unmatched {
                tuples.push(left.clone());
            }
        }
        Ok((tuples, matched_rights))
    }

    /// Right-driven pass: each right row with every matching left tuple, or alone
    fn right_pass(&self, lefts: &[JoinTuple], rights: &[&StreamRecord]) -> Result<Vec<JoinTuple>, SqlError> {
        let mut tuples = Vec::new();
        for right in rights {
            let mut joined = false;
            for left in lefts {
                if self.matches(&combine(left, right))? {
                    joined = true;
                    let mut rows = Vec::with_capacity(left.rows.len() + 1);
                    rows.push((*right).clone());
                    rows.extend(left.rows.iter().cloned());
                    tuples.push(JoinTuple {
                        rows,
                        affiliate: left.affiliate.clone(),
                    });
                }
            }
            if !joined {
                tuples.push(JoinTuple::new(vec![(*right).clone()]));
            }
        }
        Ok(tuples)
    }

    /// Whether `candidate` satisfies the ON condition; NULL counts as false
    fn matches(&self, candidate: &JoinTuple) -> Result<bool, SqlError> {
        let Some(condition) = &self.clause.condition else {
            return Ok(true);
        };
        let evaluator = ExpressionEvaluator::new(
            MultiValuer::for_row(candidate, self.window_range),
            self.registry,
        );
        match evaluator.evaluate(condition)? {
            FieldValue::Boolean(b) => Ok(b),
            FieldValue::Null => Ok(false),
            other => {
                log::debug!("invalid join condition that returns non-bool value {}", other);
                Err(SqlError::TypeError {
                    expected: "BOOLEAN join condition".to_string(),
                    actual: other.type_name().to_string(),
                    value: Some(other.to_string()),
                })
            }
        }
    }
}

/// Extend `left` with one more stream row
fn combine(left: &JoinTuple, right: &StreamRecord) -> JoinTuple {
    let mut rows = left.rows.clone();
    rows.push(right.clone());
    JoinTuple {
        rows,
        affiliate: left.affiliate.clone(),
    }
}

impl Operator for JoinOperator {
    fn name(&self) -> &str {
        "join"
    }

    /// Join a window batch; an empty join produces no output
    fn process(
        &self,
        context: &mut ProcessorContext,
        data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        let StreamData::Window(batch) = data else {
            return Err(SqlError::structural(format!(
                "join is only supported in window, received a {}",
                data.kind()
            )));
        };
        let tuples = self.join(context.registry.as_ref(), &batch)?;
        if tuples.is_empty() {
            log::debug!("Join yields nothing for rule {}", context.rule_id);
            return Ok(None);
        }
        Ok(Some(StreamData::Join(JoinResult::new(tuples, batch.window_range))))
    }
}
