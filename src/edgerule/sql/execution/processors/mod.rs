//! Operators for rule execution
//!
//! This module contains one operator per stage of a compiled rule:
//! - Preprocessing (schema coercion and event time)
//! - Filtering (WHERE)
//! - Joining (INNER, LEFT, RIGHT, FULL, CROSS)
//! - Grouping, HAVING, analytic and window-ranking functions
//! - Projection, set-returning projection and ordering
//! - The scripting hook
//!
//! Every operator implements [`Operator`]. Operators are built once per rule and
//! then applied to each piece of [`StreamData`] with the rule's [`ProcessorContext`].

use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::execution::StreamData;

pub mod aggregate;
pub mod analytic;
pub mod context;
pub mod filter;
pub mod having;
pub mod join;
pub mod order;
pub mod pipeline;
pub mod preprocess;
pub mod project;
pub mod project_set;
pub mod script;
pub mod window_rank;

pub use aggregate::AggregateOperator;
pub use analytic::AnalyticFuncsOperator;
pub use context::ProcessorContext;
pub use filter::FilterOperator;
pub use having::HavingOperator;
pub use join::JoinOperator;
pub use order::OrderOperator;
pub use pipeline::RulePipeline;
pub use preprocess::PreprocessOperator;
pub use project::ProjectOperator;
pub use project_set::ProjectSetOperator;
pub use script::{ScriptHook, ScriptOperator};
pub use window_rank::WindowRankOperator;

/// One stage of a rule
pub trait Operator: Send + Sync {
    fn name(&self) -> &str;

    /// Transform `data`. `Ok(None)` means nothing is emitted this cycle.
    fn process(
        &self,
        context: &mut ProcessorContext,
        data: StreamData,
    ) -> Result<Option<StreamData>, SqlError>;

    /// Run the operator with error forwarding.
    ///
    /// Upstream errors pass through untouched, and a failure of this operator is
    /// emitted as [`StreamData::Error`] instead of stopping the rule.
    fn apply(&self, context: &mut ProcessorContext, data: StreamData) -> Option<StreamData> {
        if let StreamData::Error(_) = data {
            return Some(data);
        }
        log::debug!("{} operator received {}", self.name(), data.kind());
        match self.process(context, data) {
            Ok(Some(output)) => Some(output),
            Ok(None) => {
                log::debug!("{} operator produced no output", self.name());
                None
            }
            Err(e) => {
                log::warn!(
                    "Rule {}: {} operator failed: {}",
                    context.rule_id,
                    self.name(),
                    e
                );
                Some(StreamData::Error(e))
            }
        }
    }
}
