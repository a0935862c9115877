//! Operator chaining for one rule

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::execution::StreamData;

/// Ordered chain of operators that together execute one rule
pub struct RulePipeline {
    operators: Vec<Box<dyn Operator>>,
}

impl RulePipeline {
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
        }
    }

    /// Append an operator to the end of the chain
    pub fn with_operator(mut self, operator: impl Operator + 'static) -> Self {
        self.operators.push(Box::new(operator));
        self
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Names of the operators, in execution order
    pub fn operator_names(&self) -> Vec<&str> {
        self.operators.iter().map(|op| op.name()).collect()
    }

    /// Push `data` through every operator.
    ///
    /// Stops at the first operator that emits nothing. Errors keep flowing so the
    /// sink sees them.
    pub fn run(&self, context: &mut ProcessorContext, data: StreamData) -> Option<StreamData> {
        let mut current = data;
        for operator in &self.operators {
            match operator.apply(context, current) {
                Some(next) => current = next,
                None => {
                    log::debug!(
                        "Rule {}: pipeline stopped at {}",
                        context.rule_id,
                        operator.name()
                    );
                    return None;
                }
            }
        }
        Some(current)
    }
}

impl Default for RulePipeline {
    fn default() -> Self {
        Self::new()
    }
}
