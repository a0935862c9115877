//! Processor execution context and state management

use crate::edgerule::config::RuleOptions;
use crate::edgerule::sql::execution::expression::{AnalyticStateStore, FunctionRegistry};
use std::sync::Arc;

/// Per-rule execution context
///
/// One context belongs to one rule instance. The function registry is shared
/// read-only; the analytic state is owned here and mutated only by the
/// analytic operator of this rule.
pub struct ProcessorContext {
    /// Rule this context belongs to, used in log lines
    pub rule_id: String,
    pub registry: Arc<FunctionRegistry>,
    pub options: RuleOptions,
    /// Memory of every analytic call of the rule
    pub analytic_state: AnalyticStateStore,
}

impl ProcessorContext {
    /// A context with the builtin functions and default rule options
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            registry: Arc::new(FunctionRegistry::with_builtins()),
            options: RuleOptions::default(),
            analytic_state: AnalyticStateStore::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: RuleOptions) -> Self {
        self.options = options;
        self
    }

    /// Forget all analytic state, e.g. when the rule restarts
    pub fn reset_state(&mut self) {
        self.analytic_state.clear();
    }
}
