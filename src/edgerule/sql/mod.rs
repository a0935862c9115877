// Streaming SQL module for edgerule
// Provides the AST consumed by operators and the operator execution layer

pub mod ast;
pub mod error;
pub mod execution;

// Re-export main API
pub use error::{ErrorCategory, SqlError};
pub use execution::{FieldValue, StreamData, StreamRecord};

// Version and feature info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FEATURES: &[&str] = &[
    "schema_preprocessing", // typed coercion, binary payloads, event time
    "filter",
    "joins",              // INNER, LEFT, RIGHT, FULL, CROSS across N streams
    "group_by",           // dimension keys including window_start/window_end
    "having_clause",      // grouped and incremental modes
    "analytic_functions", // LAG, LATEST, CHANGED_COL, HAD_CHANGED
    "window_functions",   // ROW_NUMBER with PARTITION BY
    "projection",         // wildcards, EXCEPT, aliases, spread expressions
    "project_set",        // UNNEST expansion
    "order_by",
];
