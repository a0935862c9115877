// Stream and rule definition loading
pub mod config;
// Operator pipeline tests
pub mod sql;
