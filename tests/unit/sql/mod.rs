// SQL execution tests
pub mod execution;
