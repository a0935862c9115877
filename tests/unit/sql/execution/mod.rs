// Operator tests, one file per operator plus whole-pipeline scenarios
pub mod processors;
