//! Pure helpers shared by the evaluator and the operators.

pub mod datetime;
pub mod field_value_comparator;

pub use datetime::parse_datetime;
pub use field_value_comparator::FieldValueComparator;
