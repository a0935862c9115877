//! Operator execution: the row and collection data model, expression
//! evaluation and the operators that make up a rule pipeline.

pub mod collection;
pub mod expression;
pub mod processors;
pub mod types;
pub mod utils;

pub use collection::{
    Collection, CollectionRow, GroupedRows, GroupedSet, JoinResult, JoinTuple, Row, StreamData,
    TupleRow, WindowBatch, WindowRange,
};
pub use types::{AffiliateRow, FieldValue, PickColumn, StreamRecord};
