pub mod aggregate_test;
pub mod filter_test;
pub mod having_test;
pub mod join_test;
pub mod order_test;
pub mod pipeline_test;
pub mod preprocess_test;
pub mod project_test;
