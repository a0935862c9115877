//! Set-returning projection, e.g. `SELECT unnest(tags) AS tag`
//!
//! Runs after the regular projection, which has already placed the array
//! under the output column name.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::execution::collection::WindowBatch;
use crate::edgerule::sql::execution::{FieldValue, StreamData, StreamRecord};

/// Expands each row into one row per element of an array column
pub struct ProjectSetOperator {
    /// Projected column holding the array
    field: String,
}

impl ProjectSetOperator {
    /// Create an expansion over the projected column `field`
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }

    /// One output row per array element
    ///
    /// Every output row copies the other fields of `record`. A map element
    /// is merged into the row; any other element replaces the array column.
    ///
    /// # Returns
    ///
    /// The expanded rows, a type error when the column is not an array, or
    /// a missing-field error when it is absent
    fn expand(&self, record: &StreamRecord) -> Result<Vec<StreamRecord>, SqlError> {
        let mut base = record.to_map();
        let items = match base.remove(&self.field) {
            Some(FieldValue::Array(items)) => items,
            Some(other) => {
                return Err(SqlError::TypeError {
                    expected: "ARRAY".to_string(),
                    actual: other.type_name().to_string(),
                    value: Some(other.to_string()),
                });
            }
            None => {
                return Err(SqlError::MissingField {
                    field: self.field.clone(),
                });
            }
        };
        log::trace!("Expanding {} into {} rows", self.field, items.len());

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let mut fields = base.clone();
            match item {
                FieldValue::Map(map) => fields.extend(map),
                value => {
                    fields.insert(self.field.clone(), value);
                }
            }
            rows.push(StreamRecord {
                fields,
                metadata: record.metadata.clone(),
                emitter: record.emitter.clone(),
                timestamp: record.timestamp,
                ..StreamRecord::default()
            });
        }
        Ok(rows)
    }
}

impl Operator for ProjectSetOperator {
    fn name(&self) -> &str {
        "project_set"
    }

    /// Expand a record or window batch; the result is always a window batch
    fn process(
        &self,
        _context: &mut ProcessorContext,
        data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        match data {
            StreamData::Record(record) => Ok(Some(StreamData::Window(WindowBatch::new(
                self.expand(&record)?,
                None,
            )))),
            StreamData::Window(batch) => {
                let mut rows = Vec::with_capacity(batch.rows.len());
                for record in &batch.rows {
                    rows.extend(self.expand(record)?);
                }
                Ok(Some(StreamData::Window(WindowBatch::new(rows, batch.window_range))))
            }
            other => Err(SqlError::structural(format!(
                "set-returning projection expects projected rows but received a {}",
                other.kind()
            ))),
        }
    }
}
