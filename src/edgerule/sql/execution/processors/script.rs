//! Scripting hook operator
//!
//! The interpreter itself lives outside this crate. It is plugged in through
//! [`ScriptHook`], which turns one row into the fields of its replacement.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::execution::{AffiliateRow, FieldValue, StreamData, StreamRecord};
use std::collections::HashMap;
use std::sync::Arc;

/// A user script run once per row
pub trait ScriptHook: Send + Sync {
    /// Compute the complete field map of the row that replaces `record`
    fn transform(&self, record: &StreamRecord) -> Result<HashMap<String, FieldValue>, SqlError>;
}

/// Replaces each row's fields with the output of a [`ScriptHook`]
pub struct ScriptOperator {
    hook: Arc<dyn ScriptHook>,
}

impl ScriptOperator {
    pub fn new(hook: Arc<dyn ScriptHook>) -> Self {
        Self { hook }
    }

    fn run(&self, record: &mut StreamRecord) -> Result<(), SqlError> {
        let fields = self.hook.transform(record)?;
        record.fields = fields;
        // Aliases and calculated columns were visible to the script and are now part of its output
        record.affiliate = AffiliateRow::default();
        Ok(())
    }
}

impl Operator for ScriptOperator {
    fn name(&self) -> &str {
        "script"
    }

    fn process(
        &self,
        _context: &mut ProcessorContext,
        mut data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        match &mut data {
            StreamData::Record(record) => self.run(record)?,
            StreamData::Window(batch) => {
                for record in batch.rows.iter_mut() {
                    self.run(record)?;
                }
            }
            other => {
                return Err(SqlError::structural(format!(
                    "script operator expects a record or window batch but received a {}",
                    other.kind()
                )));
            }
        }
        Ok(Some(data))
    }
}
