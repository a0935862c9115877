use crate::edgerule::sql::SqlError;
/// Field Value Comparison Utilities
///
/// Handles comparison operations between FieldValue instances.
/// These are pure comparison functions with no operator state dependency.
use crate::edgerule::sql::ast::BinaryOperator;
use crate::edgerule::sql::execution::FieldValue;
use crate::edgerule::sql::execution::utils::datetime::parse_datetime;
use std::cmp::Ordering;

/// Utility class for comparing FieldValue instances
pub struct FieldValueComparator;

impl FieldValueComparator {
    /// Compare two FieldValues for equality with exact type matching
    pub fn values_equal(left: &FieldValue, right: &FieldValue) -> bool {
        match (left, right) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => (a - b).abs() < f64::EPSILON,
            (FieldValue::String(a), FieldValue::String(b)) => a == b,
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a == b,
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a == b,
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => a == b,
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Array(a), FieldValue::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| Self::values_equal(x, y))
            }
            (FieldValue::Map(a), FieldValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|bv| Self::values_equal(v, bv)))
            }
            _ => false,
        }
    }

    /// Compare values with numeric and time coercion for IN operations
    pub fn values_equal_with_coercion(left: &FieldValue, right: &FieldValue) -> bool {
        match (left, right) {
            // NULL values should not match anything in IN context
            (FieldValue::Null, _) | (_, FieldValue::Null) => false,
            _ => match Self::ordering(left, right) {
                Some(ordering) => ordering == Ordering::Equal,
                None => Self::values_equal(left, right),
            },
        }
    }

    /// Compare two FieldValues using a comparison operator.
    ///
    /// NULL semantics: `=`, `<=` and `>=` hold only when both sides are NULL,
    /// `!=` holds unless both are NULL, and `<` / `>` never hold against NULL.
    pub fn compare_values_for_boolean(
        left: &FieldValue,
        right: &FieldValue,
        op: BinaryOperator,
    ) -> Result<bool, SqlError> {
        match (left.is_null(), right.is_null()) {
            (true, true) => {
                return Ok(matches!(
                    op,
                    BinaryOperator::Equal
                        | BinaryOperator::LessThanOrEqual
                        | BinaryOperator::GreaterThanOrEqual
                ));
            }
            (true, false) | (false, true) => return Ok(op == BinaryOperator::NotEqual),
            (false, false) => {}
        }

        if let Some(ordering) = Self::ordering(left, right) {
            return match op {
                BinaryOperator::Equal => Ok(ordering == Ordering::Equal),
                BinaryOperator::NotEqual => Ok(ordering != Ordering::Equal),
                BinaryOperator::LessThan => Ok(ordering == Ordering::Less),
                BinaryOperator::LessThanOrEqual => Ok(ordering != Ordering::Greater),
                BinaryOperator::GreaterThan => Ok(ordering == Ordering::Greater),
                BinaryOperator::GreaterThanOrEqual => Ok(ordering != Ordering::Less),
                _ => Err(Self::invalid_operation(left, right, op)),
            };
        }

        // Booleans, byte strings and nested values only support equality
        let same_kind = std::mem::discriminant(left) == std::mem::discriminant(right);
        match op {
            BinaryOperator::Equal if same_kind => Ok(Self::values_equal(left, right)),
            BinaryOperator::NotEqual if same_kind => Ok(!Self::values_equal(left, right)),
            _ => Err(Self::invalid_operation(left, right, op)),
        }
    }

    /// Total order between two orderable values, `None` when the pair has no order.
    ///
    /// Integers and floats order together. Timestamps order against timestamps,
    /// against date-time strings and against integer epoch milliseconds.
    pub fn ordering(left: &FieldValue, right: &FieldValue) -> Option<Ordering> {
        match (left, right) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(_) | FieldValue::Float(_), FieldValue::Integer(_) | FieldValue::Float(_)) => {
                let a = left.as_f64()?;
                let b = right.as_f64()?;
                a.partial_cmp(&b)
            }
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::String(s)) => {
                parse_datetime(s, None).ok().map(|b| a.cmp(&b))
            }
            (FieldValue::String(s), FieldValue::Timestamp(b)) => {
                parse_datetime(s, None).ok().map(|a| a.cmp(b))
            }
            (FieldValue::Timestamp(_), FieldValue::Integer(b)) => {
                left.timestamp_millis().map(|a| a.cmp(b))
            }
            (FieldValue::Integer(a), FieldValue::Timestamp(_)) => {
                right.timestamp_millis().map(|b| a.cmp(&b))
            }
            _ => None,
        }
    }

    /// Build the error reported when an operator cannot combine two values
    pub fn invalid_operation(left: &FieldValue, right: &FieldValue, op: BinaryOperator) -> SqlError {
        SqlError::InvalidOperation {
            operator: op.to_string(),
            left_type: left.type_name().to_string(),
            left_value: left.to_string(),
            right_type: right.type_name().to_string(),
            right_value: right.to_string(),
        }
    }
}
