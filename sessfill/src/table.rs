use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    Float64Type, Int32Type, Int64Type, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType,
};
use arrow_schema::{DataType, Schema, TimeUnit};
use chrono::{DateTime, TimeZone, Utc};

use crate::error::LogSchemaError;

pub(crate) fn column_index(schema: &Schema, name: &str) -> Result<usize, LogSchemaError> {
    schema
        .column_with_name(name)
        .map(|(idx, _)| idx)
        .ok_or_else(|| LogSchemaError::MissingColumn(name.to_string()))
}

/// Reads a timestamp column into UTC datetimes, normalizing whatever unit the
/// loader produced to microseconds. Every row must hold a value.
pub(crate) fn timestamps(
    col: &ArrayRef,
    name: &str,
) -> Result<Vec<DateTime<Utc>>, LogSchemaError> {
    let micros: Vec<Option<i64>> = match col.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => col
            .as_primitive::<TimestampSecondType>()
            .iter()
            .map(|v| v.map(|s| s * 1_000_000))
            .collect(),
        DataType::Timestamp(TimeUnit::Millisecond, _) => col
            .as_primitive::<TimestampMillisecondType>()
            .iter()
            .map(|v| v.map(|ms| ms * 1_000))
            .collect(),
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            col.as_primitive::<TimestampMicrosecondType>().iter().collect()
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => col
            .as_primitive::<TimestampNanosecondType>()
            .iter()
            .map(|v| v.map(|ns| ns / 1_000))
            .collect(),
        other => {
            return Err(LogSchemaError::InvalidTimestamp {
                column: name.to_string(),
                detail: format!("unsupported data type {other}"),
            });
        }
    };

    let mut out = Vec::with_capacity(micros.len());
    for (row, value) in micros.into_iter().enumerate() {
        let Some(value) = value else {
            return Err(LogSchemaError::InvalidTimestamp {
                column: name.to_string(),
                detail: format!("null value at row {row}"),
            });
        };
        let dt = Utc.timestamp_micros(value).single().ok_or_else(|| {
            LogSchemaError::InvalidTimestamp {
                column: name.to_string(),
                detail: format!("out-of-range value at row {row}"),
            }
        })?;
        out.push(dt);
    }
    Ok(out)
}

/// Per-row textual view of a grouping or label column. Null rows stay `None`.
pub(crate) fn row_labels(col: &ArrayRef) -> Vec<Option<String>> {
    (0..col.len()).map(|row| scalar_to_string(col, row)).collect()
}

fn scalar_to_string(array: &ArrayRef, row: usize) -> Option<String> {
    if array.is_null(row) {
        return None;
    }
    match array.data_type() {
        DataType::Utf8 => Some(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Some(array.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => Some(array.as_primitive::<Int32Type>().value(row).to_string()),
        DataType::Int64 => Some(array.as_primitive::<Int64Type>().value(row).to_string()),
        DataType::Float64 => Some(array.as_primitive::<Float64Type>().value(row).to_string()),
        DataType::Boolean => Some(array.as_boolean().value(row).to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray, TimestampSecondArray};
    use std::sync::Arc;

    #[test]
    fn timestamps_normalize_seconds_to_micros() {
        let col = Arc::new(TimestampSecondArray::from(vec![60, 120])) as ArrayRef;
        let values = timestamps(&col, "startTime").expect("Failed to read timestamps");
        assert_eq!(values[1].signed_duration_since(values[0]).num_seconds(), 60);
    }

    #[test]
    fn timestamps_reject_null_rows() {
        let col = Arc::new(TimestampSecondArray::from(vec![Some(60), None])) as ArrayRef;
        let err = timestamps(&col, "completeTime").expect_err("null timestamp must fail");
        let msg = err.to_string();
        assert!(msg.contains("completeTime"));
        assert!(msg.contains("row 1"));
    }

    #[test]
    fn timestamps_reject_non_timestamp_columns() {
        let col = Arc::new(StringArray::from(vec!["2016-01-01"])) as ArrayRef;
        assert!(timestamps(&col, "startTime").is_err());
    }

    #[test]
    fn row_labels_stringify_scalars() {
        let col = Arc::new(Int64Array::from(vec![Some(7), None])) as ArrayRef;
        assert_eq!(row_labels(&col), vec![Some("7".to_string()), None]);
    }
}
