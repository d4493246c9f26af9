//! Arrow schema inference and record-to-Arrow conversion
//!
//! Records are flat JSON objects with scalar fields. The schema is inferred
//! once, from the first batch of a stream, and every later batch must match
//! it field by field. Field order is canonicalized by sorting on column name
//! so that inference is deterministic across batches.

use crate::error::{Error, Result};
use crate::types::{JsonValue, Record};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, NullArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Infer an Arrow schema from a batch of records.
///
/// Scans every record so that a field that is null in some rows still gets
/// the type observed elsewhere. All fields come out nullable.
pub fn infer_schema(records: &[Record]) -> Result<Schema> {
    let mut field_types: BTreeMap<String, DataType> = BTreeMap::new();

    for record in records {
        for (key, value) in record {
            let inferred = infer_type(value)?;
            field_types
                .entry(key.clone())
                .and_modify(|existing| {
                    *existing = merge_types(existing, &inferred);
                })
                .or_insert(inferred);
        }
    }

    let fields: Vec<Field> = field_types
        .into_iter()
        .map(|(name, dtype)| Field::new(name, dtype, true))
        .collect();

    Ok(Schema::new(fields))
}

/// Verify that `actual` structurally equals the established schema.
///
/// Checked field by field (names, order, types), not just by column count,
/// so the error can name the first offending field.
pub fn check_schema(established: &Schema, actual: &Schema) -> Result<()> {
    for (expected_field, actual_field) in established.fields().iter().zip(actual.fields()) {
        if expected_field.name() != actual_field.name() {
            return Err(Error::schema_mismatch(
                expected_field.name(),
                format!("column '{}'", expected_field.name()),
                format!("column '{}'", actual_field.name()),
            ));
        }
        if expected_field.data_type() != actual_field.data_type() {
            return Err(Error::schema_mismatch(
                expected_field.name(),
                expected_field.data_type().to_string(),
                actual_field.data_type().to_string(),
            ));
        }
    }

    if established.fields().len() != actual.fields().len() {
        let (longer, which) = if actual.fields().len() > established.fields().len() {
            (actual, "unexpected")
        } else {
            (established, "missing")
        };
        let field = longer.fields()[established.fields().len().min(actual.fields().len())].name();
        return Err(Error::schema_mismatch(
            field,
            format!("{} columns", established.fields().len()),
            format!("{} columns ({which} '{field}')", actual.fields().len()),
        ));
    }

    Ok(())
}

/// Convert a batch of records into an Arrow RecordBatch with the given schema
pub fn records_to_batch(records: &[Record], schema: &Schema) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        let values: Vec<Option<&JsonValue>> = records
            .iter()
            .map(|record| record.get(field.name()))
            .collect();
        columns.push(build_array(&values, field.data_type())?);
    }

    RecordBatch::try_new(Arc::new(schema.clone()), columns)
        .map_err(|e| Error::encoding(format!("failed to build RecordBatch: {e}")))
}

/// Infer the Arrow type of one scalar JSON value
fn infer_type(value: &JsonValue) -> Result<DataType> {
    match value {
        JsonValue::Null => Ok(DataType::Null),
        JsonValue::Bool(_) => Ok(DataType::Boolean),
        JsonValue::Number(n) => {
            if n.is_i64() {
                Ok(DataType::Int64)
            } else {
                Ok(DataType::Float64)
            }
        }
        JsonValue::String(_) => Ok(DataType::Utf8),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(Error::encoding(
            "nested values are not supported; records must be flat scalar objects",
        )),
    }
}

/// Merge two inferred types for the same column
fn merge_types(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (a, b) if a == b => a.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        // Incompatible scalars degrade to strings
        _ => DataType::Utf8,
    }
}

/// Build one Arrow column from per-row JSON values
fn build_array(values: &[Option<&JsonValue>], dtype: &DataType) -> Result<ArrayRef> {
    match dtype {
        DataType::Null => Ok(Arc::new(NullArray::new(values.len()))),
        DataType::Boolean => {
            let array: BooleanArray = values
                .iter()
                .map(|v| match v {
                    Some(JsonValue::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect();
            Ok(Arc::new(array))
        }
        DataType::Int64 => {
            let array: Int64Array = values
                .iter()
                .map(|v| match v {
                    Some(JsonValue::Number(n)) => n.as_i64(),
                    _ => None,
                })
                .collect();
            Ok(Arc::new(array))
        }
        DataType::Float64 => {
            let array: Float64Array = values
                .iter()
                .map(|v| match v {
                    Some(JsonValue::Number(n)) => n.as_f64(),
                    _ => None,
                })
                .collect();
            Ok(Arc::new(array))
        }
        DataType::Utf8 => {
            let array: StringArray = values
                .iter()
                .map(|v| match v {
                    Some(JsonValue::String(s)) => Some(s.clone()),
                    Some(JsonValue::Null) | None => None,
                    // Column degraded to Utf8 during inference
                    Some(other) => Some(other.to_string()),
                })
                .collect();
            Ok(Arc::new(array))
        }
        other => Err(Error::encoding(format!(
            "unsupported column type {other} for record conversion"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: JsonValue) -> Record {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("test records must be objects"),
        }
    }

    #[test]
    fn test_infer_schema_simple() {
        let records = vec![
            record(json!({"name": "Alice", "age": 30})),
            record(json!({"name": "Bob", "age": 25})),
        ];

        let schema = infer_schema(&records).unwrap();
        assert_eq!(schema.fields().len(), 2);
        // Sorted field order: age before name
        assert_eq!(schema.field(0).name(), "age");
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).name(), "name");
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_infer_schema_deterministic_order() {
        let a = infer_schema(&[record(json!({"b": 1, "a": "x", "c": true}))]).unwrap();
        let b = infer_schema(&[record(json!({"c": false, "a": "y", "b": 2}))]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_infer_schema_null_upgrades() {
        let records = vec![
            record(json!({"email": null})),
            record(json!({"email": "bob@example.com"})),
        ];
        let schema = infer_schema(&records).unwrap();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_infer_schema_mixed_numbers() {
        let records = vec![record(json!({"value": 42})), record(json!({"value": 3.5}))];
        let schema = infer_schema(&records).unwrap();
        assert_eq!(schema.field(0).data_type(), &DataType::Float64);
    }

    #[test]
    fn test_infer_schema_rejects_nested() {
        let records = vec![record(json!({"user": {"id": 1}}))];
        assert!(infer_schema(&records).is_err());
    }

    #[test]
    fn test_check_schema_matches() {
        let records = vec![record(json!({"id": 1, "name": "Alice"}))];
        let schema = infer_schema(&records).unwrap();
        let other = infer_schema(&[record(json!({"id": 7, "name": "Bob"}))]).unwrap();
        assert!(check_schema(&schema, &other).is_ok());
    }

    #[test]
    fn test_check_schema_type_mismatch_names_field() {
        let established = infer_schema(&[record(json!({"id": 1, "name": "Alice"}))]).unwrap();
        let actual = infer_schema(&[record(json!({"id": "one", "name": "Bob"}))]).unwrap();

        let err = check_schema(&established, &actual).unwrap_err();
        match err {
            Error::SchemaMismatch { field, .. } => assert_eq!(field, "id"),
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[test]
    fn test_check_schema_missing_column() {
        let established = infer_schema(&[record(json!({"id": 1, "name": "Alice"}))]).unwrap();
        let actual = infer_schema(&[record(json!({"id": 2}))]).unwrap();
        assert!(check_schema(&established, &actual).is_err());
    }

    #[test]
    fn test_records_to_batch() {
        let records = vec![
            record(json!({"id": 1, "name": "Alice", "score": 9.5, "active": true})),
            record(json!({"id": 2, "name": "Bob", "score": 7.25, "active": false})),
        ];
        let schema = infer_schema(&records).unwrap();
        let batch = records_to_batch(&records, &schema).unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);

        let ids = batch
            .column_by_name("id")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ids.value(0), 1);
        assert_eq!(ids.value(1), 2);
    }

    #[test]
    fn test_records_to_batch_null_values() {
        let records = vec![
            record(json!({"id": 1, "note": "hi"})),
            record(json!({"id": 2, "note": null})),
        ];
        let schema = infer_schema(&records).unwrap();
        let batch = records_to_batch(&records, &schema).unwrap();

        let notes = batch
            .column_by_name("note")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert!(!notes.is_null(0));
        assert!(notes.is_null(1));
    }
}
