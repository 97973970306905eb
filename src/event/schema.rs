//! Embedded Avro schema for `OrderCreated`.

use serde::Deserialize;

use super::codec::FIELDS;

/// Avro schema text for the topic. Every writer and reader of
/// `global.orders.v1` uses exactly this record layout.
pub const SCHEMA_JSON: &str = r#"{
  "namespace": "com.mcdonalds.orders",
  "type": "record",
  "name": "OrderCreated",
  "fields": [
    {"name": "order_id", "type": "string"},
    {"name": "store_id", "type": "string"},
    {"name": "total_amount_cents", "type": "int"},
    {"name": "status", "type": "string"},
    {"name": "created_at", "type": "long"}
  ]
}"#;

/// Errors from validating schema text against the codec layout.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to parse schema: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Expected a record schema named 'OrderCreated', found {kind} '{name}'")]
    NotOrderCreated { kind: String, name: String },

    #[error("Schema has {found} fields, codec expects {expected}")]
    FieldCount { expected: usize, found: usize },

    #[error("Field {index} is '{found}', codec expects '{expected}'")]
    FieldMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Deserialize)]
struct RecordSchema {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: serde_json::Value,
}

/// Check that `SCHEMA_JSON` describes exactly the layout the codec writes.
pub fn verify_schema() -> Result<(), SchemaError> {
    verify_schema_text(SCHEMA_JSON)
}

fn verify_schema_text(text: &str) -> Result<(), SchemaError> {
    let schema: RecordSchema = serde_json::from_str(text)?;

    if schema.kind != "record" || schema.name != "OrderCreated" {
        return Err(SchemaError::NotOrderCreated {
            kind: schema.kind,
            name: schema.name,
        });
    }

    if schema.fields.len() != FIELDS.len() {
        return Err(SchemaError::FieldCount {
            expected: FIELDS.len(),
            found: schema.fields.len(),
        });
    }

    for (index, (field, (name, avro_type))) in schema.fields.iter().zip(FIELDS).enumerate() {
        // Unions and nested types are not primitives and never match.
        let found_type = field.field_type.as_str().unwrap_or("<complex>");
        if field.name != name || found_type != avro_type {
            return Err(SchemaError::FieldMismatch {
                index,
                expected: format!("{}: {}", name, avro_type),
                found: format!("{}: {}", field.name, found_type),
            });
        }
    }

    Ok(())
}
