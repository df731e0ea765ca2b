//! Strict JSON to Avro conversion and the registry wire framing.
//!
//! A framed datum is a zero magic byte, the 4-byte big-endian schema id, and the
//! Avro binary body. Conversion never coerces: absent required fields, wrong
//! JSON types and undeclared enum symbols fail before any bytes are produced.
//! Keys the schema does not declare are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use apache_avro::types::Value as AvroValue;
use apache_avro::Schema;
use courier_core::records::ResultRecord;
use serde_json::{Map, Value};

use crate::error::EncodingError;
use crate::registry::CompiledSchema;

pub const MAGIC_BYTE: u8 = 0;
const HEADER_LEN: usize = 5;

#[derive(Clone, Debug)]
pub struct RecordEncoder {
    schema: Arc<CompiledSchema>,
}

impl RecordEncoder {
    pub fn new(schema: Arc<CompiledSchema>) -> Self {
        Self { schema }
    }

    pub fn schema_id(&self) -> u32 {
        self.schema.id
    }

    pub fn encode(&self, record: &ResultRecord) -> Result<Vec<u8>, EncodingError> {
        self.encode_fields(&record.project())
    }

    pub fn encode_fields(&self, fields: &Map<String, Value>) -> Result<Vec<u8>, EncodingError> {
        let datum = record_to_avro(fields, &self.schema.schema)?;
        let body = apache_avro::to_avro_datum(&self.schema.schema, datum)
            .map_err(|error| EncodingError::Serialization(error.to_string()))?;
        Ok(frame(self.schema.id, &body))
    }

    /// Decodes a framed datum written with this encoder's schema.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, EncodingError> {
        let (schema_id, mut body) = split_frame(bytes)?;
        if schema_id != self.schema.id {
            return Err(EncodingError::Framing(format!(
                "schema id {schema_id} does not match {}",
                self.schema.id
            )));
        }

        let datum = apache_avro::from_avro_datum(&self.schema.schema, &mut body, None)
            .map_err(|error| EncodingError::Serialization(error.to_string()))?;
        Ok(avro_to_json(&datum))
    }
}

pub fn frame(schema_id: u32, body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(HEADER_LEN + body.len());
    framed.push(MAGIC_BYTE);
    framed.extend_from_slice(&schema_id.to_be_bytes());
    framed.extend_from_slice(body);
    framed
}

pub fn split_frame(bytes: &[u8]) -> Result<(u32, &[u8]), EncodingError> {
    if bytes.len() < HEADER_LEN {
        return Err(EncodingError::Framing(format!("{} byte(s) is shorter than the header", bytes.len())));
    }
    if bytes[0] != MAGIC_BYTE {
        return Err(EncodingError::Framing(format!("unexpected magic byte {:#04x}", bytes[0])));
    }

    let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Ok((id, &bytes[HEADER_LEN..]))
}

fn record_to_avro(fields: &Map<String, Value>, schema: &Schema) -> Result<AvroValue, EncodingError> {
    let Schema::Record(record) = schema else {
        return Err(EncodingError::TypeMismatch {
            field: "<root>".to_string(),
            expected: "record schema".to_string(),
            found: "non-record schema".to_string(),
        });
    };

    let mut converted = Vec::with_capacity(record.fields.len());
    for field in &record.fields {
        let value = match fields.get(&field.name) {
            Some(value) if !value.is_null() => value,
            _ => field.default.as_ref().unwrap_or(&Value::Null),
        };
        converted.push((field.name.clone(), value_to_avro(value, &field.schema, &field.name)?));
    }
    Ok(AvroValue::Record(converted))
}

fn value_to_avro(value: &Value, schema: &Schema, path: &str) -> Result<AvroValue, EncodingError> {
    let mismatch = |expected: &str| EncodingError::TypeMismatch {
        field: path.to_string(),
        expected: expected.to_string(),
        found: json_type(value).to_string(),
    };

    if value.is_null() && !matches!(schema, Schema::Null | Schema::Union(_)) {
        return Err(EncodingError::MissingField { field: path.to_string() });
    }

    match schema {
        Schema::Null => match value {
            Value::Null => Ok(AvroValue::Null),
            _ => Err(mismatch("null")),
        },
        Schema::Boolean => value.as_bool().map(AvroValue::Boolean).ok_or_else(|| mismatch("boolean")),
        Schema::Int => value
            .as_i64()
            .and_then(|number| i32::try_from(number).ok())
            .map(AvroValue::Int)
            .ok_or_else(|| mismatch("int")),
        Schema::Long => value.as_i64().map(AvroValue::Long).ok_or_else(|| mismatch("long")),
        Schema::Float => {
            value.as_f64().map(|number| AvroValue::Float(number as f32)).ok_or_else(|| mismatch("float"))
        }
        Schema::Double => value.as_f64().map(AvroValue::Double).ok_or_else(|| mismatch("double")),
        Schema::String => {
            let text = value.as_str().ok_or_else(|| mismatch("string"))?;
            Ok(AvroValue::String(text.to_string()))
        }
        Schema::Enum(enum_schema) => {
            let symbol = value.as_str().ok_or_else(|| mismatch("enum symbol"))?;
            let index = enum_schema.symbols.iter().position(|candidate| candidate == symbol).ok_or_else(
                || EncodingError::UnknownSymbol { field: path.to_string(), symbol: symbol.to_string() },
            )?;
            Ok(AvroValue::Enum(index as u32, symbol.to_string()))
        }
        Schema::Array(array_schema) => {
            let items = value.as_array().ok_or_else(|| mismatch("array"))?;
            items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    value_to_avro(item, &array_schema.items, &format!("{path}[{index}]"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(AvroValue::Array)
        }
        Schema::Map(map_schema) => {
            let entries = value.as_object().ok_or_else(|| mismatch("map"))?;
            entries
                .iter()
                .map(|(key, item)| {
                    value_to_avro(item, &map_schema.types, &format!("{path}.{key}"))
                        .map(|converted| (key.clone(), converted))
                })
                .collect::<Result<HashMap<_, _>, _>>()
                .map(AvroValue::Map)
        }
        Schema::Record(_) => {
            let fields = value.as_object().ok_or_else(|| mismatch("record"))?;
            record_to_avro(fields, schema)
        }
        Schema::Union(union_schema) => {
            let variants = union_schema.variants();
            if value.is_null() {
                return variants
                    .iter()
                    .position(|variant| matches!(variant, Schema::Null))
                    .map(|index| AvroValue::Union(index as u32, Box::new(AvroValue::Null)))
                    .ok_or_else(|| EncodingError::MissingField { field: path.to_string() });
            }

            variants
                .iter()
                .enumerate()
                .filter(|(_, variant)| !matches!(variant, Schema::Null))
                .find_map(|(index, variant)| {
                    value_to_avro(value, variant, path)
                        .ok()
                        .map(|converted| AvroValue::Union(index as u32, Box::new(converted)))
                })
                .ok_or_else(|| mismatch("union member"))
        }
        _ => Err(mismatch("supported schema type")),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn avro_to_json(value: &AvroValue) -> Value {
    match value {
        AvroValue::Null => Value::Null,
        AvroValue::Boolean(flag) => Value::Bool(*flag),
        AvroValue::Int(number) => Value::from(*number),
        AvroValue::Long(number) => Value::from(*number),
        AvroValue::Float(number) => Value::from(f64::from(*number)),
        AvroValue::Double(number) => Value::from(*number),
        AvroValue::String(text) | AvroValue::Enum(_, text) => Value::String(text.clone()),
        AvroValue::Bytes(bytes) | AvroValue::Fixed(_, bytes) => {
            Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect())
        }
        AvroValue::Union(_, inner) => avro_to_json(inner),
        AvroValue::Array(items) => Value::Array(items.iter().map(avro_to_json).collect()),
        AvroValue::Map(entries) => {
            Value::Object(entries.iter().map(|(key, item)| (key.clone(), avro_to_json(item))).collect())
        }
        AvroValue::Record(fields) => {
            Value::Object(fields.iter().map(|(key, item)| (key.clone(), avro_to_json(item))).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}
