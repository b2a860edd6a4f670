//! `$jsonSchema` checks backed by the `jsonschema` crate.
//!
//! Documents are rendered as relaxed extended JSON, so an ObjectId becomes
//! `{"$oid": ...}` and a date becomes `{"$date": ...}`. `bsonType` has no
//! JSON Schema counterpart; each occurrence is rewritten into an `allOf`
//! constraint over those shapes before compiling.

use jsonschema::JSONSchema;
use mongodb::bson::{Bson, Document};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// A document failed a schema check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct SchemaViolation {
    /// JSON pointer to the offending value (`/` is the document root).
    pub path: String,
    /// What was wrong.
    pub reason: String,
}

impl SchemaViolation {
    fn at_root(reason: impl Into<String>) -> Self {
        Self {
            path: "/".to_string(),
            reason: reason.into(),
        }
    }
}

/// Check `document` against a `$jsonSchema` body.
///
/// Reports the first violation found.
pub fn validate(document: &Document, schema: &Document) -> Result<(), SchemaViolation> {
    let schema = to_json_schema(Bson::Document(schema.clone()).into_relaxed_extjson())?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| SchemaViolation::at_root(format!("Invalid schema: {}", e)))?;

    let instance = Bson::Document(document.clone()).into_relaxed_extjson();
    let Err(mut errors) = compiled.validate(&instance) else {
        return Ok(());
    };
    match errors.next() {
        Some(e) => {
            let pointer = e.instance_path.to_string();
            Err(SchemaViolation {
                path: if pointer.is_empty() { "/".to_string() } else { pointer },
                reason: e.to_string(),
            })
        }
        None => Ok(()),
    }
}

/// JSON Schema constraint for one BSON type alias.
fn bson_type(name: &str) -> Result<Value, SchemaViolation> {
    let constraint = match name {
        "object" | "array" | "string" | "null" => json!({ "type": name }),
        "bool" => json!({ "type": "boolean" }),
        "int" | "long" => json!({ "type": "integer" }),
        "double" | "number" => json!({ "type": "number" }),
        "objectId" => json!({ "type": "object", "required": ["$oid"] }),
        "date" => json!({ "type": "object", "required": ["$date"] }),
        other => {
            return Err(SchemaViolation::at_root(format!(
                "Unsupported bsonType {}",
                other
            )))
        }
    };
    Ok(constraint)
}

/// Rewrite every `bsonType` keyword in `schema` into standard JSON Schema.
fn to_json_schema(schema: Value) -> Result<Value, SchemaViolation> {
    match schema {
        Value::Object(map) => {
            let mut rewritten = Map::with_capacity(map.len());
            let mut constraint = None;

            for (key, value) in map {
                match key.as_str() {
                    "bsonType" => {
                        constraint = Some(match value {
                            Value::String(name) => bson_type(&name)?,
                            Value::Array(names) => {
                                let any_of = names
                                    .iter()
                                    .map(|name| match name.as_str() {
                                        Some(name) => bson_type(name),
                                        None => Err(SchemaViolation::at_root(
                                            "bsonType list entries must be strings",
                                        )),
                                    })
                                    .collect::<Result<Vec<_>, _>>()?;
                                json!({ "anyOf": any_of })
                            }
                            other => {
                                return Err(SchemaViolation::at_root(format!(
                                    "bsonType must be a string or list, found {}",
                                    other
                                )))
                            }
                        });
                    }
                    // Keys are field names, values are subschemas.
                    "properties" | "patternProperties" => {
                        let value = match value {
                            Value::Object(fields) => Value::Object(
                                fields
                                    .into_iter()
                                    .map(|(field, schema)| Ok((field, to_json_schema(schema)?)))
                                    .collect::<Result<Map<_, _>, SchemaViolation>>()?,
                            ),
                            other => other,
                        };
                        rewritten.insert(key, value);
                    }
                    // Literal values, not subschemas.
                    "enum" | "required" | "description" => {
                        rewritten.insert(key, value);
                    }
                    _ => {
                        rewritten.insert(key, to_json_schema(value)?);
                    }
                }
            }

            if let Some(constraint) = constraint {
                rewritten.insert("allOf".to_string(), json!([constraint]));
            }
            Ok(Value::Object(rewritten))
        }
        Value::Array(values) => values
            .into_iter()
            .map(to_json_schema)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}
