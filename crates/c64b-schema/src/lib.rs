// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schema builders producing both a JSON-Schema advertisement and a runtime
//! validator with JSON-pointer error paths.
//!
//! A [`Schema`] is built fluently, advertised via [`Schema::json_schema`],
//! and enforced via [`Schema::parse`], which raises `validation` errors with
//! `$`-rooted paths. Grouped tools declare their sub-operations once as
//! [`OpVariant`]s; the `oneOf` advertisement and the runtime `op` routing
//! both derive from that list, so the two cannot drift.

#![deny(unsafe_code)]

use c64b_error::BridgeError;
use serde_json::{Map, Value, json};

pub mod args;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// A composable schema node.
#[derive(Debug, Clone)]
pub struct Schema {
    kind: SchemaKind,
    description: Option<String>,
}

#[derive(Debug, Clone)]
enum SchemaKind {
    String {
        min_len: Option<usize>,
        allowed: Option<Vec<String>>,
    },
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    Array {
        items: Box<Schema>,
    },
    Object {
        fields: Vec<Field>,
        open: bool,
    },
    Any,
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    schema: Schema,
    required: bool,
}

/// A string schema.
pub fn string() -> Schema {
    Schema::new(SchemaKind::String {
        min_len: None,
        allowed: None,
    })
}

/// An integer schema.
pub fn integer() -> Schema {
    Schema::new(SchemaKind::Integer {
        min: None,
        max: None,
    })
}

/// A number schema.
pub fn number() -> Schema {
    Schema::new(SchemaKind::Number {
        min: None,
        max: None,
    })
}

/// A boolean schema.
pub fn boolean() -> Schema {
    Schema::new(SchemaKind::Boolean)
}

/// An array schema with the given item schema.
pub fn array(items: Schema) -> Schema {
    Schema::new(SchemaKind::Array {
        items: Box::new(items),
    })
}

/// A closed object schema (`additionalProperties: false`).
pub fn object() -> Schema {
    Schema::new(SchemaKind::Object {
        fields: Vec::new(),
        open: false,
    })
}

/// A schema accepting any value.
pub fn any() -> Schema {
    Schema::new(SchemaKind::Any)
}

impl Schema {
    fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    /// Attach a human-readable description for the advertisement.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Require a minimum string length (string schemas only).
    pub fn min_len(mut self, n: usize) -> Self {
        if let SchemaKind::String { min_len, .. } = &mut self.kind {
            *min_len = Some(n);
        }
        self
    }

    /// Restrict a string schema to an enumerated set of values.
    pub fn one_of(mut self, values: &[&str]) -> Self {
        if let SchemaKind::String { allowed, .. } = &mut self.kind {
            *allowed = Some(values.iter().map(|v| v.to_string()).collect());
        }
        self
    }

    /// Lower bound for integer schemas.
    pub fn min(mut self, value: i64) -> Self {
        match &mut self.kind {
            SchemaKind::Integer { min, .. } => *min = Some(value),
            SchemaKind::Number { min, .. } => *min = Some(value as f64),
            _ => {}
        }
        self
    }

    /// Upper bound for integer schemas.
    pub fn max(mut self, value: i64) -> Self {
        match &mut self.kind {
            SchemaKind::Integer { max, .. } => *max = Some(value),
            SchemaKind::Number { max, .. } => *max = Some(value as f64),
            _ => {}
        }
        self
    }

    /// Add a required field (object schemas only).
    pub fn field(mut self, name: &str, schema: Schema) -> Self {
        if let SchemaKind::Object { fields, .. } = &mut self.kind {
            fields.push(Field {
                name: name.to_string(),
                schema,
                required: true,
            });
        }
        self
    }

    /// Add an optional field (object schemas only).
    pub fn optional(mut self, name: &str, schema: Schema) -> Self {
        if let SchemaKind::Object { fields, .. } = &mut self.kind {
            fields.push(Field {
                name: name.to_string(),
                schema,
                required: false,
            });
        }
        self
    }

    /// Allow unknown keys (object schemas only).
    pub fn open(mut self) -> Self {
        if let SchemaKind::Object { open, .. } = &mut self.kind {
            *open = true;
        }
        self
    }

    /// Produce the JSON-Schema advertisement for this node.
    pub fn json_schema(&self) -> Value {
        let mut schema = match &self.kind {
            SchemaKind::String { min_len, allowed } => {
                let mut s = json!({"type": "string"});
                if let Some(n) = min_len {
                    s["minLength"] = json!(n);
                }
                if let Some(values) = allowed {
                    s["enum"] = json!(values);
                }
                s
            }
            SchemaKind::Integer { min, max } => {
                let mut s = json!({"type": "integer"});
                if let Some(n) = min {
                    s["minimum"] = json!(n);
                }
                if let Some(n) = max {
                    s["maximum"] = json!(n);
                }
                s
            }
            SchemaKind::Number { min, max } => {
                let mut s = json!({"type": "number"});
                if let Some(n) = min {
                    s["minimum"] = json!(n);
                }
                if let Some(n) = max {
                    s["maximum"] = json!(n);
                }
                s
            }
            SchemaKind::Boolean => json!({"type": "boolean"}),
            SchemaKind::Array { items } => {
                json!({"type": "array", "items": items.json_schema()})
            }
            SchemaKind::Object { fields, open } => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    properties.insert(field.name.clone(), field.schema.json_schema());
                    if field.required {
                        required.push(field.name.clone());
                    }
                }
                let mut s = json!({
                    "type": "object",
                    "properties": properties,
                    "additionalProperties": open,
                });
                if !required.is_empty() {
                    s["required"] = json!(required);
                }
                s
            }
            SchemaKind::Any => json!({}),
        };
        if let Some(desc) = &self.description {
            schema["description"] = json!(desc);
        }
        schema
    }

    /// Validate `value` against this schema.
    ///
    /// `path` is the JSON-pointer prefix for error reporting; pass `"$"` at
    /// the root. Returns a `validation` error naming the offending path.
    pub fn parse(&self, value: &Value, path: &str) -> Result<(), BridgeError> {
        match &self.kind {
            SchemaKind::String { min_len, allowed } => {
                let Some(s) = value.as_str() else {
                    return Err(type_error("string", value, path));
                };
                if let Some(n) = min_len {
                    if s.len() < *n {
                        return Err(BridgeError::validation(
                            format!("string shorter than minimum length {n}"),
                            path,
                        )
                        .with_details(value.clone()));
                    }
                }
                if let Some(values) = allowed {
                    if !values.iter().any(|v| v == s) {
                        return Err(BridgeError::validation(
                            format!("value must be one of: {}", values.join(", ")),
                            path,
                        )
                        .with_details(value.clone()));
                    }
                }
                Ok(())
            }
            SchemaKind::Integer { min, max } => {
                let Some(n) = value.as_i64() else {
                    return Err(type_error("integer", value, path));
                };
                if let Some(lo) = min {
                    if n < *lo {
                        return Err(BridgeError::validation(
                            format!("value below minimum {lo}"),
                            path,
                        )
                        .with_details(value.clone()));
                    }
                }
                if let Some(hi) = max {
                    if n > *hi {
                        return Err(BridgeError::validation(
                            format!("value above maximum {hi}"),
                            path,
                        )
                        .with_details(value.clone()));
                    }
                }
                Ok(())
            }
            SchemaKind::Number { min, max } => {
                let Some(n) = value.as_f64() else {
                    return Err(type_error("number", value, path));
                };
                if let Some(lo) = min {
                    if n < *lo {
                        return Err(BridgeError::validation(
                            format!("value below minimum {lo}"),
                            path,
                        )
                        .with_details(value.clone()));
                    }
                }
                if let Some(hi) = max {
                    if n > *hi {
                        return Err(BridgeError::validation(
                            format!("value above maximum {hi}"),
                            path,
                        )
                        .with_details(value.clone()));
                    }
                }
                Ok(())
            }
            SchemaKind::Boolean => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(type_error("boolean", value, path))
                }
            }
            SchemaKind::Array { items } => {
                let Some(elements) = value.as_array() else {
                    return Err(type_error("array", value, path));
                };
                for (i, element) in elements.iter().enumerate() {
                    items.parse(element, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            SchemaKind::Object { fields, open } => {
                let Some(map) = value.as_object() else {
                    return Err(type_error("object", value, path));
                };
                if !open {
                    for key in map.keys() {
                        if !fields.iter().any(|f| &f.name == key) {
                            return Err(BridgeError::validation(
                                format!("unknown field '{key}'"),
                                format!("{path}.{key}"),
                            ));
                        }
                    }
                }
                for field in fields {
                    let field_path = format!("{path}.{}", field.name);
                    match map.get(&field.name) {
                        Some(v) => field.schema.parse(v, &field_path)?,
                        None if field.required => {
                            return Err(BridgeError::validation(
                                "missing required field",
                                field_path,
                            ));
                        }
                        None => {}
                    }
                }
                Ok(())
            }
            SchemaKind::Any => Ok(()),
        }
    }
}

fn type_error(expected: &str, value: &Value, path: &str) -> BridgeError {
    BridgeError::validation(format!("expected {expected}"), path).with_details(value.clone())
}

// ---------------------------------------------------------------------------
// Grouped-operation unions
// ---------------------------------------------------------------------------

/// The fixed discriminator property of grouped tools.
pub const OP_KEY: &str = "op";

/// One sub-operation of a grouped tool.
///
/// The variant list is the single source of truth: [`op_union`] derives the
/// `oneOf` advertisement from it and [`split_op`] derives the routing table.
#[derive(Debug, Clone)]
pub struct OpVariant {
    /// Discriminator value.
    pub op: &'static str,
    /// One-line summary used in the advertisement.
    pub summary: &'static str,
    /// Schema of the variant payload, excluding the `op` key itself.
    pub schema: Schema,
}

impl OpVariant {
    /// Declare a variant.
    pub fn new(op: &'static str, summary: &'static str, schema: Schema) -> Self {
        Self {
            op,
            summary,
            schema,
        }
    }
}

/// Sorted list of the discriminator values.
pub fn allowed_ops(variants: &[OpVariant]) -> Vec<String> {
    let mut ops: Vec<String> = variants.iter().map(|v| v.op.to_string()).collect();
    ops.sort();
    ops
}

/// Build the `oneOf` discriminated-union advertisement keyed on `op`.
pub fn op_union(variants: &[OpVariant]) -> Value {
    let branches: Vec<Value> = variants
        .iter()
        .map(|variant| {
            let mut branch = variant.schema.json_schema();
            branch["description"] = json!(variant.summary);
            let props = branch["properties"]
                .as_object_mut()
                .expect("variant schemas are objects");
            props.insert(OP_KEY.to_string(), json!({"const": variant.op}));
            let mut required = branch
                .get("required")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            required.insert(0, json!(OP_KEY));
            branch["required"] = json!(required);
            branch
        })
        .collect();
    json!({"type": "object", "oneOf": branches})
}

/// Validate a grouped-tool call and split it into `(op, payload)`.
///
/// The payload is the argument object with the `op` key stripped, validated
/// against the matching variant schema. Missing or unknown `op` yields a
/// `validation` error at `$.op` carrying the sorted `allowed` list.
pub fn split_op(arguments: &Value, variants: &[OpVariant]) -> Result<(String, Value), BridgeError> {
    let Some(map) = arguments.as_object() else {
        return Err(type_error("object", arguments, "$"));
    };
    let allowed = allowed_ops(variants);
    let op = match map.get(OP_KEY) {
        Some(Value::String(op)) => op.clone(),
        Some(other) => {
            return Err(type_error("string", other, "$.op")
                .with_details(json!({"allowed": allowed})));
        }
        None => {
            return Err(BridgeError::validation("missing required field", "$.op")
                .with_details(json!({"allowed": allowed})));
        }
    };
    let Some(variant) = variants.iter().find(|v| v.op == op) else {
        return Err(
            BridgeError::validation(format!("unknown operation '{op}'"), "$.op")
                .with_details(json!({"allowed": allowed})),
        );
    };

    let mut payload = map.clone();
    payload.remove(OP_KEY);
    let payload = Value::Object(payload);
    variant.schema.parse(&payload, "$")?;
    Ok((op, payload))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
