//! Target schemas for structured tasks.
//!
//! A [`Schema`] describes the shape a model response must take. It drives
//! three things: default back-fill of truncated partial results, validation
//! of candidate values, and the JSON Schema document sent to providers that
//! support a native structured-output mode.

use narragraph_core::TaskError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

/// Declared shape of a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String,
    Number,
    Integer,
    Boolean,
    /// Fields in declaration order
    Object(Vec<(String, Schema)>),
    Array(Box<Schema>),
    /// One of a fixed set of strings
    Enum(Vec<String>),
    Nullable(Box<Schema>),
    Any,
}

/// The closed set of kinds back-fill distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Other,
}

impl Schema {
    /// Object schema from `(name, schema)` pairs.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array(element: Schema) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn nullable(inner: Schema) -> Self {
        Self::Nullable(Box::new(inner))
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn kind(&self) -> SchemaKind {
        match self {
            Self::String => SchemaKind::String,
            Self::Number | Self::Integer => SchemaKind::Number,
            Self::Boolean => SchemaKind::Boolean,
            Self::Object(_) => SchemaKind::Object,
            Self::Array(_) => SchemaKind::Array,
            Self::Enum(_) | Self::Nullable(_) | Self::Any => SchemaKind::Other,
        }
    }

    /// Field names and their kinds, empty for non-object schemas.
    pub fn shape(&self) -> Vec<(&str, SchemaKind)> {
        match self {
            Self::Object(fields) => fields
                .iter()
                .map(|(name, schema)| (name.as_str(), schema.kind()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Placeholder value for a missing leaf of this schema.
    pub fn default_value(&self) -> Value {
        match self.kind() {
            SchemaKind::String => Value::String(String::new()),
            SchemaKind::Number => json!(0),
            SchemaKind::Boolean => Value::Bool(false),
            SchemaKind::Object => self.fill(None, Fill::Strict),
            SchemaKind::Array => Value::Array(Vec::new()),
            SchemaKind::Other => Value::Null,
        }
    }

    /// Fill the keys `value` is missing with their defaults.
    ///
    /// Keys the schema does not declare are dropped, missing objects are
    /// filled recursively, arrays are filled element-wise and missing leaves
    /// take [`Schema::default_value`]. Present values are never replaced: a
    /// value of the wrong type, containers included, is kept as it is so
    /// that [`Schema::validate`] rejects it.
    pub fn backfill(&self, value: &Value) -> Value {
        self.fill(Some(value), Fill::Strict)
    }

    /// Reshape a truncated partial value to exactly this schema's structure.
    ///
    /// Unlike [`Schema::backfill`], a container of the wrong type (or a null
    /// nested object) counts as missing and is replaced by its default.
    pub fn backfill_partial(&self, value: &Value) -> Value {
        self.fill(Some(value), Fill::Lenient)
    }

    fn fill(&self, value: Option<&Value>, mode: Fill) -> Value {
        match self {
            Self::Object(fields) => {
                let source = match value {
                    None => None,
                    Some(Value::Object(obj)) => Some(obj),
                    Some(other) if mode == Fill::Strict => return other.clone(),
                    Some(_) => None,
                };
                let filled: Map<String, Value> = fields
                    .iter()
                    .map(|(name, schema)| {
                        let child = source.and_then(|obj| obj.get(name));
                        let child = match (schema.kind(), mode) {
                            (SchemaKind::Object, Fill::Lenient) => child.filter(|v| !v.is_null()),
                            _ => child,
                        };
                        (name.clone(), schema.fill(child, mode))
                    })
                    .collect();
                Value::Object(filled)
            }
            Self::Array(element) => match value {
                Some(Value::Array(items)) => Value::Array(
                    items.iter().map(|item| element.fill(Some(item), mode)).collect(),
                ),
                Some(other) if mode == Fill::Strict => other.clone(),
                _ => Value::Array(Vec::new()),
            },
            _ => value.cloned().unwrap_or_else(|| self.default_value()),
        }
    }

    /// Check `value` against this schema.
    pub fn validate(&self, value: &Value) -> Result<(), TaskError> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), TaskError> {
        let ok = match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Self::Boolean => value.is_boolean(),
            Self::Enum(allowed) => value
                .as_str()
                .is_some_and(|s| allowed.iter().any(|a| a == s)),
            Self::Any => true,
            Self::Nullable(inner) => {
                if value.is_null() {
                    return Ok(());
                }
                return inner.validate_at(value, path);
            }
            Self::Object(fields) => {
                let Some(obj) = value.as_object() else {
                    return Err(mismatch(path, self));
                };
                for (name, schema) in fields {
                    let child_path = format!("{path}.{name}");
                    match obj.get(name) {
                        Some(child) => schema.validate_at(child, &child_path)?,
                        None => return Err(mismatch(&child_path, schema)),
                    }
                }
                true
            }
            Self::Array(element) => {
                let Some(items) = value.as_array() else {
                    return Err(mismatch(path, self));
                };
                for (i, item) in items.iter().enumerate() {
                    element.validate_at(item, &format!("{path}[{i}]"))?;
                }
                true
            }
        };
        if ok { Ok(()) } else { Err(mismatch(path, self)) }
    }

    /// Back-fill, validate and deserialize a candidate value.
    pub fn coerce<T: DeserializeOwned>(&self, value: &Value) -> Result<T, TaskError> {
        self.typed(self.backfill(value))
    }

    /// Like [`Schema::coerce`] but with the lenient partial back-fill.
    pub fn coerce_partial<T: DeserializeOwned>(&self, value: &Value) -> Result<T, TaskError> {
        self.typed(self.backfill_partial(value))
    }

    fn typed<T: DeserializeOwned>(&self, filled: Value) -> Result<T, TaskError> {
        self.validate(&filled)?;
        serde_json::from_value(filled).map_err(|e| TaskError::SchemaValidation {
            path: "$".into(),
            expected: e.to_string(),
        })
    }

    /// JSON Schema document in the strict dialect used for native
    /// structured output: every property required, no extra properties.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Number => json!({ "type": "number" }),
            Self::Integer => json!({ "type": "integer" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Enum(values) => json!({ "type": "string", "enum": values }),
            Self::Nullable(inner) => json!({ "anyOf": [inner.to_json_schema(), { "type": "null" }] }),
            Self::Any => json!({}),
            Self::Array(element) => json!({ "type": "array", "items": element.to_json_schema() }),
            Self::Object(fields) => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|(name, schema)| (name.clone(), schema.to_json_schema()))
                    .collect();
                let required: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false,
                })
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::String => "string".into(),
            Self::Number => "number".into(),
            Self::Integer => "integer".into(),
            Self::Boolean => "boolean".into(),
            Self::Object(_) => "object".into(),
            Self::Array(element) => format!("array<{}>", element.describe()),
            Self::Enum(values) => format!("one of [{}]", values.join(", ")),
            Self::Nullable(inner) => format!("{} or null", inner.describe()),
            Self::Any => "any value".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Strict,
    Lenient,
}

fn mismatch(path: &str, schema: &Schema) -> TaskError {
    TaskError::SchemaValidation {
        path: path.to_string(),
        expected: schema.describe(),
    }
}
