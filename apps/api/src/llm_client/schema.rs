//! Statically declared output schemas for structured inference calls.
//!
//! Every stage declares the fields it expects back. Responses are checked
//! against the declaration at the client boundary; anything that does not
//! conform is rejected, never coerced.

use serde_json::{Map, Value};

use crate::llm_client::LlmError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text,
    Boolean,
    /// A finite number in [0, 1].
    UnitFloat,
    /// One of a fixed set of strings.
    Enumerated(&'static [&'static str]),
}

impl FieldKind {
    fn describe(&self) -> String {
        match self {
            FieldKind::Text => "string".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::UnitFloat => "number between 0.0 and 1.0".to_string(),
            FieldKind::Enumerated(values) => format!(
                "one of: {}",
                values
                    .iter()
                    .map(|v| format!("\"{v}\""))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSchema {
    pub fields: &'static [OutputField],
}

impl OutputSchema {
    /// Checks `value` against the declared fields and returns an object holding
    /// exactly those fields. Undeclared fields are dropped.
    pub fn conform(&self, value: Value) -> Result<Value, LlmError> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(LlmError::Schema(format!(
                    "expected a JSON object, got {}",
                    type_name(&other)
                )))
            }
        };

        let mut conformed = Map::with_capacity(self.fields.len());
        for field in self.fields {
            let raw = object
                .remove(field.name)
                .ok_or_else(|| LlmError::Schema(format!("missing field '{}'", field.name)))?;
            check_field(field, &raw)?;
            conformed.insert(field.name.to_string(), raw);
        }

        Ok(Value::Object(conformed))
    }

    /// Renders the schema as prompt text: one line per field.
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("  \"{}\": {} ({})", f.name, f.kind.describe(), f.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn check_field(field: &OutputField, raw: &Value) -> Result<(), LlmError> {
    let mismatch = || {
        LlmError::Schema(format!(
            "field '{}' must be {}, got {}",
            field.name,
            field.kind.describe(),
            type_name(raw)
        ))
    };

    match field.kind {
        FieldKind::Text => raw.as_str().map(|_| ()).ok_or_else(mismatch),
        FieldKind::Boolean => raw.as_bool().map(|_| ()).ok_or_else(mismatch),
        FieldKind::UnitFloat => {
            let n = raw.as_f64().ok_or_else(mismatch)?;
            if n.is_finite() && (0.0..=1.0).contains(&n) {
                Ok(())
            } else {
                Err(LlmError::Schema(format!(
                    "field '{}' must be between 0.0 and 1.0, got {n}",
                    field.name
                )))
            }
        }
        FieldKind::Enumerated(values) => {
            let s = raw.as_str().ok_or_else(mismatch)?;
            if values.contains(&s) {
                Ok(())
            } else {
                Err(LlmError::Schema(format!(
                    "field '{}' has value '{s}' outside the allowed set",
                    field.name
                )))
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
