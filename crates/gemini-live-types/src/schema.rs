//! Parameter schemas for tool declarations.
//!
//! The endpoint understands an OpenAPI subset. The same schema that is sent to
//! the model at setup is used to check the arguments the model sends back
//! before they reach a handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl SchemaType {
    fn describe(self) -> &'static str {
        match self {
            SchemaType::String => "a string",
            SchemaType::Number => "a number",
            SchemaType::Integer => "an integer",
            SchemaType::Boolean => "a boolean",
            SchemaType::Array => "an array",
            SchemaType::Object => "an object",
        }
    }
}

/// An argument or argument-tree schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

/// Why a value does not conform to a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required argument `{0}`")]
    MissingRequired(String),
    #[error("argument `{path}` must be {expected}, got {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("argument `{path}` must be one of [{allowed}], got `{found}`")]
    NotInEnum {
        path: String,
        allowed: String,
        found: String,
    },
}

impl Schema {
    fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            description: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
            items: None,
            enum_values: Vec::new(),
        }
    }

    pub fn object() -> Self {
        Self::of(SchemaType::Object)
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(SchemaType::Array)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restricts a string schema to a fixed set of values.
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an optional property to an object schema.
    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Adds a property and marks it required.
    pub fn required_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, schema);
        self
    }

    /// Checks `value` against this schema.
    ///
    /// Properties not named in the schema are accepted. Integers may arrive as
    /// floats with no fractional part, which is how some models emit them.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        self.validate_at("", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> Result<(), SchemaError> {
        let mismatch = || SchemaError::TypeMismatch {
            path: display_path(path),
            expected: self.schema_type.describe(),
            found: kind_of(value),
        };

        match self.schema_type {
            SchemaType::String => {
                let s = value.as_str().ok_or_else(mismatch)?;
                if !self.enum_values.is_empty() && !self.enum_values.iter().any(|v| v == s) {
                    return Err(SchemaError::NotInEnum {
                        path: display_path(path),
                        allowed: self.enum_values.join(", "),
                        found: s.to_string(),
                    });
                }
            }
            SchemaType::Number => {
                if !value.is_number() {
                    return Err(mismatch());
                }
            }
            SchemaType::Integer => {
                let is_integral = value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0);
                if !is_integral {
                    return Err(mismatch());
                }
            }
            SchemaType::Boolean => {
                if !value.is_boolean() {
                    return Err(mismatch());
                }
            }
            SchemaType::Array => {
                let items = value.as_array().ok_or_else(mismatch)?;
                if let Some(item_schema) = &self.items {
                    for (i, item) in items.iter().enumerate() {
                        item_schema.validate_at(&format!("{path}[{i}]"), item)?;
                    }
                }
            }
            SchemaType::Object => {
                let object = value.as_object().ok_or_else(mismatch)?;
                for name in &self.required {
                    if object.get(name).is_none_or(Value::is_null) {
                        return Err(SchemaError::MissingRequired(join_path(path, name)));
                    }
                }
                for (name, property) in &self.properties {
                    match object.get(name) {
                        // Optional properties may be sent as explicit nulls.
                        None | Some(Value::Null) => {}
                        Some(v) => property.validate_at(&join_path(path, name), v)?,
                    }
                }
            }
        }
        Ok(())
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "args".to_string()
    } else {
        path.to_string()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
