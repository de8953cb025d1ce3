//! Function-calling types: declarations sent at setup, calls received from the
//! model and the responses sent back.

use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A callable function advertised to the model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    /// Unique within one session configuration.
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Schema>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Schema) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// A batch of function calls issued by the model within one turn.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub function_calls: Vec<FunctionCall>,
}

impl ToolCall {
    pub fn ids(&self) -> Vec<&str> {
        self.function_calls.iter().map(|c| c.id.as_str()).collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Correlates the call with its response.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// The answer to one [`ToolCall`]; carries one entry per call id.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub response: Value,
}

impl FunctionResponse {
    /// A successful result. Non-object payloads are wrapped as `{"output": ..}`
    /// because the endpoint only accepts objects here.
    pub fn success(call: &FunctionCall, output: Value) -> Self {
        let response = match output {
            Value::Object(_) => output,
            other => json!({ "output": other }),
        };
        Self {
            id: call.id.clone(),
            name: Some(call.name.clone()),
            response,
        }
    }

    /// An error result, `{"error": message}`.
    pub fn error(call: &FunctionCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: Some(call.name.clone()),
            response: json!({ "error": message.into() }),
        }
    }

    /// The error message if this is an error result.
    pub fn error_message(&self) -> Option<&str> {
        self.response.get("error").and_then(Value::as_str)
    }
}
