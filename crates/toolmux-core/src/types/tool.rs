//! Tool descriptor and call result types

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A tool as reported by a remote server at connect time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name as known to the remote server
    pub name: String,
    /// Description of what the tool does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object" })
}

impl ToolDescriptor {
    /// Create a new tool descriptor with an empty object schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: empty_object_schema(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Input schema as handed to the LLM
    ///
    /// `properties` defaults to an empty object and `additionalProperties`
    /// is forced to `false`.
    pub fn normalized_schema(&self) -> Value {
        let mut schema = match &self.input_schema {
            Value::Object(map) => map.clone(),
            _ => {
                let mut map = Map::new();
                map.insert("type".to_string(), json!("object"));
                map
            }
        };

        let has_properties = matches!(schema.get("properties"), Some(Value::Object(_)));
        if !has_properties {
            schema.insert("properties".to_string(), json!({}));
        }
        schema.insert("additionalProperties".to_string(), Value::Bool(false));

        Value::Object(schema)
    }
}

/// Result of a tool call
///
/// On success `content` is whatever the provider returned. Failures always use
/// the envelope built by [`CallResult::error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Provider-defined content parts
    #[serde(default)]
    pub content: Vec<Value>,
    /// Optional structured payload
    #[serde(
        rename = "structuredContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
    /// Whether this result represents an error
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallResult {
    /// Create a successful result from content parts
    pub fn success(content: Vec<Value>) -> Self {
        Self {
            content,
            structured_content: None,
            is_error: false,
        }
    }

    /// Create a successful single-text result
    pub fn text_result(text: impl Into<String>) -> Self {
        Self::success(vec![json!({ "type": "text", "text": text.into() })])
    }

    /// Create the failure envelope
    ///
    /// `{content:[{type:"text", text:"{\"error\":{\"message\":..,\"name\":..}}"}], isError:true}`
    pub fn error(name: &str, message: &str) -> Self {
        let payload = json!({
            "error": {
                "message": message,
                "name": name,
            }
        });

        Self {
            content: vec![json!({ "type": "text", "text": payload.to_string() })],
            structured_content: None,
            is_error: true,
        }
    }

    /// Extract text content as a string
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c.get("type").and_then(Value::as_str) {
                Some("text") => c.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse the `{error:{message,name}}` payload of a failure envelope
    pub fn error_payload(&self) -> Option<(String, String)> {
        if !self.is_error {
            return None;
        }
        let value: Value = serde_json::from_str(&self.text()).ok()?;
        let error = value.get("error")?;
        let message = error.get("message")?.as_str()?.to_string();
        let name = error.get("name")?.as_str()?.to_string();
        Some((message, name))
    }
}
