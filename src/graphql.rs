//! GraphQL request envelope.
//!
//! GraphQL calls go over plain HTTP POST with a JSON body of
//! `{"query", "operationName", "variables"}`; the response flows through
//! the same execution path as any REST call.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::errors::{Result, WaypostError};

/// A GraphQL request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    /// The GraphQL query or mutation document
    pub query: String,

    /// Operation name, for documents with multiple operations
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// Variables object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<JsonValue>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
        }
    }

    /// Builds the envelope from stored body fields. The variables text
    /// must parse as a JSON object or null; anything else is a config
    /// error surfaced before any network activity.
    pub fn from_parts(
        query: &str,
        variables: Option<&str>,
        operation_name: Option<&str>,
    ) -> Result<Self> {
        let variables = match variables {
            Some(text) if !text.trim().is_empty() => {
                let parsed: JsonValue = serde_json::from_str(text).map_err(|e| {
                    WaypostError::Config(format!("GraphQL variables are not valid JSON: {}", e))
                })?;
                match parsed {
                    JsonValue::Null => None,
                    JsonValue::Object(_) => Some(parsed),
                    other => {
                        return Err(WaypostError::Config(format!(
                            "GraphQL variables must be a JSON object, got {}",
                            json_type_name(&other)
                        )))
                    }
                }
            }
            _ => None,
        };

        Ok(Self {
            query: query.to_string(),
            operation_name: operation_name
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            variables,
        })
    }

    /// Envelope as a JSON value, omitting null or empty optional fields.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = json!({
            "query": self.query
        });

        if let Some(ref op_name) = self.operation_name {
            obj["operationName"] = json!(op_name);
        }

        if let Some(ref vars) = self.variables {
            if !vars.is_null() && vars.as_object().map(|o| !o.is_empty()).unwrap_or(true) {
                obj["variables"] = vars.clone();
            }
        }

        obj
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
