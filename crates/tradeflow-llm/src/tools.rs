//! Tool definition types for generation requests

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition handed to a backend
///
/// Describes a tool the backend may request, including its name,
/// description, and input schema in JSON Schema format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match the tool in the registry)
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON schema for the tool's input parameters
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_definition_serializes_schema_verbatim() {
        let schema = json!({
            "type": "object",
            "properties": { "ticker": { "type": "string" } },
            "required": ["ticker"],
        });

        let tool = ToolDefinition::new("price_history", "Daily bars", schema.clone());
        let encoded = serde_json::to_value(&tool).unwrap();

        assert_eq!(encoded["name"], "price_history");
        assert_eq!(encoded["input_schema"], schema);
        assert_eq!(serde_json::from_value::<ToolDefinition>(encoded).unwrap(), tool);
    }
}
