//! Tool System
//!
//! The tool-call transport binding: checkout operations exposed as named,
//! schema-described functions an LLM agent invokes one call at a time.
//! Every response is a complete JSON envelope - success wraps the checkout
//! under a fixed key, errors carry the shared UCP error structure - so the
//! agent runtime never sees internal error types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use checkout_core::error::{CheckoutError, ErrorResponse, Result};
use checkout_core::{Checkout, UCP_CHECKOUT_KEY};

/// Tool call request from the agent runtime
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    pub arguments: HashMap<String, Value>,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: HashMap::new(),
            id: None,
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    /// The negotiated UCP profile URI from the `ucp_meta` envelope
    pub fn ucp_profile(&self) -> Option<&str> {
        self.arguments
            .get("ucp_meta")?
            .get("ucp")?
            .get("profile")?
            .as_str()
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

impl ParameterSchema {
    pub fn required(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Whether the tool mutates checkout state
    #[serde(default)]
    pub has_side_effects: bool,
}

/// Tool trait - one implementation per checkout operation
#[async_trait]
pub trait CheckoutTool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool. The returned value is the success payload; errors
    /// are translated to the wire envelope by the registry.
    async fn execute(&self, call: &ToolCall) -> Result<Value>;

    /// Validate arguments before execution
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !call.arguments.contains_key(&param.name) {
                return Err(CheckoutError::InvalidRequest(format!(
                    "missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Success envelope wrapping a checkout under the fixed response key
pub fn checkout_response(checkout: &Checkout) -> Result<Value> {
    Ok(serde_json::json!({
        "status": "success",
        (UCP_CHECKOUT_KEY): serde_json::to_value(checkout)?,
    }))
}

/// Registry for the binding's tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn CheckoutTool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: CheckoutTool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name.clone(), Arc::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn CheckoutTool>> {
        self.tools.get(name).cloned()
    }

    /// Dispatch a tool call, translating every failure into the shared
    /// error envelope. The returned value is always a complete wire
    /// response.
    pub async fn dispatch(&self, call: &ToolCall) -> Value {
        if let Some(profile) = call.ucp_profile() {
            tracing::debug!(tool = %call.name, profile, "Tool call with UCP profile");
        }

        let Some(tool) = self.get(&call.name) else {
            let err = CheckoutError::InvalidRequest(format!("unknown tool: {}", call.name));
            return error_envelope(&err);
        };

        if let Err(err) = tool.validate(call) {
            return error_envelope(&err);
        }

        match tool.execute(call).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "Tool call failed");
                error_envelope(&err)
            }
        }
    }

    /// Get all tool schemas (for system prompt generation)
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
        prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");

        let mut schemas = self.schemas();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));

        for schema in schemas {
            prompt.push_str(&format!("### {}\n", schema.name));
            prompt.push_str(&format!("{}\n", schema.description));

            if !schema.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &schema.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    prompt.push_str(&format!(
                        "- `{}` ({}){}: {}\n",
                        param.name, param.param_type, required, param.description
                    ));
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}

fn error_envelope(err: &CheckoutError) -> Value {
    serde_json::to_value(ErrorResponse::from_error(err))
        .unwrap_or_else(|_| serde_json::json!({"status": "error"}))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl CheckoutTool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo an argument".into(),
                parameters: vec![ParameterSchema::required("value", "string", "Value to echo")],
                has_side_effects: false,
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<Value> {
            Ok(serde_json::json!({"status": "success", "value": call.arguments["value"]}))
        }
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let response = registry.dispatch(&ToolCall::new("nope")).await;
        assert_eq!(response["status"], "error");
        assert_eq!(response["errors"][0]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_dispatch_validates_required_parameters() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let response = registry.dispatch(&ToolCall::new("echo")).await;
        assert_eq!(response["status"], "error");

        let call = ToolCall::new("echo").with_argument("value", serde_json::json!("hi"));
        let response = registry.dispatch(&call).await;
        assert_eq!(response["status"], "success");
    }

    #[test]
    fn test_ucp_profile_extraction() {
        let call = ToolCall::new("echo").with_argument(
            "ucp_meta",
            serde_json::json!({"ucp": {"profile": "https://example.com/profiles/agent.json"}}),
        );
        assert_eq!(
            call.ucp_profile(),
            Some("https://example.com/profiles/agent.json")
        );
        assert_eq!(ToolCall::new("echo").ucp_profile(), None);
    }

    #[test]
    fn test_prompt_section_lists_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let prompt = registry.generate_prompt_section();
        assert!(prompt.contains("### echo"));
        assert!(prompt.contains("`value` (string) (required)"));
    }
}
