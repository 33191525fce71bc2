use std::collections::HashMap;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version spoken by this client
pub const PROTOCOL_VERSION: &str = "1.1";

/// Query request sent to a Poe bot endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Builder, PartialEq)]
#[builder(builder_type(vis = "pub"), state_mod(vis = "pub"))]
pub struct QueryRequest {
    /// Ordered conversation turns
    #[builder(field)]
    pub query: Vec<ProtocolMessage>,

    /// Tools the bot may call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(field)]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Protocol version
    #[builder(default = PROTOCOL_VERSION.to_string(), into)]
    pub version: String,

    /// Request type, always `query` for chat turns
    #[serde(rename = "type")]
    #[builder(default = "query".to_string(), into)]
    pub r#type: String,

    #[builder(default, into)]
    pub user_id: String,

    #[builder(into)]
    pub conversation_id: String,

    #[builder(into)]
    pub message_id: String,

    /// Platform credential, echoed in the body as well as the header
    #[builder(default, into)]
    pub api_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    #[builder(default)]
    pub skip_system_prompt: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<String, f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

// Builder extensions for convenience methods
impl<S: query_request_builder::State> QueryRequestBuilder<S> {
    /// Append a conversation turn
    pub fn message(mut self, message: ProtocolMessage) -> Self {
        self.query.push(message);
        self
    }

    /// Append several conversation turns
    pub fn messages(mut self, messages: impl IntoIterator<Item = ProtocolMessage>) -> Self {
        self.query.extend(messages);
        self
    }

    /// Add a tool definition
    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.get_or_insert_with(Vec::new).push(tool);
        self
    }

    /// Add several tool definitions; an empty list leaves `tools` unset
    pub fn tools(mut self, tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        let mut tools = tools.into_iter().peekable();
        if tools.peek().is_some() {
            self.tools.get_or_insert_with(Vec::new).extend(tools);
        }
        self
    }
}

/// A single conversation turn in Poe's vocabulary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl ProtocolMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            content_type: None,
            timestamp: None,
            message_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(Role::Bot, content)
    }
}

/// Participant roles understood by Poe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Bot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub r#type: String,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    pub fn function(function: FunctionDefinition) -> Self {
        Self {
            r#type: "function".to_string(),
            function,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

/// JSON-schema object describing function arguments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionParameters {
    #[serde(rename = "type")]
    pub r#type: String,
    pub properties: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for FunctionParameters {
    fn default() -> Self {
        Self {
            r#type: "object".to_string(),
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_request_wire_shape() {
        let request = QueryRequest::builder()
            .message(ProtocolMessage::system("be brief"))
            .message(ProtocolMessage::user("hi"))
            .conversation_id("conv")
            .message_id("msg-1")
            .api_key("secret")
            .temperature(0.5)
            .build();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "query": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
                "version": "1.1",
                "type": "query",
                "user_id": "",
                "conversation_id": "conv",
                "message_id": "msg-1",
                "api_key": "secret",
                "temperature": 0.5
            })
        );
    }

    #[test]
    fn test_skip_system_prompt_serialized_when_set() {
        let request = QueryRequest::builder()
            .conversation_id("conv")
            .message_id("msg-1")
            .skip_system_prompt(true)
            .build();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["skip_system_prompt"], json!(true));
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_role_display_matches_wire() {
        assert_eq!(Role::Bot.to_string(), "bot");
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);
    }
}
