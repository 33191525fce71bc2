//! Direct conversions between OpenAI and Poe formats
//!
//! ## Supported Conversions
//!
//! - `openai_request_to_poe_query()` - OpenAI `ChatRequest` → Poe `QueryRequest`
//! - `ChunkTransducer::transform()` - one Poe event → zero or one OpenAI chunk
//! - `aggregate_events()` - finished Poe event list → OpenAI `ChatResponse`
//!
//! ## Limitations
//!
//! - Only `text` content parts are forwarded; images and other parts are dropped
//! - `n`, `max_tokens` and `max_completion_tokens` have no Poe equivalent
//! - `tool_choice` naming one function still sends every tool
//! - Poe reports no token usage, so usage is always zero

mod aggregate;
mod constants;
mod json_payload;
mod streaming;

pub use aggregate::aggregate_events;
pub use constants::*;
pub use streaming::{ChunkTransducer, TransducerState};

use chrono::Utc;
use openai_ox::{
    ChatRequest, Message as OpenAIMessage, MessageContent, Role as OpenAIRole, Tool as OpenAITool,
    ToolChoice,
};
use poe_ox::{
    FunctionDefinition, FunctionParameters, ProtocolMessage, QueryRequest, Role as PoeRole,
    ToolDefinition,
};
use serde_json::Value;

use crate::id::generate_id;

/// Identity shared by every chunk and the aggregate response of one completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    /// Completion identifier, `chatcmpl-...`
    pub id: String,
    /// Unix timestamp fixed when the completion started
    pub created: i64,
    /// Model name exactly as the client sent it
    pub model: String,
}

impl CompletionContext {
    /// Start a new completion for `model`, generating its id and timestamp
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: generate_id(COMPLETION_ID_PREFIX),
            created: Utc::now().timestamp(),
            model: model.into(),
        }
    }
}

/// Map an OpenAI role onto Poe's three roles
#[must_use]
pub fn openai_role_to_poe(role: &OpenAIRole) -> PoeRole {
    match role {
        OpenAIRole::System => PoeRole::System,
        OpenAIRole::User => PoeRole::User,
        OpenAIRole::Developer => {
            log::debug!("Mapping OpenAI 'developer' role to Poe 'user' role");
            PoeRole::User
        }
        OpenAIRole::Assistant => PoeRole::Bot,
        OpenAIRole::Tool => {
            log::warn!("OpenAI 'tool' role has no Poe equivalent, mapping to 'user'");
            PoeRole::User
        }
        OpenAIRole::Other(other) => {
            log::warn!("Unknown OpenAI role '{other}', mapping to 'user'");
            PoeRole::User
        }
    }
}

/// Map a Poe role back to OpenAI
#[must_use]
pub fn poe_role_to_openai(role: PoeRole) -> OpenAIRole {
    match role {
        PoeRole::System => OpenAIRole::System,
        PoeRole::User => OpenAIRole::User,
        PoeRole::Bot => OpenAIRole::Assistant,
    }
}

/// Map a raw Poe role label back to OpenAI; unknown labels become `assistant`
#[must_use]
pub fn poe_role_label_to_openai(label: &str) -> OpenAIRole {
    if let Ok(role) = label.parse::<PoeRole>() {
        poe_role_to_openai(role)
    } else {
        log::warn!("Unknown Poe role '{label}', mapping to 'assistant'");
        OpenAIRole::Assistant
    }
}

/// Flatten message content into the single string Poe accepts.
///
/// Text parts are joined with a newline; other parts are dropped with a warning.
/// Absent content is the empty string.
#[must_use]
pub fn flatten_content(content: Option<&MessageContent>, message_index: usize) -> String {
    match content {
        None => String::new(),
        Some(MessageContent::Text(text)) => text.clone(),
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .enumerate()
            .filter_map(|(part_index, part)| match part.r#type.as_str() {
                "text" => {
                    if part.text.is_none() {
                        log::warn!(
                            "Text content part {part_index} of message {message_index} has no text"
                        );
                    }
                    part.text.as_deref()
                }
                "image_url" => {
                    log::warn!(
                        "Dropping image_url content part {part_index} of message {message_index}: attachments are not forwarded to Poe"
                    );
                    None
                }
                other => {
                    log::warn!(
                        "Dropping unknown content part type '{other}' ({part_index}) of message {message_index}"
                    );
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Convert one OpenAI message to a Poe protocol message
#[must_use]
pub fn openai_message_to_poe(message: &OpenAIMessage, message_index: usize) -> ProtocolMessage {
    ProtocolMessage::new(
        openai_role_to_poe(&message.role),
        flatten_content(message.content.as_ref(), message_index),
    )
}

/// Convert OpenAI tool definitions. Only `function` tools are kept.
#[must_use]
pub fn openai_tools_to_poe(tools: &[OpenAITool]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .filter_map(|tool| {
            if !tool.is_function() {
                log::warn!(
                    "Unsupported OpenAI tool type '{}', only 'function' is supported by Poe",
                    tool.r#type
                );
                return None;
            }

            Some(ToolDefinition::function(FunctionDefinition {
                name: tool.function.name.clone(),
                description: tool.function.description.clone().unwrap_or_default(),
                parameters: function_parameters(tool.function.parameters.as_ref()),
            }))
        })
        .collect()
}

/// Pull `type`, `properties` and `required` out of a JSON schema
fn function_parameters(schema: Option<&Value>) -> FunctionParameters {
    let Some(schema) = schema.and_then(Value::as_object) else {
        return FunctionParameters::default();
    };

    FunctionParameters {
        r#type: schema
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PARAMETERS_TYPE)
            .to_string(),
        properties: schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        required: schema
            .get("required")
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Apply `tool_choice` to the converted tool list
fn apply_tool_choice(
    tools: Vec<ToolDefinition>,
    tool_choice: Option<&ToolChoice>,
) -> Vec<ToolDefinition> {
    match tool_choice {
        None | Some(ToolChoice::Auto | ToolChoice::Required) => tools,
        Some(ToolChoice::None) => {
            log::debug!("OpenAI tool_choice is 'none', omitting tools for Poe");
            Vec::new()
        }
        Some(ToolChoice::Function { function, .. }) => {
            log::warn!(
                "OpenAI tool_choice for function '{}' is not supported by Poe, sending all tools",
                function.name
            );
            tools
        }
        Some(ToolChoice::Other(other)) => {
            log::warn!("OpenAI tool_choice '{other}' is not mappable to Poe, using auto behavior");
            tools
        }
    }
}

/// Convert an OpenAI chat request into a Poe query request
#[must_use]
pub fn openai_request_to_poe_query(
    request: &ChatRequest,
    api_key: &str,
    conversation_id: &str,
    message_id: &str,
) -> QueryRequest {
    log::debug!(
        "Transforming OpenAI request to Poe query (model: {}, messages: {})",
        request.model,
        request.messages.len()
    );

    let query: Vec<ProtocolMessage> = request
        .messages
        .iter()
        .enumerate()
        .map(|(index, message)| openai_message_to_poe(message, index))
        .collect();

    let skip_system_prompt = query.first().is_none_or(|first| first.role != PoeRole::System);

    if request.n.is_some_and(|n| n > 1) {
        log::warn!(
            "OpenAI request asks for n = {:?}, Poe returns a single completion",
            request.n
        );
    }
    if request.max_tokens.is_some() || request.max_completion_tokens.is_some() {
        log::warn!("max_tokens / max_completion_tokens are not supported by Poe and will not be enforced");
    }

    let stop_sequences = request
        .stop
        .clone()
        .map(|stop| {
            stop.into_vec()
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|stops| !stops.is_empty());

    let tools = request
        .tools
        .as_deref()
        .map(openai_tools_to_poe)
        .map(|tools| apply_tool_choice(tools, request.tool_choice.as_ref()))
        .unwrap_or_default();

    QueryRequest::builder()
        .messages(query)
        .tools(tools)
        .user_id(request.user.clone().unwrap_or_default())
        .conversation_id(conversation_id)
        .message_id(message_id)
        .api_key(api_key)
        .maybe_temperature(request.temperature)
        .skip_system_prompt(skip_system_prompt)
        .maybe_logit_bias(request.logit_bias.clone())
        .maybe_stop_sequences(stop_sequences)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_table() {
        assert_eq!(openai_role_to_poe(&OpenAIRole::System), PoeRole::System);
        assert_eq!(openai_role_to_poe(&OpenAIRole::User), PoeRole::User);
        assert_eq!(openai_role_to_poe(&OpenAIRole::Developer), PoeRole::User);
        assert_eq!(openai_role_to_poe(&OpenAIRole::Assistant), PoeRole::Bot);
        assert_eq!(openai_role_to_poe(&OpenAIRole::Tool), PoeRole::User);
        assert_eq!(
            openai_role_to_poe(&OpenAIRole::Other("critic".to_string())),
            PoeRole::User
        );
    }

    #[test]
    fn test_reverse_role_table() {
        assert_eq!(poe_role_to_openai(PoeRole::Bot), OpenAIRole::Assistant);
        assert_eq!(poe_role_label_to_openai("system"), OpenAIRole::System);
        assert_eq!(poe_role_label_to_openai("narrator"), OpenAIRole::Assistant);
    }

    #[test]
    fn test_function_parameters_defaults() {
        let params = function_parameters(None);
        assert_eq!(params.r#type, "object");
        assert!(params.properties.is_empty());
        assert!(params.required.is_empty());
    }
}
