//! Folding a finished Poe event sequence into one OpenAI response

use openai_ox::{
    ChatResponse, Choice, FinishReason, FunctionCall, ResponseMessage, Role as OpenAIRole,
    ToolCall, Usage,
};
use poe_ox::{EventKind, SseEvent};
use serde_json::Value;

use super::json_payload::{JsonShape, PoeToolCall, classify};
use super::{
    AGGREGATE_ERROR_FALLBACK, AGGREGATE_ERROR_MARKER, CompletionContext, TOOL_CALL_TYPE_FUNCTION,
};

/// Build a non-streaming response from every event of a successful session.
///
/// This is a pure fold: the same events and context always give the same
/// response. Undecodable payloads are logged and skipped.
#[must_use]
pub fn aggregate_events(events: &[SseEvent], context: &CompletionContext) -> ChatResponse {
    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut finish_reason = FinishReason::Stop;

    for event in events {
        match event.kind() {
            EventKind::Text => match event.partial_response() {
                Ok(payload) => content.push_str(&payload.text),
                Err(e) => log::warn!("Skipping Poe 'text' event: {e}"),
            },
            EventKind::ReplaceResponse => match event.partial_response() {
                Ok(payload) => {
                    content.clear();
                    content.push_str(&payload.text);
                }
                Err(e) => log::warn!("Skipping Poe 'replace_response' event: {e}"),
            },
            EventKind::Json => match event.partial_response() {
                Ok(payload) => match classify(payload.data.as_ref()) {
                    JsonShape::ChoiceDelta {
                        content: delta_content,
                        tool_calls: delta_calls,
                    } => {
                        if let Some(calls) = delta_calls {
                            merge_tool_calls(&mut tool_calls, calls);
                        }
                        if let Some(text) = delta_content {
                            content.push_str(&text);
                        }
                    }
                    JsonShape::ToolCalls(calls) => merge_tool_calls(&mut tool_calls, calls),
                    JsonShape::EmptyChoices => {
                        log::debug!("Poe 'json' event has choices but no delta");
                    }
                    JsonShape::Other => {
                        if let Some(data) = payload.data {
                            content.push_str(&Value::Object(data).to_string());
                        }
                    }
                },
                Err(e) => log::warn!("Skipping Poe 'json' event: {e}"),
            },
            EventKind::Error => {
                let text = event
                    .error_payload()
                    .ok()
                    .and_then(|payload| payload.text)
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| AGGREGATE_ERROR_FALLBACK.to_string());
                log::warn!("Poe bot reported an error during aggregation: {text}");
                content.push('\n');
                content.push_str(AGGREGATE_ERROR_MARKER);
                content.push_str(": ");
                content.push_str(&text);
                finish_reason = FinishReason::Stop;
            }
            EventKind::Done => {
                finish_reason = if tool_calls.is_empty() {
                    FinishReason::Stop
                } else {
                    FinishReason::ToolCalls
                };
            }
            EventKind::Meta | EventKind::SuggestedReply | EventKind::File => {}
            EventKind::Unrecognized(label) => {
                log::warn!("Unrecognized Poe event type '{label}' during aggregation");
            }
        }
    }

    let content = (!content.is_empty() || tool_calls.is_empty()).then_some(content);

    ChatResponse {
        id: context.id.clone(),
        object: ChatResponse::OBJECT.to_string(),
        created: context.created,
        model: context.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: OpenAIRole::Assistant,
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: Some(finish_reason),
            logprobs: None,
        }],
        usage: Usage::zero(),
        system_fingerprint: None,
    }
}

/// Append decoded tool calls in arrival order
fn merge_tool_calls(merged: &mut Vec<ToolCall>, calls: Result<Vec<PoeToolCall>, String>) {
    match calls {
        Ok(calls) => merged.extend(calls.into_iter().map(|call| ToolCall {
            id: call.id.unwrap_or_default(),
            r#type: call
                .r#type
                .unwrap_or_else(|| TOOL_CALL_TYPE_FUNCTION.to_string()),
            function: FunctionCall {
                name: call.name.unwrap_or_default(),
                arguments: call.arguments.unwrap_or_default(),
            },
        })),
        Err(reason) => log::warn!("Ignoring tool_calls in Poe 'json' event: {reason}"),
    }
}
