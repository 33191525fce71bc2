//! Streaming conversion from Poe events to OpenAI chunks
//!
//! Poe emits one event per SSE frame while OpenAI clients expect a sequence of
//! `chat.completion.chunk` objects where the role appears exactly once and the
//! last chunk carries the finish reason. The flags that make that possible
//! live in [`TransducerState`], owned by one session.

use openai_ox::{
    ChatCompletionChunk, ChoiceDelta, FinishReason, FunctionCallDelta, MessageDelta,
    Role as OpenAIRole, ToolCallDelta,
};
use poe_ox::{EventKind, PoeRequestError, SseEvent};

use super::json_payload::{JsonShape, PoeToolCall, classify};
use super::{CompletionContext, STREAM_ERROR_FALLBACK};
use crate::ConversionError;

/// Flags that persist across events of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransducerState {
    /// True until a chunk carrying the assistant role has been produced
    pub first_content_chunk_pending: bool,
    /// Set once any tool call fragment has been seen
    pub tool_call_observed: bool,
}

impl Default for TransducerState {
    fn default() -> Self {
        Self {
            first_content_chunk_pending: true,
            tool_call_observed: false,
        }
    }
}

/// Stateless converter for one completion; per-session flags are passed in
#[derive(Debug, Clone)]
pub struct ChunkTransducer {
    /// Identity stamped on every chunk
    context: CompletionContext,
}

impl ChunkTransducer {
    /// Create a transducer producing chunks for `context`
    #[must_use]
    pub fn new(context: CompletionContext) -> Self {
        Self { context }
    }

    /// Completion identity used for every chunk
    #[must_use]
    pub fn context(&self) -> &CompletionContext {
        &self.context
    }

    /// Convert one Poe event into at most one OpenAI chunk.
    ///
    /// `Ok(None)` means the event produces nothing for the client. An `error`
    /// event yields a terminal [`ConversionError`]; any other decode failure
    /// yields [`ConversionError::InvalidPayload`], which callers log and skip.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn transform(
        &self,
        event: &SseEvent,
        state: &mut TransducerState,
    ) -> Result<Option<ChatCompletionChunk>, ConversionError> {
        let mut delta = MessageDelta::default();
        let mut finish_reason = None;

        match event.kind() {
            EventKind::Text | EventKind::ReplaceResponse => {
                let payload = decoded(event, event.partial_response())?;
                if !payload.text.is_empty() {
                    delta.content = Some(payload.text);
                }
            }
            EventKind::SuggestedReply => {
                log::debug!("Suppressing Poe 'suggested_reply' event");
                return Ok(None);
            }
            EventKind::Meta => {
                match event.meta() {
                    Ok(meta) => log::debug!(
                        "Suppressing Poe 'meta' event (content_type: {})",
                        meta.content_type.as_deref().unwrap_or("unset")
                    ),
                    Err(e) => log::debug!("Suppressing undecodable Poe 'meta' event: {e}"),
                }
                return Ok(None);
            }
            EventKind::File => {
                match event.file() {
                    Ok(file) => log::debug!(
                        "Suppressing Poe 'file' event (name: {}, content_type: {}): attachments are not forwarded",
                        file.name,
                        file.content_type
                    ),
                    Err(e) => log::debug!("Suppressing undecodable Poe 'file' event: {e}"),
                }
                return Ok(None);
            }
            EventKind::Json => {
                let payload = decoded(event, event.partial_response())?;
                match classify(payload.data.as_ref()) {
                    JsonShape::ChoiceDelta {
                        content,
                        tool_calls,
                    } => {
                        match tool_calls {
                            Some(Ok(calls)) if !calls.is_empty() => {
                                state.tool_call_observed = true;
                                delta.tool_calls = Some(tool_call_deltas(calls));
                            }
                            Some(Err(reason)) => {
                                log::warn!("Ignoring tool_calls in Poe 'json' event: {reason}");
                            }
                            _ => {}
                        }
                        delta.content = content;
                    }
                    other => {
                        log::debug!("Poe 'json' event carried no choice delta ({other:?})");
                    }
                }
            }
            EventKind::Error => return Err(bot_error(event)),
            EventKind::Done => {
                finish_reason = Some(if state.tool_call_observed {
                    FinishReason::ToolCalls
                } else {
                    FinishReason::Stop
                });
            }
            EventKind::Unrecognized(label) => {
                log::warn!("Unrecognized Poe event type '{label}', skipping");
                return Ok(None);
            }
        }

        let carries_data = delta.content.as_deref().is_some_and(|c| !c.is_empty())
            || delta.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty());
        if state.first_content_chunk_pending && (carries_data || finish_reason.is_some()) {
            delta.role = Some(OpenAIRole::Assistant);
            state.first_content_chunk_pending = false;
        }

        if delta.is_empty() && finish_reason.is_none() {
            return Ok(None);
        }

        Ok(Some(self.chunk(delta, finish_reason)))
    }

    /// Wrap a delta in a chunk stamped with this completion's identity
    fn chunk(&self, delta: MessageDelta, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.context.id.clone(),
            object: ChatCompletionChunk::OBJECT.to_string(),
            created: self.context.created,
            model: self.context.model.clone(),
            choices: vec![ChoiceDelta {
                index: 0,
                delta,
                finish_reason,
                logprobs: None,
            }],
            system_fingerprint: None,
        }
    }
}

/// Attach the event label to a payload decode failure
fn decoded<T>(event: &SseEvent, result: Result<T, PoeRequestError>) -> Result<T, ConversionError> {
    result.map_err(|source| ConversionError::InvalidPayload {
        event: event.event.clone(),
        source,
    })
}

/// Build the terminal error for a Poe `error` event
fn bot_error(event: &SseEvent) -> ConversionError {
    match event.error_payload() {
        Ok(payload) => {
            let text = payload
                .text
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| STREAM_ERROR_FALLBACK.to_string());
            log::error!(
                "Poe bot reported an error (allow_retry: {}, type: {:?}): {text}",
                payload.allow_retry,
                payload.error_type
            );
            ConversionError::BotReported(text)
        }
        Err(e) => {
            log::error!("Poe bot reported an error with an unreadable payload: {e}");
            ConversionError::UnparsableBotError(event.data.clone())
        }
    }
}

/// Map bot tool calls to OpenAI fragments; the position stands in for a missing index
fn tool_call_deltas(calls: Vec<PoeToolCall>) -> Vec<ToolCallDelta> {
    calls
        .into_iter()
        .zip(0u32..)
        .map(|(call, position)| {
            let function = (call.name.is_some() || call.arguments.is_some()).then(|| {
                FunctionCallDelta {
                    name: call.name,
                    arguments: call.arguments,
                }
            });
            ToolCallDelta {
                index: call.index.unwrap_or(position),
                id: call.id,
                r#type: call.r#type,
                function,
            }
        })
        .collect()
}
