use conversion_ox::{
    ConversionError,
    poe_openai::{ChunkTransducer, CompletionContext, TransducerState},
};
use openai_ox::{ChatCompletionChunk, FinishReason, Role};
use poe_ox::SseEvent;
use serde_json::json;

fn context() -> CompletionContext {
    CompletionContext {
        id: "chatcmpl-fixed".to_string(),
        created: 1_717_171_717,
        model: "GPT-4o-Mini".to_string(),
    }
}

fn text(value: &str) -> SseEvent {
    SseEvent::new("text", json!({ "text": value }).to_string())
}

fn done() -> SseEvent {
    SseEvent::new("done", "{}")
}

fn tool_call_event(id: &str, name: &str, arguments: &str) -> SseEvent {
    SseEvent::new(
        "json",
        json!({
            "data": {
                "choices": [{
                    "delta": {
                        "tool_calls": [{
                            "id": id,
                            "type": "function",
                            "function": {"name": name, "arguments": arguments}
                        }]
                    }
                }]
            }
        })
        .to_string(),
    )
}

/// Run events through one session, keeping only emitted chunks
fn run(events: &[SseEvent]) -> Vec<ChatCompletionChunk> {
    let transducer = ChunkTransducer::new(context());
    let mut state = TransducerState::default();
    events
        .iter()
        .filter_map(|event| transducer.transform(event, &mut state).unwrap())
        .collect()
}

#[test]
fn test_text_then_done_scenario() {
    let chunks = run(&[text("Hi"), done()]);
    assert_eq!(chunks.len(), 2);

    assert_eq!(
        serde_json::to_value(&chunks[0]).unwrap(),
        json!({
            "id": "chatcmpl-fixed",
            "object": "chat.completion.chunk",
            "created": 1_717_171_717,
            "model": "GPT-4o-Mini",
            "choices": [{
                "index": 0,
                "delta": {"role": "assistant", "content": "Hi"},
                "finish_reason": null
            }]
        })
    );
    assert_eq!(
        serde_json::to_value(&chunks[1]).unwrap()["choices"][0],
        json!({"index": 0, "delta": {}, "finish_reason": "stop"})
    );
}

#[test]
fn test_role_is_emitted_exactly_once() {
    let mut events: Vec<SseEvent> = (0..20).map(|i| text(&format!("token {i} "))).collect();
    events.push(done());

    let chunks = run(&events);
    assert_eq!(chunks.len(), 21);
    let with_role = chunks
        .iter()
        .filter(|chunk| chunk.first_delta().and_then(|d| d.role.clone()).is_some())
        .count();
    assert_eq!(with_role, 1);
    assert_eq!(chunks[0].first_delta().unwrap().role, Some(Role::Assistant));
}

#[test]
fn test_done_alone_still_carries_role() {
    let chunks = run(&[done()]);
    assert_eq!(chunks.len(), 1);
    let delta = chunks[0].first_delta().unwrap();
    assert_eq!(delta.role, Some(Role::Assistant));
    assert_eq!(delta.content, None);
    assert_eq!(chunks[0].finish_reason(), Some(FinishReason::Stop));
}

#[test]
fn test_tool_calls_set_finish_reason() {
    let chunks = run(&[
        text("Let me check."),
        tool_call_event("call_1", "get_weather", "{\"city\":\"Oslo\"}"),
        done(),
    ]);
    assert_eq!(chunks.len(), 3);

    let delta = chunks[1].first_delta().unwrap();
    assert_eq!(delta.role, None);
    let calls = delta.tool_calls.as_ref().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].index, 0);
    assert_eq!(calls[0].id.as_deref(), Some("call_1"));
    assert_eq!(calls[0].r#type.as_deref(), Some("function"));
    let function = calls[0].function.as_ref().unwrap();
    assert_eq!(function.name.as_deref(), Some("get_weather"));
    assert_eq!(function.arguments.as_deref(), Some("{\"city\":\"Oslo\"}"));

    assert_eq!(chunks[2].finish_reason(), Some(FinishReason::ToolCalls));
}

#[test]
fn test_finish_reason_tracks_tool_call_observation() {
    let sequences: Vec<(Vec<SseEvent>, FinishReason)> = vec![
        (vec![done()], FinishReason::Stop),
        (vec![text("a"), text("b"), done()], FinishReason::Stop),
        (vec![tool_call_event("1", "f", "{}"), done()], FinishReason::ToolCalls),
        (
            vec![tool_call_event("1", "f", "{}"), text("after"), done()],
            FinishReason::ToolCalls,
        ),
        (
            vec![SseEvent::new("meta", "{}"), text("x"), done()],
            FinishReason::Stop,
        ),
    ];

    for (events, expected) in sequences {
        let chunks = run(&events);
        assert_eq!(chunks.last().unwrap().finish_reason(), Some(expected));
    }
}

#[test]
fn test_first_tool_call_chunk_carries_role() {
    let transducer = ChunkTransducer::new(context());
    let mut state = TransducerState::default();

    let chunk = transducer
        .transform(&tool_call_event("call_9", "f", "{}"), &mut state)
        .unwrap()
        .unwrap();
    assert_eq!(chunk.first_delta().unwrap().role, Some(Role::Assistant));
    assert_eq!(
        state,
        TransducerState {
            first_content_chunk_pending: false,
            tool_call_observed: true,
        }
    );
}

#[test]
fn test_json_delta_content_is_forwarded() {
    let event = SseEvent::new(
        "json",
        json!({"data": {"choices": [{"delta": {"content": "from json"}}]}}).to_string(),
    );
    let chunks = run(&[event]);
    assert_eq!(chunks.len(), 1);
    assert_eq!(
        chunks[0].first_delta().unwrap().content.as_deref(),
        Some("from json")
    );
}

#[test]
fn test_replace_response_is_a_content_delta() {
    let event = SseEvent::new("replace_response", r#"{"text": "rewritten"}"#);
    let chunks = run(&[text("draft"), event]);
    assert_eq!(
        chunks[1].first_delta().unwrap().content.as_deref(),
        Some("rewritten")
    );
}

#[test]
fn test_suppressed_events_emit_nothing_and_keep_state() {
    let transducer = ChunkTransducer::new(context());
    let mut state = TransducerState::default();

    for event in [
        SseEvent::new("meta", r#"{"content_type": "text/markdown"}"#),
        SseEvent::new("suggested_reply", r#"{"text": "Tell me more"}"#),
        SseEvent::new(
            "file",
            r#"{"url": "https://x/y.png", "content_type": "image/png", "name": "y.png"}"#,
        ),
        SseEvent::new("meta", "not json"),
        SseEvent::new("file", "{}"),
        SseEvent::new("ping", ""),
        SseEvent::new("json", r#"{"data": {"status": "thinking"}}"#),
        text(""),
    ] {
        assert!(transducer.transform(&event, &mut state).unwrap().is_none());
    }
    assert_eq!(state, TransducerState::default());
}

#[test]
fn test_error_event_is_terminal() {
    let transducer = ChunkTransducer::new(context());
    let mut state = TransducerState::default();

    let err = transducer
        .transform(
            &SseEvent::new("error", r#"{"allow_retry": false, "text": "rate limited"}"#),
            &mut state,
        )
        .unwrap_err();
    assert!(matches!(&err, ConversionError::BotReported(text) if text == "rate limited"));
    assert!(err.is_terminal());

    let err = transducer
        .transform(&SseEvent::new("error", r#"{"allow_retry": true}"#), &mut state)
        .unwrap_err();
    assert!(matches!(&err, ConversionError::BotReported(text) if text == "Poe bot reported an error."));

    let err = transducer
        .transform(&SseEvent::new("error", "<html>"), &mut state)
        .unwrap_err();
    assert!(matches!(&err, ConversionError::UnparsableBotError(data) if data == "<html>"));
    assert!(err.is_terminal());
}

#[test]
fn test_bad_payload_is_recoverable() {
    let transducer = ChunkTransducer::new(context());
    let mut state = TransducerState::default();

    let err = transducer
        .transform(&SseEvent::new("text", "not json"), &mut state)
        .unwrap_err();
    assert!(matches!(&err, ConversionError::InvalidPayload { event, .. } if event == "text"));
    assert!(!err.is_terminal());

    let chunk = transducer.transform(&text("ok"), &mut state).unwrap().unwrap();
    assert_eq!(chunk.first_delta().unwrap().role, Some(Role::Assistant));
}

#[test]
fn test_every_chunk_shares_completion_identity() {
    let chunks = run(&[text("a"), text("b"), done()]);
    for chunk in &chunks {
        assert_eq!(chunk.id, "chatcmpl-fixed");
        assert_eq!(chunk.created, 1_717_171_717);
        assert_eq!(chunk.model, "GPT-4o-Mini");
        assert_eq!(chunk.object, ChatCompletionChunk::OBJECT);
    }
}
