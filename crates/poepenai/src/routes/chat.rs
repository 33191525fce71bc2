use std::convert::Infallible;

use async_stream::stream;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use conversion_ox::{
    id::generate_id,
    poe_openai::{
        ChunkTransducer, CompletionContext, MESSAGE_ID_PREFIX, TransducerState, aggregate_events,
        openai_request_to_poe_query,
    },
};
use futures_util::StreamExt;
use openai_ox::ChatRequest;
use poe_ox::{EventKind, QueryOutcome, QueryRequest, SessionUpdate, collect_events};
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::state::AppState;

/// Terminator frame of an OpenAI event stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Pull the Poe API key out of `Authorization: Bearer <key>`
pub fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(ApiError::MissingAuthorization);
    };
    let value = value.to_str().map_err(|_| ApiError::InvalidAuthorization)?;

    let mut parts = value.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ApiError::InvalidAuthorization);
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::InvalidAuthorization);
    }
    if token.is_empty() {
        return Err(ApiError::EmptyToken);
    }
    Ok(token.to_string())
}

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request_id = generate_id("req");
    log::debug!(
        "Received chat completion request (request_id: {request_id}, body_bytes: {})",
        body.len()
    );

    let request: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        log::error!("Invalid request body JSON (request_id: {request_id}): {e}");
        ApiError::from(e)
    })?;

    let api_key = bearer_token(&headers).inspect_err(|e| {
        log::warn!("Rejecting request (request_id: {request_id}): {e}");
    })?;

    log::info!(
        "Processing chat completion request (request_id: {request_id}, model: {}, stream: {})",
        request.model,
        request.is_stream()
    );

    let message_id = generate_id(MESSAGE_ID_PREFIX);
    let query =
        openai_request_to_poe_query(&request, &api_key, &state.conversation_id, &message_id);
    if log::log_enabled!(log::Level::Debug) {
        let mut redacted = query.clone();
        redacted.api_key = "[REDACTED]".to_string();
        if let Ok(body) = serde_json::to_string(&redacted) {
            log::debug!("Poe query body (request_id: {request_id}): {body}");
        }
    }

    let context = CompletionContext::new(request.model.clone());

    if request.is_stream() {
        Ok(stream_completion(state, request_id, query, api_key, context))
    } else {
        complete(state, request_id, query, api_key, context)
            .await
            .map(IntoResponse::into_response)
    }
}

/// Relay chunks as they are produced; the stream ends early without `[DONE]` on failure
fn stream_completion(
    state: AppState,
    request_id: String,
    query: QueryRequest,
    api_key: String,
    context: CompletionContext,
) -> Response {
    let cancel = CancellationToken::new();
    let mut session = state
        .poe
        .stream_query(&context.model, &query, &api_key, cancel.clone());
    let transducer = ChunkTransducer::new(context);

    let frames = stream! {
        // Dropping the body (client gone) cancels the session.
        let _guard = cancel.drop_guard();
        let mut flags = TransducerState::default();
        let mut flushed = false;

        while let Some(update) = session.next().await {
            match update {
                SessionUpdate::Event(event) => {
                    match transducer.transform(&event, &mut flags) {
                        Ok(Some(chunk)) => match serde_json::to_string(&chunk) {
                            Ok(json) => {
                                log::debug!("Sending chunk (request_id: {request_id}): {json}");
                                flushed = true;
                                yield Ok::<_, Infallible>(Bytes::from(format!("data: {json}\n\n")));
                            }
                            Err(e) => {
                                log::error!("Failed to serialize chunk (request_id: {request_id}): {e}");
                            }
                        },
                        Ok(None) => {}
                        Err(e) if e.is_terminal() => {
                            log::error!(
                                "Terminating stream on bot error (request_id: {request_id}): {e}"
                            );
                            return;
                        }
                        Err(e) => {
                            log::warn!("Skipping event (request_id: {request_id}): {e}");
                        }
                    }

                    if event.kind() == EventKind::Done {
                        log::info!("Poe 'done' event processed (request_id: {request_id})");
                        yield Ok(Bytes::from_static(DONE_FRAME.as_bytes()));
                        return;
                    }
                }
                SessionUpdate::AttemptDiscarded { attempt, reason } => {
                    if flushed {
                        log::error!(
                            "Attempt {attempt} failed after chunks were sent, ending stream (request_id: {request_id}): {reason}"
                        );
                        return;
                    }
                    log::warn!("Attempt {attempt} discarded (request_id: {request_id}): {reason}");
                    flags = TransducerState::default();
                }
                SessionUpdate::Finished(QueryOutcome::Succeeded { attempts }) => {
                    log::info!(
                        "Poe stream complete after {attempts} attempt(s) (request_id: {request_id})"
                    );
                    yield Ok(Bytes::from_static(DONE_FRAME.as_bytes()));
                    return;
                }
                SessionUpdate::Finished(QueryOutcome::Failed(e)) => {
                    log::error!("Error from Poe stream (request_id: {request_id}): {e}");
                    return;
                }
                SessionUpdate::Finished(QueryOutcome::Cancelled) => {
                    log::info!("Client disconnected during streaming (request_id: {request_id})");
                    return;
                }
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Collect the whole session, then fold it into one response
async fn complete(
    state: AppState,
    request_id: String,
    query: QueryRequest,
    api_key: String,
    context: CompletionContext,
) -> Result<Json<openai_ox::ChatResponse>, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let session = state
        .poe
        .stream_query(&context.model, &query, &api_key, cancel);

    let events = match tokio::time::timeout(state.request_timeout, collect_events(session)).await
    {
        Ok(Ok(events)) => events,
        Ok(Err(e)) => {
            log::error!("Error from Poe during aggregation (request_id: {request_id}): {e}");
            return Err(ApiError::Upstream(e));
        }
        Err(_) => {
            log::warn!(
                "Request timed out during aggregation (request_id: {request_id}, after: {:?})",
                state.request_timeout
            );
            return Err(ApiError::Timeout(state.request_timeout));
        }
    };

    log::info!(
        "Aggregating non-streaming response (request_id: {request_id}, events: {})",
        events.len()
    );
    Ok(Json(aggregate_events(&events, &context)))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}
