use std::time::Duration;

use async_stream::stream;
use bon::Builder;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::error::{PoeRequestError, parse_error_response};
use crate::event::SseEvent;
use crate::request::QueryRequest;
use crate::session::{
    QueryOutcome, QuerySession, RetryPolicy, SessionState, SessionUpdate, collect_events,
    log_event, log_transition,
};
use crate::streaming::SseParser;

pub const DEFAULT_BASE_URL: &str = "https://api.poe.com/bot";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Poe bot query API client
#[derive(Debug, Clone, Builder)]
pub struct Poe {
    /// Base URL; the bot name is appended as the last path segment
    #[builder(default = DEFAULT_BASE_URL.to_string(), into)]
    pub base_url: String,

    /// Deadline for the response headers of one attempt
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,

    /// Deadline for a whole streaming attempt, body included
    #[builder(default = DEFAULT_STREAM_TIMEOUT)]
    pub stream_timeout: Duration,

    #[builder(default)]
    pub retry_policy: RetryPolicy,

    /// HTTP client for making requests
    #[builder(skip)]
    client: reqwest::Client,
}

impl Default for Poe {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Poe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bot_url(&self, bot: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), bot)
    }

    /// Query a bot and collect the events of the attempt that succeeded
    pub async fn query(
        &self,
        bot: &str,
        request: &QueryRequest,
        api_key: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<SseEvent>, PoeRequestError> {
        collect_events(self.stream_query(bot, request, api_key, cancel)).await
    }

    /// Start a retried, cancellable query session.
    ///
    /// Nothing is sent until the returned stream is first polled. Events are
    /// read from the socket only as fast as the stream is consumed.
    pub fn stream_query(
        &self,
        bot: &str,
        request: &QueryRequest,
        api_key: &str,
        cancel: CancellationToken,
    ) -> QuerySession {
        let client = self.client.clone();
        let url = self.bot_url(bot);
        let bot = bot.to_string();
        let api_key = api_key.to_string();
        let body = request.clone();
        let policy = self.retry_policy;
        let header_timeout = self.timeout;
        let stream_timeout = self.stream_timeout;

        Box::pin(stream! {
            let max_attempts = policy.max_attempts();
            let mut last_error = None;

            for attempt in 0..max_attempts {
                let number = attempt + 1;

                if attempt > 0 {
                    if cancel.is_cancelled() {
                        log_transition(&bot, SessionState::Cancelled);
                        yield SessionUpdate::Finished(QueryOutcome::Cancelled);
                        return;
                    }

                    let delay = policy.delay_for(attempt);
                    log_transition(&bot, SessionState::BackingOff { attempt: number, delay });
                    let slept = tokio::select! {
                        () = cancel.cancelled() => false,
                        () = tokio::time::sleep(delay) => true,
                    };
                    if !slept {
                        log_transition(&bot, SessionState::Cancelled);
                        yield SessionUpdate::Finished(QueryOutcome::Cancelled);
                        return;
                    }
                }

                log_transition(&bot, SessionState::Attempting { attempt: number });
                log::debug!("POST {url} (Authorization: Bearer ***)");

                let send = client
                    .post(&url)
                    .header(CONTENT_TYPE, "application/json")
                    .header(ACCEPT, "text/event-stream")
                    .bearer_auth(&api_key)
                    .timeout(stream_timeout)
                    .json(&body)
                    .send();

                let sent = tokio::select! {
                    () = cancel.cancelled() => None,
                    sent = tokio::time::timeout(header_timeout, send) => Some(sent),
                };
                let Some(sent) = sent else {
                    log_transition(&bot, SessionState::Cancelled);
                    yield SessionUpdate::Finished(QueryOutcome::Cancelled);
                    return;
                };

                let response = match sent {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => Err(PoeRequestError::from(e)),
                    Err(_) => Err(PoeRequestError::Timeout(header_timeout)),
                };

                let response = match response {
                    Ok(response) if response.status().is_success() => response,
                    Ok(response) => {
                        let status = response.status();
                        let read = tokio::select! {
                            () = cancel.cancelled() => None,
                            read = response.bytes() => Some(read),
                        };
                        let Some(read) = read else {
                            log_transition(&bot, SessionState::Cancelled);
                            yield SessionUpdate::Finished(QueryOutcome::Cancelled);
                            return;
                        };
                        let err = match read {
                            Ok(bytes) => parse_error_response(status, &bytes),
                            Err(e) => PoeRequestError::from(e),
                        };
                        log::warn!("poe query to {bot}: attempt {number} rejected: {err}");
                        yield SessionUpdate::AttemptDiscarded { attempt: number, reason: err.to_string() };
                        last_error = Some(err);
                        continue;
                    }
                    Err(err) => {
                        log::warn!("poe query to {bot}: attempt {number} failed: {err}");
                        yield SessionUpdate::AttemptDiscarded { attempt: number, reason: err.to_string() };
                        last_error = Some(err);
                        continue;
                    }
                };

                log_transition(&bot, SessionState::Streaming { attempt: number });
                let mut parser = SseParser::from_response(response);

                let failure = loop {
                    let next = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        next = parser.next_event() => Some(next),
                    };
                    let Some(next) = next else {
                        log_transition(&bot, SessionState::Cancelled);
                        yield SessionUpdate::Finished(QueryOutcome::Cancelled);
                        return;
                    };

                    match next {
                        Ok(Some(event)) => {
                            log_event(&bot, &event);
                            yield SessionUpdate::Event(event);
                            if cancel.is_cancelled() {
                                log_transition(&bot, SessionState::Cancelled);
                                yield SessionUpdate::Finished(QueryOutcome::Cancelled);
                                return;
                            }
                        }
                        Ok(None) => break None,
                        Err(err) => break Some(err),
                    }
                };

                match failure {
                    None => {
                        log_transition(&bot, SessionState::Succeeded);
                        yield SessionUpdate::Finished(QueryOutcome::Succeeded { attempts: number });
                        return;
                    }
                    Some(err) => {
                        log::warn!("poe query to {bot}: stream of attempt {number} broke: {err}");
                        yield SessionUpdate::AttemptDiscarded { attempt: number, reason: err.to_string() };
                        last_error = Some(err);
                    }
                }
            }

            log_transition(&bot, SessionState::Failed);
            let source = last_error.unwrap_or_else(|| {
                PoeRequestError::InvalidEventData("no attempt was made".to_string())
            });
            yield SessionUpdate::Finished(QueryOutcome::Failed(PoeRequestError::RetriesExhausted {
                bot,
                attempts: max_attempts,
                source: Box::new(source),
            }));
        })
    }
}
