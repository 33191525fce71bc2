//! Retry and outcome bookkeeping for a single bot query.

use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use crate::error::PoeRequestError;
use crate::event::{EventKind, SseEvent};

/// Retry budget for one query session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `base_delay * n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Linear backoff before the zero-based `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES, Self::DEFAULT_BASE_DELAY)
    }
}

/// Where a session currently is. Only used for logging transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Attempting { attempt: u32 },
    Streaming { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration },
    Succeeded,
    Failed,
    Cancelled,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attempting { attempt } => write!(f, "attempting (attempt {attempt})"),
            Self::Streaming { attempt } => write!(f, "streaming (attempt {attempt})"),
            Self::BackingOff { attempt, delay } => {
                write!(f, "backing off {delay:?} before attempt {attempt}")
            }
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal result of a session
#[derive(Debug)]
pub enum QueryOutcome {
    Succeeded { attempts: u32 },
    Failed(PoeRequestError),
    Cancelled,
}

/// One item of a running session
#[derive(Debug)]
pub enum SessionUpdate {
    /// A parsed upstream event belonging to the current attempt
    Event(SseEvent),
    /// The current attempt failed; every event it produced is void
    AttemptDiscarded { attempt: u32, reason: String },
    /// Always the last item
    Finished(QueryOutcome),
}

/// Lazy sequence of updates, ending with exactly one [`SessionUpdate::Finished`]
pub type QuerySession = BoxStream<'static, SessionUpdate>;

/// Drain a session into the events of its successful attempt
pub async fn collect_events(mut session: QuerySession) -> Result<Vec<SseEvent>, PoeRequestError> {
    let mut events = Vec::new();

    while let Some(update) = session.next().await {
        match update {
            SessionUpdate::Event(event) => events.push(event),
            SessionUpdate::AttemptDiscarded { .. } => events.clear(),
            SessionUpdate::Finished(QueryOutcome::Succeeded { .. }) => return Ok(events),
            SessionUpdate::Finished(QueryOutcome::Failed(err)) => return Err(err),
            SessionUpdate::Finished(QueryOutcome::Cancelled) => {
                return Err(PoeRequestError::Cancelled);
            }
        }
    }

    Err(PoeRequestError::InvalidEventData(
        "session ended without an outcome".to_string(),
    ))
}

pub(crate) fn log_transition(bot: &str, state: SessionState) {
    match state {
        SessionState::Failed => log::error!("poe query to {bot}: {state}"),
        SessionState::Cancelled | SessionState::BackingOff { .. } => {
            log::warn!("poe query to {bot}: {state}");
        }
        _ => log::debug!("poe query to {bot}: {state}"),
    }
}

/// Log an event at a level matching what it means; never alters the event
pub(crate) fn log_event(bot: &str, event: &SseEvent) {
    match event.kind() {
        EventKind::Error => match event.error_payload() {
            Ok(payload) => log::warn!(
                "poe bot {bot} reported error (allow_retry: {}, error_type: {}): {}",
                payload.allow_retry,
                payload.error_type.as_deref().unwrap_or("unknown"),
                payload.text.as_deref().unwrap_or(""),
            ),
            Err(e) => log::error!("poe bot {bot} sent unparsable error event: {e}"),
        },
        kind => log::debug!("poe event from {bot}: {kind} ({} bytes)", event.data.len()),
    }
}
