use std::sync::Arc;
use std::time::Duration;

use conversion_ox::poe_openai::DEFAULT_CONVERSATION_ID;
use poe_ox::Poe;
use tera::Tera;

use crate::log_ring::LogRing;
use crate::routes::logs;

/// Default deadline for collecting a non-streaming completion
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub poe: Poe,
    pub conversation_id: Arc<str>,
    pub request_timeout: Duration,
    pub log_ring: LogRing,
    pub templates: Arc<Tera>,
}

impl AppState {
    /// State with default conversation id and timeout; fails only if the
    /// embedded templates do not compile
    pub fn new(poe: Poe, log_ring: LogRing) -> Result<Self, tera::Error> {
        Ok(Self {
            poe,
            conversation_id: Arc::from(DEFAULT_CONVERSATION_ID),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            log_ring,
            templates: Arc::new(logs::templates()?),
        })
    }

    pub fn with_conversation_id(mut self, conversation_id: impl AsRef<str>) -> Self {
        self.conversation_id = Arc::from(conversation_id.as_ref());
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}
