use serde::Deserialize;
use thiserror::Error;

/// Error body some Poe deployments return for non-2xx responses
#[derive(Debug, Deserialize)]
struct PoeApiErrorPayload {
    #[serde(default)]
    error: Option<PoeApiError>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PoeApiError {
    Message { message: String },
    Text(String),
}

/// Errors that can occur when querying a Poe bot
#[derive(Debug, Error)]
pub enum PoeRequestError {
    /// HTTP client errors (connect, write, read, timeout)
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    /// The bot endpoint answered with a non-success status
    #[error("HTTP status {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: String,
    },

    /// Invalid event data in stream
    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    /// No response headers arrived in time
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    /// The caller cancelled the query
    #[error("query cancelled")]
    Cancelled,

    /// Every attempt failed; `source` is the cause of the last one
    #[error("query to bot '{bot}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        bot: String,
        attempts: u32,
        #[source]
        source: Box<PoeRequestError>,
    },
}

impl PoeRequestError {
    /// HTTP status of the failure, if the upstream produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::ReqwestError(e) => e.status().map(|s| s.as_u16()),
            Self::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether the failure was a deadline rather than a refusal
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::ReqwestError(e) => e.is_timeout(),
            Self::RetriesExhausted { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Parse an error response from the Poe bot endpoint
pub(crate) fn parse_error_response(status: reqwest::StatusCode, bytes: &bytes::Bytes) -> PoeRequestError {
    let body = String::from_utf8_lossy(bytes).to_string();

    let message = match serde_json::from_slice::<PoeApiErrorPayload>(bytes) {
        Ok(PoeApiErrorPayload {
            error: Some(PoeApiError::Message { message } | PoeApiError::Text(message)),
            ..
        }) => message,
        Ok(PoeApiErrorPayload {
            message: Some(message),
            ..
        }) => message,
        _ if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string(),
        _ => body.clone(),
    };

    PoeRequestError::Http {
        status: status.as_u16(),
        message,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_response_structured() {
        let body = bytes::Bytes::from_static(br#"{"error":{"message":"bot not found"}}"#);
        let err = parse_error_response(reqwest::StatusCode::NOT_FOUND, &body);
        match err {
            PoeRequestError::Http { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "bot not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_response_plain_text() {
        let body = bytes::Bytes::from_static(b"upstream exploded");
        let err = parse_error_response(reqwest::StatusCode::BAD_GATEWAY, &body);
        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn test_parse_error_response_empty_body() {
        let body = bytes::Bytes::new();
        let err = parse_error_response(reqwest::StatusCode::SERVICE_UNAVAILABLE, &body);
        assert_eq!(err.to_string(), "HTTP status 503: Service Unavailable");
    }

    #[test]
    fn test_retries_exhausted_keeps_last_cause() {
        let err = PoeRequestError::RetriesExhausted {
            bot: "GPT-4o".to_string(),
            attempts: 3,
            source: Box::new(PoeRequestError::Http {
                status: 500,
                message: "boom".to_string(),
                body: "boom".to_string(),
            }),
        };
        assert_eq!(err.status(), Some(500));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("HTTP status 500: boom"));
    }
}
