//! AI Provider Format Conversions
//!
//! This crate converts between the OpenAI chat-completions format and the Poe
//! bot protocol, in both directions:
//!
//! - OpenAI requests become Poe query requests
//! - Poe events become OpenAI streaming chunks, one event at a time
//! - A finished sequence of Poe events folds into one OpenAI response

#![cfg_attr(not(test), deny(unsafe_code))]
#![warn(
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items
)]

/// Error types for conversion failures
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The payload of a single event could not be decoded; the event is skipped
    #[error("Invalid '{event}' event payload: {source}")]
    InvalidPayload {
        /// Label of the offending event
        event: String,
        /// Decode failure
        #[source]
        source: poe_ox::PoeRequestError,
    },
    /// The bot reported an error; the completion cannot continue
    #[error("Poe bot reported an error: {0}")]
    BotReported(String),
    /// The bot reported an error whose payload could not be read
    #[error("Poe bot reported an unparsable error: {0}")]
    UnparsableBotError(String),
}

impl ConversionError {
    /// Whether the stream must end after this error
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::BotReported(_) | Self::UnparsableBotError(_))
    }
}

/// Session-scoped identifiers
pub mod id;

/// Conversions between Poe and OpenAI formats
pub mod poe_openai;
