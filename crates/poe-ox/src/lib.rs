//! Poe bot query API client for Rust
//!
//! This crate speaks the Poe bot protocol:
//! - Query request wire types
//! - An incremental Server-Sent Events framer
//! - Typed payloads for every event a bot can emit
//! - A retried, cancellable query session with linear backoff
//!
//! # Example
//!
//! ```rust,no_run
//! use poe_ox::{Poe, ProtocolMessage, QueryRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Poe::new();
//!
//!     let request = QueryRequest::builder()
//!         .message(ProtocolMessage::user("Hello, world!"))
//!         .conversation_id("conversation")
//!         .message_id("msg-1")
//!         .api_key("your-api-key")
//!         .build();
//!
//!     let events = client
//!         .query("GPT-4o", &request, "your-api-key", CancellationToken::new())
//!         .await?;
//!     for event in events {
//!         println!("{}: {}", event.event, event.data);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(test), deny(unsafe_code))]

pub mod client;
pub mod error;
pub mod event;
pub mod request;
pub mod session;
pub mod streaming;

pub use client::Poe;
pub use error::PoeRequestError;
pub use event::{ErrorEvent, EventKind, FileEvent, MetaEvent, PartialResponse, SseEvent};
pub use request::{
    FunctionDefinition, FunctionParameters, ProtocolMessage, QueryRequest, Role, ToolDefinition,
};
pub use session::{
    QueryOutcome, QuerySession, RetryPolicy, SessionState, SessionUpdate, collect_events,
};
pub use streaming::{SseDecoder, SseParser, parse_sse_events};
