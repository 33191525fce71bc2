//! OpenAI chat-completions wire types for Rust
//!
//! This crate models the parts of the OpenAI API an adapter needs to speak:
//! - Chat completion requests, including multi-part message content
//! - Non-streaming responses and streaming chunks
//! - Tool definitions, tool calls and streamed tool-call fragments
//! - The `{"error": {...}}` error body
//!
//! # Example
//!
//! ```rust
//! use openai_ox::{ChatRequest, Message};
//!
//! let request = ChatRequest::builder()
//!     .model("gpt-4o")
//!     .system_message("Be brief.")
//!     .message(Message::user("Hello, world!"))
//!     .build();
//!
//! assert_eq!(request.messages.len(), 2);
//! ```

pub mod error;
pub mod message;
pub mod request;
pub mod response;
pub mod tool;
pub mod usage;

pub use error::{ApiError, ErrorResponse};
pub use message::{ContentPart, Message, MessageContent, Role};
pub use request::{ChatRequest, StopSequences};
pub use response::{
    ChatCompletionChunk, ChatResponse, Choice, ChoiceDelta, FinishReason, MessageDelta,
    ResponseMessage,
};
pub use tool::{
    FunctionCall, FunctionCallDelta, Tool, ToolCall, ToolCallDelta, ToolChoice,
    ToolChoiceFunction, ToolFunction,
};
pub use usage::Usage;
