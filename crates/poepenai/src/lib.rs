//! OpenAI-compatible HTTP adapter in front of Poe bots
//!
//! `POST /v1/chat/completions` accepts an OpenAI chat request, forwards it to
//! the Poe bot named by `model` and answers either with a stream of
//! `chat.completion.chunk` frames or with one `chat.completion` object.
//! `GET /logs` shows the most recent log lines.

#![cfg_attr(not(test), deny(unsafe_code))]

pub mod cli;
pub mod error;
pub mod log_ring;
pub mod logging;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use log_ring::LogRing;
pub use state::AppState;

/// Router with every adapter route mounted
pub fn app(state: AppState) -> axum::Router {
    routes::configure(state)
}
