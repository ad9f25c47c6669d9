#![cfg_attr(not(test), deny(unsafe_code))]
#![warn(
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items
)]

//! Shared HTTP transport for the chat-ox crates
//!
//! This crate owns everything that touches the wire: building authenticated
//! requests, opening a server-sent-events stream with its header set exposed
//! up front, parsing SSE frames, and honouring a cooperative cancellation token.

pub mod error;
pub mod request_builder;
pub mod streaming;
pub mod timestamp;

pub use error::CommonRequestError;
pub use request_builder::{Endpoint, RequestBuilder, RequestConfig, SseStream};
pub use streaming::SseParser;
pub use timestamp::Timestamp;

/// Re-export common types for convenience
pub use futures_util::stream::BoxStream;
pub use reqwest::header::HeaderMap;
pub use tokio_util::sync::CancellationToken;
