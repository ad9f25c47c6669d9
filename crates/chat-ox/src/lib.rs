//! Streaming client for OpenAI-compatible chat-completion agents
//!
//! This crate turns a server-sent chunk stream into a small set of
//! notifications:
//! - batched text deltas (size and time triggered)
//! - message boundaries keyed by the server's message id
//! - tool calls reassembled from their argument fragments
//! - one terminal notification (done or error), or silence on cancellation
//!
//! # Example
//!
//! ```rust,no_run
//! use chat_ox::{ChatClient, StreamNotification, StreamOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ChatClient::from_env();
//!     let options = StreamOptions::builder().user_message("Hello, world!").build();
//!
//!     let mut log: Vec<StreamNotification> = Vec::new();
//!     let outcome = client.run_stream(options, &mut log).await;
//!
//!     println!("{outcome:?}: {log:#?}");
//! }
//! ```

#![cfg_attr(not(test), deny(unsafe_code))]
#![warn(
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items
)]

pub mod aggregator;
pub mod batch;
pub mod callbacks;
pub mod client;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod request;
pub mod response;
pub mod stream;

// Re-export main types
pub use aggregator::{AggregatorState, StreamAggregator, StreamOutcome, ToolCallInfo};
pub use batch::{BATCH_DELAY, BATCH_MIN_SIZE, BatchPolicy};
pub use callbacks::{StreamCallbacks, StreamNotification};
pub use client::ChatClient;
pub use error::{ChatRequestError, FailureSource, StreamFailure, normalize_failure};
pub use event::{StreamEvent, ToolCallFragment};
pub use message::{Message, Role};
pub use model::Model;
pub use request::{ChatRequest, StreamOptions};
pub use response::{ChatCompletionChunk, ChunkChoice, FinishReason, MessageDelta};
pub use stream::{StreamHandle, drive_stream};

// Re-export shared types from chat-ox-common for convenience
pub use chat_ox_common::{CancellationToken, HeaderMap};
