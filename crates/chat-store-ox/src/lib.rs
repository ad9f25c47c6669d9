//! Chat history for chat-ox streams
//!
//! Chats and messages live in a [`ChatRegistry`], an explicit container
//! backed by any [`ChatStore`]. [`RegistrySink`] plugs the registry into a
//! running stream so replies, tool calls and the agent id are recorded as
//! they arrive.

#![cfg_attr(not(test), deny(unsafe_code))]
#![warn(
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items
)]

pub mod error;
pub mod export;
pub mod registry;
pub mod sink;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use export::{EXPORT_VERSION, ExportPayload};
pub use registry::{ChatRegistry, DEFAULT_CHAT_TITLE};
pub use sink::{AGENT_ID_HEADER, RegistrySink, TOOL_CALL_KIND};
pub use store::{ChatStore, JsonFileStore, MemoryStore};
pub use types::{Chat, ChatMessage, ChatRole, NewMessage};
