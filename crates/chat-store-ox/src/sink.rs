//! Stream callbacks that record a reply into a [`ChatRegistry`].

use chat_ox::{StreamCallbacks, StreamFailure, ToolCallInfo};
use reqwest::header::HeaderMap;
use serde_json::{Map, json};

use crate::{ChatRegistry, ChatRole, ChatStore, NewMessage};

/// Response header carrying the agent session id
pub const AGENT_ID_HEADER: &str = "x-agent-id";

/// `meta.kind` of messages recording a tool call
pub const TOOL_CALL_KIND: &str = "tool_call";

/// Writes one streamed reply into a chat.
///
/// Each server message becomes an assistant message keyed by the server's id;
/// tool calls become thinking messages holding the call arguments.
///
/// Text deltas are buffered in the registry and written to the store at
/// message boundaries, tool calls, the end of the stream, and when the sink is
/// dropped, so a cancelled stream still keeps what it showed.
#[derive(Debug)]
pub struct RegistrySink<'a, S: ChatStore> {
    registry: &'a mut ChatRegistry<S>,
    chat_id: String,
    current_message_id: Option<String>,
    error: Option<StreamFailure>,
}

impl<'a, S: ChatStore> RegistrySink<'a, S> {
    pub fn new(registry: &'a mut ChatRegistry<S>, chat_id: impl Into<String>) -> Self {
        Self {
            registry,
            chat_id: chat_id.into(),
            current_message_id: None,
            error: None,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn registry(&self) -> &ChatRegistry<S> {
        self.registry
    }

    /// The failure reported by the stream, if any
    pub fn error(&self) -> Option<&StreamFailure> {
        self.error.as_ref()
    }

    pub fn into_error(mut self) -> Option<StreamFailure> {
        self.error.take()
    }

    /// Message receiving deltas; created on demand when the server sent text
    /// before any message id.
    fn target_message(&mut self, message_id: Option<&str>) -> String {
        if let Some(id) = message_id.or(self.current_message_id.as_deref()) {
            if self.registry.message(id).is_some() {
                return id.to_string();
            }
        }

        let mut new = NewMessage::new(&self.chat_id, ChatRole::Assistant, "");
        new.id = message_id.map(str::to_string);
        let message = self.registry.add_message(new);
        self.current_message_id = Some(message.id.clone());
        message.id
    }
}

impl<S: ChatStore> StreamCallbacks for RegistrySink<'_, S> {
    fn on_headers(&mut self, headers: &HeaderMap) {
        let agent_id = headers
            .get(AGENT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(agent_id) = agent_id {
            log::debug!("chat {} bound to agent {agent_id}", self.chat_id);
            self.registry.set_chat_agent_id(&self.chat_id, agent_id);
        }
    }

    fn on_new_message(&mut self, message_id: &str) {
        self.registry.save_pending();
        if self.registry.message(message_id).is_none() {
            self.registry.add_message(
                NewMessage::new(&self.chat_id, ChatRole::Assistant, "").with_id(message_id),
            );
        }
        self.current_message_id = Some(message_id.to_string());
    }

    fn on_delta(&mut self, text: &str, message_id: Option<&str>) {
        let id = self.target_message(message_id);
        self.registry.buffer_message_content(&id, text);
    }

    fn on_tool_call(&mut self, tool_call: &ToolCallInfo) {
        self.registry.save_pending();
        let mut meta = Map::new();
        meta.insert("kind".to_string(), json!(TOOL_CALL_KIND));
        meta.insert("id".to_string(), json!(tool_call.id));
        meta.insert("index".to_string(), json!(tool_call.index));
        meta.insert("name".to_string(), json!(tool_call.name));

        self.registry.add_message(
            NewMessage::new(&self.chat_id, ChatRole::Thinking, tool_call.arguments.clone())
                .with_meta(meta),
        );
    }

    fn on_done(&mut self) {
        self.registry.save_pending();
    }

    fn on_error(&mut self, error: &StreamFailure) {
        self.registry.save_pending();
        self.error = Some(error.clone());
    }
}

impl<S: ChatStore> Drop for RegistrySink<'_, S> {
    fn drop(&mut self) {
        self.registry.save_pending();
    }
}
