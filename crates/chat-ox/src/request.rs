use bon::Builder;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{Message, Model};

/// Default cap on generated output
pub const DEFAULT_MAX_TOKENS: u32 = 1500;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Request body for a streaming chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// List of messages in the conversation
    pub messages: Vec<Message>,

    /// The model to use for completion
    pub model: String,

    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 to 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Per-request configuration for a streamed completion
#[derive(Debug, Clone, Default, Builder)]
#[builder(builder_type(vis = "pub"), state_mod(vis = "pub"))]
pub struct StreamOptions {
    /// Conversation history, oldest first
    #[builder(field)]
    pub messages: Vec<Message>,

    /// Target model; the agent model is used when unset
    #[builder(into)]
    pub model: Option<String>,

    /// Maximum output size
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Token the caller can use to abort the stream
    pub cancel: Option<CancellationToken>,
}

impl<S: stream_options_builder::State> StreamOptionsBuilder<S> {
    /// Add a message
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add several messages
    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Add a user message
    pub fn user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }
}

impl StreamOptions {
    /// Build the wire request, applying defaults and outbound role mapping.
    #[must_use]
    pub fn to_request(&self) -> ChatRequest {
        let model = self
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .map_or_else(|| Model::default().to_string(), str::to_string);

        ChatRequest {
            model,
            messages: self.messages.iter().map(Message::to_outbound).collect(),
            max_tokens: Some(self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
            temperature: Some(self.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let request = StreamOptions::builder().user_message("hi").build().to_request();

        assert_eq!(request.model, "sgr_auto_tool_calling_agent");
        assert_eq!(request.max_tokens, Some(1500));
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.messages, vec![Message::user("hi")]);
    }

    #[test]
    fn test_empty_model_falls_back_to_default() {
        let request = StreamOptions::builder().model("").build().to_request();
        assert_eq!(request.model, "sgr_auto_tool_calling_agent");
    }

    #[test]
    fn test_tool_messages_sent_as_user() {
        let request = StreamOptions::builder()
            .model("agent-1")
            .message(Message::system("be brief"))
            .message(Message::tool("{\"ok\":true}"))
            .message(Message::assistant("done"))
            .max_tokens(64)
            .temperature(0.5)
            .build()
            .to_request();

        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(request.messages[1].content, "{\"ok\":true}");

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "agent-1",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "{\"ok\":true}"},
                    {"role": "assistant", "content": "done"}
                ],
                "max_tokens": 64,
                "temperature": 0.5
            })
        );
    }
}
