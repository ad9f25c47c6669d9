use chat_ox_common::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generate a fresh record identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    /// Agent session announced by the server in `x-agent-id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Chat {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: new_id(),
            title: title.into(),
            agent_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Who a stored message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
    /// Intermediate agent output such as tool calls; never sent back upstream
    Thinking,
}

/// A message within a chat. `content` grows while a reply streams in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// Input for [`crate::ChatRegistry::add_message`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    /// Caller supplied id, e.g. the server's message id; generated when absent
    pub id: Option<String>,
    pub chat_id: String,
    pub role: ChatRole,
    pub content: String,
    pub meta: Option<Map<String, Value>>,
}

impl NewMessage {
    pub fn new(chat_id: impl Into<String>, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: None,
            chat_id: chat_id.into(),
            role,
            content: content.into(),
            meta: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_use_camel_case_millis() {
        let chat = Chat {
            id: "c1".to_string(),
            title: "New Chat".to_string(),
            agent_id: Some("agent-1".to_string()),
            created_at: Timestamp::from_millis(1_700_000_000_000).unwrap(),
            updated_at: Timestamp::from_millis(1_700_000_000_500).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&chat).unwrap(),
            json!({
                "id": "c1",
                "title": "New Chat",
                "agentId": "agent-1",
                "createdAt": 1_700_000_000_000_i64,
                "updatedAt": 1_700_000_000_500_i64
            })
        );

        let message: ChatMessage = serde_json::from_value(json!({
            "id": "m1",
            "chatId": "c1",
            "role": "thinking",
            "content": "{}",
            "createdAt": 1_700_000_000_000_i64,
            "meta": {"kind": "tool_call"}
        }))
        .unwrap();
        assert_eq!(message.role, ChatRole::Thinking);
        assert_eq!(message.meta.unwrap()["kind"], "tool_call");
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
        assert_ne!(Chat::new("a").id, Chat::new("a").id);
    }
}
