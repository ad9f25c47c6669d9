//! In-memory view of the chat history, written through to a [`ChatStore`].

use std::collections::BTreeSet;

use chat_ox::Message;
use chat_ox_common::Timestamp;

use crate::{
    Chat, ChatMessage, ChatRole, ChatStore, NewMessage, StoreError, export::ExportPayload,
    types::new_id,
};

/// Title given to chats created without one
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Explicit container for chats, their messages and the current selection.
///
/// Mutations apply to the in-memory state first and are then written to the
/// store. A failed write is logged and does not undo the mutation.
#[derive(Debug)]
pub struct ChatRegistry<S> {
    store: S,
    /// Most recently updated first after [`ChatRegistry::hydrate`]
    chats: Vec<Chat>,
    /// Oldest first
    messages: Vec<ChatMessage>,
    selected_chat_id: Option<String>,
    /// Messages changed in memory but not yet written to the store
    unsaved: BTreeSet<String>,
}

impl<S: ChatStore> ChatRegistry<S> {
    /// Empty registry; call [`ChatRegistry::hydrate`] to load the store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            chats: Vec::new(),
            messages: Vec::new(),
            selected_chat_id: None,
            unsaved: BTreeSet::new(),
        }
    }

    /// Reload everything from the store.
    ///
    /// Chats are ordered by `updated_at` descending and the newest is
    /// selected; messages by `created_at` ascending. An empty or unreadable
    /// store yields a single fresh chat.
    pub fn hydrate(&mut self) {
        self.save_pending();
        let loaded = self
            .store
            .get_all_chats()
            .and_then(|chats| Ok((chats, self.store.get_all_messages()?)));

        match loaded {
            Ok((chats, _)) if chats.is_empty() => {
                self.chats.clear();
                self.messages.clear();
                self.selected_chat_id = None;
                self.create_chat(DEFAULT_CHAT_TITLE);
            }
            Ok((mut chats, mut messages)) => {
                chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                messages.sort_by_key(|m| m.created_at);
                log::debug!("hydrated {} chats, {} messages", chats.len(), messages.len());
                self.selected_chat_id = chats.first().map(|c| c.id.clone());
                self.chats = chats;
                self.messages = messages;
            }
            Err(err) => {
                log::warn!("failed to load chat history: {err}");
                if self.chats.is_empty() {
                    self.create_chat(DEFAULT_CHAT_TITLE);
                }
            }
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn chat(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn selected_chat_id(&self) -> Option<&str> {
        self.selected_chat_id.as_deref()
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        self.selected_chat_id.as_deref().and_then(|id| self.chat(id))
    }

    /// Messages of the selected chat, oldest first.
    pub fn chat_messages(&self) -> Vec<&ChatMessage> {
        match self.selected_chat_id.as_deref() {
            Some(id) => self.messages_for(id).collect(),
            None => Vec::new(),
        }
    }

    pub fn messages_for<'a>(&'a self, chat_id: &'a str) -> impl Iterator<Item = &'a ChatMessage> {
        self.messages.iter().filter(move |m| m.chat_id == chat_id)
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Create a chat at the top of the list and select it.
    pub fn create_chat(&mut self, title: impl Into<String>) -> Chat {
        let chat = Chat::new(title);
        self.chats.insert(0, chat.clone());
        self.selected_chat_id = Some(chat.id.clone());
        persist(self.store.put_chat(&chat), "create chat");
        chat
    }

    /// Rename a chat. A blank title keeps the current one but still bumps
    /// `updated_at`. Returns `false` for an unknown chat.
    pub fn rename_chat(&mut self, id: &str, title: &str) -> bool {
        let Some(chat) = self.chats.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        let title = title.trim();
        if !title.is_empty() {
            chat.title = title.to_string();
        }
        chat.updated_at = Timestamp::now();
        persist(self.store.put_chat(chat), "rename chat");
        true
    }

    /// Delete a chat and its messages. When it was selected, the first
    /// remaining chat becomes selected.
    pub fn delete_chat(&mut self, id: &str) -> bool {
        let before = self.chats.len();
        self.chats.retain(|c| c.id != id);
        let removed = self.chats.len() != before;
        self.messages.retain(|m| m.chat_id != id);

        if self.selected_chat_id.as_deref() == Some(id) {
            self.selected_chat_id = self.chats.first().map(|c| c.id.clone());
        }

        persist(self.store.delete_chat(id), "delete chat");
        persist(self.store.delete_messages_by_chat(id), "delete chat messages");
        removed
    }

    /// Select an existing chat. Unknown ids leave the selection unchanged.
    pub fn select_chat(&mut self, id: &str) -> bool {
        if self.chat(id).is_none() {
            return false;
        }
        self.selected_chat_id = Some(id.to_string());
        true
    }

    /// Append a message and touch its chat's `updated_at`.
    ///
    /// `created_at` never goes backwards within the registry, so reloading
    /// reproduces insertion order even for messages added in the same
    /// millisecond.
    pub fn add_message(&mut self, new: NewMessage) -> ChatMessage {
        let message = ChatMessage {
            id: new.id.filter(|id| !id.is_empty()).unwrap_or_else(new_id),
            chat_id: new.chat_id,
            role: new.role,
            content: new.content,
            created_at: self.next_created_at(),
            meta: new.meta,
        };
        self.messages.push(message.clone());

        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == message.chat_id) {
            chat.updated_at = Timestamp::now();
            persist(self.store.put_chat(chat), "touch chat");
        }
        persist(self.store.put_message(&message), "add message");
        message
    }

    /// Append streamed text to a message. Returns `false` for an unknown id.
    pub fn append_message_content(&mut self, id: &str, delta: &str) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        message.content.push_str(delta);
        persist(self.store.put_message(message), "append message content");
        true
    }

    /// Append streamed text in memory only. The message is written by the
    /// next [`ChatRegistry::save_pending`]. Returns `false` for an unknown id.
    pub fn buffer_message_content(&mut self, id: &str, delta: &str) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        message.content.push_str(delta);
        self.unsaved.insert(message.id.clone());
        true
    }

    /// Whether buffered content is waiting for [`ChatRegistry::save_pending`]
    pub fn has_unsaved(&self) -> bool {
        !self.unsaved.is_empty()
    }

    /// Write every message changed through [`ChatRegistry::buffer_message_content`].
    pub fn save_pending(&mut self) {
        for id in std::mem::take(&mut self.unsaved) {
            if let Some(message) = self.messages.iter().find(|m| m.id == id) {
                persist(self.store.put_message(message), "save buffered content");
            }
        }
    }

    pub fn delete_message(&mut self, id: &str) -> bool {
        let Some(index) = self.messages.iter().position(|m| m.id == id) else {
            return false;
        };
        self.messages.remove(index);
        self.unsaved.remove(id);
        persist(self.store.delete_message(id), "delete message");
        true
    }

    pub fn set_chat_agent_id(&mut self, chat_id: &str, agent_id: &str) -> bool {
        let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) else {
            return false;
        };
        chat.agent_id = Some(agent_id.to_string());
        persist(self.store.put_chat(chat), "set agent id");
        true
    }

    /// Request history for a chat: user, assistant and system messages in
    /// order. Thinking entries and empty messages are left out.
    pub fn conversation(&self, chat_id: &str) -> Vec<Message> {
        self.messages_for(chat_id)
            .filter(|m| !m.content.is_empty())
            .filter_map(|m| match m.role {
                ChatRole::User => Some(Message::user(m.content.clone())),
                ChatRole::Assistant => Some(Message::assistant(m.content.clone())),
                ChatRole::System => Some(Message::system(m.content.clone())),
                ChatRole::Thinking => None,
            })
            .collect()
    }

    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn export(&self) -> Result<ExportPayload, StoreError> {
        self.store.export_all()
    }

    /// Replace the store contents with `payload` and reload.
    ///
    /// # Errors
    ///
    /// Rejects unsupported versions before touching the store and propagates
    /// store write failures.
    pub fn import(&mut self, payload: &ExportPayload) -> Result<(), StoreError> {
        self.store.import_all(payload)?;
        log::info!(
            "imported {} chats, {} messages",
            payload.chats.len(),
            payload.messages.len()
        );
        self.hydrate();
        Ok(())
    }

    fn next_created_at(&self) -> Timestamp {
        let now = Timestamp::now();
        match self.messages.iter().map(|m| m.created_at).max() {
            Some(last) if last >= now => {
                Timestamp::from_millis(last.as_millis() + 1).unwrap_or(now)
            }
            _ => now,
        }
    }
}

fn persist(result: Result<(), StoreError>, action: &str) {
    if let Err(err) = result {
        log::warn!("failed to persist ({action}): {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use chat_ox::Role;

    /// Store whose every operation fails
    struct BrokenStore;

    fn broken() -> StoreError {
        StoreError::io("/dev/null", std::io::Error::other("disk on fire"))
    }

    impl ChatStore for BrokenStore {
        fn get_all_chats(&self) -> Result<Vec<Chat>, StoreError> {
            Err(broken())
        }
        fn put_chat(&mut self, _chat: &Chat) -> Result<(), StoreError> {
            Err(broken())
        }
        fn delete_chat(&mut self, _id: &str) -> Result<(), StoreError> {
            Err(broken())
        }
        fn get_all_messages(&self) -> Result<Vec<ChatMessage>, StoreError> {
            Err(broken())
        }
        fn get_messages_by_chat(&self, _chat_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
            Err(broken())
        }
        fn put_message(&mut self, _message: &ChatMessage) -> Result<(), StoreError> {
            Err(broken())
        }
        fn delete_message(&mut self, _id: &str) -> Result<(), StoreError> {
            Err(broken())
        }
        fn delete_messages_by_chat(&mut self, _chat_id: &str) -> Result<(), StoreError> {
            Err(broken())
        }
        fn clear_all(&mut self) -> Result<(), StoreError> {
            Err(broken())
        }
    }

    fn hydrated() -> ChatRegistry<MemoryStore> {
        let mut registry = ChatRegistry::new(MemoryStore::new());
        registry.hydrate();
        registry
    }

    #[test]
    fn test_hydrate_empty_store_creates_chat() {
        let registry = hydrated();
        assert_eq!(registry.chats().len(), 1);
        assert_eq!(registry.chats()[0].title, DEFAULT_CHAT_TITLE);
        assert_eq!(registry.selected_chat_id(), Some(registry.chats()[0].id.as_str()));
        assert_eq!(registry.store().get_all_chats().unwrap().len(), 1);
    }

    #[test]
    fn test_hydrate_sorts_chats_and_messages() {
        let mut store = MemoryStore::new();
        let mut older = Chat::new("older");
        older.updated_at = Timestamp::from_millis(1_000).unwrap();
        let mut newer = Chat::new("newer");
        newer.updated_at = Timestamp::from_millis(2_000).unwrap();
        store.put_chat(&older).unwrap();
        store.put_chat(&newer).unwrap();
        for (id, at) in [("b", 20), ("a", 10), ("c", 30)] {
            store
                .put_message(&ChatMessage {
                    id: id.to_string(),
                    chat_id: older.id.clone(),
                    role: ChatRole::User,
                    content: id.to_string(),
                    created_at: Timestamp::from_millis(at).unwrap(),
                    meta: None,
                })
                .unwrap();
        }

        let mut registry = ChatRegistry::new(store);
        registry.hydrate();

        let titles: Vec<&str> = registry.chats().iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["newer", "older"]);
        assert_eq!(registry.selected_chat_id(), Some(newer.id.as_str()));
        let ids: Vec<&str> = registry.messages_for(&older.id).map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_hydrate_survives_broken_store() {
        let mut registry = ChatRegistry::new(BrokenStore);
        registry.hydrate();
        assert_eq!(registry.chats().len(), 1);

        let chat_id = registry.chats()[0].id.clone();
        let message = registry.add_message(NewMessage::new(&chat_id, ChatRole::User, "still here"));
        assert!(registry.append_message_content(&message.id, "!"));
        assert_eq!(registry.chat_messages()[0].content, "still here!");
    }

    #[test]
    fn test_create_selects_and_rename_ignores_blank() {
        let mut registry = hydrated();
        let chat = registry.create_chat("Plans");
        assert_eq!(registry.chats()[0].id, chat.id);
        assert_eq!(registry.selected_chat().map(|c| c.title.as_str()), Some("Plans"));

        assert!(registry.rename_chat(&chat.id, "   "));
        assert_eq!(registry.chat(&chat.id).unwrap().title, "Plans");
        assert!(registry.rename_chat(&chat.id, "  Trip  "));
        assert_eq!(registry.chat(&chat.id).unwrap().title, "Trip");
        assert!(!registry.rename_chat("missing", "x"));
    }

    #[test]
    fn test_delete_chat_cascades_and_reselects() {
        let mut registry = hydrated();
        let first = registry.chats()[0].id.clone();
        let second = registry.create_chat("Second");
        registry.add_message(NewMessage::new(&second.id, ChatRole::User, "hi"));

        assert!(registry.delete_chat(&second.id));
        assert_eq!(registry.selected_chat_id(), Some(first.as_str()));
        assert_eq!(registry.messages_for(&second.id).count(), 0);
        assert!(registry.store().get_messages_by_chat(&second.id).unwrap().is_empty());
        assert!(!registry.delete_chat(&second.id));
    }

    #[test]
    fn test_add_message_uses_caller_id_and_touches_chat() {
        let mut registry = hydrated();
        let chat = registry.chats()[0].clone();

        let message = registry.add_message(
            NewMessage::new(&chat.id, ChatRole::Assistant, "").with_id("server-1"),
        );
        assert_eq!(message.id, "server-1");
        assert!(registry.chat(&chat.id).unwrap().updated_at >= chat.updated_at);

        assert!(registry.append_message_content("server-1", "Hel"));
        assert!(registry.append_message_content("server-1", "lo"));
        assert_eq!(registry.message("server-1").unwrap().content, "Hello");
        assert_eq!(registry.store().get_all_messages().unwrap()[0].content, "Hello");
        assert!(!registry.append_message_content("nope", "x"));
    }

    #[test]
    fn test_created_at_is_strictly_increasing() {
        let mut registry = hydrated();
        let chat_id = registry.chats()[0].id.clone();
        let stamps: Vec<Timestamp> = (0..5)
            .map(|i| {
                registry
                    .add_message(NewMessage::new(&chat_id, ChatRole::User, i.to_string()))
                    .created_at
            })
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_conversation_skips_thinking_and_empty() {
        let mut registry = hydrated();
        let chat_id = registry.chats()[0].id.clone();
        registry.add_message(NewMessage::new(&chat_id, ChatRole::System, "be brief"));
        registry.add_message(NewMessage::new(&chat_id, ChatRole::User, "hi"));
        registry.add_message(NewMessage::new(&chat_id, ChatRole::Thinking, "{\"q\":1}"));
        registry.add_message(NewMessage::new(&chat_id, ChatRole::Assistant, ""));
        registry.add_message(NewMessage::new(&chat_id, ChatRole::Assistant, "hello"));

        let roles: Vec<Role> = registry.conversation(&chat_id).iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn test_import_reloads_state() {
        let mut registry = hydrated();
        let chat = Chat::new("Imported");
        let payload = ExportPayload::new(vec![chat.clone()], Vec::new());

        registry.import(&payload).unwrap();
        assert_eq!(registry.chats(), &[chat.clone()]);
        assert_eq!(registry.selected_chat_id(), Some(chat.id.as_str()));
        assert_eq!(registry.export().unwrap().chats, vec![chat]);
    }

    #[test]
    fn test_delete_message_and_agent_id() {
        let mut registry = hydrated();
        let chat_id = registry.chats()[0].id.clone();
        let message = registry.add_message(NewMessage::new(&chat_id, ChatRole::User, "x"));

        assert!(registry.delete_message(&message.id));
        assert!(!registry.delete_message(&message.id));
        assert!(registry.set_chat_agent_id(&chat_id, "agent-9"));
        assert_eq!(registry.chats()[0].agent_id.as_deref(), Some("agent-9"));
        assert!(!registry.set_chat_agent_id("missing", "agent-9"));
    }

    #[test]
    fn test_buffered_content_waits_for_save() {
        let mut registry = hydrated();
        let chat_id = registry.chats()[0].id.clone();
        let message = registry.add_message(NewMessage::new(&chat_id, ChatRole::Assistant, ""));

        assert!(registry.buffer_message_content(&message.id, "Hel"));
        assert!(registry.buffer_message_content(&message.id, "lo"));
        assert!(registry.has_unsaved());
        assert_eq!(registry.message(&message.id).unwrap().content, "Hello");
        assert_eq!(registry.store().get_all_messages().unwrap()[0].content, "");

        registry.save_pending();
        assert!(!registry.has_unsaved());
        assert_eq!(registry.store().get_all_messages().unwrap()[0].content, "Hello");
        assert!(!registry.buffer_message_content("missing", "x"));
    }

    #[test]
    fn test_file_store_reload_keeps_insertion_order() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("chats.json");

        let chat_id = {
            let mut registry = ChatRegistry::new(crate::JsonFileStore::open(&path).unwrap());
            registry.hydrate();
            let chat_id = registry.chats()[0].id.clone();
            for i in 0..40 {
                registry.add_message(NewMessage::new(&chat_id, ChatRole::User, i.to_string()));
            }
            chat_id
        };

        let mut registry = ChatRegistry::new(crate::JsonFileStore::open(&path).unwrap());
        registry.hydrate();

        let contents: Vec<String> = registry
            .messages_for(&chat_id)
            .map(|m| m.content.clone())
            .collect();
        let expected: Vec<String> = (0..40).map(|i: i32| i.to_string()).collect();
        assert_eq!(contents, expected);
    }
}
