//! Keyed record storage for chats and messages.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Chat, ChatMessage, StoreError, export::ExportPayload};

/// Object store keyed by record id.
///
/// `put_*` inserts or replaces. Deleting a missing record is not an error.
pub trait ChatStore {
    fn get_all_chats(&self) -> Result<Vec<Chat>, StoreError>;

    fn put_chat(&mut self, chat: &Chat) -> Result<(), StoreError>;

    fn delete_chat(&mut self, id: &str) -> Result<(), StoreError>;

    fn get_all_messages(&self) -> Result<Vec<ChatMessage>, StoreError>;

    fn get_messages_by_chat(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    fn put_message(&mut self, message: &ChatMessage) -> Result<(), StoreError>;

    fn delete_message(&mut self, id: &str) -> Result<(), StoreError>;

    fn delete_messages_by_chat(&mut self, chat_id: &str) -> Result<(), StoreError>;

    fn clear_all(&mut self) -> Result<(), StoreError>;

    /// Replace the whole contents in one step.
    ///
    /// The default goes record by record; backends with a cheaper bulk path
    /// override it.
    fn replace_all(&mut self, chats: &[Chat], messages: &[ChatMessage]) -> Result<(), StoreError> {
        self.clear_all()?;
        for chat in chats {
            self.put_chat(chat)?;
        }
        for message in messages {
            self.put_message(message)?;
        }
        Ok(())
    }

    /// Snapshot everything as a version 1 payload.
    fn export_all(&self) -> Result<ExportPayload, StoreError> {
        Ok(ExportPayload::new(
            self.get_all_chats()?,
            self.get_all_messages()?,
        ))
    }

    /// Validate `payload`, then replace the store contents with it.
    fn import_all(&mut self, payload: &ExportPayload) -> Result<(), StoreError> {
        payload.validate()?;
        self.replace_all(&payload.chats, &payload.messages)
    }
}

/// Non-persistent store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    chats: BTreeMap<String, Chat>,
    messages: BTreeMap<String, ChatMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatStore for MemoryStore {
    fn get_all_chats(&self) -> Result<Vec<Chat>, StoreError> {
        Ok(self.chats.values().cloned().collect())
    }

    fn put_chat(&mut self, chat: &Chat) -> Result<(), StoreError> {
        self.chats.insert(chat.id.clone(), chat.clone());
        Ok(())
    }

    fn delete_chat(&mut self, id: &str) -> Result<(), StoreError> {
        self.chats.remove(id);
        Ok(())
    }

    fn get_all_messages(&self) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self.messages.values().cloned().collect())
    }

    fn get_messages_by_chat(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    fn put_message(&mut self, message: &ChatMessage) -> Result<(), StoreError> {
        self.messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    fn delete_message(&mut self, id: &str) -> Result<(), StoreError> {
        self.messages.remove(id);
        Ok(())
    }

    fn delete_messages_by_chat(&mut self, chat_id: &str) -> Result<(), StoreError> {
        self.messages.retain(|_, m| m.chat_id != chat_id);
        Ok(())
    }

    fn clear_all(&mut self) -> Result<(), StoreError> {
        self.chats.clear();
        self.messages.clear();
        Ok(())
    }
}

/// On-disk shape of a [`JsonFileStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    chats: Vec<Chat>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

/// Store persisted as one JSON document.
///
/// The file is rewritten after every mutation through a temporary sibling and
/// a rename, so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open `path`, starting empty when it does not exist or is blank.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not hold a valid database.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut inner = MemoryStore::new();

        if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            if contents.trim().is_empty() {
                log::debug!("store file {} is empty", path.display());
            } else {
                let snapshot: Snapshot = serde_json::from_str(&contents)?;
                log::debug!(
                    "loaded {} chats and {} messages from {}",
                    snapshot.chats.len(),
                    snapshot.messages.len(),
                    path.display()
                );
                for chat in snapshot.chats {
                    inner.chats.insert(chat.id.clone(), chat);
                }
                for message in snapshot.messages {
                    inner.messages.insert(message.id.clone(), message);
                }
            }
        } else {
            log::debug!("no store file at {}, starting empty", path.display());
        }

        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let snapshot = Snapshot {
            chats: self.inner.chats.values().cloned().collect(),
            messages: self.inner.messages.values().cloned().collect(),
        };
        let json = serde_json::to_string(&snapshot)?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        log::trace!("saved store to {}", self.path.display());
        Ok(())
    }
}

impl ChatStore for JsonFileStore {
    fn get_all_chats(&self) -> Result<Vec<Chat>, StoreError> {
        self.inner.get_all_chats()
    }

    fn put_chat(&mut self, chat: &Chat) -> Result<(), StoreError> {
        self.inner.put_chat(chat)?;
        self.save()
    }

    fn delete_chat(&mut self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_chat(id)?;
        self.save()
    }

    fn get_all_messages(&self) -> Result<Vec<ChatMessage>, StoreError> {
        self.inner.get_all_messages()
    }

    fn get_messages_by_chat(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        self.inner.get_messages_by_chat(chat_id)
    }

    fn put_message(&mut self, message: &ChatMessage) -> Result<(), StoreError> {
        self.inner.put_message(message)?;
        self.save()
    }

    fn delete_message(&mut self, id: &str) -> Result<(), StoreError> {
        self.inner.delete_message(id)?;
        self.save()
    }

    fn delete_messages_by_chat(&mut self, chat_id: &str) -> Result<(), StoreError> {
        self.inner.delete_messages_by_chat(chat_id)?;
        self.save()
    }

    fn clear_all(&mut self) -> Result<(), StoreError> {
        self.inner.clear_all()?;
        self.save()
    }

    fn replace_all(&mut self, chats: &[Chat], messages: &[ChatMessage]) -> Result<(), StoreError> {
        self.inner.replace_all(chats, messages)?;
        self.save()
    }
}
