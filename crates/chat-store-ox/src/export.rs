//! Versioned bulk export format.

use chat_ox_common::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{Chat, ChatMessage, StoreError};

/// Only version understood by [`ExportPayload::validate`]
pub const EXPORT_VERSION: u32 = 1;

/// Snapshot of every chat and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub version: u32,
    pub exported_at: Timestamp,
    pub chats: Vec<Chat>,
    pub messages: Vec<ChatMessage>,
}

impl ExportPayload {
    pub fn new(chats: Vec<Chat>, messages: Vec<ChatMessage>) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: Timestamp::now(),
            chats,
            messages,
        }
    }

    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedVersion`] for any version other than
    /// [`EXPORT_VERSION`].
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.version == EXPORT_VERSION {
            Ok(())
        } else {
            Err(StoreError::UnsupportedVersion(self.version))
        }
    }

    /// Parse and validate a payload.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, missing `chats`/`messages` arrays, or an
    /// unsupported version.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let payload: Self = serde_json::from_str(json)?;
        payload.validate()?;
        Ok(payload)
    }

    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
