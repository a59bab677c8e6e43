//! Message repository
//!
//! The recording core only reads a message's title and content; everything
//! else about message management lives behind the `MessageStore` trait.

mod json;
mod memory;

pub use json::JsonMessageStore;
pub use memory::InMemoryMessageStore;

use serde::{Deserialize, Serialize};

pub type MessageId = i64;

/// A teleprompter script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unset until the store assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub title: String,
    pub content: String,
}

impl Message {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Errors reported by a message store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store was used before `init()` completed.
    NotReady,
    NotFound(MessageId),
    Invalid(String),
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotReady => write!(f, "Message store is not initialized"),
            StoreError::NotFound(id) => write!(f, "Message {} not found", id),
            StoreError::Invalid(e) => write!(f, "Invalid message: {}", e),
            StoreError::Io(e) => write!(f, "Message store I/O error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Repository contract consumed by the recording core.
///
/// `update` replaces both title and content; there is no partial update.
pub trait MessageStore: Send + Sync {
    fn add(&self, title: &str, content: &str) -> Result<MessageId, StoreError>;
    fn update(&self, id: MessageId, title: &str, content: &str) -> Result<(), StoreError>;
    fn get_all(&self) -> Result<Vec<Message>, StoreError>;
    fn get_by_id(&self, id: MessageId) -> Result<Option<Message>, StoreError>;
    /// Deleting an unknown id is not an error.
    fn delete(&self, id: MessageId) -> Result<(), StoreError>;
}

/// Title and content must both carry visible text.
pub fn validate(title: &str, content: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::Invalid("title must not be empty".to_string()));
    }
    if content.trim().is_empty() {
        return Err(StoreError::Invalid("content must not be empty".to_string()));
    }
    Ok(())
}
