//! Durable message store backed by a single JSON file
//!
//! The store has an explicit lifecycle: `new()` only records the path and
//! `init()` loads (or creates) the file. Every operation before `init()`
//! fails with `StoreError::NotReady` instead of silently doing nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use super::{validate, Message, MessageId, MessageStore, StoreError};
use crate::settings::write_atomically;

const STORE_FILE_NAME: &str = "messages.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: MessageId,
    messages: Vec<Message>,
}

pub struct JsonMessageStore {
    path: PathBuf,
    data: RwLock<Option<StoreFile>>,
    /// Serializes writers. Readers never take it, so reads proceed while a
    /// write is being flushed to disk and observe the previous contents.
    write_guard: Mutex<()>,
}

impl JsonMessageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: RwLock::new(None),
            write_guard: Mutex::new(()),
        }
    }

    /// Default location: <local data dir>/teleprompt/messages.json
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("teleprompt")
            .join(STORE_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_ready(&self) -> bool {
        self.data.read().map(|d| d.is_some()).unwrap_or(false)
    }

    /// Load the file, creating an empty store if it does not exist yet.
    pub fn init(&self) -> Result<(), StoreError> {
        let loaded = match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str::<StoreFile>(&contents)
                .map_err(|e| StoreError::Io(format!("parse {:?}: {}", self.path, e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = StoreFile::default();
                self.flush(&empty)?;
                empty
            }
            Err(e) => return Err(StoreError::Io(format!("read {:?}: {}", self.path, e))),
        };

        log::info!(
            "Message store ready: {:?} ({} messages)",
            self.path,
            loaded.messages.len()
        );
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(loaded);
        Ok(())
    }

    fn snapshot(&self) -> Result<StoreFile, StoreError> {
        self.data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(StoreError::NotReady)
    }

    fn flush(&self, file: &StoreFile) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(file)
            .map_err(|e| StoreError::Io(format!("serialize store: {}", e)))?;
        write_atomically(&self.path, &contents).map_err(StoreError::Io)
    }

    /// Apply `change` to a copy, persist it, then publish it. A failed write
    /// leaves the visible contents untouched.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut StoreFile) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _writer = self.write_guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = self.snapshot()?;
        let out = change(&mut next)?;
        self.flush(&next)?;
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(next);
        Ok(out)
    }
}

impl MessageStore for JsonMessageStore {
    fn add(&self, title: &str, content: &str) -> Result<MessageId, StoreError> {
        validate(title, content)?;
        self.mutate(|file| {
            file.next_id += 1;
            let id = file.next_id;
            file.messages.push(Message {
                id: Some(id),
                title: title.to_string(),
                content: content.to_string(),
            });
            log::debug!("Message store: added {}", id);
            Ok(id)
        })
    }

    fn update(&self, id: MessageId, title: &str, content: &str) -> Result<(), StoreError> {
        validate(title, content)?;
        self.mutate(|file| {
            let message = file
                .messages
                .iter_mut()
                .find(|m| m.id == Some(id))
                .ok_or(StoreError::NotFound(id))?;
            message.title = title.to_string();
            message.content = content.to_string();
            Ok(())
        })
    }

    fn get_all(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.snapshot()?.messages)
    }

    fn get_by_id(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self
            .snapshot()?
            .messages
            .into_iter()
            .find(|m| m.id == Some(id)))
    }

    fn delete(&self, id: MessageId) -> Result<(), StoreError> {
        self.mutate(|file| {
            file.messages.retain(|m| m.id != Some(id));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_store(dir: &tempfile::TempDir) -> JsonMessageStore {
        let store = JsonMessageStore::new(dir.path().join(STORE_FILE_NAME));
        store.init().unwrap();
        store
    }

    #[test]
    fn operations_before_init_fail_with_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMessageStore::new(dir.path().join(STORE_FILE_NAME));

        assert!(!store.is_ready());
        assert_eq!(store.add("Intro", "Hello"), Err(StoreError::NotReady));
        assert_eq!(store.get_all(), Err(StoreError::NotReady));
        assert_eq!(store.get_by_id(1), Err(StoreError::NotReady));
        assert_eq!(store.delete(1), Err(StoreError::NotReady));
    }

    #[test]
    fn init_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ready_store(&dir);
        assert!(store.is_ready());
        assert!(store.path().exists());
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = ready_store(&dir);
            store.add("Intro", "Hello").unwrap()
        };

        let reopened = ready_store(&dir);
        let message = reopened.get_by_id(id).unwrap().unwrap();
        assert_eq!(message.title, "Intro");

        // ids keep counting after a reopen
        assert_eq!(reopened.add("Outro", "Bye").unwrap(), id + 1);
    }

    #[test]
    fn invalid_add_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = ready_store(&dir);
        assert!(matches!(store.add("", "Hello"), Err(StoreError::Invalid(_))));
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE_NAME);
        std::fs::write(&path, "[oops").unwrap();
        let store = JsonMessageStore::new(&path);
        assert!(matches!(store.init(), Err(StoreError::Io(_))));
        assert!(!store.is_ready());
    }
}
