use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{validate, Message, MessageId, MessageStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    next_id: MessageId,
    messages: BTreeMap<MessageId, Message>,
}

/// Volatile store, mostly for tests and previews.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    inner: RwLock<Inner>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageStore for InMemoryMessageStore {
    fn add(&self, title: &str, content: &str) -> Result<MessageId, StoreError> {
        validate(title, content)?;
        let mut inner = self.write();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.insert(
            id,
            Message {
                id: Some(id),
                title: title.to_string(),
                content: content.to_string(),
            },
        );
        Ok(id)
    }

    fn update(&self, id: MessageId, title: &str, content: &str) -> Result<(), StoreError> {
        validate(title, content)?;
        let mut inner = self.write();
        let message = inner.messages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        message.title = title.to_string();
        message.content = content.to_string();
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.read().messages.values().cloned().collect())
    }

    fn get_by_id(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.read().messages.get(&id).cloned())
    }

    fn delete(&self, id: MessageId) -> Result<(), StoreError> {
        self.write().messages.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_assigned_in_order_and_not_reused() {
        let store = InMemoryMessageStore::new();
        let a = store.add("A", "first").unwrap();
        let b = store.add("B", "second").unwrap();
        assert_eq!((a, b), (1, 2));

        store.delete(b).unwrap();
        let c = store.add("C", "third").unwrap();
        assert_eq!(c, 3);
    }

    #[test]
    fn update_replaces_both_fields() {
        let store = InMemoryMessageStore::new();
        let id = store.add("Intro", "Hello").unwrap();
        store.update(id, "Intro v2", "Hello again").unwrap();

        let message = store.get_by_id(id).unwrap().unwrap();
        assert_eq!(message.title, "Intro v2");
        assert_eq!(message.content, "Hello again");
        assert_eq!(message.id, Some(id));
    }

    #[test]
    fn update_of_unknown_id_fails() {
        let store = InMemoryMessageStore::new();
        assert_eq!(store.update(9, "t", "c"), Err(StoreError::NotFound(9)));
    }

    #[test]
    fn delete_of_unknown_id_is_a_no_op() {
        let store = InMemoryMessageStore::new();
        assert!(store.delete(42).is_ok());
        assert!(store.get_all().unwrap().is_empty());
    }
}
