//! Long-term memory notes - free text the character keeps across conversations,
//! stored as the `memory` record

use crate::models::{Record, RecordKind};
use crate::store::RecordStore;
use std::sync::Arc;

pub struct MemoryBook {
    store: Arc<RecordStore>,
}

impl MemoryBook {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Append a note. Returns false if the memory record is not loaded.
    pub fn add(&self, text: &str) -> bool {
        let added = self
            .store
            .with_memory(|notes| notes.push(text.to_string()))
            .is_some();
        if added {
            log::info!("[MEMORY] Added note: {}", text);
            self.store.persist(RecordKind::Memory);
        }
        added
    }

    pub fn list(&self) -> Vec<String> {
        self.store
            .with_memory(|notes| notes.clone())
            .unwrap_or_default()
    }

    /// Remove the note at `index` (0-based). Out of range leaves the record untouched.
    pub fn delete(&self, index: usize) -> Option<String> {
        let removed = self
            .store
            .with_memory(|notes| (index < notes.len()).then(|| notes.remove(index)))
            .flatten();

        match &removed {
            Some(note) => {
                log::info!("[MEMORY] Deleted note {}: {}", index, note);
                self.store.persist(RecordKind::Memory);
            }
            None => log::warn!("[MEMORY] No note at index {}", index),
        }
        removed
    }

    pub fn reset(&self) {
        log::info!("[MEMORY] Clearing all notes");
        self.store.replace(Record::Memory(Vec::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StorageConfig;
    use serde_json::json;

    fn book() -> (Arc<RecordStore>, MemoryBook) {
        let store = Arc::new(RecordStore::new());
        assert!(store.init(&StorageConfig {
            uri: "sqlite::memory:".to_string(),
            database_name: "test".to_string(),
        }));
        store.load_all();
        (store.clone(), MemoryBook::new(store))
    }

    #[tokio::test]
    async fn test_add_list_delete() {
        let (store, book) = book();
        assert!(book.add("likes tea"));
        assert!(book.add("birthday in May"));
        assert!(book.add("has a cat"));

        assert_eq!(book.delete(1).as_deref(), Some("birthday in May"));
        assert_eq!(book.delete(5), None);
        assert_eq!(book.list(), vec!["likes tea", "has a cat"]);

        store.flush().await;
        assert_eq!(
            store.get(RecordKind::Memory).unwrap().to_value().unwrap(),
            json!(["likes tea", "has a cat"])
        );
    }

    #[tokio::test]
    async fn test_reset_clears_notes() {
        let (_store, book) = book();
        book.add("something");
        book.reset();
        assert!(book.list().is_empty());
    }

    #[test]
    fn test_unloaded_store() {
        let book = MemoryBook::new(Arc::new(RecordStore::new()));
        assert!(!book.add("note"));
        assert!(book.list().is_empty());
        assert_eq!(book.delete(0), None);
    }
}
