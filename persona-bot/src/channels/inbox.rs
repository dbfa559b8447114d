//! Unread message buffer - chat messages the bot has seen but not yet answered,
//! kept per channel in the `unread` record

use crate::models::{RecordKind, UnreadMessage};
use crate::store::RecordStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Anything that can report a channel's unanswered messages
pub trait UnreadSource: Send + Sync {
    fn unread_for(&self, channel_id: &str) -> Vec<UnreadMessage>;
}

pub struct UnreadInbox {
    store: Arc<RecordStore>,
    /// One lock per channel, held while a reply for that channel is generated
    reply_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UnreadInbox {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            reply_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Buffer a message for a channel. Returns false if the unread record is not loaded.
    pub fn push(&self, channel_id: &str, message: UnreadMessage) -> bool {
        let count = self.store.with_unread(|buffer| {
            let messages = buffer.entry(channel_id.to_string()).or_default();
            messages.push(message);
            messages.len()
        });

        match count {
            Some(count) => {
                log::debug!("[UNREAD] CH[{}] buffered message ({} unread)", channel_id, count);
                self.store.persist(RecordKind::Unread);
                true
            }
            None => {
                log::error!("[UNREAD] Unread record is not loaded, message dropped");
                false
            }
        }
    }

    /// Drop the `count` oldest buffered messages once they have been answered.
    /// Messages that arrived after the answered snapshot stay buffered.
    pub fn clear_first(&self, channel_id: &str, count: usize) {
        let removed = self
            .store
            .with_unread(|buffer| {
                let messages = buffer.get_mut(channel_id)?;
                let answered = count.min(messages.len());
                messages.drain(..answered);
                if messages.is_empty() {
                    buffer.remove(channel_id);
                }
                Some(answered)
            })
            .flatten();

        if let Some(removed) = removed.filter(|removed| *removed > 0) {
            log::info!("[UNREAD] CH[{}] cleared {} answered messages", channel_id, removed);
            self.store.persist(RecordKind::Unread);
        }
    }

    /// Lock that serializes replies within one channel, so two overlapping
    /// mentions never answer the same buffered messages twice
    pub fn reply_lock(&self, channel_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.reply_locks
            .lock()
            .entry(channel_id.to_string())
            .or_default()
            .clone()
    }
}

impl UnreadSource for UnreadInbox {
    fn unread_for(&self, channel_id: &str) -> Vec<UnreadMessage> {
        self.store
            .with_unread(|buffer| buffer.get(channel_id).cloned())
            .flatten()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format_unread;
    use crate::store::StorageConfig;
    use chrono::TimeZone;

    fn inbox() -> (Arc<RecordStore>, UnreadInbox) {
        let store = Arc::new(RecordStore::new());
        assert!(store.init(&StorageConfig {
            uri: "sqlite::memory:".to_string(),
            database_name: "test".to_string(),
        }));
        store.load_all();
        (store.clone(), UnreadInbox::new(store))
    }

    fn message(author: &str, minute: u32, content: &str) -> UnreadMessage {
        let at = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, minute, 0).unwrap();
        UnreadMessage::new(author, at, content)
    }

    #[tokio::test]
    async fn test_push_keeps_order_per_channel() {
        let (_store, inbox) = inbox();
        assert!(inbox.push("1", message("alice", 0, "hi")));
        assert!(inbox.push("1", message("bob", 1, "hello")));
        assert!(inbox.push("2", message("carol", 2, "elsewhere")));

        assert_eq!(
            format_unread(&inbox.unread_for("1")).unwrap(),
            "[alice @ 2024-01-02 03:00:00]: hi\n[bob @ 2024-01-02 03:01:00]: hello"
        );
        assert_eq!(inbox.unread_for("2").len(), 1);
        assert!(inbox.unread_for("3").is_empty());
    }

    #[tokio::test]
    async fn test_clear_first_persists_removal() {
        let (store, inbox) = inbox();
        inbox.push("1", message("alice", 0, "hi"));
        inbox.push("2", message("bob", 0, "yo"));
        inbox.clear_first("1", 1);
        inbox.clear_first("missing", 3);
        store.flush().await;

        assert!(inbox.unread_for("1").is_empty());
        let saved = store.stored_document(RecordKind::Unread).unwrap();
        assert!(saved["data"].get("1").is_none());
        assert_eq!(saved["data"]["2"][0]["author"], "bob");
    }

    #[tokio::test]
    async fn test_messages_arriving_mid_reply_stay_buffered() {
        let (_store, inbox) = inbox();
        inbox.push("1", message("alice", 0, "first"));
        let answered = inbox.unread_for("1");

        inbox.push("1", message("bob", 1, "second, arrived while replying"));
        inbox.clear_first("1", answered.len());

        let remaining = inbox.unread_for("1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].author, "bob");
        assert_eq!(remaining[0].content, "second, arrived while replying");
    }

    #[tokio::test]
    async fn test_reply_lock_is_shared_per_channel() {
        let (_store, inbox) = inbox();
        let first = inbox.reply_lock("1");
        let _held = first.lock().await;

        assert!(inbox.reply_lock("1").try_lock().is_err());
        assert!(inbox.reply_lock("2").try_lock().is_ok());
    }

    #[test]
    fn test_unloaded_store_drops_messages() {
        let inbox = UnreadInbox::new(Arc::new(RecordStore::new()));
        assert!(!inbox.push("1", message("alice", 0, "hi")));
        assert!(inbox.unread_for("1").is_empty());
    }
}
