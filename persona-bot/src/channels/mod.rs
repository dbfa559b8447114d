pub mod commands;
pub mod discord;
pub mod inbox;

pub use inbox::{UnreadInbox, UnreadSource};

use crate::ai::{ConversationHistory, RequestOrchestrator};
use crate::memory::MemoryBook;
use crate::store::RecordStore;
use std::sync::Arc;

/// Everything a chat handler needs, shared across events
pub struct BotContext {
    pub character_name: String,
    pub model: String,
    pub command_prefix: String,
    pub store: Arc<RecordStore>,
    pub history: Arc<ConversationHistory>,
    pub memory: Arc<MemoryBook>,
    pub inbox: Arc<UnreadInbox>,
    pub orchestrator: Arc<RequestOrchestrator>,
}

#[cfg(test)]
impl BotContext {
    /// Context over an in-memory store. The model client is never reached by command tests.
    pub fn for_tests(persona_path: &std::path::Path) -> Self {
        use crate::ai::{GeminiClient, PersonaFile};
        use crate::store::StorageConfig;
        use std::time::Duration;

        let store = Arc::new(RecordStore::new());
        assert!(store.init(&StorageConfig {
            uri: "sqlite::memory:".to_string(),
            database_name: "test".to_string(),
        }));
        store.load_all();

        let history = Arc::new(ConversationHistory::new(
            store.clone(),
            PersonaFile::new(persona_path),
            50,
        ));
        let inbox = Arc::new(UnreadInbox::new(store.clone()));
        let orchestrator = Arc::new(RequestOrchestrator::new(
            Arc::new(GeminiClient::new(Duration::from_secs(5)).unwrap()),
            history.clone(),
            inbox.clone(),
            Vec::new(),
            Duration::from_secs(5),
        ));

        Self {
            character_name: "aoi".to_string(),
            model: "gemini-2.0-flash".to_string(),
            command_prefix: "!".to_string(),
            memory: Arc::new(MemoryBook::new(store.clone())),
            store,
            history,
            inbox,
            orchestrator,
        }
    }
}
