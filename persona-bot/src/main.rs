use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod channels;
mod config;
mod db;
mod memory;
mod models;
mod store;

use ai::{ConversationHistory, GeminiClient, PersonaFile, RequestOrchestrator};
use channels::{BotContext, UnreadInbox};
use config::Config;
use memory::MemoryBook;
use store::RecordStore;

const COMMAND_PREFIX: &str = "!";

#[tokio::main]
async fn main() -> Result<(), String> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    log::info!("Starting character '{}'", config.character_name);

    let store = Arc::new(RecordStore::new());
    if !store.init(&config.storage()) {
        return Err("Database initialization failed, aborting startup".to_string());
    }
    store.load_all();

    if config.api_keys.is_empty() {
        log::warn!("No Gemini API keys configured; every request will fail");
    } else {
        log::info!("Loaded {} Gemini API keys", config.api_keys.len());
    }

    let persona = PersonaFile::new(&config.persona_file);
    if persona.load().is_none() {
        log::warn!("Persona unavailable; channels will start with an empty history");
    }

    let history = Arc::new(ConversationHistory::new(
        store.clone(),
        persona,
        config.max_history_length,
    ));
    let inbox = Arc::new(UnreadInbox::new(store.clone()));
    let gemini = GeminiClient::new(config.api_timeout)?;
    let orchestrator = Arc::new(RequestOrchestrator::new(
        Arc::new(gemini),
        history.clone(),
        inbox.clone(),
        config.api_keys.clone(),
        config.api_timeout,
    ));

    let context = Arc::new(BotContext {
        character_name: config.character_name.clone(),
        model: config.model.clone(),
        command_prefix: COMMAND_PREFIX.to_string(),
        store: store.clone(),
        history,
        memory: Arc::new(MemoryBook::new(store.clone())),
        inbox,
        orchestrator,
    });

    let result = channels::discord::run_discord_client(&config.discord_token, context).await;

    log::info!("Shutting down, saving all records...");
    store.save_all();
    store.flush().await;
    log::info!("All records saved");

    result
}
