pub mod errors;
pub mod gemini;
pub mod history;
pub mod orchestrator;
pub mod persona;

pub use errors::GenerateError;
pub use gemini::GeminiClient;
pub use history::ConversationHistory;
pub use orchestrator::RequestOrchestrator;
pub use persona::PersonaFile;

use crate::models::HistoryEntry;
use async_trait::async_trait;

/// Token counts reported by the API for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub candidate_tokens: u32,
    pub total_tokens: u32,
}

/// A successful model response
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// A generative model that continues a conversation
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` as the next user turn after `history`, authenticating with `api_key`
    async fn send_message(
        &self,
        api_key: &str,
        model: &str,
        history: &[HistoryEntry],
        prompt: &str,
    ) -> Result<ModelReply, GenerateError>;
}
