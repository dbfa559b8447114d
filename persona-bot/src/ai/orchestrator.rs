//! Request orchestrator - sends a channel's conversation to the model,
//! rotating across API keys until one answers
//!
//! Keys are tried starting from the one that last succeeded and wrapping
//! around, so load spreads across keys by success rather than always
//! hammering the first. The starting index lives only in this process and
//! is back to 0 after a restart.

use crate::ai::errors::rate_limit_delay;
use crate::ai::history::ConversationHistory;
use crate::ai::{ChatModel, GenerateError, ModelReply};
use crate::channels::inbox::UnreadSource;
use crate::models::{format_unread, starts_with_user, HistoryEntry, Role};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Extra attempts with the same key after a rate-limit error
const MAX_RETRIES_PER_KEY: usize = 1;

pub struct RequestOrchestrator {
    model: Arc<dyn ChatModel>,
    history: Arc<ConversationHistory>,
    unread: Arc<dyn UnreadSource>,
    api_keys: Vec<String>,
    /// Index into `api_keys` of the last key that succeeded
    start_index: AtomicUsize,
    api_timeout: Duration,
}

impl RequestOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        history: Arc<ConversationHistory>,
        unread: Arc<dyn UnreadSource>,
        api_keys: Vec<String>,
        api_timeout: Duration,
    ) -> Self {
        Self {
            model,
            history,
            unread,
            api_keys,
            start_index: AtomicUsize::new(0),
            api_timeout,
        }
    }

    /// Index of the key the next request starts with
    pub fn start_index(&self) -> usize {
        self.start_index.load(Ordering::Relaxed)
    }

    /// Send `prompt` to `model_name`, with the channel's history as context.
    ///
    /// On success the channel's unread messages (as one user turn) and the
    /// reply are appended to its history. Every failure resolves to `None`.
    pub async fn send_request(
        &self,
        model_name: &str,
        prompt: &str,
        channel_id: Option<&str>,
    ) -> Option<String> {
        log::info!("[AI_REQUEST] Starting request to model '{}'", model_name);

        let user_turn = channel_id.and_then(|id| format_unread(&self.unread.unread_for(id)));

        let history = match channel_id {
            Some(id) => match self.history.channel_history(id) {
                Some(history) => history,
                None => {
                    log::error!("[AI_REQUEST] CH[{}] history unavailable, aborting request", id);
                    return None;
                }
            },
            None => Vec::new(),
        };

        if self.api_keys.is_empty() {
            log::error!("[AI_REQUEST_FATAL] No Gemini API keys configured");
            return None;
        }

        let request_history: &[HistoryEntry] = if starts_with_user(&history) {
            &history
        } else {
            log::warn!(
                "[AI_REQUEST] CH[{}] history is empty or does not start with a user turn, sending without history",
                channel_id.unwrap_or("-")
            );
            &[]
        };

        let (reply, last_error) = self.call_with_rotation(model_name, request_history, prompt).await;

        let Some(reply) = reply else {
            log::error!("[AI_REQUEST_FATAL] Request failed with every API key");
            if let Some(e) = last_error {
                log::error!("[AI_REQUEST_FATAL] Last error: {} - {}", e.label(), e);
            }
            return None;
        };

        if let Some(id) = channel_id {
            if let Some(content) = &user_turn {
                self.history.add_message(id, Role::User, content);
            }
            if !reply.text.is_empty() {
                self.history.add_message(id, Role::Model, &reply.text);
            }
        }

        if let Some(usage) = &reply.usage {
            log::info!(
                "[TOKEN_COUNT] Prompt: {}, Candidates: {}, Total: {}",
                usage.prompt_tokens,
                usage.candidate_tokens,
                usage.total_tokens
            );
        }

        Some(reply.text)
    }

    async fn call_with_rotation(
        &self,
        model_name: &str,
        history: &[HistoryEntry],
        prompt: &str,
    ) -> (Option<ModelReply>, Option<GenerateError>) {
        let total = self.api_keys.len();
        let order = credential_order(total, self.start_index());
        let mut last_error = None;

        for (position, index) in order.iter().copied().enumerate() {
            let api_key = &self.api_keys[index];
            log::info!("[AI_REQUEST] Trying API key {}/{} (index {})", index + 1, total, index);

            let mut retries = 0;
            let mut wait_before_next = None;

            loop {
                match self.attempt(api_key, model_name, history, prompt).await {
                    Ok(reply) => {
                        self.start_index.store(index, Ordering::Relaxed);
                        log::info!("[AI_RESPONSE] Response received with API key {}", index + 1);
                        return (Some(reply), None);
                    }
                    Err(GenerateError::RateLimited(message)) => {
                        let delay = rate_limit_delay(&message);
                        log::warn!("[AI_REQUEST_RATE_LIMIT] API key {} rate limited: {}", index + 1, message);
                        last_error = Some(GenerateError::RateLimited(message));
                        retries += 1;

                        if retries <= MAX_RETRIES_PER_KEY {
                            log::info!(
                                "[AI_REQUEST_RATE_LIMIT] Waiting {:.1}s before retrying the same key",
                                delay.as_secs_f64()
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }

                        log::warn!("[AI_REQUEST_RATE_LIMIT] Retry limit reached for API key {}", index + 1);
                        wait_before_next = Some(delay);
                        break;
                    }
                    Err(e @ GenerateError::InvalidHistory(_)) => {
                        log::error!("[AI_REQUEST_HISTORY_INVALID] {}", e);
                        return (None, Some(e));
                    }
                    Err(e) => {
                        log::error!(
                            "[AI_REQUEST_{}] API key {} failed, moving to next key: {}",
                            e.label(),
                            index + 1,
                            e
                        );
                        last_error = Some(e);
                        break;
                    }
                }
            }

            let has_next = position + 1 < order.len();
            if let (Some(delay), true) = (wait_before_next, has_next) {
                log::info!(
                    "[AI_REQUEST_RATE_LIMIT] Waiting {:.1}s before trying the next key",
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
        }

        (None, last_error)
    }

    async fn attempt(
        &self,
        api_key: &str,
        model_name: &str,
        history: &[HistoryEntry],
        prompt: &str,
    ) -> Result<ModelReply, GenerateError> {
        let call = self.model.send_message(api_key, model_name, history, prompt);
        match tokio::time::timeout(self.api_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GenerateError::Timeout(self.api_timeout)),
        }
    }
}

/// Order in which to try `count` keys: from `start` to the end, then wrap around.
/// An out-of-range `start` falls back to 0.
pub fn credential_order(count: usize, start: usize) -> Vec<usize> {
    let start = if start < count { start } else { 0 };
    (0..count).map(|offset| (start + offset) % count).collect()
}
