//! Channel conversation history on top of the record store
//!
//! Every channel history opens with the persona as a `user` turn. When a
//! history reaches the configured length, the oldest exchange after the
//! persona (indices 1 and 2) is dropped so the persona always stays first.

use crate::ai::persona::PersonaFile;
use crate::models::{ChannelHistories, HistoryEntry, Record, RecordKind, Role};
use crate::store::RecordStore;
use std::sync::Arc;

pub struct ConversationHistory {
    store: Arc<RecordStore>,
    persona: PersonaFile,
    max_length: usize,
}

impl ConversationHistory {
    pub fn new(store: Arc<RecordStore>, persona: PersonaFile, max_length: usize) -> Self {
        Self {
            store,
            persona,
            max_length,
        }
    }

    pub fn persona(&self) -> &PersonaFile {
        &self.persona
    }

    /// Get a channel's history, seeding it with the persona if it is missing or empty.
    ///
    /// When the persona cannot be loaded the channel is seeded with an empty
    /// history. Either way the seed is persisted. Returns `None` only if the
    /// history record is not loaded.
    pub fn channel_history(&self, channel_id: &str) -> Option<Vec<HistoryEntry>> {
        let existing = self.store.with_history(|histories| {
            histories.get(channel_id).map(|history| !history.is_empty())
        });

        let Some(existing) = existing else {
            log::error!("[HISTORY] History record is not loaded");
            return None;
        };

        if existing != Some(true) {
            let action = if existing.is_none() { "Initializing" } else { "Re-initializing" };
            log::info!(
                "[HISTORY] CH[{}] has no history, {} from persona file",
                channel_id,
                action.to_lowercase()
            );

            let seed = match self.persona.load() {
                Some(persona) => {
                    log::info!("[HISTORY] CH[{}] seeded with persona", channel_id);
                    vec![HistoryEntry::user(persona)]
                }
                None => {
                    log::error!(
                        "[HISTORY] {} CH[{}] failed, persona unavailable; using empty history",
                        action,
                        channel_id
                    );
                    Vec::new()
                }
            };

            self.store.with_history(|histories| {
                histories.insert(channel_id.to_string(), seed);
            })?;
            self.store.persist(RecordKind::History);
        }

        self.store
            .with_history(|histories| histories.get(channel_id).cloned().unwrap_or_default())
    }

    /// Append a turn to a channel's history, evicting the oldest exchange when full.
    /// Returns false if the history could not be resolved.
    pub fn add_message(&self, channel_id: &str, role: Role, text: &str) -> bool {
        if self.channel_history(channel_id).is_none() {
            log::error!(
                "[HISTORY] CH[{}] history unavailable, {} message dropped",
                channel_id,
                role
            );
            return false;
        }

        let max_length = self.max_length;
        let new_len = self.store.with_history(|histories| {
            let history = histories.entry(channel_id.to_string()).or_default();
            if enforce_max_length(history, max_length) {
                log::warn!(
                    "[HISTORY] CH[{}] history too long, dropped the oldest exchange after the persona",
                    channel_id
                );
            }
            history.push(HistoryEntry::new(role, text));
            history.len()
        });

        match new_len {
            Some(len) => {
                log::info!(
                    "[HISTORY] CH[{}] added {} message (entries: {})",
                    channel_id,
                    role,
                    len
                );
                self.store.persist(RecordKind::History);
                true
            }
            None => false,
        }
    }

    /// Drop every channel's history
    pub fn reset_all(&self) {
        log::info!("[HISTORY] Resetting conversation history for all channels");
        self.store.replace(Record::History(ChannelHistories::new()));
    }

    /// Read-only copy of a channel's history; never seeds
    pub fn history_for_channel(&self, channel_id: &str) -> Option<Vec<HistoryEntry>> {
        self.store
            .with_history(|histories| histories.get(channel_id).cloned())
            .flatten()
    }

    /// Check that the persona file can currently be loaded
    pub fn reload_persona(&self) -> bool {
        self.persona.load().is_some()
    }

    /// Overwrite a channel's history with a fresh persona seed.
    /// Does nothing and returns false when the persona cannot be loaded.
    pub fn apply_persona(&self, channel_id: &str) -> bool {
        let Some(persona) = self.persona.load() else {
            return false;
        };

        let applied = self
            .store
            .with_history(|histories| {
                histories.insert(channel_id.to_string(), vec![HistoryEntry::user(persona)]);
            })
            .is_some();

        if applied {
            self.store.persist(RecordKind::History);
            log::info!("[HISTORY] CH[{}] persona applied", channel_id);
        }
        applied
    }
}

/// Make room for one more entry once `history` has reached `max_length`
/// by removing indices 1 and 2. Index 0 (the persona) is never removed and
/// histories shorter than 3 entries are left alone.
/// Returns true if entries were removed.
pub fn enforce_max_length(history: &mut Vec<HistoryEntry>, max_length: usize) -> bool {
    if history.len() < max_length {
        return false;
    }

    if history.len() >= 3 {
        history.drain(1..3);
        return true;
    }

    if history.len() == 2 && history[0].role == Role::User {
        log::warn!("[HISTORY] History at max length but only holds the persona and one reply, nothing removed");
    }
    false
}
