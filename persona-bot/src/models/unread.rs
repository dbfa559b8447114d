use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages received in each channel since the bot last replied there
pub type UnreadBuffer = BTreeMap<String, Vec<UnreadMessage>>;

fn unknown_author() -> String {
    "Unknown".to_string()
}

/// A chat message waiting to be handed to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadMessage {
    #[serde(default = "unknown_author")]
    pub author: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub content: String,
}

impl UnreadMessage {
    pub fn new(author: impl Into<String>, sent_at: DateTime<Utc>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            timestamp: sent_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            content: content.into(),
        }
    }

    /// `[author @ timestamp]: content`
    pub fn format_line(&self) -> String {
        format!("[{} @ {}]: {}", self.author, self.timestamp, self.content)
    }
}

/// Render buffered messages as the text of a single user turn.
/// Returns `None` when nothing is buffered.
pub fn format_unread(messages: &[UnreadMessage]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    let lines: Vec<String> = messages.iter().map(UnreadMessage::format_line).collect();
    Some(lines.join("\n"))
}
