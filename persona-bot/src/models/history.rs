use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Conversation history for every channel, keyed by channel id
pub type ChannelHistories = BTreeMap<String, Vec<HistoryEntry>>;

/// Speaker of a history turn, as the Gemini API names them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a channel conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub parts: Vec<String>,
}

impl HistoryEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![text.into()],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    #[cfg(test)]
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    /// All parts joined into a single block of text
    pub fn text(&self) -> String {
        self.parts.join("\n")
    }
}

/// Whether a history can be sent as-is: the API rejects histories that open with a model turn.
pub fn starts_with_user(history: &[HistoryEntry]) -> bool {
    history.first().is_some_and(|entry| entry.role == Role::User)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_like_gemini_content() {
        let entry = HistoryEntry::model("hello");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, serde_json::json!({"role": "model", "parts": ["hello"]}));
    }

    #[test]
    fn test_starts_with_user() {
        assert!(!starts_with_user(&[]));
        assert!(starts_with_user(&[HistoryEntry::user("persona")]));
        assert!(!starts_with_user(&[HistoryEntry::model("hi"), HistoryEntry::user("x")]));
    }
}
