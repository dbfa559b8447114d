//! Records - the named datasets the bot keeps in memory and mirrors to storage
//!
//! Each record lives as a single `{ data: ... }` document in its own
//! collection. The shape of `data` depends on the kind: memory notes are a
//! list, everything else is a mapping.

use serde_json::{Map, Value};
use strum::{Display, EnumIter, IntoEnumIterator};

use super::{ChannelHistories, UnreadBuffer};

/// The closed set of records the bot persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum RecordKind {
    Memory,
    Emotion,
    Setting,
    Schedule,
    History,
    Unread,
}

impl RecordKind {
    pub fn all() -> Vec<RecordKind> {
        RecordKind::iter().collect()
    }

    /// Collection holding this record's document
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Memory => "memory",
            RecordKind::Emotion => "emotion",
            RecordKind::Setting => "setting",
            RecordKind::Schedule => "schedule",
            RecordKind::History => "history",
            RecordKind::Unread => "unread",
        }
    }

    /// Value used when the collection has no document yet
    pub fn default_record(&self) -> Record {
        match self {
            RecordKind::Memory => Record::Memory(Vec::new()),
            RecordKind::Emotion => Record::Emotion(Map::new()),
            RecordKind::Setting => Record::Setting(Map::new()),
            RecordKind::Schedule => Record::Schedule(Map::new()),
            RecordKind::History => Record::History(ChannelHistories::new()),
            RecordKind::Unread => Record::Unread(UnreadBuffer::new()),
        }
    }
}

/// Contents of one record
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Memory(Vec<String>),
    Emotion(Map<String, Value>),
    Setting(Map<String, Value>),
    Schedule(Map<String, Value>),
    History(ChannelHistories),
    Unread(UnreadBuffer),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Memory(_) => RecordKind::Memory,
            Record::Emotion(_) => RecordKind::Emotion,
            Record::Setting(_) => RecordKind::Setting,
            Record::Schedule(_) => RecordKind::Schedule,
            Record::History(_) => RecordKind::History,
            Record::Unread(_) => RecordKind::Unread,
        }
    }

    /// Decode the `data` field of a stored document
    pub fn from_value(kind: RecordKind, value: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            RecordKind::Memory => Record::Memory(serde_json::from_value(value)?),
            RecordKind::Emotion => Record::Emotion(serde_json::from_value(value)?),
            RecordKind::Setting => Record::Setting(serde_json::from_value(value)?),
            RecordKind::Schedule => Record::Schedule(serde_json::from_value(value)?),
            RecordKind::History => Record::History(serde_json::from_value(value)?),
            RecordKind::Unread => Record::Unread(serde_json::from_value(value)?),
        })
    }

    /// Encode as the `data` field of a stored document
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Record::Memory(notes) => serde_json::to_value(notes),
            Record::Emotion(map) | Record::Setting(map) | Record::Schedule(map) => {
                Ok(Value::Object(map.clone()))
            }
            Record::History(histories) => serde_json::to_value(histories),
            Record::Unread(buffer) => serde_json::to_value(buffer),
        }
    }

    pub fn as_memory_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Record::Memory(notes) => Some(notes),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn as_history(&self) -> Option<&ChannelHistories> {
        match self {
            Record::History(histories) => Some(histories),
            _ => None,
        }
    }

    pub fn as_history_mut(&mut self) -> Option<&mut ChannelHistories> {
        match self {
            Record::History(histories) => Some(histories),
            _ => None,
        }
    }

    pub fn as_unread_mut(&mut self) -> Option<&mut UnreadBuffer> {
        match self {
            Record::Unread(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Emotion, setting and schedule records are free-form mappings
    #[cfg(test)]
    pub fn as_mapping_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match self {
            Record::Emotion(map) | Record::Setting(map) | Record::Schedule(map) => Some(map),
            _ => None,
        }
    }

    /// Number of top-level items (notes, keys or channels)
    pub fn len(&self) -> usize {
        match self {
            Record::Memory(notes) => notes.len(),
            Record::Emotion(map) | Record::Setting(map) | Record::Schedule(map) => map.len(),
            Record::History(histories) => histories.len(),
            Record::Unread(buffer) => buffer.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryEntry;
    use serde_json::json;

    #[test]
    fn test_defaults_match_document_shapes() {
        assert_eq!(RecordKind::Memory.default_record().to_value().unwrap(), json!([]));
        for kind in [RecordKind::Emotion, RecordKind::Setting, RecordKind::Schedule, RecordKind::History, RecordKind::Unread] {
            assert_eq!(kind.default_record().to_value().unwrap(), json!({}), "{}", kind);
        }
    }

    #[test]
    fn test_collection_names() {
        let names: Vec<&str> = RecordKind::all().iter().map(|k| k.collection()).collect();
        assert_eq!(names, vec!["memory", "emotion", "setting", "schedule", "history", "unread"]);
        assert_eq!(RecordKind::History.to_string(), "history");
    }

    #[test]
    fn test_history_decodes_stored_document() {
        let data = json!({
            "42": [
                {"role": "user", "parts": ["You are Aoi."]},
                {"role": "model", "parts": ["Understood."]}
            ]
        });
        let record = Record::from_value(RecordKind::History, data.clone()).unwrap();
        let histories = record.as_history().unwrap();
        assert_eq!(histories["42"][0], HistoryEntry::user("You are Aoi."));
        assert_eq!(record.to_value().unwrap(), data);
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(Record::from_value(RecordKind::Memory, json!({"not": "a list"})).is_err());
        assert!(Record::from_value(RecordKind::Setting, json!([1, 2])).is_err());
    }

    #[test]
    fn test_accessors_follow_variant() {
        let mut record = RecordKind::Setting.default_record();
        assert!(record.as_memory_mut().is_none());
        record.as_mapping_mut().unwrap().insert("volume".into(), json!(3));
        assert_eq!(record.kind(), RecordKind::Setting);
        assert_eq!(record.len(), 1);
    }
}
