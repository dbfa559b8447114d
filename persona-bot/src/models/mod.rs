mod history;
mod record;
mod unread;

pub use history::{starts_with_user, ChannelHistories, HistoryEntry, Role};
pub use record::{Record, RecordKind};
pub use unread::{format_unread, UnreadBuffer, UnreadMessage};
