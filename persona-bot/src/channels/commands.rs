//! Prefix commands for managing the bot from chat
//!
//! Commands never reach the model. Each one produces a single text reply.

use crate::channels::BotContext;

/// Longest excerpt of a history entry shown by the history command
const HISTORY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Drop the conversation history of every channel
    ResetHistory,
    /// Show this channel's history
    ShowHistory,
    /// Check that the persona file loads
    PersonaReload,
    /// Re-seed this channel's history with the persona
    PersonaApply,
    MemoryAdd(String),
    MemoryList,
    /// 1-based note number, as shown by the list command
    MemoryDelete(usize),
    MemoryReset,
    /// Write every record to storage and wait for it
    Save,
    Help,
    /// Recognized command with bad arguments; holds the usage line
    Usage(&'static str),
    Unknown(String),
}

/// Parse `text` as a command. Returns `None` when it does not start with `prefix`.
pub fn parse_command(text: &str, prefix: &str) -> Option<Command> {
    let body = text.trim().strip_prefix(prefix)?;
    let mut words = body.split_whitespace();
    let name = words.next()?.to_lowercase();
    let sub = words.next().map(|w| w.to_lowercase());

    let command = match (name.as_str(), sub.as_deref()) {
        ("reset", None) => Command::ResetHistory,
        ("history", None) => Command::ShowHistory,
        ("persona", Some("reload")) => Command::PersonaReload,
        ("persona", Some("apply")) => Command::PersonaApply,
        ("persona", _) => Command::Usage("persona reload | persona apply"),
        ("memory", Some("add")) => {
            let note = rest_after(body, 2);
            if note.is_empty() {
                Command::Usage("memory add <text>")
            } else {
                Command::MemoryAdd(note.to_string())
            }
        }
        ("memory", Some("list")) => Command::MemoryList,
        ("memory", Some("delete")) => match words.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n > 0 => Command::MemoryDelete(n),
            _ => Command::Usage("memory delete <number>"),
        },
        ("memory", Some("reset")) => Command::MemoryReset,
        ("memory", _) => Command::Usage("memory add <text> | memory list | memory delete <number> | memory reset"),
        ("save", None) => Command::Save,
        ("help", _) => Command::Help,
        _ => Command::Unknown(name),
    };
    Some(command)
}

/// Text following the first `skip` words, with its original spacing
fn rest_after(body: &str, skip: usize) -> &str {
    let mut rest = body.trim_start();
    for _ in 0..skip {
        rest = match rest.find(char::is_whitespace) {
            Some(end) => rest[end..].trim_start(),
            None => "",
        };
    }
    rest.trim_end()
}

/// Run a command for `channel_id` and build the reply
pub async fn execute(command: Command, context: &BotContext, channel_id: &str) -> String {
    log::info!("[COMMAND] CH[{}] {:?}", channel_id, command);

    match command {
        Command::ResetHistory => {
            context.history.reset_all();
            "Conversation history cleared for every channel.".to_string()
        }
        Command::ShowHistory => match context.history.history_for_channel(channel_id) {
            Some(entries) if !entries.is_empty() => {
                let lines: Vec<String> = entries
                    .iter()
                    .enumerate()
                    .map(|(i, entry)| {
                        format!("{}. **{}**: {}", i, entry.role, truncate_chars(&entry.text(), HISTORY_PREVIEW_CHARS))
                    })
                    .collect();
                format!("History for this channel ({} entries):\n{}", entries.len(), lines.join("\n"))
            }
            _ => "No history for this channel yet.".to_string(),
        },
        Command::PersonaReload => {
            if context.history.reload_persona() {
                format!(
                    "Persona file {} loaded. Use `{}persona apply` to use it here.",
                    context.history.persona().path().display(),
                    context.command_prefix
                )
            } else {
                format!(
                    "Could not load persona file {}.",
                    context.history.persona().path().display()
                )
            }
        }
        Command::PersonaApply => {
            if context.history.apply_persona(channel_id) {
                "Persona applied. This channel's history starts over.".to_string()
            } else {
                "Could not load the persona file, history left unchanged.".to_string()
            }
        }
        Command::MemoryAdd(note) => {
            if context.memory.add(&note) {
                format!("Remembered: {}", note)
            } else {
                "Memory is not available right now.".to_string()
            }
        }
        Command::MemoryList => {
            let notes = context.memory.list();
            if notes.is_empty() {
                "No memories yet.".to_string()
            } else {
                let lines: Vec<String> = notes
                    .iter()
                    .enumerate()
                    .map(|(i, note)| format!("{}. {}", i + 1, note))
                    .collect();
                format!("Memories:\n{}", lines.join("\n"))
            }
        }
        Command::MemoryDelete(number) => match context.memory.delete(number - 1) {
            Some(note) => format!("Forgot: {}", note),
            None => format!("There is no memory number {}.", number),
        },
        Command::MemoryReset => {
            context.memory.reset();
            "All memories cleared.".to_string()
        }
        Command::Save => {
            let pending = context.store.save_all().len();
            context.store.flush().await;
            format!("Saved {} records.", pending)
        }
        Command::Help => help_text(&context.command_prefix),
        Command::Usage(usage) => format!("Usage: `{}{}`", context.command_prefix, usage),
        Command::Unknown(name) => format!(
            "Unknown command `{}`. Try `{}help`.",
            name, context.command_prefix
        ),
    }
}

fn help_text(prefix: &str) -> String {
    [
        ("reset", "clear conversation history in every channel"),
        ("history", "show this channel's history"),
        ("persona reload", "check that the persona file loads"),
        ("persona apply", "restart this channel's history from the persona"),
        ("memory add <text>", "remember a note"),
        ("memory list", "list notes"),
        ("memory delete <number>", "forget a note"),
        ("memory reset", "forget every note"),
        ("save", "write everything to the database now"),
    ]
    .iter()
    .map(|(usage, what)| format!("`{}{}` - {}", prefix, usage, what))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Shorten `text` to at most `max_chars` characters, marking the cut with "..."
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HistoryEntry, RecordKind, Role};
    use std::io::Write;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("!reset", "!"), Some(Command::ResetHistory));
        assert_eq!(parse_command("  !history ", "!"), Some(Command::ShowHistory));
        assert_eq!(parse_command("!Persona Apply", "!"), Some(Command::PersonaApply));
        assert_eq!(parse_command("!persona reload", "!"), Some(Command::PersonaReload));
        assert_eq!(parse_command("!memory list", "!"), Some(Command::MemoryList));
        assert_eq!(parse_command("!memory delete 2", "!"), Some(Command::MemoryDelete(2)));
        assert_eq!(parse_command("!save", "!"), Some(Command::Save));
        assert_eq!(parse_command("!dance", "!"), Some(Command::Unknown("dance".to_string())));
        assert_eq!(parse_command("hello there", "!"), None);
        assert_eq!(parse_command("!", "!"), None);
    }

    #[test]
    fn test_parse_memory_add_keeps_text() {
        assert_eq!(
            parse_command("!memory add  likes  green tea ", "!"),
            Some(Command::MemoryAdd("likes  green tea".to_string()))
        );
        assert!(matches!(parse_command("!memory add", "!"), Some(Command::Usage(_))));
    }

    #[test]
    fn test_parse_bad_arguments() {
        assert!(matches!(parse_command("!memory delete 0", "!"), Some(Command::Usage(_))));
        assert!(matches!(parse_command("!memory delete two", "!"), Some(Command::Usage(_))));
        assert!(matches!(parse_command("!persona", "!"), Some(Command::Usage(_))));
        assert!(matches!(parse_command("!memory", "!"), Some(Command::Usage(_))));
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("こんにちは世界", 5), "こんにちは...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    fn context(persona: &tempfile::NamedTempFile) -> BotContext {
        BotContext::for_tests(persona.path())
    }

    fn persona_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "You are Aoi.").unwrap();
        file
    }

    #[tokio::test]
    async fn test_memory_commands() {
        let persona = persona_file();
        let context = context(&persona);

        execute(Command::MemoryAdd("likes tea".to_string()), &context, "1").await;
        execute(Command::MemoryAdd("has a cat".to_string()), &context, "1").await;
        assert_eq!(
            execute(Command::MemoryList, &context, "1").await,
            "Memories:\n1. likes tea\n2. has a cat"
        );
        assert_eq!(
            execute(Command::MemoryDelete(1), &context, "1").await,
            "Forgot: likes tea"
        );
        assert_eq!(
            execute(Command::MemoryDelete(9), &context, "1").await,
            "There is no memory number 9."
        );
        execute(Command::MemoryReset, &context, "1").await;
        assert_eq!(execute(Command::MemoryList, &context, "1").await, "No memories yet.");
    }

    #[tokio::test]
    async fn test_history_and_persona_commands() {
        let persona = persona_file();
        let context = context(&persona);

        assert_eq!(
            execute(Command::ShowHistory, &context, "7").await,
            "No history for this channel yet."
        );

        context.history.add_message("7", Role::User, "hello");
        let shown = execute(Command::ShowHistory, &context, "7").await;
        assert!(shown.starts_with("History for this channel (2 entries):"));
        assert!(shown.contains("1. **user**: hello"));

        execute(Command::PersonaApply, &context, "7").await;
        assert_eq!(
            context.history.history_for_channel("7").unwrap(),
            vec![HistoryEntry::user("You are Aoi.")]
        );

        execute(Command::ResetHistory, &context, "7").await;
        assert_eq!(context.history.history_for_channel("7"), None);
    }

    #[tokio::test]
    async fn test_save_writes_every_record() {
        let persona = persona_file();
        let context = context(&persona);

        let reply = execute(Command::Save, &context, "1").await;

        assert_eq!(reply, format!("Saved {} records.", RecordKind::all().len()));
        assert_eq!(context.store.pending_writes(), 0);
    }
}
