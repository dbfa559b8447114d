use crate::channels::commands::{self, parse_command};
use crate::channels::{BotContext, UnreadSource};
use crate::models::{format_unread, UnreadMessage};
use chrono::{DateTime, Utc};
use serenity::all::{Client, Context, EventHandler, GatewayIntents, Message, Ready, UserId};
use std::sync::{Arc, OnceLock};

/// Discord's per-message character limit
const MESSAGE_LIMIT: usize = 2000;

const APOLOGY: &str = "Sorry, I couldn't come up with a reply just now. Please try again in a moment.";

struct DiscordHandler {
    context: Arc<BotContext>,
    bot_id: OnceLock<UserId>,
}

#[serenity::async_trait]
impl EventHandler for DiscordHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        // Ignore messages from bots (including ourselves)
        if msg.author.bot {
            return;
        }

        let text = msg.content.trim().to_string();
        if text.is_empty() {
            return;
        }

        let channel_id = msg.channel_id.to_string();

        if let Some(command) = parse_command(&text, &self.context.command_prefix) {
            let reply = commands::execute(command, &self.context, &channel_id).await;
            self.send_chunks(&ctx, &msg, &reply).await;
            return;
        }

        let Some(bot_id) = self.bot_id.get().copied() else {
            log::warn!("Discord: Message received before ready, ignoring");
            return;
        };

        let author = msg
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| msg.author.name.clone());
        let content = strip_mentions(&text, bot_id);
        let sent_at = DateTime::<Utc>::from_timestamp(msg.timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now);

        log::info!(
            "Discord: CH[{}] message from {}: {}",
            channel_id,
            author,
            commands::truncate_chars(&content, 50)
        );

        self.context
            .inbox
            .push(&channel_id, UnreadMessage::new(author, sent_at, content));

        let is_dm = msg.guild_id.is_none();
        if !is_dm && !msg.mentions.iter().any(|u| u.id == bot_id) {
            return;
        }

        self.respond(&ctx, &msg, &channel_id).await;
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        let _ = self.bot_id.set(ready.user.id);
        log::info!(
            "Discord: '{}' connected as {}",
            self.context.character_name,
            ready.user.name
        );
    }
}

impl DiscordHandler {
    /// Answer everything buffered for the channel in one model call
    async fn respond(&self, ctx: &Context, msg: &Message, channel_id: &str) {
        let reply_lock = self.context.inbox.reply_lock(channel_id);
        let _replying = reply_lock.lock().await;

        if let Err(e) = msg.channel_id.broadcast_typing(&ctx.http).await {
            log::warn!("Discord: Failed to send typing indicator: {}", e);
        }

        // A reply that finished while we waited may already have answered everything
        let answered = self.context.inbox.unread_for(channel_id);
        let Some(prompt) = format_unread(&answered) else {
            return;
        };

        let reply = self
            .context
            .orchestrator
            .send_request(&self.context.model, &prompt, Some(channel_id))
            .await;

        match reply {
            Some(text) => {
                self.context.inbox.clear_first(channel_id, answered.len());
                self.send_chunks(ctx, msg, &text).await;
            }
            None => {
                log::error!("Discord: CH[{}] no reply generated", channel_id);
                if let Err(e) = msg.channel_id.say(&ctx.http, APOLOGY).await {
                    log::error!("Discord: Failed to send apology: {}", e);
                }
            }
        }
    }

    async fn send_chunks(&self, ctx: &Context, msg: &Message, text: &str) {
        for chunk in split_message(text, MESSAGE_LIMIT) {
            if let Err(e) = msg.channel_id.say(&ctx.http, &chunk).await {
                log::error!("Failed to send Discord message: {}", e);
            }
        }
    }
}

/// Remove `<@BOT_ID>` and `<@!BOT_ID>` mentions of the bot
fn strip_mentions(content: &str, bot_id: UserId) -> String {
    content
        .replace(&format!("<@{}>", bot_id), "")
        .replace(&format!("<@!{}>", bot_id), "")
        .trim()
        .to_string()
}

/// Split a message into chunks of at most `max_len` characters,
/// breaking on line boundaries where possible
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        if current_len + line_len + 1 > max_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            // If single line is too long, split it
            let mut remaining = line;
            while remaining.chars().count() > max_len {
                let end = remaining
                    .char_indices()
                    .nth(max_len)
                    .map(|(i, _)| i)
                    .unwrap_or(remaining.len());
                chunks.push(remaining[..end].to_string());
                remaining = &remaining[end..];
            }
            current = remaining.to_string();
            current_len = remaining.chars().count();
        } else {
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Run the Discord client until it stops or Ctrl+C is received
pub async fn run_discord_client(token: &str, context: Arc<BotContext>) -> Result<(), String> {
    log::info!("Starting Discord client for '{}'", context.character_name);

    // We need message content to read messages
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = DiscordHandler {
        context,
        bot_id: OnceLock::new(),
    };

    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| format!("Failed to create Discord client: {}", e))?;

    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Discord: Received shutdown signal");
            shard_manager.shutdown_all().await;
        }
        result = client.start() => {
            match result {
                Ok(()) => log::info!("Discord: Client stopped"),
                Err(e) => {
                    let error = format!("Discord client error: {}", e);
                    log::error!("{}", error);
                    return Err(error);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_message() {
        assert_eq!(split_message("hello", 2000), vec!["hello"]);
    }

    #[test]
    fn test_split_on_lines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 9), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn test_split_long_line_on_char_boundaries() {
        let text = "あ".repeat(5);
        let chunks = split_message(&text, 2);
        assert_eq!(chunks, vec!["ああ", "ああ", "あ"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 2));
    }

    #[test]
    fn test_split_keeps_every_character() {
        let text = format!("{}\n{}", "x".repeat(2500), "tail");
        let chunks = split_message(&text, 2000);
        assert!(chunks.iter().all(|c| c.chars().count() <= 2000));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_strip_mentions() {
        let bot_id = UserId::new(123456789);
        assert_eq!(strip_mentions("<@123456789> hello", bot_id), "hello");
        assert_eq!(strip_mentions("<@!123456789> hi <@123456789>", bot_id), "hi");
        assert_eq!(strip_mentions("<@42> hey", bot_id), "<@42> hey");
    }
}
