//! Telegram Bot API client: long-polls for updates and sends/edits messages.
//!
//! Native Rust implementation over `reqwest`, exposing the `Messenger`
//! trait for outbound traffic and an update stream for inbound traffic.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::messenger::{BotUpdate, CallbackQuery, InlineButton, Messenger, Reply};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Back-off after a failed poll.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Stream of inbound updates.
pub type UpdateStream = Pin<Box<dyn Stream<Item = BotUpdate> + Send>>;

/// Telegram bot client.
#[derive(Clone)]
pub struct TelegramBot {
    bot_token: SecretString,
    client: reqwest::Client,
    poll_timeout: Duration,
}

impl TelegramBot {
    pub fn new(bot_token: SecretString, poll_timeout: Duration) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            poll_timeout,
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// POST a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let data: Value = resp.json().await.unwrap_or(Value::Null);

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed ({status}): {description}"),
            });
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Register the command menu shown by Telegram clients.
    pub async fn set_my_commands(&self, commands: &[(&str, &str)]) -> Result<(), ChannelError> {
        let commands: Vec<Value> = commands
            .iter()
            .map(|(command, description)| {
                serde_json::json!({ "command": command, "description": description })
            })
            .collect();
        let count = commands.len();
        self.call("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await?;
        tracing::info!(count, "Telegram command menu registered");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    /// Start long-polling `getUpdates` in a background task.
    ///
    /// The task stops once the returned stream is dropped.
    pub fn updates(&self) -> UpdateStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();
        let timeout_secs = self.poll_timeout.as_secs();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram bot listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = parse_update(update) else {
                        continue;
                    };

                    if tx.send(parsed).is_err() {
                        tracing::info!("Telegram update stream closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|update| (update, rx))
        });

        Box::pin(stream)
    }
}

#[async_trait]
impl Messenger for TelegramBot {
    /// Long texts are split; the keyboard goes on the last chunk.
    async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<(), ChannelError> {
        let chunks = split_message(&reply.text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last && !reply.keyboard.is_empty() {
                body["reply_markup"] = keyboard_markup(&reply.keyboard);
            }
            self.call("sendMessage", &body).await?;
        }

        tracing::debug!(chat_id, chunks = chunks.len(), "Telegram message sent");
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        reply: &Reply,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": reply.text,
        });
        if !reply.keyboard.is_empty() {
            body["reply_markup"] = keyboard_markup(&reply.keyboard);
        }

        match self.call("editMessageText", &body).await {
            Ok(_) => Ok(()),
            // Pressing a button twice re-renders identical content.
            Err(ChannelError::SendFailed { reason, .. })
                if reason.contains("message is not modified") =>
            {
                tracing::debug!(chat_id, message_id, "Telegram edit skipped, content unchanged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), ChannelError> {
        self.call(
            "answerCallbackQuery",
            &serde_json::json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("https://api.telegram.org/bot{}/{method}", token.expose_secret())
}

/// Build an `InlineKeyboardMarkup` object.
fn keyboard_markup(rows: &[Vec<InlineButton>]) -> Value {
    serde_json::json!({ "inline_keyboard": rows })
}

/// Convert a raw `getUpdates` entry into a `BotUpdate`.
/// Returns `None` for update kinds the bot does not handle.
fn parse_update(update: &Value) -> Option<BotUpdate> {
    if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(Value::as_str)?;
        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)?;
        let from_id = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)?;

        return Some(BotUpdate::Message {
            chat_id,
            from_id,
            text: text.to_string(),
        });
    }

    if let Some(query) = update.get("callback_query") {
        let id = query.get("id").and_then(Value::as_str)?;
        let from_id = query
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)?;
        let message = query.get("message").and_then(|m| {
            let chat_id = m.get("chat").and_then(|c| c.get("id")).and_then(Value::as_i64)?;
            let message_id = m.get("message_id").and_then(Value::as_i64)?;
            Some((chat_id, message_id))
        });
        let data = query
            .get("data")
            .and_then(Value::as_str)
            .map(String::from);

        return Some(BotUpdate::CallbackQuery(CallbackQuery {
            id: id.to_string(),
            from_id,
            message,
            data,
        }));
    }

    None
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(token: &str) -> TelegramBot {
        TelegramBot::new(SecretString::from(token.to_string()), Duration::from_secs(1))
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            bot("123:ABC").api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parses_text_message() {
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "first_name": "Иван"},
                "chat": {"id": 42, "type": "private"},
                "text": "/join AB12"
            }
        });
        assert_eq!(
            parse_update(&update),
            Some(BotUpdate::Message {
                chat_id: 42,
                from_id: 42,
                text: "/join AB12".into()
            })
        );
    }

    #[test]
    fn skips_message_without_text() {
        let update = serde_json::json!({
            "update_id": 11,
            "message": {
                "message_id": 2,
                "from": {"id": 42},
                "chat": {"id": 42},
                "sticker": {}
            }
        });
        assert_eq!(parse_update(&update), None);
    }

    #[test]
    fn parses_callback_query() {
        let update = serde_json::json!({
            "update_id": 12,
            "callback_query": {
                "id": "cbq-1",
                "from": {"id": 42},
                "message": {"message_id": 77, "chat": {"id": 42}},
                "data": "{\"t\":\"qr\"}"
            }
        });
        assert_eq!(
            parse_update(&update),
            Some(BotUpdate::CallbackQuery(CallbackQuery {
                id: "cbq-1".into(),
                from_id: 42,
                message: Some((42, 77)),
                data: Some("{\"t\":\"qr\"}".into()),
            }))
        );
    }

    #[test]
    fn parses_callback_query_without_message_or_data() {
        let update = serde_json::json!({
            "update_id": 13,
            "callback_query": {"id": "cbq-2", "from": {"id": 5}}
        });
        let Some(BotUpdate::CallbackQuery(query)) = parse_update(&update) else {
            panic!("expected callback query");
        };
        assert_eq!(query.message, None);
        assert_eq!(query.data, None);
    }

    #[test]
    fn ignores_other_update_kinds() {
        let update = serde_json::json!({"update_id": 14, "edited_message": {}});
        assert_eq!(parse_update(&update), None);
    }

    // ── Keyboard markup ─────────────────────────────────────────────

    #[test]
    fn keyboard_markup_shape() {
        let rows = vec![
            vec![InlineButton {
                text: "Да".into(),
                callback_data: "a".into(),
            }],
            vec![InlineButton {
                text: "Нет".into(),
                callback_data: "b".into(),
            }],
        ];
        let markup = keyboard_markup(&rows);
        assert_eq!(markup["inline_keyboard"][0][0]["text"], "Да");
        assert_eq!(markup["inline_keyboard"][1][0]["callback_data"], "b");
    }

    // ── Network error paths ─────────────────────────────────────────

    #[tokio::test]
    async fn send_with_fake_token_fails() {
        let result = bot("fake-token")
            .send_message(123456, &Reply::text("hello"))
            .await;
        assert!(matches!(result, Err(ChannelError::SendFailed { .. })));
    }

    // ── Message splitting ───────────────────────────────────────────

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // Cyrillic letters are two bytes each.
        let msg = "ж".repeat(3000);
        let chunks = split_message(&msg, 4095);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4094);
        assert_eq!(chunks.concat(), msg);
    }
}
