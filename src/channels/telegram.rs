//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text and photo messages become `InboundEvent`s; replies are rendered with
//! a reply keyboard when the dialogue asks for one.

use async_trait::async_trait;
use serde_json::Value;

use crate::channels::{
    Channel, ImagePayload, InboundEvent, InboundInput, KeyboardHint, MessageStream, OutboundReply,
    PhotoRef, StatusUpdate,
};
use crate::config::TelegramConfig;
use crate::error::ChannelError;
use crate::session::UserId;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const API_BASE: &str = "https://api.telegram.org";

/// Connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            allowed_users: config.allowed_users.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Send a text message, splitting past Telegram's 4096 char limit. The
    /// keyboard goes with the last chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&KeyboardHint>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let markup = keyboard.map(reply_markup);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { markup.as_ref() } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single chunk, Markdown first with plain-text fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = markup {
            body["reply_markup"] = markup.clone();
        }

        let markdown_resp = self.post("sendMessage", &body).await?;
        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        if let Some(map) = body.as_object_mut() {
            map.remove("parse_mode");
        }
        let plain_resp = self.post("sendMessage", &body).await?;
        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
                ),
            });
        }
        Ok(())
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, ChannelError> {
        self.client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client
                    .post(api_url(&bot_token, "getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = update.get("message").and_then(parse_message) else {
                        continue;
                    };

                    let user = parsed.user_id.to_string();
                    if !check_user_allowed(&allowed_users, [parsed.username.as_str(), user.as_str()])
                    {
                        tracing::warn!(
                            username = %parsed.username,
                            user_id = %user,
                            "Telegram: ignoring message from unauthorized user"
                        );
                        continue;
                    }

                    let metadata = serde_json::json!({
                        "chat_id": parsed.chat_id,
                        "username": parsed.username,
                    });

                    let input = inbound_input(parsed.kind);
                    let event = InboundEvent::new(parsed.user_id, input).with_metadata(metadata);
                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(&self, event: &InboundEvent, reply: OutboundReply) -> Result<(), ChannelError> {
        let chat_id = chat_id(event).ok_or_else(|| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: "No chat_id in message metadata".into(),
        })?;

        self.send_message(chat_id, &reply.text, reply.keyboard.as_ref())
            .await
    }

    async fn send_status(
        &self,
        event: &InboundEvent,
        status: StatusUpdate,
    ) -> Result<(), ChannelError> {
        let Some(chat_id) = chat_id(event) else {
            return Ok(());
        };
        match status {
            StatusUpdate::Typing => {
                let body = serde_json::json!({
                    "chat_id": chat_id,
                    "action": "typing"
                });
                let _ = self.post("sendChatAction", &body).await;
                Ok(())
            }
            StatusUpdate::Notice(text) if !text.is_empty() => {
                self.send_message(chat_id, &text, None).await
            }
            StatusUpdate::Notice(_) => Ok(()),
        }
    }

    async fn fetch_photo(&self, photo: &PhotoRef) -> Result<ImagePayload, ChannelError> {
        let (bytes, url) = download_photo(&self.client, &self.bot_token, &photo.file_id)
            .await
            .map_err(|e| ChannelError::DownloadFailed {
                name: "telegram".into(),
                reason: format!("{e:#}"),
            })?;
        let image = ImagePayload::new(bytes).with_remote_url(url);
        Ok(match &photo.caption {
            Some(caption) => image.with_caption(caption.as_str()),
            None => image,
        })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
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

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &str, method: &str) -> String {
    format!("{API_BASE}/bot{bot_token}/{method}")
}

fn file_url(bot_token: &str, file_path: &str) -> String {
    format!("{API_BASE}/file/bot{bot_token}/{file_path}")
}

fn chat_id(event: &InboundEvent) -> Option<&str> {
    event.metadata.get("chat_id").and_then(Value::as_str)
}

#[derive(Debug, PartialEq)]
enum UpdateKind {
    Start,
    Text(String),
    Photo {
        file_id: String,
        caption: Option<String>,
    },
}

#[derive(Debug, PartialEq)]
struct ParsedMessage {
    user_id: UserId,
    chat_id: String,
    username: String,
    kind: UpdateKind,
}

/// Pull what the bot needs out of a `message` object. Messages without a
/// sender, or that are neither text nor photo, are skipped.
fn parse_message(message: &Value) -> Option<ParsedMessage> {
    let from = message.get("from")?;
    let user_id = UserId::from(from.get("id").and_then(Value::as_i64)?);
    let username = from
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())?;

    let kind = if let Some(text) = message.get("text").and_then(Value::as_str) {
        if is_start_command(text) {
            UpdateKind::Start
        } else {
            UpdateKind::Text(text.to_string())
        }
    } else {
        // Sizes are ordered smallest first.
        let file_id = message
            .get("photo")
            .and_then(Value::as_array)
            .and_then(|sizes| sizes.last())
            .and_then(|size| size.get("file_id"))
            .and_then(Value::as_str)?;
        UpdateKind::Photo {
            file_id: file_id.to_string(),
            caption: message
                .get("caption")
                .and_then(Value::as_str)
                .map(String::from),
        }
    };

    Some(ParsedMessage {
        user_id,
        chat_id,
        username,
        kind,
    })
}

/// Photos are announced only; the dialogue fetches them in turn order.
fn inbound_input(kind: UpdateKind) -> InboundInput {
    match kind {
        UpdateKind::Start => InboundInput::Start,
        UpdateKind::Text(text) => InboundInput::Text(text),
        UpdateKind::Photo { file_id, caption } => {
            InboundInput::PendingPhoto(PhotoRef { file_id, caption })
        }
    }
}

/// `/start`, optionally addressed to the bot (`/start@pet_bot`) or with a
/// deep-link payload.
fn is_start_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    command == "/start" || command.starts_with("/start@")
}

/// Resolve a file id and fetch its bytes. Returns the bytes and the URL they
/// came from.
async fn download_photo(
    client: &reqwest::Client,
    bot_token: &str,
    file_id: &str,
) -> anyhow::Result<(Vec<u8>, String)> {
    let data: Value = client
        .post(api_url(bot_token, "getFile"))
        .json(&serde_json::json!({ "file_id": file_id }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let path = data
        .pointer("/result/file_path")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("getFile returned no file_path"))?;

    let url = file_url(bot_token, path);
    let bytes = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok((bytes.to_vec(), url))
}

/// Telegram `reply_markup` for a keyboard hint.
fn reply_markup(hint: &KeyboardHint) -> Value {
    match hint {
        KeyboardHint::Choices(rows) => {
            let keyboard: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| serde_json::json!({ "text": label }))
                        .collect()
                })
                .collect();
            serde_json::json!({
                "keyboard": keyboard,
                "resize_keyboard": true,
                "one_time_keyboard": true,
            })
        }
        KeyboardHint::Remove => serde_json::json!({ "remove_keyboard": true }),
    }
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's length limit.
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

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&at| at > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(&TelegramConfig {
            bot_token: "123:ABC".into(),
            allowed_users: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }

    // ── Basic channel tests ─────────────────────────────────────────

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(&["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_and_file_urls() {
        let ch = channel(&["*"]);
        assert_eq!(
            ch.api_url("getUpdates"),
            "https://api.telegram.org/bot123:ABC/getUpdates"
        );
        assert_eq!(
            file_url("123:ABC", "photos/file_7.jpg"),
            "https://api.telegram.org/file/bot123:ABC/photos/file_7.jpg"
        );
    }

    fn allowed(users: &[&str], identities: &[&str]) -> bool {
        let users: Vec<String> = users.iter().map(|s| s.to_string()).collect();
        check_user_allowed(&users, identities.iter().copied())
    }

    #[test]
    fn telegram_user_allowed_wildcard() {
        assert!(allowed(&["*"], &["anyone"]));
    }

    #[test]
    fn telegram_user_allowed_by_name_or_id() {
        assert!(allowed(&["alice", "42"], &["alice", "1"]));
        assert!(allowed(&["alice", "42"], &["unknown", "42"]));
        assert!(!allowed(&["alice", "42"], &["bob", "7"]));
        assert!(!allowed(&["alice", "42"], &["Alice"]));
    }

    #[test]
    fn telegram_user_denied_empty_list() {
        assert!(!allowed(&[], &["alice"]));
    }

    // ── Update parsing ──────────────────────────────────────────────

    fn message(extra: Value) -> Value {
        let mut base = json!({
            "message_id": 1,
            "from": {"id": 42, "username": "alice", "first_name": "Alice"},
            "chat": {"id": 99887766, "type": "private"},
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        base
    }

    #[test]
    fn parses_text_message() {
        let parsed = parse_message(&message(json!({"text": "How much to feed?"}))).unwrap();
        assert_eq!(parsed.user_id, UserId::from(42));
        assert_eq!(parsed.chat_id, "99887766");
        assert_eq!(parsed.username, "alice");
        assert_eq!(parsed.kind, UpdateKind::Text("How much to feed?".into()));
    }

    #[test]
    fn parses_start_command_variants() {
        for text in ["/start", "/start@pet_bot", "/start promo"] {
            let parsed = parse_message(&message(json!({ "text": text }))).unwrap();
            assert_eq!(parsed.kind, UpdateKind::Start, "{text}");
        }
        let parsed = parse_message(&message(json!({"text": "/starting"}))).unwrap();
        assert_eq!(parsed.kind, UpdateKind::Text("/starting".into()));
    }

    #[test]
    fn photo_takes_largest_size_and_caption() {
        let parsed = parse_message(&message(json!({
            "photo": [
                {"file_id": "small", "width": 90, "height": 90},
                {"file_id": "large", "width": 1280, "height": 1280},
            ],
            "caption": "Is this normal?",
        })))
        .unwrap();
        assert_eq!(
            parsed.kind,
            UpdateKind::Photo {
                file_id: "large".into(),
                caption: Some("Is this normal?".into()),
            }
        );
    }

    #[test]
    fn photo_is_announced_not_downloaded() {
        let kind = UpdateKind::Photo {
            file_id: "large".into(),
            caption: None,
        };
        assert_eq!(
            inbound_input(kind),
            InboundInput::PendingPhoto(PhotoRef {
                file_id: "large".into(),
                caption: None,
            })
        );
        assert_eq!(inbound_input(UpdateKind::Start), InboundInput::Start);
    }

    #[test]
    fn skips_messages_without_sender_or_content() {
        assert!(parse_message(&json!({"chat": {"id": 1}, "text": "hi"})).is_none());
        assert!(parse_message(&message(json!({"sticker": {"file_id": "s"}}))).is_none());
    }

    // ── Keyboards ───────────────────────────────────────────────────

    #[test]
    fn choices_render_as_reply_keyboard() {
        let hint = KeyboardHint::choices([["Dog", "Cat"], ["Bird", "Rodent"]]);
        let markup = reply_markup(&hint);
        assert_eq!(markup["keyboard"][0][1]["text"], "Cat");
        assert_eq!(markup["keyboard"][1][0]["text"], "Bird");
        assert_eq!(markup["one_time_keyboard"], true);
        assert_eq!(markup["resize_keyboard"], true);
    }

    #[test]
    fn remove_renders_keyboard_removal() {
        assert_eq!(
            reply_markup(&KeyboardHint::Remove),
            json!({"remove_keyboard": true})
        );
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
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
        // 'é' is two bytes; 4096 falls inside one of them.
        let msg = format!("a{}", "é".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.concat(), msg);
        assert!(chunks.iter().all(|c| c.len() <= 4096));
    }

    // ── Respond extracts chat_id from metadata ──────────────────────

    #[test]
    fn event_metadata_carries_chat_id() {
        let event = InboundEvent::new(UserId::from(1), InboundInput::Text("hello".into()))
            .with_metadata(json!({"chat_id": "99887766"}));
        assert_eq!(chat_id(&event), Some("99887766"));

        let bare = InboundEvent::new(UserId::from(1), InboundInput::Start);
        assert_eq!(chat_id(&bare), None);
    }
}
