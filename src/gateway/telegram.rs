// ABOUTME: Telegram backend and operator notifier built on teloxide long polling
// ABOUTME: Converts Telegram updates to InboundEvents and delivers relayed messages to chats

use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MediaKind, MessageKind, ParseMode, UpdateKind};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use shoal_core::config::TelegramConfig;
use shoal_core::error::DeliveryError;
use shoal_core::message::ChannelType;
use shoal_core::notify::OperatorNotifier;
use shoal_core::store::detect_image_extension;
use shoal_core::traits::{format_with_sender, ChatBackend, EventPayload, EventStream, InboundEvent};

/// Long polling timeout in seconds
const POLL_TIMEOUT: u32 = 30;
/// Back-off after a failed poll
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

// =============================================================================
// TelegramBackend
// =============================================================================

/// Telegram bot acting as one relay backend.
///
/// `run` drives long polling and pushes converted updates into the channel
/// handed out by `events`.
pub struct TelegramBackend {
    bot: Bot,
    /// Bot's numeric user ID as a string
    bot_user_id: String,
    events_tx: mpsc::Sender<InboundEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
}

impl TelegramBackend {
    /// Authenticate with the Bot API and resolve the bot's own user id
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        let bot = Bot::new(&config.bot_token);

        let me = bot.get_me().await.context("Failed to call Telegram getMe")?;
        let bot_user_id = me.id.0.to_string();

        tracing::info!(
            bot_username = %me.username(),
            bot_id = %bot_user_id,
            "Telegram bot authenticated"
        );

        let (events_tx, events_rx) = mpsc::channel(256);
        Ok(Self {
            bot,
            bot_user_id,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Turn one Telegram message into an event, downloading media as needed
    async fn convert(&self, message: &teloxide::types::Message) -> Option<InboundEvent> {
        let from = message.from.as_ref()?;
        let MessageKind::Common(common) = &message.kind else {
            return None;
        };

        let payload = match &common.media_kind {
            MediaKind::Text(text) => EventPayload::Text(text.text.clone()),
            MediaKind::Photo(photo) => {
                // Largest size comes last
                let size = photo.photo.last()?;
                match self.download(&size.file.id).await {
                    Ok(data) => EventPayload::Photo(data),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to download Telegram photo");
                        return None;
                    }
                }
            }
            MediaKind::Document(doc) => match self.download(&doc.document.file.id).await {
                Ok(data) => EventPayload::File {
                    name: doc
                        .document
                        .file_name
                        .clone()
                        .unwrap_or_else(|| "document".to_string()),
                    data,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to download Telegram document");
                    return None;
                }
            },
            MediaKind::Video(_) | MediaKind::VideoNote(_) | MediaKind::Animation(_) => {
                EventPayload::Video
            }
            MediaKind::Audio(_) | MediaKind::Voice(_) => EventPayload::Audio,
            MediaKind::Sticker(_) => EventPayload::Sticker,
            MediaKind::Location(loc) => EventPayload::Location {
                latitude: loc.location.latitude,
                longitude: loc.location.longitude,
            },
            _ => EventPayload::Other("telegram media".to_string()),
        };

        let author_name = match from.last_name {
            Some(ref last) => format!("{} {}", from.first_name, last),
            None => from.first_name.clone(),
        };

        Some(InboundEvent {
            room: message.chat.id.0.to_string(),
            author_id: from.id.0.to_string(),
            author_name,
            payload,
        })
    }

    async fn download(&self, file_id: &teloxide::types::FileId) -> Result<Vec<u8>> {
        let file = self
            .bot
            .get_file(file_id.clone())
            .await
            .context("Failed to get file info from Telegram")?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .context("Failed to download file from Telegram")?;
        Ok(data)
    }
}

fn parse_chat_id(target: &str) -> Result<ChatId, DeliveryError> {
    target
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| DeliveryError::UnknownRoom(target.to_string()))
}

#[async_trait]
impl ChatBackend for TelegramBackend {
    fn channel(&self) -> ChannelType {
        ChannelType::Telegram
    }

    fn self_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn send_message(
        &self,
        target: &str,
        content: &str,
        sender: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let chat_id = parse_chat_id(target)?;
        self.bot
            .send_message(chat_id, format_with_sender(content, sender))
            .await
            .map_err(DeliveryError::transport)?;
        Ok(())
    }

    async fn send_photo(
        &self,
        target: &str,
        photo: &[u8],
        sender: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let chat_id = parse_chat_id(target)?;
        let ext = detect_image_extension(photo).ok_or(DeliveryError::UnsupportedImage)?;

        let input_file = InputFile::memory(photo.to_vec()).file_name(format!("photo.{}", ext));
        let mut req = self.bot.send_photo(chat_id, input_file);
        if let Some(name) = sender.filter(|s| !s.is_empty()) {
            req = req.caption(format!("[{}]", name));
        }
        req.await.map_err(DeliveryError::transport)?;
        Ok(())
    }

    async fn events(&self) -> Result<EventStream> {
        let rx = self
            .events_rx
            .lock()
            .map_err(|_| anyhow::anyhow!("Telegram event lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow::anyhow!("Telegram event stream already taken"))?;
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn run(&self) -> Result<()> {
        let mut offset: i32 = 0;
        tracing::info!(platform = "telegram", "Long polling started");

        loop {
            let updates = match self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT)
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(
                        platform = "telegram",
                        error = %e,
                        "Long polling error, retrying in 5s"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in &updates {
                offset = update.id.as_offset();

                let UpdateKind::Message(message) = &update.kind else {
                    continue;
                };
                let Some(event) = self.convert(message).await else {
                    continue;
                };
                if self.events_tx.send(event).await.is_err() {
                    anyhow::bail!("Telegram event receiver dropped");
                }
            }
        }
    }
}

// =============================================================================
// TelegramNotifier
// =============================================================================

/// Sends operator reports to admin chats as preformatted HTML
pub struct TelegramNotifier {
    bot: Bot,
    admins: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
            admins: config.admins.clone(),
        }
    }
}

/// Telegram rejects messages longer than this, counted in UTF-16 units
const MAX_MESSAGE_LEN: usize = 4096;

fn escape_html_char(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    }
}

/// Wrap a report in a `<code>` block, cut to fit a single message.
///
/// Truncation happens between escaped characters so an entity is never split.
pub fn format_report_html(text: &str) -> String {
    const OPEN: &str = "<code>";
    const CLOSE: &str = "</code>";
    const CUT: &str = "\n...";

    let budget = MAX_MESSAGE_LEN - OPEN.len() - CLOSE.len() - CUT.len();
    let mut body = String::with_capacity(text.len().min(MAX_MESSAGE_LEN));
    let mut used = 0;
    let mut truncated = false;

    for c in text.chars() {
        let cost = escape_html_char(c).map_or(c.len_utf16(), str::len);
        if used + cost > budget {
            truncated = true;
            break;
        }
        match escape_html_char(c) {
            Some(entity) => body.push_str(entity),
            None => body.push(c),
        }
        used += cost;
    }
    if truncated {
        body.push_str(CUT);
    }
    format!("{}{}{}", OPEN, body, CLOSE)
}

#[async_trait]
impl OperatorNotifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        let html = format_report_html(text);
        for admin in &self.admins {
            // Keep going: every admin gets a try
            if let Err(e) = self
                .bot
                .send_message(ChatId(*admin), html.clone())
                .parse_mode(ParseMode::Html)
                .await
            {
                tracing::warn!(chat_id = admin, error = %e, "Failed to notify operator");
            }
        }
        Ok(())
    }
}
