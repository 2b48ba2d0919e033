// ABOUTME: Line-based console backend — stdin lines become events, relayed messages print to stdout
// ABOUTME: Lets a relay be exercised locally without any chat network credentials

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use shoal_core::config::ConsoleConfig;
use shoal_core::error::DeliveryError;
use shoal_core::message::ChannelType;
use shoal_core::store::detect_image_extension;
use shoal_core::traits::{format_with_sender, ChatBackend, EventPayload, EventStream, InboundEvent};

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// Author id given to lines typed at the console
pub const CONSOLE_USER: &str = "console-user";

/// One line typed at the console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Text(String),
    /// `/photo <path>`
    Photo(PathBuf),
    /// `/file <path>`
    File(PathBuf),
}

/// Parse a console line. Blank lines yield nothing.
pub fn parse_line(line: &str) -> Option<ConsoleLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    if let Some(path) = line.strip_prefix("/photo ") {
        return Some(ConsoleLine::Photo(PathBuf::from(path.trim())));
    }
    if let Some(path) = line.strip_prefix("/file ") {
        return Some(ConsoleLine::File(PathBuf::from(path.trim())));
    }
    Some(ConsoleLine::Text(line.to_string()))
}

/// Console backend with a single room
pub struct ConsoleBackend {
    room: String,
    self_id: String,
    input: Mutex<Option<Input>>,
    output: Mutex<Output>,
}

impl ConsoleBackend {
    pub fn new(config: &ConsoleConfig, input: Input, output: Output) -> Self {
        Self {
            room: config.room.clone(),
            self_id: config.self_id.clone(),
            input: Mutex::new(Some(input)),
            output: Mutex::new(output),
        }
    }

    /// Console wired to the process's stdin and stdout
    pub fn stdio(config: &ConsoleConfig) -> Self {
        Self::new(
            config,
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(tokio::io::stdout()),
        )
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    async fn write_line(&self, line: &str) -> Result<(), DeliveryError> {
        let mut out = self.output.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(DeliveryError::transport)?;
        out.write_all(b"\n").await.map_err(DeliveryError::transport)?;
        out.flush().await.map_err(DeliveryError::transport)
    }

    fn check_room(&self, target: &str) -> Result<(), DeliveryError> {
        if target != self.room {
            return Err(DeliveryError::UnknownRoom(target.to_string()));
        }
        Ok(())
    }
}

/// Read an attachment named on the console; unreadable paths become a
/// relayable notice instead of ending the stream
async fn load_attachment(path: PathBuf, as_photo: bool) -> EventPayload {
    match tokio::fs::read(&path).await {
        Ok(data) if as_photo => EventPayload::Photo(data),
        Ok(data) => EventPayload::File {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "attachment".to_string()),
            data,
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read attachment");
            EventPayload::Other(format!("unreadable attachment {}", path.display()))
        }
    }
}

#[async_trait]
impl ChatBackend for ConsoleBackend {
    fn channel(&self) -> ChannelType {
        ChannelType::Console
    }

    fn self_id(&self) -> &str {
        &self.self_id
    }

    async fn send_message(
        &self,
        target: &str,
        content: &str,
        sender: Option<&str>,
    ) -> Result<(), DeliveryError> {
        self.check_room(target)?;
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.write_line(&format!("{} {}", stamp, format_with_sender(content, sender)))
            .await
    }

    async fn send_photo(
        &self,
        target: &str,
        photo: &[u8],
        sender: Option<&str>,
    ) -> Result<(), DeliveryError> {
        self.check_room(target)?;
        let ext = detect_image_extension(photo).ok_or(DeliveryError::UnsupportedImage)?;
        let stamp = chrono::Local::now().format("%H:%M:%S");
        let notice = format!("(photo: {} bytes, {})", photo.len(), ext);
        self.write_line(&format!("{} {}", stamp, format_with_sender(&notice, sender)))
            .await
    }

    async fn events(&self) -> Result<EventStream> {
        let input = self
            .input
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow::anyhow!("console input already taken"))?;
        let room = self.room.clone();

        let stream = futures_util::stream::unfold(input.lines(), move |mut lines| {
            let room = room.clone();
            async move {
                loop {
                    let line = match lines.next_line().await {
                        Ok(Some(line)) => line,
                        Ok(None) => return None,
                        Err(e) => {
                            tracing::warn!(error = %e, "Console input failed");
                            return None;
                        }
                    };
                    let payload = match parse_line(&line) {
                        None => continue,
                        Some(ConsoleLine::Text(text)) => EventPayload::Text(text),
                        Some(ConsoleLine::Photo(path)) => load_attachment(path, true).await,
                        Some(ConsoleLine::File(path)) => load_attachment(path, false).await,
                    };
                    let event = InboundEvent {
                        room,
                        author_id: CONSOLE_USER.to_string(),
                        author_name: "console".to_string(),
                        payload,
                    };
                    return Some((event, lines));
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
