// ABOUTME: Relayed chat message model shared by every backend and the bus
// ABOUTME: Defines Message, ChannelType (origin network) and MessageKind (content tag)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which messaging network a message came from or is headed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Wechat,
    Telegram,
    Irc,
    Matrix,
    Console,
}

impl ChannelType {
    /// Lowercase tag, also used as the backend key inside `[bindings.*]` tables
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Wechat => "wechat",
            ChannelType::Telegram => "telegram",
            ChannelType::Irc => "irc",
            ChannelType::Matrix => "matrix",
            ChannelType::Console => "console",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wechat" => Ok(ChannelType::Wechat),
            "telegram" => Ok(ChannelType::Telegram),
            "irc" => Ok(ChannelType::Irc),
            "matrix" => Ok(ChannelType::Matrix),
            "console" => Ok(ChannelType::Console),
            other => anyhow::bail!("Unknown channel type: {}", other),
        }
    }
}

/// Content tag of a relayed message.
///
/// Everything except `Text` and `Event` has already been reduced to either a
/// retrieval URL (photos, files) or a placeholder line by the time it is a
/// `Message`; the tag only tells the outbound side how to deliver it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Photo,
    File,
    Video,
    Audio,
    Sticker,
    Location,
    /// System-originated notice (joins, relay status, ...)
    Event,
}

/// A chat event in flight between backends.
///
/// Fields are private: once built, a message is never modified, only cloned
/// and handed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    channel: ChannelType,
    sender: String,
    target: String,
    content: String,
    kind: MessageKind,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message authored by `sender`, stamped with the current time.
    pub fn new(
        channel: ChannelType,
        sender: impl Into<String>,
        target: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            channel,
            sender: sender.into(),
            target: target.into(),
            content: content.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Build a system-originated notice (empty sender, `Event` kind).
    pub fn system(channel: ChannelType, target: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(channel, String::new(), target, content, MessageKind::Event)
    }

    pub fn channel(&self) -> ChannelType {
        self.channel
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Sender as an option; system messages have none
    pub fn sender_opt(&self) -> Option<&str> {
        if self.sender.is_empty() {
            None
        } else {
            Some(&self.sender)
        }
    }

    /// Logical room this message belongs to
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_system(&self) -> bool {
        self.sender.is_empty()
    }
}
