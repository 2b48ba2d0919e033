// ABOUTME: Capability interface every chat backend adapter implements for a bridge
// ABOUTME: Defines ChatBackend plus the backend-native InboundEvent it yields

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::DeliveryError;
use crate::message::ChannelType;

// =============================================================================
// Inbound Events
// =============================================================================

/// Payload of a backend-native event, before normalization into a Message
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Text(String),
    /// Raw image bytes
    Photo(Vec<u8>),
    File {
        name: String,
        data: Vec<u8>,
    },
    Video,
    Audio,
    Sticker,
    Location {
        latitude: f64,
        longitude: f64,
    },
    /// Anything else the adapter recognized but cannot relay; carries the
    /// backend's own name for it
    Other(String),
}

/// An event delivered by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Backend-specific room id the event was posted in
    pub room: String,
    /// Backend-specific id of the author
    pub author_id: String,
    /// Display name of the author
    pub author_name: String,
    pub payload: EventPayload,
}

impl InboundEvent {
    pub fn text(
        room: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            author_id: author_id.into(),
            author_name: author_name.into(),
            payload: EventPayload::Text(text.into()),
        }
    }
}

/// Boxed stream of backend events
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

// =============================================================================
// Backend Capability
// =============================================================================

/// What a bridge needs from a chat backend.
///
/// Sends fail per message with a `DeliveryError`; those never take the bridge
/// down. `events` and `run` fail with `anyhow::Error` since losing either
/// means the backend is gone.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Which network this backend talks to
    fn channel(&self) -> ChannelType;

    /// The backend's own identity; events authored by it are never relayed
    fn self_id(&self) -> &str;

    /// Check if an author id is the backend itself
    fn is_self(&self, author_id: &str) -> bool {
        author_id == self.self_id()
    }

    /// Send text to a backend room
    async fn send_message(
        &self,
        target: &str,
        content: &str,
        sender: Option<&str>,
    ) -> Result<(), DeliveryError>;

    /// Send an image to a backend room
    async fn send_photo(
        &self,
        target: &str,
        photo: &[u8],
        sender: Option<&str>,
    ) -> Result<(), DeliveryError>;

    /// Subscribe to inbound events
    async fn events(&self) -> Result<EventStream>;

    /// The backend's own driving loop (long polling, socket reads, ...).
    ///
    /// Backends whose event delivery is self-driven can keep the default,
    /// which never returns.
    async fn run(&self) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Prefix a message with its author the way most backends show relayed text
pub fn format_with_sender(content: &str, sender: Option<&str>) -> String {
    match sender {
        Some(name) if !name.is_empty() => format!("[{}] {}", name, content),
        _ => content.to_string(),
    }
}
