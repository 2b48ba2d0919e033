// ABOUTME: Bidirectional bridge coupling one chat backend to the message bus
// ABOUTME: Inbound normalizes backend events onto the bus; outbound delivers bus messages to rooms

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_stream::StreamExt;

use crate::binding::Binding;
use crate::bus::MessageBus;
use crate::error::DeliveryError;
use crate::message::{ChannelType, Message, MessageKind};
use crate::metrics;
use crate::store::ContentStore;
use crate::supervisor::WorkerTask;
use crate::traits::{ChatBackend, EventPayload, InboundEvent};

pub const VIDEO_PLACEHOLDER: &str = "(Video message received)";
pub const AUDIO_PLACEHOLDER: &str = "(Audio message received)";
pub const STICKER_PLACEHOLDER: &str = "(Sticker received)";
pub const PHOTO_PLACEHOLDER: &str = "(Photo received)";

const INBOUND: &str = "inbound";
const OUTBOUND: &str = "outbound";

/// How an inbound payload becomes message content
#[derive(Debug, Clone, PartialEq)]
pub enum Rendering {
    /// Relay as-is
    Text(MessageKind, String),
    /// Store the bytes and relay the URL; relay `fallback` when there is no store
    Attachment {
        kind: MessageKind,
        bytes: Vec<u8>,
        is_image: bool,
        fallback: String,
    },
}

/// Map a backend payload to its relay rendering.
///
/// Kinds the relay cannot carry become a fixed placeholder line instead of
/// being dropped, so the conversation on the other side still shows that
/// something was said.
pub fn render(payload: EventPayload) -> Rendering {
    match payload {
        EventPayload::Text(text) => Rendering::Text(MessageKind::Text, text),
        EventPayload::Photo(bytes) => Rendering::Attachment {
            kind: MessageKind::Photo,
            bytes,
            is_image: true,
            fallback: PHOTO_PLACEHOLDER.to_string(),
        },
        EventPayload::File { name, data } => Rendering::Attachment {
            kind: MessageKind::File,
            bytes: data,
            is_image: false,
            fallback: format!("(File received: {})", name),
        },
        EventPayload::Video => Rendering::Text(MessageKind::Video, VIDEO_PLACEHOLDER.to_string()),
        EventPayload::Audio => Rendering::Text(MessageKind::Audio, AUDIO_PLACEHOLDER.to_string()),
        EventPayload::Sticker => {
            Rendering::Text(MessageKind::Sticker, STICKER_PLACEHOLDER.to_string())
        }
        EventPayload::Location {
            latitude,
            longitude,
        } => Rendering::Text(
            MessageKind::Location,
            format!("(Location: {:.5}, {:.5})", latitude, longitude),
        ),
        EventPayload::Other(kind) => Rendering::Text(
            MessageKind::Event,
            format!("(Unsupported message type: {})", kind),
        ),
    }
}

/// One backend wired to the bus.
///
/// The binding and both bus handles are fixed at construction; the inbound
/// and outbound directions run as independent tasks over the same bridge.
pub struct Bridge {
    backend: Option<Arc<dyn ChatBackend>>,
    binding: Arc<Binding>,
    inbound: Arc<dyn MessageBus>,
    outbound: Arc<dyn MessageBus>,
    store: Option<Arc<ContentStore>>,
}

impl Bridge {
    /// `backend` is `None` when the adapter could not be built (for example
    /// missing configuration); such a bridge relays nothing.
    pub fn new(
        backend: Option<Arc<dyn ChatBackend>>,
        binding: Arc<Binding>,
        inbound: Arc<dyn MessageBus>,
        outbound: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            backend,
            binding,
            inbound,
            outbound,
            store: None,
        }
    }

    /// Persist photos and files through `store` and relay their URLs
    pub fn with_store(mut self, store: Arc<ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn channel(&self) -> Option<ChannelType> {
        self.backend.as_ref().map(|b| b.channel())
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Supervised tasks for this bridge: inbound, outbound and the backend's
    /// own driving loop. Empty when there is no backend.
    pub fn tasks(self: &Arc<Self>) -> Vec<WorkerTask> {
        let Some(backend) = self.backend.clone() else {
            return Vec::new();
        };
        let channel = backend.channel();

        let inbound = Arc::clone(self);
        let outbound = Arc::clone(self);
        vec![
            WorkerTask::spawn(format!("{}-inbound", channel), async move {
                inbound.run_inbound().await
            }),
            WorkerTask::spawn(format!("{}-outbound", channel), async move {
                outbound.run_outbound().await
            }),
            WorkerTask::spawn(format!("{}-driver", channel), async move {
                backend
                    .run()
                    .await
                    .with_context(|| format!("{} driving loop failed", channel))
            }),
        ]
    }

    // =========================================================================
    // Inbound: backend -> bus
    // =========================================================================

    /// Relay backend events onto the inbound bus until the backend's event
    /// stream ends. Per-event problems never end the loop.
    pub async fn run_inbound(&self) -> Result<()> {
        let Some(backend) = self.backend.as_deref() else {
            tracing::info!("No backend configured, inbound direction idle");
            return Ok(());
        };
        let channel = backend.channel();

        let mut events = backend
            .events()
            .await
            .with_context(|| format!("Failed to subscribe to {} events", channel))?;
        tracing::info!(channel = %channel, rooms = self.binding.len(), "Inbound direction started");

        while let Some(event) = events.next().await {
            let Some(msg) = self.normalize(backend, event).await else {
                continue;
            };
            match self.inbound.publish(msg) {
                Ok(()) => metrics::record_relayed(INBOUND, channel),
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "Failed to publish message");
                    metrics::record_dropped(INBOUND, channel, "publish");
                }
            }
        }

        anyhow::bail!("{} event stream ended", channel)
    }

    /// Turn a backend event into a bus message.
    ///
    /// Returns `None` for events that must not be relayed: our own messages,
    /// rooms outside the binding, and attachments the store refused.
    pub async fn normalize(
        &self,
        backend: &dyn ChatBackend,
        event: InboundEvent,
    ) -> Option<Message> {
        let channel = backend.channel();

        if backend.is_self(&event.author_id) {
            tracing::debug!(channel = %channel, room = %event.room, "Skipping own message");
            metrics::record_dropped(INBOUND, channel, "self");
            return None;
        }

        let Some(logical) = self.binding.logical_room(&event.room) else {
            tracing::info!(channel = %channel, room = %event.room, "Room not bound, not forwarding");
            metrics::record_dropped(INBOUND, channel, "unbound");
            return None;
        };

        let (kind, content) = match render(event.payload) {
            Rendering::Text(kind, text) => (kind, text),
            Rendering::Attachment {
                kind,
                bytes,
                is_image,
                fallback,
            } => match self.store.clone() {
                Some(store) => match store.put_async(bytes, is_image).await {
                    Ok(blob) => {
                        metrics::record_attachment_stored(channel);
                        (kind, blob.url)
                    }
                    Err(e) => {
                        tracing::warn!(
                            channel = %channel,
                            room = %event.room,
                            error = %e,
                            "Failed to store attachment, dropping event"
                        );
                        metrics::record_dropped(INBOUND, channel, "storage");
                        return None;
                    }
                },
                None => (kind, fallback),
            },
        };

        Some(Message::new(
            channel,
            event.author_name,
            logical,
            content,
            kind,
        ))
    }

    // =========================================================================
    // Outbound: bus -> backend
    // =========================================================================

    /// Deliver bus messages to the backend until the bus closes. Delivery
    /// failures are logged per message and never retried.
    pub async fn run_outbound(&self) -> Result<()> {
        let Some(backend) = self.backend.as_deref() else {
            tracing::info!("No backend configured, outbound direction idle");
            return Ok(());
        };
        let channel = backend.channel();

        let mut stream = self.outbound.subscribe();
        tracing::info!(channel = %channel, "Outbound direction started");

        while let Some(msg) = stream.next().await {
            // Our own network already saw it
            if msg.channel() == channel {
                continue;
            }

            let Some(room) = self.binding.backend_room(msg.target()) else {
                tracing::debug!(
                    channel = %channel,
                    target = %msg.target(),
                    "No room bound for target"
                );
                metrics::record_dropped(OUTBOUND, channel, "unbound");
                continue;
            };

            match self.deliver(backend, room, &msg).await {
                Ok(()) => metrics::record_relayed(OUTBOUND, channel),
                Err(DeliveryError::UnsupportedImage) => {
                    tracing::debug!(channel = %channel, room = %room, "Dropping photo in unsupported format");
                    metrics::record_dropped(OUTBOUND, channel, "image_format");
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %channel,
                        room = %room,
                        error = %e,
                        "Failed to deliver message"
                    );
                    metrics::record_delivery_failure(channel);
                }
            }
        }

        anyhow::bail!("{} bus closed", self.outbound.direction().as_str())
    }

    async fn deliver(
        &self,
        backend: &dyn ChatBackend,
        room: &str,
        msg: &Message,
    ) -> Result<(), DeliveryError> {
        let sender = msg.sender_opt();
        if msg.kind() == MessageKind::Photo {
            if let Some(bytes) = self.local_photo(msg.content()).await {
                return backend.send_photo(room, &bytes, sender).await;
            }
        }
        backend.send_message(room, msg.content(), sender).await
    }

    /// Bytes of a photo URL issued by our own store, if we have them
    async fn local_photo(&self, url: &str) -> Option<Vec<u8>> {
        let store = self.store.clone()?;
        store.resolve(url)?;
        match store.read_async(url.to_string()).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Photo not readable locally, sending link");
                None
            }
        }
    }
}
