// ABOUTME: Directional message bus connecting bridges to the hub router
// ABOUTME: Defines the MessageBus trait and LocalBus, an in-process broadcast implementation

use std::pin::Pin;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::BusError;
use crate::message::Message;

/// Default buffer for the in-process bus before slow subscribers start lagging
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Boxed stream of bus messages. Ends only when the bus is closed.
pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Which way messages on a bus travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Backends publish here, the hub router consumes
    ImToHub,
    /// The hub router publishes here, backends consume
    HubToIm,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ImToHub => "im2hub",
            Direction::HubToIm => "hub2im",
        }
    }
}

/// Publish/subscribe primitive carrying messages between bridges.
///
/// Every call to `subscribe` returns an independent stream that sees all
/// messages published after the call.
pub trait MessageBus: Send + Sync {
    fn direction(&self) -> Direction;

    /// Publish a message to all current subscribers
    fn publish(&self, msg: Message) -> Result<(), BusError>;

    /// Start a new subscription
    fn subscribe(&self) -> MessageStream;
}

/// In-process bus backed by a tokio broadcast channel.
pub struct LocalBus {
    direction: Direction,
    sender: RwLock<Option<broadcast::Sender<Message>>>,
}

impl LocalBus {
    pub fn new(direction: Direction) -> Self {
        Self::with_capacity(direction, DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(direction: Direction, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            direction,
            sender: RwLock::new(Some(sender)),
        }
    }

    /// Close the bus. Publishing fails afterwards and every open
    /// subscription ends once it has drained what it already received.
    pub fn close(&self) {
        if let Ok(mut guard) = self.sender.write() {
            guard.take();
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.receiver_count()))
            .unwrap_or(0)
    }
}

impl MessageBus for LocalBus {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn publish(&self, msg: Message) -> Result<(), BusError> {
        let guard = self.sender.read().map_err(|_| BusError::Closed)?;
        let sender = guard.as_ref().ok_or(BusError::Closed)?;
        // No subscribers is not an error: the message is simply not delivered
        if sender.send(msg).is_err() {
            tracing::debug!(bus = self.direction.as_str(), "Published with no subscribers");
        }
        Ok(())
    }

    fn subscribe(&self) -> MessageStream {
        let receiver = match self.sender.read() {
            Ok(guard) => guard.as_ref().map(|s| s.subscribe()),
            Err(_) => None,
        };
        let Some(receiver) = receiver else {
            return Box::pin(tokio_stream::empty());
        };

        let direction = self.direction;
        let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
            Ok(msg) => Some(msg),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                tracing::warn!(bus = direction.as_str(), skipped = n, "Bus subscriber lagged");
                None
            }
        });
        Box::pin(stream)
    }
}
