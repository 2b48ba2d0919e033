// ABOUTME: In-memory test doubles for backends and operator notification
// ABOUTME: MockBackend records sends and replays injected events; RecordingNotifier keeps reports

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::DeliveryError;
use crate::message::ChannelType;
use crate::notify::OperatorNotifier;
use crate::traits::{ChatBackend, EventStream, InboundEvent};

/// Something a MockBackend was asked to deliver
#[derive(Debug, Clone, PartialEq)]
pub enum SentItem {
    Message {
        target: String,
        content: String,
        sender: Option<String>,
    },
    Photo {
        target: String,
        bytes: Vec<u8>,
        sender: Option<String>,
    },
}

impl SentItem {
    pub fn target(&self) -> &str {
        match self {
            SentItem::Message { target, .. } | SentItem::Photo { target, .. } => target,
        }
    }
}

/// Scriptable backend: inject events with `inject`, inspect deliveries with
/// `sent` / `wait_for_sent`.
pub struct MockBackend {
    channel: ChannelType,
    self_id: String,
    events_tx: Mutex<Option<mpsc::UnboundedSender<InboundEvent>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
    sent: Mutex<Vec<SentItem>>,
    failures_left: AtomicUsize,
    reject_photos: AtomicBool,
}

impl MockBackend {
    pub fn new(channel: ChannelType, self_id: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            channel,
            self_id: self_id.into(),
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
            sent: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(0),
            reject_photos: AtomicBool::new(false),
        }
    }

    /// Deliver an event as if it came from the network
    pub fn inject(&self, event: InboundEvent) {
        if let Ok(guard) = self.events_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(event);
            }
        }
    }

    /// End the event stream after already injected events drain
    pub fn close_events(&self) {
        if let Ok(mut guard) = self.events_tx.lock() {
            guard.take();
        }
    }

    /// Make the next `n` sends fail with a rejection
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Make every `send_photo` fail as an unrecognized image
    pub fn reject_photos(&self) {
        self.reject_photos.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentItem> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Wait until at least `n` items were sent or `timeout` passes
    pub async fn wait_for_sent(&self, n: usize, timeout: Duration) -> Vec<SentItem> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent();
            if sent.len() >= n || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn record(&self, item: SentItem) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(item);
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn channel(&self) -> ChannelType {
        self.channel
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
        if self.take_failure() {
            return Err(DeliveryError::Rejected("scripted failure".to_string()));
        }
        self.record(SentItem::Message {
            target: target.to_string(),
            content: content.to_string(),
            sender: sender.map(String::from),
        });
        Ok(())
    }

    async fn send_photo(
        &self,
        target: &str,
        photo: &[u8],
        sender: Option<&str>,
    ) -> Result<(), DeliveryError> {
        if self.reject_photos.load(Ordering::SeqCst) {
            return Err(DeliveryError::UnsupportedImage);
        }
        if self.take_failure() {
            return Err(DeliveryError::Rejected("scripted failure".to_string()));
        }
        self.record(SentItem::Photo {
            target: target.to_string(),
            bytes: photo.to_vec(),
            sender: sender.map(String::from),
        });
        Ok(())
    }

    async fn events(&self) -> Result<EventStream> {
        let rx = self
            .events_rx
            .lock()
            .map_err(|_| anyhow::anyhow!("mock event lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow::anyhow!("mock event stream already taken"))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// Notifier that keeps every report it is handed
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OperatorNotifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(text.to_string());
        }
        Ok(())
    }
}
