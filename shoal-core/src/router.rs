// ABOUTME: Hub router moving messages from the backend-facing bus to the delivery bus
// ABOUTME: Runs as a supervised task; its ending means the relay is broken

use std::sync::Arc;

use anyhow::Result;
use tokio_stream::StreamExt;

use crate::bus::{Direction, MessageBus};

/// Forwards everything bridges publish (im→hub) to every bridge's outbound
/// side (hub→im). Each bridge filters out its own network's messages.
pub struct Router {
    im_to_hub: Arc<dyn MessageBus>,
    hub_to_im: Arc<dyn MessageBus>,
}

impl Router {
    pub fn new(im_to_hub: Arc<dyn MessageBus>, hub_to_im: Arc<dyn MessageBus>) -> Self {
        if im_to_hub.direction() != Direction::ImToHub || hub_to_im.direction() != Direction::HubToIm {
            tracing::warn!(
                source = im_to_hub.direction().as_str(),
                sink = hub_to_im.direction().as_str(),
                "Router wired with unexpected bus directions"
            );
        }
        Self {
            im_to_hub,
            hub_to_im,
        }
    }

    /// Forward until the source bus closes
    pub async fn run(self) -> Result<()> {
        let mut stream = self.im_to_hub.subscribe();
        tracing::info!("Hub router started");

        while let Some(msg) = stream.next().await {
            tracing::debug!(
                channel = %msg.channel(),
                target = %msg.target(),
                "Routing message"
            );
            if let Err(e) = self.hub_to_im.publish(msg) {
                tracing::warn!(error = %e, "Failed to forward message to delivery bus");
            }
        }

        anyhow::bail!("{} bus closed", self.im_to_hub.direction().as_str())
    }
}
