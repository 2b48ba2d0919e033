// ABOUTME: Process wiring — buses, hub router, one bridge per bound backend, all under one supervisor
// ABOUTME: Backends are passed in so the same wiring runs against test doubles

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use shoal_core::bridge::Bridge;
use shoal_core::bus::{Direction, LocalBus, MessageBus};
use shoal_core::config::Config;
use shoal_core::message::ChannelType;
use shoal_core::notify::OperatorNotifier;
use shoal_core::router::Router;
use shoal_core::store::ContentStore;
use shoal_core::supervisor::{Supervisor, WorkerTask};
use shoal_core::traits::ChatBackend;

use crate::gateway;

/// A fully wired relay, ready to be supervised
pub struct Relay {
    pub im_to_hub: Arc<LocalBus>,
    pub hub_to_im: Arc<LocalBus>,
    pub bridges: Vec<Arc<Bridge>>,
    pub supervisor: Supervisor,
}

/// Wire the relay around already constructed backends.
///
/// Every bound channel gets a bridge; channels missing from `backends` get
/// one with an absent backend.
pub fn wire(
    config: &Config,
    mut backends: Vec<(ChannelType, Arc<dyn ChatBackend>)>,
    notifier: Arc<dyn OperatorNotifier>,
) -> Result<Relay> {
    let im_to_hub = Arc::new(LocalBus::new(Direction::ImToHub));
    let hub_to_im = Arc::new(LocalBus::new(Direction::HubToIm));

    let store = match config.localstore {
        Some(ref cfg) => Some(Arc::new(
            ContentStore::from_config(cfg).context("Failed to open attachment store")?,
        )),
        None => None,
    };

    let mut supervisor = Supervisor::new(notifier)
        .with_notify_timeout(Duration::from_secs(config.supervisor.notify_timeout_secs));

    let router = Router::new(
        im_to_hub.clone() as Arc<dyn MessageBus>,
        hub_to_im.clone() as Arc<dyn MessageBus>,
    );
    supervisor.add(WorkerTask::spawn("router", router.run()));

    let mut bridges = Vec::new();
    for channel in config.bound_channels() {
        let binding = Arc::new(config.binding_for(channel)?);
        let backend = backends
            .iter()
            .position(|(c, _)| *c == channel)
            .map(|i| backends.swap_remove(i).1);

        let mut bridge = Bridge::new(
            backend,
            binding,
            im_to_hub.clone(),
            hub_to_im.clone(),
        );
        if let Some(ref store) = store {
            bridge = bridge.with_store(store.clone());
        }

        let bridge = Arc::new(bridge);
        let tasks = bridge.tasks();
        tracing::info!(
            channel = %channel,
            rooms = bridge.binding().len(),
            tasks = tasks.len(),
            "Bridge wired"
        );
        supervisor.extend(tasks);
        bridges.push(bridge);
    }

    for (channel, _) in backends {
        tracing::warn!(channel = %channel, "Backend has no bound rooms, not started");
    }

    Ok(Relay {
        im_to_hub,
        hub_to_im,
        bridges,
        supervisor,
    })
}

/// Connect every bound backend and wire the relay
pub async fn build(config: &Config) -> Result<Relay> {
    let mut backends = Vec::new();
    for channel in config.bound_channels() {
        if let Some(backend) = gateway::connect(channel, config)
            .await
            .with_context(|| format!("Failed to start {} backend", channel))?
        {
            backends.push((channel, backend));
        }
    }
    wire(config, backends, gateway::operator_notifier(config))
}
