// ABOUTME: Concrete chat backend adapters and the factory that builds them from config
// ABOUTME: Channels without an adapter get an absent backend and relay nothing

pub mod console;
#[cfg(feature = "telegram")]
pub mod telegram;

use std::sync::Arc;

use anyhow::Result;

use shoal_core::config::Config;
use shoal_core::message::ChannelType;
use shoal_core::notify::{LogNotifier, OperatorNotifier};
use shoal_core::traits::ChatBackend;

/// Build the backend for one bound channel.
///
/// Returns `Ok(None)` when this build has no adapter for the channel or the
/// adapter is disabled in config; connection failures are errors.
pub async fn connect(channel: ChannelType, config: &Config) -> Result<Option<Arc<dyn ChatBackend>>> {
    match channel {
        ChannelType::Console => {
            if !config.console.enabled {
                tracing::warn!("Rooms are bound to console but [console] is not enabled");
                return Ok(None);
            }
            Ok(Some(Arc::new(console::ConsoleBackend::stdio(&config.console))))
        }
        ChannelType::Telegram => connect_telegram(config).await,
        other => {
            tracing::warn!(
                channel = %other,
                "No adapter for this backend, its rooms are not relayed"
            );
            Ok(None)
        }
    }
}

#[cfg(feature = "telegram")]
async fn connect_telegram(config: &Config) -> Result<Option<Arc<dyn ChatBackend>>> {
    let Some(ref tg) = config.telegram else {
        tracing::warn!("Rooms are bound to telegram but [telegram] is not configured");
        return Ok(None);
    };
    if !tg.relay {
        tracing::info!("Telegram relay disabled, bot is used for operator reports only");
        return Ok(None);
    }
    let backend = telegram::TelegramBackend::connect(tg).await?;
    Ok(Some(Arc::new(backend)))
}

#[cfg(not(feature = "telegram"))]
async fn connect_telegram(_config: &Config) -> Result<Option<Arc<dyn ChatBackend>>> {
    tracing::warn!("Rooms are bound to telegram but shoal was built without the telegram feature");
    Ok(None)
}

/// Where failure reports go: Telegram admins when configured, the log otherwise
pub fn operator_notifier(config: &Config) -> Arc<dyn OperatorNotifier> {
    #[cfg(feature = "telegram")]
    {
        if let Some(ref tg) = config.telegram {
            if !tg.admins.is_empty() {
                return Arc::new(telegram::TelegramNotifier::new(tg));
            }
        }
    }
    #[cfg(not(feature = "telegram"))]
    {
        if !config.operator_recipients().is_empty() {
            tracing::warn!(
                "Operator chat ids configured but shoal was built without the telegram feature"
            );
        }
    }
    Arc::new(LogNotifier)
}
