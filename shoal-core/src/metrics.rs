// ABOUTME: Relay counters recorded through the metrics facade
// ABOUTME: No-ops unless the embedding binary installs a recorder

use crate::message::ChannelType;

pub const MESSAGES_RELAYED: &str = "shoal_messages_relayed_total";
pub const MESSAGES_DROPPED: &str = "shoal_messages_dropped_total";
pub const DELIVERY_FAILURES: &str = "shoal_delivery_failures_total";
pub const ATTACHMENTS_STORED: &str = "shoal_attachments_stored_total";
pub const TASK_DEATHS: &str = "shoal_task_deaths_total";

/// One message made it across a bridge direction
pub fn record_relayed(direction: &'static str, channel: ChannelType) {
    metrics::counter!(MESSAGES_RELAYED, "direction" => direction, "channel" => channel.as_str())
        .increment(1);
}

/// One message was intentionally not relayed
pub fn record_dropped(direction: &'static str, channel: ChannelType, reason: &'static str) {
    metrics::counter!(
        MESSAGES_DROPPED,
        "direction" => direction,
        "channel" => channel.as_str(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_delivery_failure(channel: ChannelType) {
    metrics::counter!(DELIVERY_FAILURES, "channel" => channel.as_str()).increment(1);
}

pub fn record_attachment_stored(channel: ChannelType) {
    metrics::counter!(ATTACHMENTS_STORED, "channel" => channel.as_str()).increment(1);
}

pub fn record_task_death(task: &str) {
    metrics::counter!(TASK_DEATHS, "task" => task.to_string()).increment(1);
}
