//! Metric name and label definitions.

/// Relay engine metrics
pub mod relay {
    /// Inbound events handled, labelled by `outcome`
    pub const EVENTS_TOTAL: &str = "tgdc_relay_events_total";
    /// Time to handle one inbound event in seconds
    pub const HANDLE_DURATION_SECONDS: &str = "tgdc_relay_handle_duration_seconds";
    /// Successful deliveries to subscriber chats
    pub const BROADCAST_DELIVERIES_TOTAL: &str = "tgdc_relay_broadcast_deliveries_total";
    /// Failed deliveries to subscriber chats
    pub const BROADCAST_FAILURES_TOTAL: &str = "tgdc_relay_broadcast_failures_total";
}

/// Correlation store metrics
pub mod store {
    /// Correlation keys currently held
    pub const CORRELATIONS: &str = "tgdc_store_correlations";
    /// Keys evicted by pruning
    pub const PRUNED_TOTAL: &str = "tgdc_store_pruned_total";
    /// Failed snapshot writes
    pub const PERSIST_ERRORS_TOTAL: &str = "tgdc_store_persist_errors_total";
}

/// Media transfer metrics
pub mod media {
    /// Attachments downloaded for relaying
    pub const TRANSFERS_TOTAL: &str = "tgdc_media_transfers_total";
    /// Bytes downloaded for relaying
    pub const TRANSFER_BYTES_TOTAL: &str = "tgdc_media_transfer_bytes_total";
    /// Attachments above the destination's upload cap
    pub const OVERSIZE_TOTAL: &str = "tgdc_media_oversize_total";
    /// Failed downloads
    pub const TRANSFER_FAILURES_TOTAL: &str = "tgdc_media_transfer_failures_total";
}

/// Telegram adapter metrics
pub mod telegram {
    /// Updates received from the Bot API
    pub const UPDATES_RECEIVED_TOTAL: &str = "tgdc_telegram_updates_received_total";
    /// Messages sent to Telegram
    pub const MESSAGES_SENT_TOTAL: &str = "tgdc_telegram_messages_sent_total";
    /// Send errors
    pub const MESSAGE_SEND_ERRORS_TOTAL: &str = "tgdc_telegram_message_send_errors_total";
    /// Flood-control waits honoured
    pub const RETRY_AFTER_TOTAL: &str = "tgdc_telegram_retry_after_total";
    /// Polling errors
    pub const POLLING_ERRORS_TOTAL: &str = "tgdc_telegram_polling_errors_total";
}

/// Discord adapter metrics
pub mod discord {
    /// Gateway events received
    pub const EVENTS_RECEIVED_TOTAL: &str = "tgdc_discord_events_received_total";
    /// Messages sent to Discord
    pub const MESSAGES_SENT_TOTAL: &str = "tgdc_discord_messages_sent_total";
    /// Send errors
    pub const MESSAGE_SEND_ERRORS_TOTAL: &str = "tgdc_discord_message_send_errors_total";
    /// Webhooks created by the bridge
    pub const WEBHOOKS_CREATED_TOTAL: &str = "tgdc_discord_webhooks_created_total";
}

/// Histogram bucket definitions
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Event handling duration buckets (in seconds)
    /// Covers 5ms to 2 minutes; large media transfers sit in the tail
    pub static HANDLE_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
        ]
    });
}
