//! Delivery of one message to every subscriber chat.

use {
    tgdc_channels::{OutboundMessage, PlatformClient},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use tgdc_metrics::{counter, relay as relay_metrics};

use crate::correlation::MessageRef;

#[derive(Debug)]
pub struct DeliveryFailure {
    pub chat_id: String,
    pub error: tgdc_channels::Error,
}

/// Per-chat outcome of a fan-out.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Successful deliveries, in subscriber order.
    pub delivered: Vec<MessageRef>,
    pub failures: Vec<DeliveryFailure>,
}

impl BroadcastReport {
    /// The delivery recorded in the correlation store: the first success.
    /// Edits and deletes of the source only reach this copy.
    #[must_use]
    pub fn canonical(&self) -> Option<&MessageRef> {
        self.delivered.first()
    }
}

/// Send to each chat in `subscribers` except `exclude`, one after another.
///
/// `render` builds the message for a given chat, so per-chat details such
/// as native reply targets can differ. A failing chat is logged and
/// skipped; it never aborts delivery to the others.
pub async fn fan_out<F>(
    client: &dyn PlatformClient,
    subscribers: &[String],
    exclude: Option<&str>,
    mut render: F,
) -> BroadcastReport
where
    F: FnMut(&str) -> OutboundMessage,
{
    let platform = client.platform();
    let mut report = BroadcastReport::default();

    for chat_id in subscribers {
        if exclude == Some(chat_id.as_str()) {
            continue;
        }
        let message = render(chat_id);
        match client.send_message(chat_id, &message).await {
            Ok(message_id) => {
                debug!(chat_id, message_id, "delivered to subscriber");
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::BROADCAST_DELIVERIES_TOTAL).increment(1);
                report
                    .delivered
                    .push(MessageRef::new(platform, chat_id.clone(), message_id));
            },
            Err(error) => {
                warn!(chat_id, %error, "delivery to subscriber failed");
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::BROADCAST_FAILURES_TOTAL).increment(1);
                report.failures.push(DeliveryFailure {
                    chat_id: chat_id.clone(),
                    error,
                });
            },
        }
    }
    report
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support::MockClient,
        tgdc_channels::Platform,
    };

    fn chats(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let client = MockClient::new(Platform::Telegram, "T");
        client.fail_chat("b");
        let report = fan_out(&client, &chats(&["a", "b", "c"]), None, |_| {
            OutboundMessage::text("hi")
        })
        .await;

        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].chat_id, "b");
        assert_eq!(report.canonical().unwrap().chat_id, "a");
        assert_eq!(client.sent_to(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn excluded_chat_is_skipped() {
        let client = MockClient::new(Platform::Telegram, "T");
        let report = fan_out(&client, &chats(&["a", "b"]), Some("a"), |chat| {
            OutboundMessage::text(format!("to {chat}"))
        })
        .await;

        assert_eq!(report.delivered.len(), 1);
        assert_eq!(client.sent_texts(), vec!["to b"]);
    }

    #[tokio::test]
    async fn all_failing_has_no_canonical() {
        let client = MockClient::new(Platform::Telegram, "T");
        client.fail_chat("a");
        let report = fan_out(&client, &chats(&["a"]), None, |_| OutboundMessage::text("x")).await;
        assert!(report.canonical().is_none());
    }
}
