use std::{sync::Arc, time::Duration};

use {
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tgdc_channels::InboundEvent,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use tgdc_metrics::{counter, telegram as tg_metrics};

use crate::{handlers, outbound::TelegramClient, state::PollIndex};

/// Start long polling with `client`'s bot.
///
/// Verifies the token, clears any webhook, then spawns a background task
/// that pushes normalized events into `events` until the returned
/// `CancellationToken` is cancelled or the receiver goes away.
pub async fn start_polling(
    client: Arc<TelegramClient>,
    events: mpsc::Sender<InboundEvent>,
) -> anyhow::Result<CancellationToken> {
    let bot = client.bot().clone();

    // Verify credentials and get bot username.
    let me = bot.get_me().await?;

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    info!(
        username = ?me.username,
        "telegram bot connected (webhook cleared)"
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let timeout = client.config().poll_timeout_secs;
    let polls = PollIndex::new();

    tokio::spawn(async move {
        info!("starting telegram manual polling loop");
        let mut offset: i32 = 0;

        loop {
            if cancel_clone.is_cancelled() {
                info!("telegram polling stopped");
                break;
            }

            let result = tokio::select! {
                () = cancel_clone.cancelled() => continue,
                result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(timeout)
                    .allowed_updates(vec![
                        AllowedUpdate::Message,
                        AllowedUpdate::EditedMessage,
                        AllowedUpdate::Poll,
                    ])
                    .send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        #[cfg(feature = "metrics")]
                        counter!(tg_metrics::UPDATES_RECEIVED_TOTAL).increment(1);

                        let event = match &update.kind {
                            UpdateKind::Message(msg) => {
                                debug!(chat_id = msg.chat.id.0, "received telegram message");
                                handlers::message_event(msg, false, &polls)
                            },
                            UpdateKind::EditedMessage(msg) => {
                                debug!(
                                    chat_id = msg.chat.id.0,
                                    "received telegram edited message"
                                );
                                handlers::message_event(msg, true, &polls)
                            },
                            UpdateKind::Poll(poll) => handlers::poll_event(poll, &polls),
                            other => {
                                debug!("ignoring non-message update: {other:?}");
                                None
                            },
                        };

                        if let Some(event) = event
                            && events.send(event).await.is_err()
                        {
                            info!("relay stopped, ending telegram polling");
                            cancel_clone.cancel();
                            return;
                        }
                    }
                },
                Err(e) => {
                    // Detect conflict error: another bot instance is running with the same token.
                    if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                        warn!(
                            "telegram polling disabled: another instance is already running with this token"
                        );
                        cancel_clone.cancel();
                        break;
                    }

                    #[cfg(feature = "metrics")]
                    counter!(tg_metrics::POLLING_ERRORS_TOTAL).increment(1);
                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                },
            }
        }
    });

    Ok(cancel)
}
