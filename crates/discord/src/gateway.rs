use {
    secrecy::ExposeSecret,
    serenity::Client,
    tgdc_channels::InboundEvent,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{error, info},
};

use crate::{config::DiscordConfig, handler::DiscordHandler};

/// Connect to the Discord gateway.
///
/// Spawns the shard runner and a watcher that shuts every shard down once
/// the returned `CancellationToken` is cancelled. The token is also
/// cancelled if the gateway connection ends on its own.
pub async fn start_gateway(
    config: &DiscordConfig,
    events: mpsc::Sender<InboundEvent>,
) -> anyhow::Result<CancellationToken> {
    let handler = DiscordHandler::new(events, config.guild_id);
    let mut client = Client::builder(config.token.expose_secret(), DiscordHandler::intents())
        .event_handler(handler)
        .await?;

    let cancel = CancellationToken::new();
    let shard_manager = client.shard_manager.clone();

    let watcher = cancel.clone();
    tokio::spawn(async move {
        watcher.cancelled().await;
        info!("discord gateway shutting down");
        shard_manager.shutdown_all().await;
    });

    let runner = cancel.clone();
    tokio::spawn(async move {
        info!("starting discord gateway");
        if let Err(e) = client.start().await {
            error!(error = %e, "discord gateway stopped");
        }
        runner.cancel();
    });

    Ok(cancel)
}
