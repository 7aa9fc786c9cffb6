//! `tgdc run`: wire both adapters to one relay and run until interrupted.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    tgdc_channels::PlatformClient,
    tgdc_config::{Severity, TgdcConfig},
    tgdc_discord::{DiscordClient, DiscordConfig},
    tgdc_relay::{MediaPipeline, Relay, RelayOptions, Store, StoreOptions, SubscriberRegistry},
    tgdc_telegram::{TelegramClient, TelegramConfig},
    tokio::sync::mpsc,
    tracing::{error, info, warn},
};

/// Inbound events buffered per platform before the adapter waits.
const EVENT_BUFFER: usize = 256;

/// How long relay workers get to drain after shutdown is requested.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: TgdcConfig) -> anyhow::Result<()> {
    let report = tgdc_config::validate(&config);
    for d in &report.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
        }
    }
    if report.has_errors() {
        anyhow::bail!("invalid configuration, run `tgdc doctor` for details");
    }

    #[cfg(feature = "metrics")]
    let _metrics = init_metrics(&config)?;

    let telegram_config: TelegramConfig = serde_json::from_value(config.telegram.clone())
        .context("invalid [telegram] section")?;
    let discord_config: DiscordConfig =
        serde_json::from_value(config.discord.clone()).context("invalid [discord] section")?;

    let store = Arc::new(
        Store::open(
            config.storage.resolved_state_path(),
            StoreOptions {
                ceiling: config.relay.correlation_ceiling,
                allow_overwrite: config.relay.allow_overwrite,
            },
        )
        .await?,
    );
    let subscribers =
        Arc::new(SubscriberRegistry::open(config.storage.resolved_subscribers_path()).await?);
    let media = Arc::new(match &config.storage.media_dir {
        Some(dir) => MediaPipeline::in_dir(dir.clone())?,
        None => MediaPipeline::new()?,
    });

    let telegram = Arc::new(TelegramClient::from_config(telegram_config)?);
    let discord = Arc::new(DiscordClient::new(discord_config.clone()));

    let options = RelayOptions {
        max_body_chars: config.relay.max_body_chars,
        identity_name: config.relay.identity_name.clone(),
        echo_to_subscribers: config.relay.echo_to_subscribers,
        command_prefix: config.relay.command_prefix,
        target_channel: discord_config.channel_id.map(|id| id.to_string()),
    };
    let relay = Arc::new(Relay::new(
        Arc::clone(&telegram) as Arc<dyn PlatformClient>,
        discord as Arc<dyn PlatformClient>,
        Arc::clone(&store),
        Arc::clone(&subscribers),
        media,
        options,
    ));

    // One worker per platform: events from the same side stay ordered while
    // the two sides make progress independently.
    let (telegram_tx, telegram_rx) = mpsc::channel(EVENT_BUFFER);
    let (discord_tx, discord_rx) = mpsc::channel(EVENT_BUFFER);
    let workers = [
        tokio::spawn(Arc::clone(&relay).run(telegram_rx)),
        tokio::spawn(relay.run(discord_rx)),
    ];

    let telegram_cancel = tgdc_telegram::start_polling(telegram, telegram_tx).await?;
    let discord_cancel = tgdc_discord::start_gateway(&discord_config, discord_tx).await?;

    info!(
        subscribers = subscribers.len().await,
        correlations = store.len().await,
        "relay running"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
        },
        () = telegram_cancel.cancelled() => warn!("telegram polling stopped"),
        () = discord_cancel.cancelled() => warn!("discord gateway stopped"),
    }

    telegram_cancel.cancel();
    discord_cancel.cancel();

    if tokio::time::timeout(DRAIN_TIMEOUT, join_workers(workers))
        .await
        .is_err()
    {
        warn!("relay workers did not drain in time");
    }

    store.persist().await?;
    info!("tgdc stopped");
    Ok(())
}

async fn join_workers(workers: [tokio::task::JoinHandle<()>; 2]) {
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "relay worker panicked");
        }
    }
}

#[cfg(feature = "metrics")]
fn init_metrics(config: &TgdcConfig) -> anyhow::Result<tgdc_metrics::MetricsHandle> {
    let listen = config
        .metrics
        .listen
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("invalid metrics.listen")?;
    tgdc_metrics::init_metrics(tgdc_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        listen,
        global_labels: vec![("service".into(), "tgdc".into())],
    })
}
