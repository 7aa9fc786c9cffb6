//! `tgdc state`: operator access to the persisted bridge settings.
//!
//! Edits the same state file the relay uses, so run these while the relay
//! is stopped; a running relay overwrites the file on its next write.

use {
    anyhow::Result,
    clap::{Subcommand, ValueEnum},
    tgdc_config::TgdcConfig,
    tgdc_relay::{Store, StoreOptions, SubscriberRegistry},
};

#[derive(Subcommand)]
pub enum StateAction {
    /// Print settings and counts.
    Show,
    /// Resume relaying in both directions.
    Enable,
    /// Stop relaying in both directions.
    Disable,
    /// Stop or resume relaying Discord messages back to Telegram.
    Dnd { mode: Switch },
    /// Override the configured Discord channel. Omit the id to clear.
    Target { channel_id: Option<String> },
    /// Grant bridge admin rights to a user id.
    AddAdmin { user_id: String },
    /// Revoke bridge admin rights.
    RemoveAdmin { user_id: String },
    /// Forget every message correlation. Edits and deletes of messages
    /// relayed before this are no longer mirrored.
    ClearCorrelations,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

pub async fn handle_state(config: &TgdcConfig, action: StateAction) -> Result<()> {
    let store = Store::open(
        config.storage.resolved_state_path(),
        StoreOptions {
            ceiling: config.relay.correlation_ceiling,
            allow_overwrite: config.relay.allow_overwrite,
        },
    )
    .await?;

    let message = match action {
        StateAction::Show => {
            let subscribers =
                SubscriberRegistry::open(config.storage.resolved_subscribers_path()).await?;
            show(&store, &subscribers).await?
        },
        action => apply(&store, action).await?,
    };
    println!("{message}");
    Ok(())
}

async fn show(store: &Store, subscribers: &SubscriberRegistry) -> Result<String> {
    let summary = serde_json::json!({
        "settings": store.settings().await,
        "correlations": store.len().await,
        "subscribers": subscribers.list().await,
    });
    Ok(serde_json::to_string_pretty(&summary)?)
}

async fn apply(store: &Store, action: StateAction) -> Result<String> {
    let message = match action {
        StateAction::Show => return Ok(String::new()),
        StateAction::Enable => {
            store.set_enabled(true).await?;
            "relay enabled".to_string()
        },
        StateAction::Disable => {
            store.set_enabled(false).await?;
            "relay disabled".to_string()
        },
        StateAction::Dnd { mode } => {
            let on = matches!(mode, Switch::On);
            store.set_do_not_disturb(on).await?;
            if on {
                "do not disturb on: Discord messages are not relayed".to_string()
            } else {
                "do not disturb off".to_string()
            }
        },
        StateAction::Target { channel_id } => {
            let message = match &channel_id {
                Some(id) => format!("target channel set to {id}"),
                None => "target channel override cleared".to_string(),
            };
            store.set_target_channel(channel_id).await?;
            message
        },
        StateAction::AddAdmin { user_id } => {
            // The very first admin bootstraps the list.
            if store.claim_first_admin(&user_id).await? {
                format!("{user_id} is the first admin")
            } else if store.add_admin(&user_id).await? {
                format!("{user_id} added as admin")
            } else {
                format!("{user_id} already is an admin")
            }
        },
        StateAction::RemoveAdmin { user_id } => {
            if store.remove_admin(&user_id).await? {
                format!("{user_id} removed")
            } else {
                format!("{user_id} was not an admin")
            }
        },
        StateAction::ClearCorrelations => {
            let count = store.len().await;
            store.clear_correlations().await?;
            format!("dropped {count} correlation keys")
        },
    };
    Ok(message)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("state.json"), StoreOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        apply(&store, StateAction::Disable).await.unwrap();
        apply(&store, StateAction::Dnd { mode: Switch::On })
            .await
            .unwrap();
        apply(&store, StateAction::Target {
            channel_id: Some("42".into()),
        })
        .await
        .unwrap();
        drop(store);

        let settings = open(&dir).await.settings().await;
        assert!(!settings.enabled);
        assert!(settings.do_not_disturb);
        assert_eq!(settings.target_channel.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn first_admin_then_more() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        let first = apply(&store, StateAction::AddAdmin {
            user_id: "1".into(),
        })
        .await
        .unwrap();
        assert_eq!(first, "1 is the first admin");

        let again = apply(&store, StateAction::AddAdmin {
            user_id: "1".into(),
        })
        .await
        .unwrap();
        assert_eq!(again, "1 already is an admin");

        apply(&store, StateAction::AddAdmin {
            user_id: "2".into(),
        })
        .await
        .unwrap();
        apply(&store, StateAction::RemoveAdmin {
            user_id: "1".into(),
        })
        .await
        .unwrap();
        assert!(!store.is_admin("1").await);
        assert!(store.is_admin("2").await);
    }

    #[tokio::test]
    async fn show_lists_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let subscribers = SubscriberRegistry::in_memory(["-100".to_string()]);

        let out = show(&store, &subscribers).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["correlations"], 0);
        assert_eq!(value["subscribers"][0], "-100");
        assert_eq!(value["settings"]["enabled"], true);
    }
}
