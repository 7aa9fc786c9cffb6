//! Persistent relay state: bridge settings, the correlation table and
//! poll ownership tags, snapshotted to one JSON file.
//!
//! The file is rewritten atomically (temp file + rename) after every
//! mutation, while the state lock is held, so snapshots are never
//! interleaved and a crash never leaves a torn file behind.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    tgdc_channels::Platform,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use tgdc_metrics::{counter, gauge, store as store_metrics};

use crate::{
    Error, Result,
    correlation::{Correlation, CorrelationTable, MessageRef, StoredCorrelation},
};

/// Default number of correlation keys kept before pruning.
pub const DEFAULT_CEILING: usize = 3000;

/// Operator-controlled switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Master switch for relaying in both directions.
    pub enabled: bool,
    /// Stop relaying from the destination back to subscribers.
    pub do_not_disturb: bool,
    /// Destination channel id. Overrides the configured one when set.
    pub target_channel: Option<String>,
    /// User ids allowed to run bridge commands.
    pub admins: Vec<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            do_not_disturb: false,
            target_channel: None,
            admins: Vec::new(),
        }
    }
}

/// Ownership tag of a relayed poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollMirror {
    /// Platform the poll was created on. Only its vote updates count.
    pub owner: Platform,
    /// The mirror is editable text and tracks vote changes.
    pub live: bool,
    /// Display name of the poll's author. Vote updates carry no sender, so
    /// re-rendered mirrors take their author header from here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Key count above which the oldest half is evicted.
    pub ceiling: usize,
    /// Let a new link replace an existing pair for either message.
    pub allow_overwrite: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            allow_overwrite: true,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    settings: BridgeSettings,
    #[serde(default)]
    correlations: Vec<StoredCorrelation>,
    #[serde(default)]
    polls: HashMap<String, PollMirror>,
}

#[derive(Debug, Default)]
struct State {
    settings: BridgeSettings,
    links: CorrelationTable,
    polls: HashMap<String, PollMirror>,
}

impl State {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            settings: self.settings.clone(),
            correlations: self.links.entries().collect(),
            polls: self.polls.clone(),
        }
    }

    fn forget_polls<'a>(&mut self, keys: impl IntoIterator<Item = &'a String>) {
        for key in keys {
            self.polls.remove(key);
        }
    }
}

/// Correlation store shared by all relay tasks.
pub struct Store {
    path: Option<PathBuf>,
    options: StoreOptions,
    state: Mutex<State>,
}

impl Store {
    /// Load the snapshot at `path`.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is logged
    /// and also starts empty; it is overwritten on the next mutation.
    pub async fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let path = path.into();
        let state = match load_snapshot(&path).await {
            Ok(Some(snapshot)) => {
                let (links, dropped) = CorrelationTable::from_entries(snapshot.correlations);
                if dropped > 0 {
                    warn!(path = %path.display(), dropped, "dropped unpaired correlation records");
                }
                let mut polls = snapshot.polls;
                polls.retain(|key, _| links.contains_key(key));
                info!(
                    path = %path.display(),
                    correlations = links.len(),
                    "loaded relay state"
                );
                State {
                    settings: snapshot.settings,
                    links,
                    polls,
                }
            },
            Ok(None) => {
                debug!(path = %path.display(), "no relay state yet, starting empty");
                State::default()
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "relay state unreadable, starting empty");
                State::default()
            },
        };

        report_size(&state);
        Ok(Self {
            path: Some(path),
            options,
            state: Mutex::new(state),
        })
    }

    /// Store that never touches disk.
    #[must_use]
    pub fn in_memory(options: StoreOptions) -> Self {
        Self {
            path: None,
            options,
            state: Mutex::new(State::default()),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn settings(&self) -> BridgeSettings {
        self.state.lock().await.settings.clone()
    }

    pub async fn lookup(&self, message: &MessageRef) -> Option<Correlation> {
        self.state.lock().await.links.lookup(message).cloned()
    }

    /// Poll tag of a correlated message, from either side of the pair.
    pub async fn poll_mirror(&self, message: &MessageRef) -> Option<PollMirror> {
        self.state.lock().await.polls.get(&message.key()).cloned()
    }

    /// Number of correlation keys (two per relayed message).
    pub async fn len(&self) -> usize {
        self.state.lock().await.links.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.links.is_empty()
    }

    /// Record `source <-> mirror`, prune if above the ceiling, persist.
    ///
    /// With overwrite disabled, linking a message that is already part of
    /// a pair fails with [`Error::DuplicateLink`] and changes nothing. Any
    /// other error is a failed write: the pair is kept in memory and lands
    /// on disk with the next successful persist.
    pub async fn link(
        &self,
        source: &MessageRef,
        mirror: &MessageRef,
        impersonated: bool,
        poll: Option<PollMirror>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        if !self.options.allow_overwrite {
            for message in [source, mirror] {
                if state.links.lookup(message).is_some() {
                    return Err(Error::DuplicateLink {
                        key: message.key(),
                    });
                }
            }
        }

        let replaced = state.links.link(source, mirror, impersonated);
        if !replaced.is_empty() {
            debug!(source = %source, replaced = ?replaced, "replaced existing correlation");
            state.forget_polls(&replaced);
        }
        if let Some(tag) = poll {
            state.polls.insert(source.key(), tag.clone());
            state.polls.insert(mirror.key(), tag);
        }

        let evicted = state.links.prune(self.options.ceiling);
        if !evicted.is_empty() {
            info!(
                evicted = evicted.len(),
                remaining = state.links.len(),
                "pruned correlation store"
            );
            state.forget_polls(&evicted);
            #[cfg(feature = "metrics")]
            counter!(store_metrics::PRUNED_TOTAL).increment(evicted.len() as u64);
        }

        report_size(&state);
        self.persist_locked(&state).await
    }

    /// Remove the pair containing `message`, in both directions.
    /// Returns the record keyed by `message`, if there was one.
    pub async fn unlink(&self, message: &MessageRef) -> Result<Option<Correlation>> {
        let mut state = self.state.lock().await;
        let Some(removed) = state.links.unlink(message) else {
            return Ok(None);
        };
        let keys = [message.key(), removed.peer.key()];
        state.forget_polls(&keys);
        report_size(&state);
        self.persist_locked(&state).await?;
        Ok(Some(removed))
    }

    /// Drop every correlation and poll tag, keeping settings.
    pub async fn clear_correlations(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.links = CorrelationTable::new();
        state.polls.clear();
        report_size(&state);
        self.persist_locked(&state).await
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.update_settings(|s| s.enabled = enabled).await
    }

    pub async fn set_do_not_disturb(&self, do_not_disturb: bool) -> Result<()> {
        self.update_settings(|s| s.do_not_disturb = do_not_disturb)
            .await
    }

    pub async fn set_target_channel(&self, channel_id: Option<String>) -> Result<()> {
        self.update_settings(|s| s.target_channel = channel_id).await
    }

    /// Returns `false` when the user already was an admin.
    pub async fn add_admin(&self, user_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.settings.admins.iter().any(|a| a == user_id) {
            return Ok(false);
        }
        state.settings.admins.push(user_id.to_string());
        self.persist_locked(&state).await?;
        Ok(true)
    }

    /// Make `user_id` an admin if nobody is one yet. Returns whether it did.
    pub async fn claim_first_admin(&self, user_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.settings.admins.is_empty() {
            return Ok(false);
        }
        state.settings.admins.push(user_id.to_string());
        info!(user_id, "first admin registered");
        self.persist_locked(&state).await?;
        Ok(true)
    }

    /// Returns `false` when the user was not an admin.
    pub async fn remove_admin(&self, user_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.settings.admins.len();
        state.settings.admins.retain(|a| a != user_id);
        if state.settings.admins.len() == before {
            return Ok(false);
        }
        self.persist_locked(&state).await?;
        Ok(true)
    }

    pub async fn is_admin(&self, user_id: &str) -> bool {
        self.state
            .lock()
            .await
            .settings
            .admins
            .iter()
            .any(|a| a == user_id)
    }

    /// Write the current snapshot to disk now.
    pub async fn persist(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.persist_locked(&state).await
    }

    async fn update_settings(&self, f: impl FnOnce(&mut BridgeSettings)) -> Result<()> {
        let mut state = self.state.lock().await;
        f(&mut state.settings);
        self.persist_locked(&state).await
    }

    async fn persist_locked(&self, state: &State) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let result = write_snapshot(path, &state.snapshot()).await;
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "failed to persist relay state");
            #[cfg(feature = "metrics")]
            counter!(store_metrics::PERSIST_ERRORS_TOTAL).increment(1);
        }
        result
    }
}

fn report_size(state: &State) {
    #[cfg(feature = "metrics")]
    gauge!(store_metrics::CORRELATIONS).set(state.links.len() as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = state;
}

async fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if data.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|source| Error::StoreCorrupt { source })
}

async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::correlation::Role};

    fn tg(id: &str) -> MessageRef {
        MessageRef::new(Platform::Telegram, "42", id)
    }

    fn dc(id: &str) -> MessageRef {
        MessageRef::new(Platform::Discord, "900", id)
    }

    #[tokio::test]
    async fn link_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = Store::open(&path, StoreOptions::default()).await.unwrap();
        store.link(&tg("100"), &dc("D1"), true, None).await.unwrap();
        store.set_do_not_disturb(true).await.unwrap();
        drop(store);

        let reopened = Store::open(&path, StoreOptions::default()).await.unwrap();
        let record = reopened.lookup(&tg("100")).await.unwrap();
        assert_eq!(record.peer, dc("D1"));
        assert!(record.impersonated);
        assert_eq!(
            reopened.lookup(&dc("D1")).await.unwrap().role,
            Role::Mirror
        );
        assert!(reopened.settings().await.do_not_disturb);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = Store::open(&path, StoreOptions::default()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(store.settings().await.enabled);

        store.link(&tg("1"), &dc("A"), false, None).await.unwrap();
        let data = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(data.contains("telegram:42:1"));
    }

    #[tokio::test]
    async fn missing_parent_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = Store::open(&path, StoreOptions::default()).await.unwrap();
        store.set_enabled(false).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn failed_write_keeps_the_pair_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = Store::open(blocker.join("state.json"), StoreOptions::default())
            .await
            .unwrap();

        let err = store.link(&tg("1"), &dc("A"), false, None).await.unwrap_err();
        assert!(!matches!(err, Error::DuplicateLink { .. }));
        assert_eq!(store.lookup(&tg("1")).await.unwrap().peer, dc("A"));
        assert_eq!(store.lookup(&dc("A")).await.unwrap().peer, tg("1"));
    }

    #[tokio::test]
    async fn unlink_drops_poll_tags() {
        let store = Store::in_memory(StoreOptions::default());
        let tag = PollMirror {
            owner: Platform::Telegram,
            live: true,
            author: Some("Ann".into()),
        };
        store
            .link(&tg("7"), &dc("P"), false, Some(tag.clone()))
            .await
            .unwrap();
        assert_eq!(store.poll_mirror(&dc("P")).await, Some(tag));

        store.unlink(&tg("7")).await.unwrap();
        assert!(store.poll_mirror(&dc("P")).await.is_none());
        assert!(store.lookup(&dc("P")).await.is_none());
    }

    #[tokio::test]
    async fn overwrite_disabled_rejects_relink() {
        let store = Store::in_memory(StoreOptions {
            allow_overwrite: false,
            ..StoreOptions::default()
        });
        store.link(&tg("1"), &dc("A"), false, None).await.unwrap();
        let err = store.link(&tg("1"), &dc("B"), false, None).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateLink { .. }));
        assert_eq!(store.lookup(&tg("1")).await.unwrap().peer, dc("A"));
    }

    #[tokio::test]
    async fn ceiling_prunes_in_pairs() {
        let store = Store::in_memory(StoreOptions {
            ceiling: 6,
            allow_overwrite: true,
        });
        for i in 0..4 {
            store
                .link(&tg(&i.to_string()), &dc(&format!("D{i}")), false, None)
                .await
                .unwrap();
        }
        // 8 keys > 6: oldest half (two pairs) evicted.
        assert_eq!(store.len().await, 4);
        assert!(store.lookup(&tg("0")).await.is_none());
        assert!(store.lookup(&dc("D1")).await.is_none());
        assert!(store.lookup(&tg("3")).await.is_some());
    }

    #[tokio::test]
    async fn admin_roster() {
        let store = Store::in_memory(StoreOptions::default());
        assert!(store.claim_first_admin("10").await.unwrap());
        assert!(!store.claim_first_admin("12").await.unwrap());
        assert!(store.add_admin("11").await.unwrap());
        assert!(!store.add_admin("11").await.unwrap());
        assert!(store.is_admin("11").await);
        assert!(store.remove_admin("11").await.unwrap());
        assert!(!store.remove_admin("11").await.unwrap());
        assert!(!store.is_admin("11").await);
    }

    #[tokio::test]
    async fn unlink_unknown_returns_none() {
        let store = Store::in_memory(StoreOptions::default());
        assert!(store.unlink(&tg("404")).await.unwrap().is_none());
    }
}
