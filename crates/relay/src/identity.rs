//! Per-channel cache of send-as identities (webhooks).
//!
//! Resolution is single-flight per channel: concurrent first uses wait on
//! the same lookup instead of each creating an identity. Failures are not
//! cached, so the next use retries.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    tgdc_channels::{Identity, PlatformClient},
    tokio::sync::OnceCell,
    tracing::{debug, info, warn},
};

use crate::{Error, Result};

type Slot = Arc<OnceCell<Identity>>;

pub struct IdentityCache {
    client: Arc<dyn PlatformClient>,
    name: String,
    slots: Mutex<HashMap<String, Slot>>,
}

impl IdentityCache {
    /// `name` is the display name used to find or create identities.
    pub fn new(client: Arc<dyn PlatformClient>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Identity for `channel_id`, resolving it on first use.
    pub async fn resolve(&self, channel_id: &str) -> Result<Identity> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(channel_id.to_string()).or_default())
        };

        let identity = slot
            .get_or_try_init(|| async {
                debug!(channel_id, name = %self.name, "resolving identity");
                let identity = self
                    .client
                    .resolve_or_create_identity(channel_id, &self.name)
                    .await
                    .map_err(|e| {
                        warn!(channel_id, error = %e, "identity unavailable");
                        Error::identity_unavailable(channel_id, e)
                    })?;
                info!(channel_id, identity = %identity.id, "identity ready");
                Ok::<_, Error>(identity)
            })
            .await?;
        Ok(identity.clone())
    }

    /// Forget the cached identity of `channel_id`, e.g. after it was deleted
    /// on the platform. The next [`IdentityCache::resolve`] recreates it.
    pub fn invalidate(&self, channel_id: &str) {
        let removed = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(channel_id);
        if removed.is_some() {
            debug!(channel_id, "identity invalidated");
        }
    }

    /// Cached identity without resolving.
    #[must_use]
    pub fn cached(&self, channel_id: &str) -> Option<Identity> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel_id)
            .and_then(|slot| slot.get().cloned())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support::MockClient,
        tgdc_channels::Platform,
    };

    #[tokio::test]
    async fn concurrent_first_use_creates_once() {
        let client = Arc::new(MockClient::new(Platform::Discord, "D"));
        let cache = Arc::new(IdentityCache::new(client.clone(), "Bridge"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.resolve("900").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(client.identities_created(), 1);
        assert_eq!(cache.cached("900").unwrap().name, "Bridge");
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let client = Arc::new(MockClient::new(Platform::Discord, "D"));
        client.fail_identities(true);
        let cache = IdentityCache::new(client.clone(), "Bridge");

        let err = cache.resolve("900").await.unwrap_err();
        assert!(matches!(err, Error::IdentityUnavailable { .. }));
        assert!(cache.cached("900").is_none());

        client.fail_identities(false);
        cache.resolve("900").await.unwrap();
        assert_eq!(client.identities_created(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recreation() {
        let client = Arc::new(MockClient::new(Platform::Discord, "D"));
        let cache = IdentityCache::new(client.clone(), "Bridge");

        cache.resolve("900").await.unwrap();
        cache.invalidate("900");
        cache.resolve("900").await.unwrap();
        assert_eq!(client.identities_created(), 2);
    }
}
