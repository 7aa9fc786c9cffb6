use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
///
/// The `telegram` and `discord` sections stay raw values: each adapter
/// deserializes its own config type from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TgdcConfig {
    pub telegram: serde_json::Value,
    pub discord: serde_json::Value,
    pub relay: RelayConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

impl Default for TgdcConfig {
    fn default() -> Self {
        Self {
            telegram: serde_json::Value::Object(serde_json::Map::new()),
            discord: serde_json::Value::Object(serde_json::Map::new()),
            relay: RelayConfig::default(),
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Relay behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Name of the per-channel webhook used to post as other users.
    pub identity_name: String,
    /// Body length cap before the destination's own message limit applies.
    pub max_body_chars: usize,
    /// Copy origin messages to the other subscriber chats.
    pub echo_to_subscribers: bool,
    /// Messages starting with this character are commands, not relayed.
    pub command_prefix: char,
    /// Correlation pairs kept before the oldest half is pruned.
    pub correlation_ceiling: usize,
    /// Replace an existing correlation for the same source (true) or reject
    /// the new one.
    pub allow_overwrite: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            identity_name: "Bridge".into(),
            max_body_chars: 2000,
            echo_to_subscribers: true,
            command_prefix: '/',
            correlation_ceiling: 3000,
            allow_overwrite: true,
        }
    }
}

/// Where persistent and transient files live. Unset paths fall back to
/// the user data dir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribers_path: Option<PathBuf>,
    /// Directory for in-flight attachments; a fresh temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Snapshot document path.
    #[must_use]
    pub fn resolved_state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("state.json"))
    }

    /// Subscriber registry path.
    #[must_use]
    pub fn resolved_subscribers_path(&self) -> PathBuf {
        self.subscribers_path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("subscribers.json"))
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// `host:port` for the scrape endpoint; no listener when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
}
