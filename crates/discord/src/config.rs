use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Upload limit for guilds without boosts.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024;

/// Configuration for the Discord bot.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token from the developer portal.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Guild the bridge lives in; needed for message deep links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<u64>,

    /// Default target channel for relayed Telegram messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,

    /// Largest attachment sent to Discord.
    pub max_upload_bytes: u64,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"[REDACTED]")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            guild_id: None,
            channel_id: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = DiscordConfig::default();
        assert_eq!(cfg.max_upload_bytes, 8 * 1024 * 1024);
        assert!(cfg.guild_id.is_none());
        assert!(cfg.channel_id.is_none());
    }

    #[test]
    fn deserialize_from_json() {
        let json = r#"{
            "token": "dc-token",
            "guild_id": 1234,
            "channel_id": 5678
        }"#;
        let cfg: DiscordConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.token.expose_secret(), "dc-token");
        assert_eq!(cfg.guild_id, Some(1234));
        assert_eq!(cfg.channel_id, Some(5678));
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = DiscordConfig {
            token: Secret::new("very-secret".into()),
            ..Default::default()
        };
        assert!(!format!("{cfg:?}").contains("very-secret"));
    }
}
