use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Bot API upload limit for bots using the public endpoint.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Configuration for the Telegram bot.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Public avatar URL pattern, `{user_id}` is replaced with the sender's
    /// numeric id. Used as the persona avatar when relaying to Discord.
    /// Bot API file URLs embed the token, so they are never shared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url_template: Option<String>,

    /// Largest attachment sent to Telegram.
    pub max_upload_bytes: u64,

    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout_secs: u32,
}

impl TelegramConfig {
    /// Avatar URL for `user_id`, if a template is configured.
    #[must_use]
    pub fn avatar_url(&self, user_id: &str) -> Option<String> {
        self.avatar_url_template
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| t.replace("{user_id}", user_id))
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("avatar_url_template", &self.avatar_url_template)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            avatar_url_template: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            poll_timeout_secs: 30,
        }
    }
}
