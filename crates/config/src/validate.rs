//! Semantic checks on a loaded configuration.

use crate::schema::TgdcConfig;

/// Discord rejects webhook names longer than this.
const WEBHOOK_NAME_MAX: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "relay.correlation_ceiling"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Check tokens, relay limits and the metrics listener.
#[must_use]
pub fn validate(config: &TgdcConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (section, value) in [("telegram", &config.telegram), ("discord", &config.discord)] {
        let path = format!("{section}.token");
        match value.get("token").and_then(|t| t.as_str()).map(str::trim) {
            None | Some("") => result.push(Severity::Error, &path, "token is required"),
            Some(token) if token.contains("${") => result.push(
                Severity::Error,
                &path,
                format!("unresolved placeholder {token:?}"),
            ),
            Some(_) => {},
        }
    }

    if config.discord.get("channel_id").is_none_or(|v| v.is_null()) {
        result.push(
            Severity::Warning,
            "discord.channel_id",
            "no target channel; Telegram messages are held back until one is set",
        );
    }

    let relay = &config.relay;
    if relay.correlation_ceiling == 0 {
        result.push(
            Severity::Error,
            "relay.correlation_ceiling",
            "must be greater than zero",
        );
    }
    if relay.max_body_chars == 0 {
        result.push(
            Severity::Error,
            "relay.max_body_chars",
            "must be greater than zero",
        );
    }
    let name = relay.identity_name.trim();
    if name.is_empty() || name.chars().count() > WEBHOOK_NAME_MAX {
        result.push(
            Severity::Error,
            "relay.identity_name",
            format!("must be 1 to {WEBHOOK_NAME_MAX} characters"),
        );
    } else if name.to_ascii_lowercase().contains("discord") {
        result.push(
            Severity::Error,
            "relay.identity_name",
            "Discord rejects webhook names containing \"discord\"",
        );
    }

    if config.metrics.enabled
        && let Some(listen) = &config.metrics.listen
        && listen.parse::<std::net::SocketAddr>().is_err()
    {
        result.push(
            Severity::Error,
            "metrics.listen",
            format!("{listen:?} is not a socket address"),
        );
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    fn valid() -> TgdcConfig {
        TgdcConfig {
            telegram: json!({ "token": "123:abc" }),
            discord: json!({ "token": "dc", "channel_id": 5 }),
            ..Default::default()
        }
    }

    fn paths(result: &ValidationResult) -> Vec<&str> {
        result.diagnostics.iter().map(|d| d.path.as_str()).collect()
    }

    #[test]
    fn complete_config_is_clean() {
        let result = validate(&valid());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_tokens_are_errors() {
        let result = validate(&TgdcConfig::default());
        assert!(result.has_errors());
        let errors: Vec<_> = result.errors().map(|d| d.path.as_str()).collect();
        assert_eq!(errors, vec!["telegram.token", "discord.token"]);
    }

    #[test]
    fn unresolved_placeholder_is_an_error() {
        let mut cfg = valid();
        cfg.telegram = json!({ "token": "${TG_TOKEN}" });
        assert_eq!(paths(&validate(&cfg)), vec!["telegram.token"]);
    }

    #[test]
    fn missing_channel_is_only_a_warning() {
        let mut cfg = valid();
        cfg.discord = json!({ "token": "dc" });
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(paths(&result), vec!["discord.channel_id"]);
    }

    #[rstest]
    #[case("")]
    #[case("My Discord Bridge")]
    fn bad_identity_names(#[case] name: &str) {
        let mut cfg = valid();
        cfg.relay.identity_name = name.into();
        assert_eq!(paths(&validate(&cfg)), vec!["relay.identity_name"]);
    }

    #[test]
    fn zero_limits_are_errors() {
        let mut cfg = valid();
        cfg.relay.correlation_ceiling = 0;
        cfg.relay.max_body_chars = 0;
        assert_eq!(
            paths(&validate(&cfg)),
            vec!["relay.correlation_ceiling", "relay.max_body_chars"]
        );
    }

    #[test]
    fn metrics_listener_must_parse() {
        let mut cfg = valid();
        cfg.metrics.enabled = true;
        cfg.metrics.listen = Some("localhost".into());
        assert_eq!(paths(&validate(&cfg)), vec!["metrics.listen"]);
        cfg.metrics.listen = Some("127.0.0.1:9100".into());
        assert!(validate(&cfg).diagnostics.is_empty());
    }
}
