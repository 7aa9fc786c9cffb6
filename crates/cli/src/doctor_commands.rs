//! `tgdc doctor`: config validation and an audit of tokens and state files.
//!
//! Prints a report with `[ok]`, `[warn]`, `[fail]` or `[info]` per item and
//! exits non-zero when anything failed.

use std::path::Path;

use {
    anyhow::Result,
    tgdc_config::{Severity, TgdcConfig},
};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }
}

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

pub fn handle_doctor(config: &TgdcConfig, explicit: Option<&Path>) -> Result<()> {
    eprintln!("{BOLD}tgdc doctor{RESET}");
    eprintln!("{BOLD}==========={RESET}\n");

    let source = explicit
        .map(Path::to_path_buf)
        .or_else(tgdc_config::find_config_file);

    let sections = [
        check_config(config, source.as_deref()),
        check_telegram(config),
        check_discord(config),
        check_storage(config),
    ];

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn check_config(config: &TgdcConfig, source: Option<&Path>) -> Section {
    let mut section = Section::new("Config");
    match source {
        Some(path) => section.push(Status::Info, format!("loaded {}", path.display())),
        None => section.push(
            Status::Info,
            "no config file found; using defaults and environment",
        ),
    }

    let result = tgdc_config::validate(config);
    if result.diagnostics.is_empty() {
        section.push(Status::Ok, "configuration is valid");
    }
    for d in &result.diagnostics {
        let status = match d.severity {
            Severity::Error => Status::Fail,
            Severity::Warning => Status::Warn,
        };
        section.push(status, format!("{}: {}", d.path, d.message));
    }
    section
}

fn check_telegram(config: &TgdcConfig) -> Section {
    let mut section = Section::new("Telegram");
    if let Some(token) = config.telegram.get("token").and_then(|t| t.as_str()) {
        // Bot tokens look like `<bot id>:<secret>`.
        match token.split_once(':') {
            Some((id, secret))
                if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && !secret.is_empty() =>
            {
                section.push(Status::Ok, format!("bot token for bot id {id}"));
            },
            _ if token.trim().is_empty() => {},
            _ => section.push(Status::Warn, "token does not look like a Bot API token"),
        }
    }
    match config
        .telegram
        .get("avatar_url_template")
        .and_then(|t| t.as_str())
    {
        Some(template) if template.contains("{user_id}") => {
            section.push(Status::Ok, "sender avatars are shared with Discord");
        },
        Some(_) => section.push(
            Status::Warn,
            "avatar_url_template has no {user_id} placeholder",
        ),
        None => section.push(Status::Info, "sender avatars are not shared"),
    }
    section
}

fn check_discord(config: &TgdcConfig) -> Section {
    let mut section = Section::new("Discord");
    for key in ["guild_id", "channel_id"] {
        match config.discord.get(key) {
            Some(v) if v.as_u64().is_some_and(|id| id > 0) => {
                section.push(Status::Ok, format!("{key} = {v}"));
            },
            None | Some(serde_json::Value::Null) => {
                let status = if key == "guild_id" {
                    Status::Info
                } else {
                    Status::Warn
                };
                section.push(status, format!("{key} is not set"));
            },
            Some(v) => section.push(Status::Fail, format!("{key} must be a numeric id, got {v}")),
        }
    }
    section
}

fn check_storage(config: &TgdcConfig) -> Section {
    let mut section = Section::new("Storage");
    for (label, path) in [
        ("relay state", config.storage.resolved_state_path()),
        ("subscribers", config.storage.resolved_subscribers_path()),
    ] {
        check_json_file(&mut section, label, &path);
    }
    if let Some(dir) = &config.storage.media_dir
        && !dir.is_dir()
    {
        section.push(
            Status::Warn,
            format!("media dir {} does not exist yet", dir.display()),
        );
    }
    section
}

fn check_json_file(section: &mut Section, label: &str, path: &Path) {
    if !path.exists() {
        section.push(
            Status::Info,
            format!("{label}: {} not created yet", path.display()),
        );
        return;
    }
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(_) => section.push(Status::Ok, format!("{label}: {}", path.display())),
            Err(e) => section.push(
                Status::Warn,
                format!(
                    "{label}: {} is not valid JSON and will be reset ({e})",
                    path.display()
                ),
            ),
        },
        Err(e) => section.push(
            Status::Fail,
            format!("{label}: cannot read {}: {e}", path.display()),
        ),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    impl Section {
        fn statuses(&self) -> Vec<Status> {
            self.items.iter().map(|i| i.status).collect()
        }
    }

    fn config() -> TgdcConfig {
        TgdcConfig {
            telegram: json!({ "token": "123456:secret" }),
            discord: json!({ "token": "dc", "guild_id": 1, "channel_id": 2 }),
            ..Default::default()
        }
    }

    #[test]
    fn print_report_counts_errors_and_warnings() {
        let mut section = Section::new("test");
        section.push(Status::Ok, "fine");
        section.push(Status::Warn, "caution");
        section.push(Status::Warn, "caution2");
        section.push(Status::Fail, "broken");
        section.push(Status::Info, "note");

        let (errors, warnings) = print_report(&[section]);
        assert_eq!(errors, 1);
        assert_eq!(warnings, 2);
    }

    #[test]
    fn valid_config_passes() {
        let section = check_config(&config(), None);
        assert_eq!(section.statuses(), vec![Status::Info, Status::Ok]);
    }

    #[test]
    fn missing_tokens_fail() {
        let section = check_config(&TgdcConfig::default(), None);
        let fails = section
            .statuses()
            .into_iter()
            .filter(|s| *s == Status::Fail)
            .count();
        assert_eq!(fails, 2);
    }

    #[test]
    fn telegram_token_shape() {
        assert_eq!(check_telegram(&config()).statuses(), vec![
            Status::Ok,
            Status::Info
        ]);

        let mut cfg = config();
        cfg.telegram = json!({ "token": "garbage", "avatar_url_template": "https://x/a.png" });
        assert_eq!(check_telegram(&cfg).statuses(), vec![
            Status::Warn,
            Status::Warn
        ]);
    }

    #[test]
    fn discord_ids() {
        assert_eq!(check_discord(&config()).statuses(), vec![
            Status::Ok,
            Status::Ok
        ]);

        let mut cfg = config();
        cfg.discord = json!({ "token": "dc", "channel_id": "general" });
        assert_eq!(check_discord(&cfg).statuses(), vec![
            Status::Info,
            Status::Fail
        ]);
    }

    #[test]
    fn state_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        let subscribers = dir.path().join("subscribers.json");
        std::fs::write(&state, "{not json").unwrap();
        std::fs::write(&subscribers, "[\"1\"]").unwrap();

        let mut cfg = config();
        cfg.storage.state_path = Some(state);
        cfg.storage.subscribers_path = Some(subscribers);
        cfg.storage.media_dir = Some(dir.path().to_path_buf());

        assert_eq!(check_storage(&cfg).statuses(), vec![Status::Warn, Status::Ok]);
    }

    #[test]
    fn missing_state_is_informational() {
        let dir = tempfile::tempdir().unwrap();
        let mut section = Section::new("s");
        check_json_file(&mut section, "relay state", &dir.path().join("none.json"));
        assert_eq!(section.statuses(), vec![Status::Info]);
    }
}
