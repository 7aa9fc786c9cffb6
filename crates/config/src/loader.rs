use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{env_subst::substitute_env, schema::TgdcConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["tgdc.toml", "tgdc.yaml", "tgdc.yml", "tgdc.json"];

/// Environment fallbacks: variable, platform section, key.
const ENV_FALLBACKS: &[(&str, &str, &str)] = &[
    ("TG_TOKEN", "telegram", "token"),
    ("DC_TOKEN", "discord", "token"),
    ("DISCORD_GUILD_ID", "discord", "guild_id"),
    ("DISCORD_CHANNEL_ID", "discord", "channel_id"),
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<TgdcConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./tgdc.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/tgdc/tgdc.{toml,yaml,yml,json}` (user-global)
///
/// Returns `TgdcConfig::default()` if no config file is found or it fails
/// to parse; environment fallbacks are applied either way.
pub fn discover_and_load() -> TgdcConfig {
    let config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                TgdcConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        TgdcConfig::default()
    };
    apply_env_overrides(config)
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/tgdc/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tgdc").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory, or `./` when no home is known.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "tgdc")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load `KEY=value` pairs from `path` into the process environment.
///
/// Variables already set win. A missing file is not an error.
pub fn load_env_file(path: &Path) -> anyhow::Result<bool> {
    if !path.exists() {
        debug!(path = %path.display(), "no env file");
        return Ok(false);
    }
    dotenvy::from_path(path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?;
    info!(path = %path.display(), "loaded env file");
    Ok(true)
}

/// Fill missing tokens and Discord ids from `TG_TOKEN`, `DC_TOKEN`,
/// `DISCORD_GUILD_ID` and `DISCORD_CHANNEL_ID`.
pub fn apply_env_overrides(config: TgdcConfig) -> TgdcConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: TgdcConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> TgdcConfig {
    for &(var, section, key) in ENV_FALLBACKS {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let target = match section {
            "telegram" => &mut config.telegram,
            _ => &mut config.discord,
        };
        if !target.is_object() {
            *target = serde_json::Value::Object(serde_json::Map::new());
        }
        let Some(map) = target.as_object_mut() else {
            continue;
        };
        if map.get(key).is_some_and(|v| !is_blank(v)) {
            continue;
        }
        let value = value.trim();
        let json = if key.ends_with("_id") {
            match value.parse::<u64>() {
                Ok(id) => serde_json::Value::from(id),
                Err(_) => {
                    warn!(var, "ignoring non-numeric id from environment");
                    continue;
                },
            }
        } else {
            serde_json::Value::from(value)
        };
        debug!(var, section, key, "config value taken from environment");
        map.insert(key.to_string(), json);
    }
    config
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<TgdcConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
