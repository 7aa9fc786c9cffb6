mod bridge;
mod doctor_commands;
mod state_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tgdc_config::TgdcConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "tgdc", about = "Relay messages between Telegram chats and a Discord channel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "TGDC_CONFIG")]
    config: Option<PathBuf>,
    /// `KEY=value` file loaded into the environment before the config.
    #[arg(long, global = true, env = "TGDC_ENV_FILE", default_value = "key.env")]
    env_file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default when no subcommand is provided).
    Run,
    /// Check configuration, tokens and state files.
    Doctor,
    /// Inspect or change the persisted bridge settings.
    State {
        #[command(subcommand)]
        action: state_commands::StateAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Explicit `--config` file, or discovery in the standard locations.
/// Environment fallbacks apply either way.
fn load_config(cli: &Cli) -> anyhow::Result<TgdcConfig> {
    match &cli.config {
        Some(path) => Ok(tgdc_config::apply_env_overrides(
            tgdc_config::load_config(path)?,
        )),
        None => Ok(tgdc_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    tgdc_config::load_env_file(&cli.env_file)?;
    let config = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "tgdc starting");
            bridge::run(config).await
        },
        Some(Commands::Doctor) => doctor_commands::handle_doctor(&config, cli.config.as_deref()),
        Some(Commands::State { action }) => state_commands::handle_state(&config, action).await,
    }
}
