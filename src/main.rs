// ABOUTME: Main entry point for the shoal relay
// ABOUTME: Parses the CLI, initializes logging and config, then hands every task to the supervisor

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shoal::config::Config;
use shoal::paths;
use shoal::relay;

#[derive(Parser)]
#[command(name = "shoal", version, about = "Chat relay between messaging backends")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: $SHOAL_CONFIG_PATH, ./config.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (default when no subcommand is provided).
    Run,
    /// Load and validate configuration, then print the room bindings.
    Check,
    /// Print a summary of the resolved configuration.
    Debug,
}

/// Initialise tracing: console output plus a daily log file under the data dir.
///
/// The returned guard flushes the file writer and must live as long as main.
fn init_telemetry(cli: &Cli) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let log_dir = paths::log_dir();
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "shoal.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(e) => {
            eprintln!("Cannot create log dir {}: {}", log_dir.display(), e);
            (None, None)
        }
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .init();
    }
    guard
}

#[derive(Serialize)]
struct ConfigSummary {
    bindings: Vec<BindingSummary>,
    localstore: Option<String>,
    telegram_configured: bool,
    telegram_relay: bool,
    operator_recipients: usize,
    console_enabled: bool,
    notify_timeout_secs: u64,
}

#[derive(Serialize)]
struct BindingSummary {
    channel: String,
    rooms: Vec<(String, String)>,
}

fn summarize(config: &Config) -> Result<ConfigSummary> {
    let mut bindings = Vec::new();
    for channel in config.bound_channels() {
        let binding = config.binding_for(channel)?;
        bindings.push(BindingSummary {
            channel: channel.to_string(),
            rooms: binding
                .rooms()
                .into_iter()
                .map(|(room, logical)| (room.to_string(), logical.to_string()))
                .collect(),
        });
    }
    Ok(ConfigSummary {
        bindings,
        localstore: config
            .localstore
            .as_ref()
            .map(|s| format!("{} -> {}", s.path, s.base_url)),
        telegram_configured: config.telegram.is_some(),
        telegram_relay: config.telegram.as_ref().is_some_and(|tg| tg.relay),
        operator_recipients: config.operator_recipients().len(),
        console_enabled: config.console.enabled,
        notify_timeout_secs: config.supervisor.notify_timeout_secs,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let log_guard = init_telemetry(&cli);

    // Log panics before they take the process down
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            panic = %panic_info,
            backtrace = %std::backtrace::Backtrace::force_capture(),
            "Panic"
        );
    }));

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Check => {
            for binding in summarize(&config)?.bindings {
                println!("{}:", binding.channel);
                for (room, logical) in binding.rooms {
                    println!("  {} -> {}", room, logical);
                }
            }
            println!("Configuration OK");
            Ok(())
        }
        Commands::Debug => {
            println!("{}", serde_json::to_string_pretty(&summarize(&config)?)?);
            Ok(())
        }
        Commands::Run => {
            tracing::info!(
                bindings = config.bindings.len(),
                backends = ?config.bound_channels(),
                "Starting shoal relay"
            );
            let relay = relay::build(&config).await?;
            tracing::info!(tasks = ?relay.supervisor.task_names(), "Relay wired");
            relay.supervisor.run_all(log_guard).await
        }
    }
}
