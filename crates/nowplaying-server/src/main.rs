mod error;
mod http;
mod system;
mod ws;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use nowplaying_core::adapter::mock::DemoAdapter;
use nowplaying_core::config::AppConfig;
use nowplaying_core::service::AdapterTask;
use nowplaying_core::MediaService;
use nowplaying_detect::{
    available_adapters, NotificationFeed, NotificationSender, SourceDatabase, SourceFilter,
};

use crate::error::ServerError;
use crate::system::SystemInfo;

const DEFAULT_LOG_FILTER: &str = "nowplaying=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "nowplaying", version)]
#[command(about = "Serve what is currently playing over HTTP and WebSocket", long_about = None)]
#[command(after_help = "Filter modes:
  all          All media sources (default)
  no-browser   Exclude browsers (Chromium, Firefox, Chrome, etc.)
  apps-only    Dedicated media apps only (same as no-browser)")]
struct Cli {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Which media sources to report: all, no-browser, apps-only
    #[arg(short, long)]
    filter: Option<String>,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long a source may stay silent before it is forgotten
    #[arg(long)]
    freshness_window_ms: Option<u64>,

    /// Snapshots buffered per push subscriber
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Log level or filter directive (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Also write daily-rotated logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Replace platform adapters with a fake player
    #[arg(long)]
    demo: bool,

    /// Accept notification text on POST /notifications
    #[arg(long)]
    accept_notifications: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_level.as_deref(), cli.log_dir.as_ref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: Option<&str>, log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = match level {
        Some(level) if level.contains('=') => EnvFilter::new(level),
        Some(level) => EnvFilter::new(format!("nowplaying={level},tower_http={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "nowplaying.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<AppConfig, ServerError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .map_err(|e| ServerError::Config(e.to_string()))?;

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(filter) = &cli.filter {
        config.adapters.filter = filter.clone();
    }
    if let Some(window) = cli.freshness_window_ms {
        config.aggregator.freshness_window_ms = window;
    }
    if let Some(capacity) = cli.queue_capacity {
        config.hub.queue_capacity = capacity;
    }
    if cli.accept_notifications {
        config.adapters.accept_notifications = true;
    }

    config
        .validate()
        .map_err(|e| ServerError::Config(e.to_string()))?;
    Ok(config)
}

struct AdapterSelection {
    adapters: Vec<AdapterTask>,
    notifications: Option<NotificationSender>,
}

/// Blocking: platform probes may run subprocesses.
fn select_adapters(config: &AppConfig, demo: bool) -> Result<AdapterSelection, ServerError> {
    let filter: SourceFilter = config
        .adapters
        .filter
        .parse()
        .map_err(ServerError::Config)?;

    let db = SourceDatabase::load(&AppConfig::sources_path());
    let interval = config.adapters.poll_interval();

    let mut adapters = if demo {
        info!("Demo mode, platform adapters disabled");
        let demo: AdapterTask = (Box::new(DemoAdapter::new(interval)), interval);
        vec![demo]
    } else {
        available_adapters(&config.adapters, filter, &db)
    };

    let notifications = config.adapters.accept_notifications.then(|| {
        let (sender, feed) = NotificationFeed::new("notifications", db);
        adapters.push((Box::new(feed), interval));
        sender
    });

    Ok(AdapterSelection {
        adapters,
        notifications,
    })
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let config = load_config(&cli)?;
    let selection = {
        let config = config.clone();
        let demo = cli.demo;
        tokio::task::spawn_blocking(move || select_adapters(&config, demo)).await??
    };

    let service = MediaService::start(&config, selection.adapters);
    let state = http::AppState::from_service(&service, SystemInfo::collect(), selection.notifications);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(source) => {
            service.shutdown().await;
            return Err(ServerError::Bind { addr, source });
        }
    };
    info!(
        addr = %addr,
        freshness_window_ms = config.aggregator.freshness_window_ms,
        filter = %config.adapters.filter,
        "Listening"
    );

    let served = axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal(service.shutdown_token()))
        .await;

    service.shutdown().await;
    served.map_err(ServerError::Serve)
}

/// Resolves on Ctrl-C and cancels `token` so push sessions close too.
async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                token.cancelled().await;
                return;
            }
            info!("Shutting down");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use nowplaying_core::Adapter;

    use super::*;

    const DEFAULT_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "nowplaying",
            "--config",
            DEFAULT_CONFIG,
            "--port",
            "9000",
            "-f",
            "no-browser",
            "--freshness-window-ms",
            "5000",
            "--queue-capacity",
            "4",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.adapters.filter, "no-browser");
        assert_eq!(config.aggregator.freshness_window_ms, 5000);
        assert_eq!(config.hub.queue_capacity, 4);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from([
            "nowplaying",
            "--config",
            DEFAULT_CONFIG,
            "--queue-capacity",
            "0",
        ]);
        assert!(matches!(load_config(&cli), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        let config = AppConfig {
            adapters: nowplaying_core::config::AdaptersConfig {
                filter: "everything".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            select_adapters(&config, false),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_demo_mode_uses_demo_adapter() {
        let selection = select_adapters(&AppConfig::default(), true).unwrap();
        assert_eq!(selection.adapters.len(), 1);
        assert_eq!(selection.adapters[0].0.name(), "demo");
        assert!(selection.notifications.is_none());
    }

    #[test]
    fn test_accept_notifications_adds_feed() {
        let cli = Cli::parse_from([
            "nowplaying",
            "--config",
            DEFAULT_CONFIG,
            "--accept-notifications",
        ]);
        let config = load_config(&cli).unwrap();
        let selection = select_adapters(&config, true).unwrap();

        let names: Vec<&str> = selection.adapters.iter().map(|(a, _)| a.name()).collect();
        assert_eq!(names, ["demo", "notifications"]);
        assert!(selection.notifications.is_some());
    }
}
