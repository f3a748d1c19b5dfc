use statbot::adapters::{
    ChannelKind, DiscordClient, FloorPriceFetcher, JsonHttp, RigTelemetryFetcher, StatFetcher,
    TokenPriceFetcher,
};
use statbot::domain::{FloorPriceSnapshot, RigTelemetrySnapshot};
use statbot::config::{AppConfig, LoggingConfig};
use statbot::error::{Result, StatBotError};
use statbot::persistence::ChannelRegistry;
use statbot::services::{Fetchers, Reconciler, ReconcilerSettings};
use std::future::Future;
use tokio::signal;
use tracing::error;
use tracing_subscriber::EnvFilter;

pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},statbot=debug,hyper=warn", logging.level))
    });

    // Prefer the configured dir, fall back to STATBOT_LOG_DIR
    let log_dir = logging
        .dir
        .clone()
        .or_else(|| std::env::var("STATBOT_LOG_DIR").ok());

    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial file, so writability is checked first.
    let file_layer = log_dir.as_deref().and_then(|log_dir| {
        if std::fs::create_dir_all(log_dir).is_err() {
            eprintln!(
                "Warning: Could not create log directory {}, file logging disabled",
                log_dir
            );
            return None;
        }
        let test_path = std::path::Path::new(log_dir).join(".statbot_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(log_dir, "statbot.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Flushes on drop; the process runs until exit
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    let (json_layer, console_layer) = if logging.json {
        (
            Some(tracing_subscriber::fmt::layer().json().with_target(true)),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/statbot.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

pub fn load_config(config_dir: &std::path::Path) -> Result<AppConfig> {
    let config = AppConfig::load_from(config_dir)?;
    config
        .validate()
        .map_err(|errors| StatBotError::Validation(errors.join("; ")))?;
    Ok(config)
}

pub fn build_platform(config: &AppConfig) -> Result<DiscordClient> {
    DiscordClient::new(
        config.discord.api_base.as_deref(),
        &config.discord.token,
        &config.discord.guild_id,
        config.discord.category_id.clone(),
        config.discord.lock_channels,
    )
}

pub fn build_fetchers(config: &AppConfig) -> Result<Fetchers> {
    let http = JsonHttp::new(config.sources.request_timeout_secs)?;
    let sources = &config.sources;

    let floor: Option<Box<dyn StatFetcher<Snapshot = FloorPriceSnapshot>>> =
        match (&sources.floor_url, config.roles.floor) {
            (Some(url), true) => Some(Box::new(FloorPriceFetcher::new(http.clone(), url))),
            _ => None,
        };
    let rig: Option<Box<dyn StatFetcher<Snapshot = RigTelemetrySnapshot>>> =
        match (&sources.rig_url, config.roles.mining) {
            (Some(url), true) => Some(Box::new(RigTelemetryFetcher::new(
                http.clone(),
                url,
                sources.rig_api_key.clone(),
            ))),
            _ => None,
        };

    Ok(Fetchers {
        tokens: Box::new(TokenPriceFetcher::new(
            http,
            &sources.token_base_url,
            &sources.token_query_id,
        )),
        floor,
        rig,
    })
}

pub fn reconciler_settings(config: &AppConfig) -> ReconcilerSettings {
    ReconcilerSettings {
        roles: config.active_roles(),
        style: config.label_style(),
        channel_kind: ChannelKind::Voice,
        ticks_per_slow_cycle: config.schedule.ticks_per_slow_cycle,
        refresh_slow_on_start: config.schedule.refresh_slow_on_start,
        nickname_ticker: config.display.nickname_ticker.clone(),
    }
}

pub fn build_reconciler(
    config: &AppConfig,
    registry: ChannelRegistry,
    settings: ReconcilerSettings,
) -> Result<Reconciler<DiscordClient>> {
    Reconciler::new(
        build_platform(config)?,
        build_fetchers(config)?,
        registry,
        settings,
    )
}

/// Resolve when `listen` does; a handler that fails to install never fires
async fn signal_or_pending<F>(name: &str, listen: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = listen.await {
        error!("Failed to install {} handler, it will not stop the bot: {}", name, e);
        std::future::pending::<()>().await;
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = signal_or_pending("Ctrl+C", signal::ctrl_c());

    #[cfg(unix)]
    let terminate = signal_or_pending("SIGTERM", async {
        let mut stream = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        stream.recv().await;
        Ok(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
