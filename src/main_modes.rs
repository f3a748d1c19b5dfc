use statbot::adapters::ChannelPlatform;
use statbot::cli;
use statbot::config::AppConfig;
use statbot::domain::Snapshots;
use statbot::error::Result;
use statbot::persistence::ChannelRegistry;
use statbot::services::{HealthServer, HealthState, Metrics};
use std::path::Path;
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::main_runtime::{build_platform, build_reconciler, reconciler_settings, shutdown_signal};

/// Load the registry and fold in legacy marker files, if configured
fn open_registry(config: &AppConfig) -> Result<ChannelRegistry> {
    let mut registry = ChannelRegistry::load_or_empty(&config.registry.path)?;
    if let Some(dir) = &config.registry.legacy_marker_dir {
        if dir.is_dir() {
            let imported = registry.import_legacy_markers(dir)?;
            if imported > 0 {
                registry.persist()?;
            }
        } else {
            warn!("Legacy marker directory {} does not exist", dir.display());
        }
    }
    Ok(registry)
}

/// Long-running mode: one tick per interval until a shutdown signal
pub async fn run_daemon(config: AppConfig) -> Result<()> {
    let registry = open_registry(&config)?;
    let mut reconciler = build_reconciler(&config, registry, reconciler_settings(&config))?;

    info!(
        "Starting statbot: {} roles, every {}s, slow roles every {} ticks",
        config.active_roles().len(),
        config.schedule.interval_secs,
        config.schedule.ticks_per_slow_cycle
    );

    match reconciler.verify_bindings().await {
        Ok(0) => {}
        Ok(n) => info!("{} bound channels were deleted and will be recreated", n),
        Err(e) => warn!("Could not list guild channels, keeping all bindings: {}", e),
    }

    let metrics = Arc::new(Metrics::new());
    let health = Arc::new(HealthState::new(
        Arc::clone(&metrics),
        config.schedule.interval_secs,
    ));
    if let Some(port) = config.health_port {
        let server = HealthServer::new(Arc::clone(&health), port);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Health server stopped: {}", e);
            }
        });
    }

    let mut interval = tokio::time::interval(Duration::from_secs(config.schedule.interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut snapshots = Snapshots::default();
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = interval.tick() => {
                match reconciler.run_tick(std::mem::take(&mut snapshots)).await {
                    Ok(outcome) => {
                        health
                            .record_tick(&outcome.report, reconciler.registry().len())
                            .await;
                        snapshots = outcome.snapshots;
                    }
                    Err(e) => {
                        error!("Tick aborted: {}", e);
                        if let Err(persist_err) = reconciler.flush() {
                            error!("Failed to persist channel registry: {}", persist_err);
                        }
                        return Err(e);
                    }
                }
            }
        }
    }

    reconciler.flush()?;
    info!("Stopped after {} ticks ({})", reconciler.ticks_run(), metrics.summary());
    Ok(())
}

/// Run one tick with every role due and print its report
pub async fn run_once(config: AppConfig) -> Result<()> {
    let registry = open_registry(&config)?;
    let mut settings = reconciler_settings(&config);
    settings.refresh_slow_on_start = true;
    let mut reconciler = build_reconciler(&config, registry, settings)?;

    if let Err(e) = reconciler.verify_bindings().await {
        warn!("Could not list guild channels, keeping all bindings: {}", e);
    }
    let outcome = reconciler.run_tick(Snapshots::default()).await?;
    reconciler.flush()?;
    cli::print_report(&outcome.report)
}

/// Fetch everything and print the labels; nothing is created or renamed
pub async fn run_preview(config: AppConfig) -> Result<()> {
    let registry = ChannelRegistry::empty(&config.registry.path);
    let reconciler = build_reconciler(&config, registry, reconciler_settings(&config))?;
    let (_, labels) = reconciler.preview().await;
    cli::print_preview(&labels);
    Ok(())
}

pub async fn show_channels(config: AppConfig) -> Result<()> {
    let registry = ChannelRegistry::load(&config.registry.path)?;
    let platform = build_platform(&config)?;
    let channels = match platform.list_channels().await {
        Ok(channels) => Some(channels),
        Err(e) => {
            warn!("Could not list guild channels: {}", e);
            None
        }
    };
    cli::print_channels(&registry, channels.as_deref());
    Ok(())
}

pub fn run_migrate(config: AppConfig, from: &Path) -> Result<()> {
    let mut registry = ChannelRegistry::load_or_empty(&config.registry.path)?;
    let imported = registry.import_legacy_markers(from)?;
    if registry.is_dirty() {
        registry.persist()?;
    }
    println!(
        "Imported {} channel markers from {} into {} ({} bindings total)",
        imported,
        from.display(),
        registry.path().display(),
        registry.len()
    );
    Ok(())
}
