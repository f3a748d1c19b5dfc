//! Reconciliation driver
//!
//! One tick runs FETCH -> RESOLVE_CHANNELS -> RENAME -> PERSIST, strictly in
//! that order. Recoverable failures are logged and confined to the role or
//! family they hit; only `UnknownRole` aborts the tick.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::adapters::{ChannelKind, ChannelPlatform, StatFetcher};
use crate::domain::{
    FloorPriceSnapshot, RigTelemetrySnapshot, Snapshots, StatFamily, StatRole, TokenBatch,
};
use crate::error::{Result, StatBotError};
use crate::labels::{self, LabelStyle, CHANNEL_NAME_MAX, NICKNAME_MAX};
use crate::persistence::ChannelRegistry;
use crate::scheduler::{CadenceScheduler, DueSet};

/// The data sources a deployment has configured
pub struct Fetchers {
    pub tokens: Box<dyn StatFetcher<Snapshot = TokenBatch>>,
    pub floor: Option<Box<dyn StatFetcher<Snapshot = FloorPriceSnapshot>>>,
    pub rig: Option<Box<dyn StatFetcher<Snapshot = RigTelemetrySnapshot>>>,
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Roles to display, in reconciliation order
    pub roles: Vec<StatRole>,
    pub style: LabelStyle,
    pub channel_kind: ChannelKind,
    pub ticks_per_slow_cycle: u32,
    pub refresh_slow_on_start: bool,
    pub nickname_ticker: Option<String>,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub slow_due: bool,
    pub due_roles: Vec<StatRole>,
    pub fetch_failures: Vec<StatFamily>,
    pub created: Vec<StatRole>,
    pub renamed: Vec<StatRole>,
    pub unchanged: Vec<StatRole>,
    /// No label, label too long, or channel creation failed
    pub skipped: Vec<StatRole>,
    pub rename_failed: Vec<StatRole>,
    pub nickname_updated: bool,
    pub persisted: bool,
}

/// Snapshots to carry into the next tick, plus the report of this one
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub snapshots: Snapshots,
    pub report: TickReport,
}

pub struct Reconciler<P: ChannelPlatform> {
    platform: P,
    fetchers: Fetchers,
    registry: ChannelRegistry,
    scheduler: CadenceScheduler,
    settings: ReconcilerSettings,
    ticks_run: u64,
    last_nickname: Option<String>,
}

impl<P: ChannelPlatform> Reconciler<P> {
    pub fn new(
        platform: P,
        fetchers: Fetchers,
        registry: ChannelRegistry,
        settings: ReconcilerSettings,
    ) -> Result<Self> {
        let scheduler = CadenceScheduler::new(settings.ticks_per_slow_cycle)?;
        Ok(Self {
            platform,
            fetchers,
            registry,
            scheduler,
            settings,
            ticks_run: 0,
            last_nickname: None,
        })
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &CadenceScheduler {
        &self.scheduler
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    /// Drop bindings whose channel was deleted on the platform.
    ///
    /// Returns how many bindings were forgotten; they are recreated on the
    /// next tick that has them due.
    pub async fn verify_bindings(&mut self) -> Result<usize> {
        let channels = self.platform.list_channels().await?;
        let stale: Vec<StatRole> = self
            .registry
            .bindings()
            .filter(|b| !channels.iter().any(|c| c.id == b.channel_id))
            .map(|b| b.role.clone())
            .collect();

        for role in &stale {
            if let Some(binding) = self.registry.forget(role) {
                warn!(
                    role = %role,
                    channel_id = %binding.channel_id,
                    "Bound channel no longer exists, it will be recreated"
                );
            }
        }
        Ok(stale.len())
    }

    /// Run one full reconciliation tick.
    ///
    /// `previous` are the snapshots returned by the last tick; failed fetches
    /// leave their entry untouched.
    pub async fn run_tick(&mut self, previous: Snapshots) -> Result<TickOutcome> {
        self.ticks_run += 1;
        let mut due = self.scheduler.advance();
        if self.ticks_run == 1 && self.settings.refresh_slow_on_start {
            due = DueSet { slow: true };
        }
        let slow_due = due.slow;

        let due_roles: Vec<StatRole> = self
            .settings
            .roles
            .iter()
            .filter(|role| due.includes(role.cadence()))
            .cloned()
            .collect();

        let mut report = TickReport {
            tick: self.ticks_run,
            slow_due,
            due_roles: due_roles.clone(),
            ..TickReport::default()
        };
        debug!(
            tick = self.ticks_run,
            slow_due,
            "Tick started with {} due roles",
            due_roles.len()
        );

        // FETCH
        let snapshots = self.fetch(previous, &due_roles, &mut report).await;

        // Labels are pure; generate them before touching the platform
        let labels: Vec<(StatRole, Option<String>)> = due_roles
            .iter()
            .map(|role| (role.clone(), self.generate_label(role, &snapshots)))
            .collect();

        // RESOLVE_CHANNELS
        let mut resolved: Vec<(StatRole, Option<String>)> = Vec::with_capacity(labels.len());
        for (role, label) in labels {
            if self.registry.resolve(&role).is_some() {
                resolved.push((role, label));
                continue;
            }

            let initial_name = label
                .clone()
                .unwrap_or_else(|| role.placeholder_label());
            let platform = &self.platform;
            let kind = self.settings.channel_kind;
            let created = self
                .registry
                .ensure(&role, || platform.create_channel(&initial_name, kind))
                .await;

            match created {
                Ok(channel_id) => {
                    info!(role = %role, channel_id = %channel_id, "Created stat channel '{}'", initial_name);
                    self.registry.record_label(&role, &initial_name)?;
                    report.created.push(role.clone());
                    resolved.push((role, label));
                }
                Err(e) => {
                    let err = StatBotError::ChannelCreateFailed {
                        role: role.clone(),
                        reason: e.to_string(),
                    };
                    warn!(role = %role, "{}; retrying next tick", err);
                    report.skipped.push(role);
                }
            }
        }

        // RENAME
        for (role, label) in resolved {
            let Some(label) = label else {
                report.skipped.push(role);
                continue;
            };
            let Some(binding) = self.registry.binding(&role) else {
                return Err(StatBotError::UnknownRole(role));
            };
            if binding.last_label == label {
                if !report.created.contains(&role) {
                    report.unchanged.push(role);
                }
                continue;
            }

            let channel_id = binding.channel_id.clone();
            match self.platform.rename_channel(&channel_id, &label).await {
                Ok(()) => {
                    info!(role = %role, channel_id = %channel_id, "Renamed to '{}'", label);
                    self.registry.record_label(&role, &label)?;
                    report.renamed.push(role);
                }
                Err(e) => {
                    let err = StatBotError::RenameFailed {
                        role: role.clone(),
                        reason: e.to_string(),
                    };
                    warn!(role = %role, channel_id = %channel_id, "{}", err);
                    report.rename_failed.push(role);
                }
            }
        }

        report.nickname_updated = self.update_nickname(&snapshots).await;

        // PERSIST
        if self.registry.is_dirty() {
            match self.registry.persist() {
                Ok(()) => report.persisted = true,
                Err(e) => error!(
                    "Failed to persist channel registry to {}: {}",
                    self.registry.path().display(),
                    e
                ),
            }
        }

        info!(
            tick = report.tick,
            renamed = report.renamed.len(),
            created = report.created.len(),
            unchanged = report.unchanged.len(),
            skipped = report.skipped.len(),
            rename_failed = report.rename_failed.len(),
            fetch_failures = report.fetch_failures.len(),
            "Tick complete"
        );
        Ok(TickOutcome { snapshots, report })
    }

    /// Fetch every family and render every configured label, without
    /// touching the platform or the scheduler
    pub async fn preview(&self) -> (Snapshots, Vec<(StatRole, Result<String>)>) {
        let mut ignored = TickReport::default();
        let all_roles = self.settings.roles.clone();
        let snapshots = self
            .fetch(Snapshots::default(), &all_roles, &mut ignored)
            .await;
        let labels = all_roles
            .into_iter()
            .map(|role| {
                let label = labels::label_for(&role, &snapshots, &self.settings.style);
                (role, label)
            })
            .collect();
        (snapshots, labels)
    }

    /// Persist outstanding registry changes, e.g. before exit
    pub fn flush(&mut self) -> Result<()> {
        if self.registry.is_dirty() {
            self.registry.persist()?;
        }
        Ok(())
    }

    async fn fetch(
        &self,
        previous: Snapshots,
        due_roles: &[StatRole],
        report: &mut TickReport,
    ) -> Snapshots {
        let needs = |family: StatFamily| due_roles.iter().any(|r| r.inputs().contains(&family));
        let mut snapshots = previous;

        if needs(StatFamily::TokenPrices) || self.settings.nickname_ticker.is_some() {
            match self.fetchers.tokens.fetch().await {
                Ok(batch) => snapshots.tokens = Some(batch),
                Err(e) => {
                    let family = self.fetchers.tokens.family();
                    warn!(family = %family, "{}; keeping previous prices", e);
                    report.fetch_failures.push(family);
                }
            }
        }

        if needs(StatFamily::FloorPrice) {
            if let Some(fetcher) = &self.fetchers.floor {
                match fetcher.fetch().await {
                    Ok(floor) => snapshots.floor = Some(floor),
                    Err(e) => {
                        warn!(family = %fetcher.family(), "{}; keeping previous floor", e);
                        report.fetch_failures.push(fetcher.family());
                    }
                }
            }
        }

        if needs(StatFamily::RigTelemetry) {
            if let Some(fetcher) = &self.fetchers.rig {
                match fetcher.fetch().await {
                    Ok(rig) => snapshots.rig = Some(rig),
                    Err(e) => {
                        warn!(family = %fetcher.family(), "{}; keeping previous telemetry", e);
                        report.fetch_failures.push(fetcher.family());
                    }
                }
            }
        }

        snapshots
    }

    fn generate_label(&self, role: &StatRole, snapshots: &Snapshots) -> Option<String> {
        let label = match labels::label_for(role, snapshots, &self.settings.style) {
            Ok(label) => label,
            Err(e) => {
                warn!(role = %role, "No label this tick: {}", e);
                return None;
            }
        };

        let len = label.chars().count();
        if len > CHANNEL_NAME_MAX {
            let err = StatBotError::LabelTooLong {
                role: role.clone(),
                len,
                max: CHANNEL_NAME_MAX,
            };
            warn!(role = %role, "{}; keeping the current name", err);
            return None;
        }
        Some(label)
    }

    async fn update_nickname(&mut self, snapshots: &Snapshots) -> bool {
        let Some(ticker) = self.settings.nickname_ticker.as_deref() else {
            return false;
        };
        let token = match snapshots.tokens().and_then(|batch| batch.get(ticker)) {
            Ok(token) => token,
            Err(e) => {
                warn!("No nickname this tick: {}", e);
                return false;
            }
        };

        let nickname = labels::nickname_label(token, &self.settings.style);
        if nickname.chars().count() > NICKNAME_MAX {
            warn!(
                "Nickname '{}' exceeds {} characters, keeping the current one",
                nickname, NICKNAME_MAX
            );
            return false;
        }
        if self.last_nickname.as_deref() == Some(nickname.as_str()) {
            return false;
        }

        match self.platform.set_nickname(&nickname).await {
            Ok(()) => {
                info!("Updated nickname to '{}'", nickname);
                self.last_nickname = Some(nickname);
                true
            }
            Err(e) => {
                warn!("Failed to update nickname: {}", e);
                false
            }
        }
    }
}
