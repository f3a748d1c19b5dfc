use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use statbot::adapters::{ChannelKind, ChannelPlatform, PlatformChannel, StatFetcher};
use statbot::domain::{
    FloorPriceSnapshot, RigTelemetrySnapshot, Snapshots, StatFamily, StatRole, TokenBatch,
    TokenSnapshot,
};
use statbot::error::{Result, StatBotError};
use statbot::labels::LabelStyle;
use statbot::persistence::ChannelRegistry;
use statbot::services::{Fetchers, Reconciler, ReconcilerSettings};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-memory guild that records every call
#[derive(Clone, Default)]
struct FakeGuild {
    inner: Arc<Mutex<GuildState>>,
}

#[derive(Default)]
struct GuildState {
    next_id: u64,
    channels: Vec<PlatformChannel>,
    creates: usize,
    renames: Vec<(String, String)>,
    fail_renames: bool,
}

impl FakeGuild {
    fn creates(&self) -> usize {
        self.inner.lock().unwrap().creates
    }

    fn renames(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().renames.clone()
    }

    fn name_of(&self, id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .channels
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
    }

    fn delete(&self, id: &str) {
        self.inner.lock().unwrap().channels.retain(|c| c.id != id);
    }

    fn set_fail_renames(&self, fail: bool) {
        self.inner.lock().unwrap().fail_renames = fail;
    }
}

#[async_trait]
impl ChannelPlatform for FakeGuild {
    async fn create_channel(&self, name: &str, kind: ChannelKind) -> Result<String> {
        let mut state = self.inner.lock().unwrap();
        state.next_id += 1;
        state.creates += 1;
        let id = format!("{}", 1000 + state.next_id);
        state.channels.push(PlatformChannel {
            id: id.clone(),
            name: name.to_string(),
            kind: Some(kind),
        });
        Ok(id)
    }

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_renames {
            return Err(StatBotError::RateLimited("rename".to_string()));
        }
        let channel = state
            .channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| StatBotError::Platform(format!("unknown channel {}", channel_id)))?;
        channel.name = name.to_string();
        state
            .renames
            .push((channel_id.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<PlatformChannel>> {
        Ok(self.inner.lock().unwrap().channels.clone())
    }

    async fn set_nickname(&self, _nickname: &str) -> Result<()> {
        Ok(())
    }
}

/// Token fetcher whose BTC price steps up by one dollar per fetch
struct SteppingPrices {
    calls: Mutex<u32>,
}

#[async_trait]
impl StatFetcher for SteppingPrices {
    type Snapshot = TokenBatch;

    fn family(&self) -> StatFamily {
        StatFamily::TokenPrices
    }

    async fn fetch(&self) -> Result<TokenBatch> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let now = Utc::now();
        let token = |symbol: &str, price| TokenSnapshot {
            symbol: symbol.to_string(),
            current_price: price,
            price_change_24h: dec!(10),
            price_change_percent_24h: dec!(0.5),
            as_of: now,
        };
        Ok(TokenBatch::new(
            vec![
                token("btc", dec!(50000) + rust_decimal::Decimal::from(*calls)),
                token("luna", dec!(0.98)),
            ],
            now,
        ))
    }
}

struct FixedFloor;

#[async_trait]
impl StatFetcher for FixedFloor {
    type Snapshot = FloorPriceSnapshot;

    fn family(&self) -> StatFamily {
        StatFamily::FloorPrice
    }

    async fn fetch(&self) -> Result<FloorPriceSnapshot> {
        Ok(FloorPriceSnapshot {
            floor_in_base_token: dec!(980),
            as_of: Utc::now(),
        })
    }
}

struct DownRig;

#[async_trait]
impl StatFetcher for DownRig {
    type Snapshot = RigTelemetrySnapshot;

    fn family(&self) -> StatFamily {
        StatFamily::RigTelemetry
    }

    async fn fetch(&self) -> Result<RigTelemetrySnapshot> {
        Err(StatBotError::fetch_failed(
            StatFamily::RigTelemetry,
            "connection refused",
        ))
    }
}

fn fetchers() -> Fetchers {
    Fetchers {
        tokens: Box::new(SteppingPrices {
            calls: Mutex::new(0),
        }),
        floor: Some(Box::new(FixedFloor)),
        rig: Some(Box::new(DownRig)),
    }
}

fn roles() -> Vec<StatRole> {
    vec![
        StatRole::price("btc"),
        StatRole::FloorPrice,
        StatRole::MiningHashrate,
    ]
}

fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        roles: roles(),
        style: LabelStyle::default(),
        channel_kind: ChannelKind::Voice,
        ticks_per_slow_cycle: 2,
        refresh_slow_on_start: true,
        nickname_ticker: None,
    }
}

fn reconciler(guild: &FakeGuild, path: &std::path::Path) -> Reconciler<FakeGuild> {
    Reconciler::new(
        guild.clone(),
        fetchers(),
        ChannelRegistry::load_or_empty(path).unwrap(),
        settings(),
    )
    .unwrap()
}

#[tokio::test]
async fn channels_survive_restart_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("channels.json");
    let guild = FakeGuild::default();

    let mut first = reconciler(&guild, &path);
    let outcome = first.run_tick(Snapshots::default()).await.unwrap();
    // Rig telemetry is down, but its channel still gets a placeholder
    assert_eq!(outcome.report.created.len(), 3);
    assert_eq!(outcome.report.fetch_failures, vec![StatFamily::RigTelemetry]);
    let hashrate_id = first
        .registry()
        .resolve(&StatRole::MiningHashrate)
        .unwrap()
        .to_string();
    assert_eq!(guild.name_of(&hashrate_id).as_deref(), Some("Hashrate: loading"));
    drop(first);

    let mut second = reconciler(&guild, &path);
    assert_eq!(second.verify_bindings().await.unwrap(), 0);
    let outcome = second.run_tick(Snapshots::default()).await.unwrap();

    // Same prices as before the restart: the persisted labels match
    assert_eq!(guild.creates(), 3);
    assert!(outcome.report.created.is_empty());
    assert!(guild.renames().is_empty());
    assert_eq!(
        outcome.report.unchanged,
        vec![StatRole::price("btc"), StatRole::FloorPrice]
    );
    assert_eq!(outcome.report.skipped, vec![StatRole::MiningHashrate]);

    let btc_id = second.registry().resolve(&StatRole::price("btc")).unwrap();
    assert_eq!(
        guild.name_of(btc_id).as_deref(),
        Some("🟢 BTC: $50001.00 (↗ 0.50%)")
    );
}

#[tokio::test]
async fn deleted_channel_is_recreated_after_verification() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("channels.json");
    let guild = FakeGuild::default();

    let mut bot = reconciler(&guild, &path);
    let outcome = bot.run_tick(Snapshots::default()).await.unwrap();
    let floor_id = bot
        .registry()
        .resolve(&StatRole::FloorPrice)
        .unwrap()
        .to_string();
    guild.delete(&floor_id);

    assert_eq!(bot.verify_bindings().await.unwrap(), 1);
    let outcome = bot.run_tick(outcome.snapshots).await.unwrap();
    assert_eq!(outcome.report.created, vec![StatRole::FloorPrice]);
    assert_eq!(guild.creates(), 4);

    let new_id = bot.registry().resolve(&StatRole::FloorPrice).unwrap();
    assert_ne!(new_id, floor_id);
    assert_eq!(guild.name_of(new_id).as_deref(), Some("Floor: 980L ($960.40)"));
}

#[tokio::test]
async fn failed_renames_are_retried_with_fresh_labels() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("channels.json");
    let guild = FakeGuild::default();

    let mut bot = reconciler(&guild, &path);
    let outcome = bot.run_tick(Snapshots::default()).await.unwrap();

    guild.set_fail_renames(true);
    let outcome = bot.run_tick(outcome.snapshots).await.unwrap();
    assert_eq!(outcome.report.rename_failed, vec![StatRole::price("btc")]);

    guild.set_fail_renames(false);
    let outcome = bot.run_tick(outcome.snapshots).await.unwrap();
    assert_eq!(outcome.report.renamed, vec![StatRole::price("btc")]);

    let btc_id = bot.registry().resolve(&StatRole::price("btc")).unwrap().to_string();
    assert_eq!(
        guild.renames(),
        vec![(btc_id, "🟢 BTC: $50003.00 (↗ 0.50%)".to_string())]
    );

    let reloaded = ChannelRegistry::load(&path).unwrap();
    assert_eq!(
        reloaded.binding(&StatRole::price("btc")).unwrap().last_label,
        "🟢 BTC: $50003.00 (↗ 0.50%)"
    );
}

#[tokio::test]
async fn corrupt_registry_is_moved_aside() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("channels.json");
    std::fs::write(&path, "{ not json").unwrap();

    let guild = FakeGuild::default();
    let mut bot = reconciler(&guild, &path);
    assert!(bot.registry().is_empty());
    assert!(dir.path().join("channels.json.corrupt").exists());

    bot.run_tick(Snapshots::default()).await.unwrap();
    assert_eq!(ChannelRegistry::load(&path).unwrap().len(), 3);
}
