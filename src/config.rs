use config::{Config, ConfigError, Environment, File, Map, Source, Value, ValueKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::StatRole;
use crate::labels::LabelStyle;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health server port, disabled when unset
    #[serde(default)]
    pub health_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token, sent as `Authorization: Bot <token>`
    pub token: String,
    /// Target server
    pub guild_id: String,
    /// REST base URL (default: Discord API v10)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Category new stat channels are created under
    #[serde(default)]
    pub category_id: Option<String>,
    /// Deny CONNECT to @everyone on created voice channels
    #[serde(default = "default_true")]
    pub lock_channels: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Token price endpoint; the query id is appended verbatim
    #[serde(default = "default_token_base_url")]
    pub token_base_url: String,
    /// e.g. "bitcoin,terra-luna"
    pub token_query_id: String,
    #[serde(default)]
    pub floor_url: Option<String>,
    #[serde(default)]
    pub rig_url: Option<String>,
    /// Opaque bearer token for the rig API
    #[serde(default)]
    pub rig_api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_token_base_url() -> String {
    "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&ids=".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolesConfig {
    /// Tickers that get a price channel each
    #[serde(default)]
    pub price_symbols: Vec<String>,
    /// Show the NFT floor channel
    #[serde(default)]
    pub floor: bool,
    /// Show the mining hashrate and daily profit channels
    #[serde(default)]
    pub mining: bool,
    #[serde(default = "default_floor_base_symbol")]
    pub floor_base_symbol: String,
    #[serde(default = "default_floor_suffix")]
    pub floor_suffix: String,
    #[serde(default = "default_profit_quote_symbol")]
    pub profit_quote_symbol: String,
}

fn default_floor_base_symbol() -> String {
    "luna".to_string()
}

fn default_floor_suffix() -> String {
    "L".to_string()
}

fn default_profit_quote_symbol() -> String {
    "btc".to_string()
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            price_symbols: Vec::new(),
            floor: false,
            mining: false,
            floor_base_symbol: default_floor_base_symbol(),
            floor_suffix: default_floor_suffix(),
            profit_quote_symbol: default_profit_quote_symbol(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between ticks
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Slow roles refresh once every this many ticks (96 x 5 min = 8 h)
    #[serde(default = "default_ticks_per_slow_cycle")]
    pub ticks_per_slow_cycle: u32,
    /// Also refresh slow roles on the first tick after startup
    #[serde(default = "default_true")]
    pub refresh_slow_on_start: bool,
}

fn default_interval() -> u64 {
    300
}

fn default_ticks_per_slow_cycle() -> u32 {
    96
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            ticks_per_slow_cycle: default_ticks_per_slow_cycle(),
            refresh_slow_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Decimal places for prices
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    /// Mirror this ticker's price into the bot nickname
    #[serde(default)]
    pub nickname_ticker: Option<String>,
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_decimals() -> u32 {
    2
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_symbol: default_currency_symbol(),
            decimals: default_decimals(),
            nickname_ticker: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
    /// Marker directory imported once at startup
    #[serde(default)]
    pub legacy_marker_dir: Option<PathBuf>,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("data/channels.json")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            legacy_marker_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Flat environment variables of the single-token nickname bot this grew out of.
///
/// Layered below the prefixed `STATBOT_*` variables and the config files.
#[derive(Debug, Clone, Default)]
pub struct LegacyEnv {
    vars: Vec<(String, String)>,
}

const LEGACY_KEYS: &[(&str, &str)] = &[
    ("DISCORD_TOKEN", "discord.token"),
    ("GUILD_ID", "discord.guild_id"),
    ("BASE_URL", "sources.token_base_url"),
    ("TOKEN_QUERY_ID", "sources.token_query_id"),
    ("FLOOR_URL", "sources.floor_url"),
    ("RIG_URL", "sources.rig_url"),
    ("RIG_API_KEY", "sources.rig_api_key"),
    ("CURRENCY_SYMBOL", "display.currency_symbol"),
    ("DECIMALS", "display.decimals"),
    ("TICKER_DISPLAY_ID", "display.nickname_ticker"),
];

impl LegacyEnv {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I: IntoIterator<Item = (String, String)>>(vars: I) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }
}

/// `UPDATE_FREQUENCY` is in minutes and may be fractional (`0.5` is 30 seconds)
fn legacy_interval_secs(value: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| {
        ConfigError::Message(format!("UPDATE_FREQUENCY {}: {}", reason, value))
    };
    let minutes: Decimal = value.trim().parse().map_err(|_| invalid("is not a number"))?;
    let secs = minutes
        .checked_mul(Decimal::from(60))
        .ok_or_else(|| invalid("is too large"))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    if secs <= Decimal::ZERO {
        return Err(invalid("must be at least one second"));
    }
    secs.to_u64().ok_or_else(|| invalid("is too large"))
}

impl Source for LegacyEnv {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let origin = "legacy environment".to_string();
        let mut map = Map::new();

        for (name, value) in &self.vars {
            if let Some((_, key)) = LEGACY_KEYS.iter().find(|(legacy, _)| legacy == name) {
                map.insert(
                    key.to_string(),
                    Value::new(Some(&origin), ValueKind::String(value.clone())),
                );
            } else if name == "UPDATE_FREQUENCY" {
                map.insert(
                    "schedule.interval_secs".to_string(),
                    Value::new(Some(&origin), ValueKind::U64(legacy_interval_secs(value)?)),
                );
            }
        }

        Ok(map)
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        Self::load_layered(config_dir, LegacyEnv::from_env())
    }

    /// Defaults < legacy flat env < config files < `STATBOT_*` env
    pub fn load_layered<P: AsRef<Path>>(
        config_dir: P,
        legacy: LegacyEnv,
    ) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("schedule.interval_secs", 300)?
            .add_source(legacy)
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("STATBOT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (STATBOT_DISCORD__TOKEN, etc.)
            .add_source(
                Environment::with_prefix("STATBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("roles.price_symbols")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// A minimal configuration tracking BTC, for tests and quick starts
    pub fn default_config(token: &str, guild_id: &str) -> Self {
        Self {
            discord: DiscordConfig {
                token: token.to_string(),
                guild_id: guild_id.to_string(),
                api_base: None,
                category_id: None,
                lock_channels: true,
            },
            sources: SourcesConfig {
                token_base_url: default_token_base_url(),
                token_query_id: "bitcoin".to_string(),
                floor_url: None,
                rig_url: None,
                rig_api_key: None,
                request_timeout_secs: default_request_timeout(),
            },
            roles: RolesConfig {
                price_symbols: vec!["btc".to_string()],
                ..RolesConfig::default()
            },
            schedule: ScheduleConfig::default(),
            display: DisplayConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
            health_port: None,
        }
    }

    /// Stat roles this deployment displays, in reconciliation order
    pub fn active_roles(&self) -> Vec<StatRole> {
        let mut roles: Vec<StatRole> = Vec::new();
        for symbol in &self.roles.price_symbols {
            let role = StatRole::price(symbol);
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        if self.roles.floor {
            roles.push(StatRole::FloorPrice);
        }
        if self.roles.mining {
            roles.push(StatRole::MiningHashrate);
            roles.push(StatRole::MiningDailyProfit);
        }
        roles
    }

    pub fn label_style(&self) -> LabelStyle {
        LabelStyle {
            currency_symbol: self.display.currency_symbol.clone(),
            decimals: self.display.decimals,
            floor_suffix: self.roles.floor_suffix.clone(),
            floor_base_symbol: self.roles.floor_base_symbol.to_lowercase(),
            profit_quote_symbol: self.roles.profit_quote_symbol.to_lowercase(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.discord.token.trim().is_empty() {
            errors.push("discord.token must be set".to_string());
        }
        if self.discord.guild_id.trim().is_empty()
            || !self.discord.guild_id.chars().all(|c| c.is_ascii_digit())
        {
            errors.push("discord.guild_id must be a numeric snowflake".to_string());
        }
        if let Some(api_base) = &self.discord.api_base {
            check_url("discord.api_base", api_base, &mut errors);
        }

        check_url(
            "sources.token_base_url",
            &format!("{}{}", self.sources.token_base_url, self.sources.token_query_id),
            &mut errors,
        );
        if self.sources.token_query_id.trim().is_empty() {
            errors.push("sources.token_query_id must be set".to_string());
        }
        if self.sources.request_timeout_secs == 0 {
            errors.push("sources.request_timeout_secs must be positive".to_string());
        }

        match (&self.sources.floor_url, self.roles.floor) {
            (Some(url), _) => check_url("sources.floor_url", url, &mut errors),
            (None, true) => errors.push("roles.floor is enabled but sources.floor_url is not set".to_string()),
            (None, false) => {}
        }
        match (&self.sources.rig_url, self.roles.mining) {
            (Some(url), _) => check_url("sources.rig_url", url, &mut errors),
            (None, true) => errors.push("roles.mining is enabled but sources.rig_url is not set".to_string()),
            (None, false) => {}
        }

        if self.active_roles().is_empty() && self.display.nickname_ticker.is_none() {
            errors.push(
                "nothing to display: set roles.price_symbols, roles.floor, roles.mining or display.nickname_ticker"
                    .to_string(),
            );
        }

        if self.schedule.interval_secs == 0 {
            errors.push("schedule.interval_secs must be positive".to_string());
        }
        if self.schedule.ticks_per_slow_cycle == 0 {
            errors.push("schedule.ticks_per_slow_cycle must be at least 1".to_string());
        }
        if self.display.decimals > 8 {
            errors.push(format!(
                "display.decimals must be at most 8, got {}",
                self.display.decimals
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_url(field: &str, value: &str, errors: &mut Vec<String>) {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!("{} has unsupported scheme '{}'", field, url.scheme())),
        Err(e) => errors.push(format!("{} is not a valid URL: {}", field, e)),
    }
}
