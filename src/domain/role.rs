use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatBotError;

/// Data family a statistic is fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatFamily {
    TokenPrices,
    FloorPrice,
    RigTelemetry,
}

impl StatFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatFamily::TokenPrices => "token_prices",
            StatFamily::FloorPrice => "floor_price",
            StatFamily::RigTelemetry => "rig_telemetry",
        }
    }
}

impl fmt::Display for StatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How often a role is refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    /// Every tick
    Fast,
    /// Once per slow cycle
    Slow,
}

/// A displayed statistic, each backed by one channel.
///
/// The string key (`price:btc`, `floor`, `mining_hashrate`,
/// `mining_daily_profit`) is what the registry file is keyed by, so it must
/// stay stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StatRole {
    /// Spot price of one ticker, symbol stored lowercase
    Price { symbol: String },
    FloorPrice,
    MiningHashrate,
    MiningDailyProfit,
}

impl StatRole {
    pub fn price(symbol: &str) -> Self {
        StatRole::Price {
            symbol: symbol.trim().to_lowercase(),
        }
    }

    pub fn key(&self) -> String {
        match self {
            StatRole::Price { symbol } => format!("price:{}", symbol),
            StatRole::FloorPrice => "floor".to_string(),
            StatRole::MiningHashrate => "mining_hashrate".to_string(),
            StatRole::MiningDailyProfit => "mining_daily_profit".to_string(),
        }
    }

    /// Family whose fetch refreshes this role
    pub fn family(&self) -> StatFamily {
        match self {
            StatRole::Price { .. } => StatFamily::TokenPrices,
            StatRole::FloorPrice => StatFamily::FloorPrice,
            StatRole::MiningHashrate | StatRole::MiningDailyProfit => StatFamily::RigTelemetry,
        }
    }

    /// Every family the label generator reads from
    pub fn inputs(&self) -> &'static [StatFamily] {
        match self {
            StatRole::Price { .. } => &[StatFamily::TokenPrices],
            StatRole::FloorPrice => &[StatFamily::FloorPrice, StatFamily::TokenPrices],
            StatRole::MiningHashrate => &[StatFamily::RigTelemetry],
            StatRole::MiningDailyProfit => &[StatFamily::RigTelemetry, StatFamily::TokenPrices],
        }
    }

    pub fn cadence(&self) -> Cadence {
        match self.family() {
            StatFamily::RigTelemetry => Cadence::Slow,
            StatFamily::TokenPrices | StatFamily::FloorPrice => Cadence::Fast,
        }
    }

    /// Channel name used when a channel has to be created before any data arrived
    pub fn placeholder_label(&self) -> String {
        match self {
            StatRole::Price { symbol } => format!("{}: loading", symbol.to_uppercase()),
            StatRole::FloorPrice => "Floor: loading".to_string(),
            StatRole::MiningHashrate => "Hashrate: loading".to_string(),
            StatRole::MiningDailyProfit => "Daily: loading".to_string(),
        }
    }
}

impl fmt::Display for StatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for StatRole {
    type Err = StatBotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "floor" => Ok(StatRole::FloorPrice),
            "mining_hashrate" => Ok(StatRole::MiningHashrate),
            "mining_daily_profit" => Ok(StatRole::MiningDailyProfit),
            other => match other.strip_prefix("price:") {
                Some(symbol) if !symbol.trim().is_empty() => Ok(StatRole::price(symbol)),
                _ => Err(StatBotError::NotFound(format!("stat role '{}'", other))),
            },
        }
    }
}

impl From<StatRole> for String {
    fn from(role: StatRole) -> Self {
        role.key()
    }
}

impl TryFrom<String> for StatRole {
    type Error = StatBotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
