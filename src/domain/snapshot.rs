use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StatFamily;
use crate::error::{Result, StatBotError};

/// Normalized market data for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    /// Lowercase ticker symbol, e.g. "btc"
    pub symbol: String,
    pub current_price: Decimal,
    pub price_change_24h: Decimal,
    /// Rounded to 2 decimal places at fetch time
    pub price_change_percent_24h: Decimal,
    pub as_of: DateTime<Utc>,
}

/// Every ticker returned by one token price fetch.
///
/// Replaced as a whole; tickers are never mixed across fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBatch {
    pub snapshots: Vec<TokenSnapshot>,
    pub fetched_at: DateTime<Utc>,
}

impl TokenBatch {
    pub fn new(snapshots: Vec<TokenSnapshot>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            snapshots,
            fetched_at,
        }
    }

    pub fn get(&self, symbol: &str) -> Result<&TokenSnapshot> {
        self.snapshots
            .iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| StatBotError::NotFound(format!("ticker '{}' in price batch", symbol)))
    }

    pub fn price_of(&self, symbol: &str) -> Result<Decimal> {
        self.get(symbol).map(|s| s.current_price)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// NFT collection floor, denominated in the base token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPriceSnapshot {
    pub floor_in_base_token: Decimal,
    pub as_of: DateTime<Utc>,
}

/// Aggregated mining rig telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigTelemetrySnapshot {
    pub hashrate: Decimal,
    pub hashrate_unit: String,
    /// Daily profitability in `profitability_unit` (e.g. BTC)
    pub daily_profitability: Decimal,
    pub profitability_unit: String,
    pub active_rig_count: u32,
    pub as_of: DateTime<Utc>,
}

/// Last good snapshot of every family, passed into and returned from each tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshots {
    pub tokens: Option<TokenBatch>,
    pub floor: Option<FloorPriceSnapshot>,
    pub rig: Option<RigTelemetrySnapshot>,
}

impl Snapshots {
    pub fn tokens(&self) -> Result<&TokenBatch> {
        self.tokens
            .as_ref()
            .ok_or_else(|| missing(StatFamily::TokenPrices))
    }

    pub fn floor(&self) -> Result<&FloorPriceSnapshot> {
        self.floor
            .as_ref()
            .ok_or_else(|| missing(StatFamily::FloorPrice))
    }

    pub fn rig(&self) -> Result<&RigTelemetrySnapshot> {
        self.rig
            .as_ref()
            .ok_or_else(|| missing(StatFamily::RigTelemetry))
    }

    pub fn has(&self, family: StatFamily) -> bool {
        match family {
            StatFamily::TokenPrices => self.tokens.is_some(),
            StatFamily::FloorPrice => self.floor.is_some(),
            StatFamily::RigTelemetry => self.rig.is_some(),
        }
    }
}

fn missing(family: StatFamily) -> StatBotError {
    StatBotError::NotFound(format!("no {} snapshot fetched yet", family))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(symbol: &str, price: Decimal) -> TokenSnapshot {
        TokenSnapshot {
            symbol: symbol.to_string(),
            current_price: price,
            price_change_24h: Decimal::ZERO,
            price_change_percent_24h: Decimal::ZERO,
            as_of: Utc::now(),
        }
    }

    #[test]
    fn test_batch_lookup_is_case_insensitive() {
        let batch = TokenBatch::new(vec![snapshot("btc", dec!(56000))], Utc::now());
        assert_eq!(batch.price_of("BTC").unwrap(), dec!(56000));
    }

    #[test]
    fn test_missing_ticker_is_not_found_not_zero() {
        let batch = TokenBatch::new(vec![snapshot("btc", dec!(56000))], Utc::now());
        let err = batch.price_of("luna").unwrap_err();
        assert!(matches!(err, StatBotError::NotFound(_)));
    }

    #[test]
    fn test_empty_snapshots_report_missing_families() {
        let snapshots = Snapshots::default();
        assert!(snapshots.tokens().is_err());
        assert!(!snapshots.has(StatFamily::RigTelemetry));
    }
}
