//! Stat fetchers: one per data family, each turning one GET into a snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::http::{decimal_field, percent_field, JsonHttp};
use crate::domain::{
    FloorPriceSnapshot, RigTelemetrySnapshot, StatFamily, TokenBatch, TokenSnapshot,
};
use crate::error::{Result, StatBotError};
use crate::labels::parse_amount_with_unit;

/// A data source that yields a fresh snapshot or `FetchFailed`
#[async_trait]
pub trait StatFetcher: Send + Sync {
    type Snapshot: Send;

    fn family(&self) -> StatFamily;

    /// Perform exactly one outbound request
    async fn fetch(&self) -> Result<Self::Snapshot>;
}

/// CoinGecko `coins/markets`-style token price endpoint
pub struct TokenPriceFetcher {
    http: JsonHttp,
    url: String,
}

impl TokenPriceFetcher {
    /// The query URL is `base_url` followed by `query_id`, as the endpoint expects
    pub fn new(http: JsonHttp, base_url: &str, query_id: &str) -> Self {
        Self {
            http,
            url: format!("{}{}", base_url, query_id),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn parse(body: &Value, fetched_at: DateTime<Utc>) -> Result<TokenBatch> {
        let family = StatFamily::TokenPrices;
        let entries = body
            .as_array()
            .ok_or_else(|| StatBotError::fetch_failed(family, "expected a JSON array"))?;
        if entries.is_empty() {
            return Err(StatBotError::fetch_failed(family, "empty price list"));
        }

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(symbol) = entry
                .get("symbol")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
            else {
                warn!("Skipping price entry without symbol");
                continue;
            };

            let as_of = entry
                .get("last_updated")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(fetched_at);

            let snapshot = TokenSnapshot {
                symbol: symbol.to_lowercase(),
                current_price: decimal_field(entry, "current_price")
                    .map_err(|e| StatBotError::fetch_failed(family, e.to_string()))?,
                price_change_24h: decimal_field(entry, "price_change_24h")
                    .map_err(|e| StatBotError::fetch_failed(family, e.to_string()))?,
                price_change_percent_24h: percent_field(entry, "price_change_percentage_24h")
                    .map_err(|e| StatBotError::fetch_failed(family, e.to_string()))?,
                as_of,
            };
            snapshots.push(snapshot);
        }

        if snapshots.is_empty() {
            return Err(StatBotError::fetch_failed(family, "no usable price entries"));
        }
        Ok(TokenBatch::new(snapshots, fetched_at))
    }
}

#[async_trait]
impl StatFetcher for TokenPriceFetcher {
    type Snapshot = TokenBatch;

    fn family(&self) -> StatFamily {
        StatFamily::TokenPrices
    }

    async fn fetch(&self) -> Result<TokenBatch> {
        let body = self.http.get_json(self.family(), &self.url, None).await?;
        let batch = Self::parse(&body, Utc::now())?;
        debug!("Fetched {} token prices", batch.len());
        Ok(batch)
    }
}

/// NFT floor endpoint returning `{ "floor": <number> }`
pub struct FloorPriceFetcher {
    http: JsonHttp,
    url: String,
}

impl FloorPriceFetcher {
    pub fn new(http: JsonHttp, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }

    pub fn parse(body: &Value, fetched_at: DateTime<Utc>) -> Result<FloorPriceSnapshot> {
        let family = StatFamily::FloorPrice;
        if body.get("floor").map_or(true, Value::is_null) {
            return Err(StatBotError::fetch_failed(family, "response has no floor field"));
        }
        let floor = decimal_field(body, "floor")
            .map_err(|e| StatBotError::fetch_failed(family, e.to_string()))?;
        Ok(FloorPriceSnapshot {
            floor_in_base_token: floor,
            as_of: fetched_at,
        })
    }
}

#[async_trait]
impl StatFetcher for FloorPriceFetcher {
    type Snapshot = FloorPriceSnapshot;

    fn family(&self) -> StatFamily {
        StatFamily::FloorPrice
    }

    async fn fetch(&self) -> Result<FloorPriceSnapshot> {
        let body = self.http.get_json(self.family(), &self.url, None).await?;
        Self::parse(&body, Utc::now())
    }
}

/// Mining rig telemetry endpoint.
///
/// Expected shape:
/// `{ "rigs": [{ "name", "status", "hashrate" }], "hashrate"?, "hashrate_unit"?,
///    "daily_profitability": "0.00012345 BTC" }`
pub struct RigTelemetryFetcher {
    http: JsonHttp,
    url: String,
    api_key: Option<String>,
}

impl RigTelemetryFetcher {
    pub fn new(http: JsonHttp, url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            url: url.to_string(),
            api_key,
        }
    }

    pub fn parse(body: &Value, fetched_at: DateTime<Utc>) -> Result<RigTelemetrySnapshot> {
        let family = StatFamily::RigTelemetry;
        let rigs = body
            .get("rigs")
            .and_then(Value::as_array)
            .ok_or_else(|| StatBotError::fetch_failed(family, "response has no rigs array"))?;

        let active_rig_count = rigs
            .iter()
            .filter(|rig| {
                rig.get("status")
                    .and_then(Value::as_str)
                    .map(|s| s.eq_ignore_ascii_case("mining") || s.eq_ignore_ascii_case("active"))
                    .unwrap_or(false)
            })
            .count() as u32;

        let hashrate = if body.get("hashrate").map_or(false, |v| !v.is_null()) {
            decimal_field(body, "hashrate")
                .map_err(|e| StatBotError::fetch_failed(family, e.to_string()))?
        } else {
            let mut total = rust_decimal::Decimal::ZERO;
            for rig in rigs {
                let rate = decimal_field(rig, "hashrate")
                    .map_err(|e| StatBotError::fetch_failed(family, e.to_string()))?;
                total = total.checked_add(rate).ok_or_else(|| {
                    StatBotError::fetch_failed(family, "summed rig hashrate overflows")
                })?;
            }
            total
        };

        let hashrate_unit = body
            .get("hashrate_unit")
            .and_then(Value::as_str)
            .unwrap_or("MH/s")
            .to_string();

        let (daily_profitability, profitability_unit) = match body.get("daily_profitability") {
            None | Some(Value::Null) => (rust_decimal::Decimal::ZERO, "BTC".to_string()),
            Some(Value::String(raw)) => parse_amount_with_unit(raw)
                .map(|(amount, unit)| {
                    let unit = if unit.is_empty() { "BTC".to_string() } else { unit };
                    (amount, unit)
                })
                .map_err(|e| StatBotError::fetch_failed(family, e.to_string()))?,
            Some(_) => (
                decimal_field(body, "daily_profitability")
                    .map_err(|e| StatBotError::fetch_failed(family, e.to_string()))?,
                "BTC".to_string(),
            ),
        };

        Ok(RigTelemetrySnapshot {
            hashrate,
            hashrate_unit,
            daily_profitability,
            profitability_unit,
            active_rig_count,
            as_of: fetched_at,
        })
    }
}

#[async_trait]
impl StatFetcher for RigTelemetryFetcher {
    type Snapshot = RigTelemetrySnapshot;

    fn family(&self) -> StatFamily {
        StatFamily::RigTelemetry
    }

    async fn fetch(&self) -> Result<RigTelemetrySnapshot> {
        let body = self
            .http
            .get_json(self.family(), &self.url, self.api_key.as_deref())
            .await?;
        let snapshot = Self::parse(&body, Utc::now())?;
        debug!(
            "Fetched rig telemetry: {} active rigs, {} {}",
            snapshot.active_rig_count, snapshot.hashrate, snapshot.hashrate_unit
        );
        Ok(snapshot)
    }
}
