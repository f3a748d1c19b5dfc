//! Label generators
//!
//! Pure functions turning snapshots into channel names. No I/O; the same
//! snapshots always give the same label.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::domain::{
    FloorPriceSnapshot, RigTelemetrySnapshot, Snapshots, StatRole, TokenSnapshot,
};
use crate::error::{Result, StatBotError};

/// Discord channel names are limited to 100 characters
pub const CHANNEL_NAME_MAX: usize = 100;
/// Discord nicknames are limited to 32 characters
pub const NICKNAME_MAX: usize = 32;

/// Rendering options shared by every generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelStyle {
    pub currency_symbol: String,
    /// Decimal places for token prices
    pub decimals: u32,
    /// Unit suffix after the floor amount, e.g. "L" for LUNA
    pub floor_suffix: String,
    /// Ticker the floor is denominated in
    pub floor_base_symbol: String,
    /// Ticker the mining profit is paid in
    pub profit_quote_symbol: String,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            currency_symbol: "$".to_string(),
            decimals: 2,
            floor_suffix: "L".to_string(),
            floor_base_symbol: "luna".to_string(),
            profit_quote_symbol: "btc".to_string(),
        }
    }
}

/// 24h direction of a price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn of(change: Decimal) -> Self {
        if change > Decimal::ZERO {
            Trend::Up
        } else if change < Decimal::ZERO {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Trend::Up => "🟢",
            Trend::Down => "🔴",
            Trend::Flat => "⚪",
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Up => "\u{2197}",
            Trend::Down => "\u{2198}",
            Trend::Flat => "\u{2192}",
        }
    }
}

/// Format with exactly `dp` decimal places, rounding half away from zero
pub fn fixed(value: Decimal, dp: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded.rescale(dp);
    rounded.to_string()
}

/// `🟢 BTC: $56000.12 (↗ 1.03%)`
pub fn price_label(token: &TokenSnapshot, style: &LabelStyle) -> String {
    let trend = Trend::of(token.price_change_24h);
    format!(
        "{} {}: {}{} ({} {}%)",
        trend.color(),
        token.symbol.to_uppercase(),
        style.currency_symbol,
        fixed(token.current_price, style.decimals),
        trend.arrow(),
        fixed(token.price_change_percent_24h, 2)
    )
}

/// `Floor: 980L ($960.40)`; the dollar value is derived, never stored
pub fn floor_label(
    floor: &FloorPriceSnapshot,
    base_price: Decimal,
    style: &LabelStyle,
) -> Result<String> {
    let dollar_value = dollar_value(floor.floor_in_base_token, base_price, "floor")?;
    Ok(format!(
        "Floor: {}{} ({}{})",
        floor.floor_in_base_token.normalize(),
        style.floor_suffix,
        style.currency_symbol,
        fixed(dollar_value, 2)
    ))
}

/// `Hashrate: 123.45 MH/s`
pub fn hashrate_label(rig: &RigTelemetrySnapshot) -> String {
    format!("Hashrate: {} {}", fixed(rig.hashrate, 2), rig.hashrate_unit)
}

/// `Daily: 0.0001 BTC ($5.60)`
pub fn daily_profit_label(
    rig: &RigTelemetrySnapshot,
    quote_price: Decimal,
    style: &LabelStyle,
) -> Result<String> {
    let dollar_profit = dollar_value(rig.daily_profitability, quote_price, "daily_profitability")?;
    Ok(format!(
        "Daily: {} {} ({}{})",
        fixed(rig.daily_profitability, 4),
        rig.profitability_unit,
        style.currency_symbol,
        fixed(dollar_profit, 2)
    ))
}

/// `amount * price`, failing instead of overflowing on extreme API values
fn dollar_value(amount: Decimal, price: Decimal, field: &str) -> Result<Decimal> {
    amount
        .checked_mul(price)
        .ok_or_else(|| StatBotError::InvalidNumber {
            field: field.to_string(),
            value: format!("{} x {} overflows", amount, price),
        })
}

/// Bot nickname: `BTC ↗ $56000.12`
pub fn nickname_label(token: &TokenSnapshot, style: &LabelStyle) -> String {
    format!(
        "{} {} {}{}",
        token.symbol.to_uppercase(),
        Trend::of(token.price_change_24h).arrow(),
        style.currency_symbol,
        fixed(token.current_price, style.decimals)
    )
}

/// Generate the label of `role` from the latest snapshots.
///
/// Fails with `NotFound` when an input snapshot or ticker is missing.
pub fn label_for(role: &StatRole, snapshots: &Snapshots, style: &LabelStyle) -> Result<String> {
    match role {
        StatRole::Price { symbol } => {
            let token = snapshots.tokens()?.get(symbol)?;
            Ok(price_label(token, style))
        }
        StatRole::FloorPrice => {
            let floor = snapshots.floor()?;
            let base_price = snapshots.tokens()?.price_of(&style.floor_base_symbol)?;
            floor_label(floor, base_price, style)
        }
        StatRole::MiningHashrate => Ok(hashrate_label(snapshots.rig()?)),
        StatRole::MiningDailyProfit => {
            let rig = snapshots.rig()?;
            let quote_price = snapshots.tokens()?.price_of(&style.profit_quote_symbol)?;
            daily_profit_label(rig, quote_price, style)
        }
    }
}

/// Split `"<number> <unit>"` into its numeric prefix and the unit
pub fn parse_amount_with_unit(raw: &str) -> Result<(Decimal, String)> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let amount = Decimal::from_str(number).map_err(|_| StatBotError::InvalidNumber {
        field: "amount".to_string(),
        value: raw.to_string(),
    })?;
    Ok((amount, unit.trim().to_string()))
}
