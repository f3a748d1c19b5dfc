//! Shared JSON-over-HTTP plumbing for the data source adapters.

use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::StatFamily;
use crate::error::{Result, StatBotError};

const USER_AGENT: &str = concat!("statbot/", env!("CARGO_PKG_VERSION"));

/// Thin GET-and-decode client; one request per call, no retries
#[derive(Clone)]
pub struct JsonHttp {
    http: Client,
}

impl JsonHttp {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StatBotError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// GET `url` and decode the body; every failure becomes `FetchFailed`
    pub async fn get_json(
        &self,
        family: StatFamily,
        url: &str,
        bearer: Option<&str>,
    ) -> Result<Value> {
        let mut req = self.http.get(url);
        if let Some(token) = bearer {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StatBotError::fetch_failed(family, format!("request error: {}", e)))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| StatBotError::fetch_failed(family, format!("body error: {}", e)))?;

        if status.as_u16() == 429 {
            warn!(family = %family, "Data source rate limited the request");
            return Err(StatBotError::fetch_failed(family, "rate limited (429)"));
        }
        if !status.is_success() {
            return Err(StatBotError::fetch_failed(
                family,
                format!("status={} body={}", status, truncate(&text, 200)),
            ));
        }

        debug!(family = %family, bytes = text.len(), "Fetched data source");
        serde_json::from_str(&text)
            .map_err(|e| StatBotError::fetch_failed(family, format!("invalid JSON: {}", e)))
    }
}

/// Read a numeric field: missing or null is 0, anything non-numeric is an error
pub fn decimal_field(root: &Value, field: &str) -> Result<Decimal> {
    match root.get(field) {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(value) => parse_decimalish(value).ok_or_else(|| StatBotError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Read a percentage field rounded to 2 decimal places
pub fn percent_field(root: &Value, field: &str) -> Result<Decimal> {
    decimal_field(root, field)
        .map(|v| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

pub fn parse_decimalish(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_missing_and_null_fields_default_to_zero() {
        let body = json!({ "present": 1.5, "nothing": null });
        assert_eq!(decimal_field(&body, "present").unwrap(), dec!(1.5));
        assert_eq!(decimal_field(&body, "nothing").unwrap(), Decimal::ZERO);
        assert_eq!(decimal_field(&body, "absent").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_non_numeric_field_is_an_error() {
        let body = json!({ "price": "abc", "flag": true });
        assert!(matches!(
            decimal_field(&body, "price"),
            Err(StatBotError::InvalidNumber { .. })
        ));
        assert!(decimal_field(&body, "flag").is_err());
    }

    #[test]
    fn test_numeric_strings_and_scientific_notation() {
        let body = json!({ "a": "42.10", "b": 1e-7 });
        assert_eq!(decimal_field(&body, "a").unwrap(), dec!(42.10));
        assert_eq!(decimal_field(&body, "b").unwrap(), dec!(0.0000001));
    }

    #[test]
    fn test_percent_rounds_to_two_places() {
        let body = json!({ "pct": 1.0349, "up": 2.345 });
        assert_eq!(percent_field(&body, "pct").unwrap(), dec!(1.03));
        assert_eq!(percent_field(&body, "up").unwrap(), dec!(2.35));
        assert_eq!(percent_field(&body, "missing").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
