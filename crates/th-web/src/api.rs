//! Request handlers

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use trade_history::constants::{DEFAULT_TX_LIMIT, MAX_TX_LIMIT};
use trade_history::{AnalyzedTransaction, parse_timestamp, validate_address};

use crate::AppState;
use crate::error::ApiError;

/// A JSON field that may arrive as a number or as a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

/// `POST /api/transactions` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsRequest {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub limit: Option<NumberOrString>,
    #[serde(default)]
    pub before_signature: Option<String>,
    #[serde(default)]
    pub after_timestamp: Option<NumberOrString>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub transactions: Vec<AnalyzedTransaction>,
    pub last_signature: Option<String>,
}

/// Requested page size, clamped to 1..=MAX_TX_LIMIT. Numeric strings use
/// their leading integer.
fn parse_limit(limit: Option<&NumberOrString>) -> Result<usize, ApiError> {
    let value = match limit {
        None => return Ok(DEFAULT_TX_LIMIT),
        Some(NumberOrString::Number(n)) if n.is_finite() => n.trunc() as i64,
        Some(NumberOrString::Number(_)) => return Err(ApiError::BadRequest("limit must be a number".to_string())),
        Some(NumberOrString::Text(s)) => leading_integer(s)
            .ok_or_else(|| ApiError::BadRequest(format!("limit must be a number, got {:?}", s)))?,
    };
    Ok(value.clamp(1, MAX_TX_LIMIT as i64) as usize)
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// `afterTimestamp` as epoch milliseconds or a date string. Empty or zero
/// values mean no cutoff.
fn parse_after(after: Option<&NumberOrString>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match after {
        None => Ok(None),
        Some(NumberOrString::Number(n)) if *n == 0.0 => Ok(None),
        Some(NumberOrString::Number(n)) => DateTime::from_timestamp_millis(*n as i64)
            .filter(|_| n.is_finite())
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("afterTimestamp out of range: {}", n))),
        Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::Text(s)) => parse_timestamp(s).map(Some).map_err(ApiError::from),
    }
}

/// Fetch, analyze and return a page of an address's transactions.
pub async fn transactions(
    State(state): State<AppState>,
    body: Result<Json<TransactionsRequest>, JsonRejection>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let address = request
        .address
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Address is required".to_string()))?;
    validate_address(address)?;
    let address = address.trim();

    let limit = parse_limit(request.limit.as_ref())?;
    let after = parse_after(request.after_timestamp.as_ref())?;
    let before = request.before_signature.as_deref().filter(|s| !s.is_empty());

    info!(address, limit, ?before, ?after, "fetching transactions");

    let page = state.source.get_transactions(address, limit, before, after).await?;
    let transactions = state.analyzer.analyze_page(&page.transactions).await;

    info!(address, count = transactions.len(), "returning transactions");

    Ok(Json(TransactionsResponse {
        transactions,
        last_signature: page.last_signature,
    }))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Option<NumberOrString> {
        Some(NumberOrString::Text(s.to_string()))
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).unwrap(), 10);
        assert_eq!(parse_limit(Some(&NumberOrString::Number(25.0))).unwrap(), 25);
        assert_eq!(parse_limit(text("50").as_ref()).unwrap(), 50);
        assert_eq!(parse_limit(text("20abc").as_ref()).unwrap(), 20);
        assert_eq!(parse_limit(Some(&NumberOrString::Number(5000.0))).unwrap(), 1000);
        assert_eq!(parse_limit(Some(&NumberOrString::Number(0.0))).unwrap(), 1);
        assert_eq!(parse_limit(text("-3").as_ref()).unwrap(), 1);
        assert!(parse_limit(text("lots").as_ref()).is_err());
    }

    #[test]
    fn test_parse_after() {
        let millis = 1_705_276_800_000.0;
        let from_number = parse_after(Some(&NumberOrString::Number(millis))).unwrap().unwrap();
        let from_date = parse_after(text("2024-01-15").as_ref()).unwrap().unwrap();
        assert_eq!(from_number, from_date);

        assert!(parse_after(None).unwrap().is_none());
        assert!(parse_after(text("").as_ref()).unwrap().is_none());
        assert!(parse_after(Some(&NumberOrString::Number(0.0))).unwrap().is_none());
        assert!(parse_after(text("not a date").as_ref()).is_err());
    }
}
