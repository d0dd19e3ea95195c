//! Validation of raw rate payloads.
//!
//! Used for both live API responses and fixture files: both carry the same
//! `{base, date, rates}` shape.

use std::str::FromStr;

use chrono::NaiveDate;
use expensa_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::error::CurrencyError;
use super::types::RateTable;

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRates {
    /// Base currency as requested by the caller.
    pub base: CurrencyCode,
    /// Effective date from the payload, or the fallback date.
    pub date: NaiveDate,
    /// Entries with a valid code and a positive rate.
    pub rates: RateTable,
    /// Number of entries that were discarded.
    pub dropped: usize,
}

/// Validates a `{base, date, rates}` payload.
///
/// Invalid entries (code not 3 letters, rate missing, non-numeric or not
/// positive) are discarded. A base that differs from `expected_base` is
/// logged and tolerated. A missing or malformed date becomes `today`.
///
/// # Errors
///
/// Returns `CurrencyError::InvalidRates` if the payload is not an object,
/// has no `rates` object, or no entry survives validation.
pub fn validate_rates_payload(
    payload: &Value,
    expected_base: &CurrencyCode,
    today: NaiveDate,
) -> Result<ValidatedRates, CurrencyError> {
    let object = payload
        .as_object()
        .ok_or_else(|| CurrencyError::InvalidRates("payload is not an object".to_string()))?;

    let raw_rates = object
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| CurrencyError::InvalidRates("missing rates object".to_string()))?;

    if let Some(base) = object.get("base").and_then(Value::as_str) {
        if !base.eq_ignore_ascii_case(expected_base.as_str()) {
            tracing::warn!(
                expected = %expected_base,
                received = base,
                "rate payload base differs from requested base"
            );
        }
    }

    let date = object
        .get("date")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or(today);

    let mut rates = RateTable::new();
    let mut dropped = 0;
    for (code, value) in raw_rates {
        let parsed = CurrencyCode::parse(code)
            .ok()
            .zip(match value {
                Value::Number(number) => decimal_from_json(number),
                _ => None,
            });
        match parsed {
            Some((code, rate)) if rate > Decimal::ZERO => {
                rates.insert(code, rate);
            }
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(base = %expected_base, dropped, "discarded invalid rate entries");
    }

    if rates.is_empty() {
        return Err(CurrencyError::InvalidRates(format!(
            "no valid rates for {expected_base}"
        )));
    }

    Ok(ValidatedRates {
        base: expected_base.clone(),
        date,
        rates,
        dropped,
    })
}

/// Converts a JSON number to a decimal without going through `f64` arithmetic.
#[must_use]
pub fn decimal_from_json(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}

/// Returns the hex SHA-256 digest of a raw response body.
#[must_use]
pub fn payload_hash(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
