//! Hardcoded emergency rates, the last tier of the fallback chain.

use expensa_shared::types::CurrencyCode;
use rust_decimal::Decimal;

use super::types::RateTable;

/// Warning attached to every emergency rate set.
pub const EMERGENCY_WARNING: &str = "These are approximate rates for emergency use only";

/// (target, mantissa, scale) triples; `Decimal::new(85, 2)` is 0.85.
type Row = (&'static str, i64, u32);

const USD: &[Row] = &[
    ("EUR", 85, 2),
    ("GBP", 73, 2),
    ("INR", 83, 0),
    ("JPY", 110, 0),
    ("CAD", 125, 2),
    ("AUD", 135, 2),
];

const EUR: &[Row] = &[
    ("USD", 118, 2),
    ("GBP", 86, 2),
    ("INR", 98, 0),
    ("JPY", 130, 0),
    ("CAD", 147, 2),
    ("AUD", 159, 2),
];

const GBP: &[Row] = &[
    ("USD", 137, 2),
    ("EUR", 116, 2),
    ("INR", 114, 0),
    ("JPY", 151, 0),
    ("CAD", 171, 2),
    ("AUD", 185, 2),
];

const INR: &[Row] = &[
    ("USD", 12, 3),
    ("EUR", 10, 3),
    ("GBP", 9, 3),
    ("JPY", 133, 2),
    ("CAD", 15, 3),
    ("AUD", 16, 3),
];

/// Returns the emergency table for `base`, or `None` if the base is not covered.
#[must_use]
pub fn emergency_rates(base: &CurrencyCode) -> Option<RateTable> {
    let rows = match base.as_str() {
        "USD" => USD,
        "EUR" => EUR,
        "GBP" => GBP,
        "INR" => INR,
        _ => return None,
    };

    Some(
        rows.iter()
            .filter_map(|(code, mantissa, scale)| {
                CurrencyCode::parse(code)
                    .ok()
                    .map(|code| (code, Decimal::new(*mantissa, *scale)))
            })
            .collect(),
    )
}
