//! Rate set and provenance types shared by every rate source.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use expensa_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rates for one base currency: target code → units of target per one unit of base.
pub type RateTable = BTreeMap<CurrencyCode, Decimal>;

/// Where a rate set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Fresh (non-expired) cache entry.
    Cache,
    /// Live upstream API.
    Api,
    /// Most recent cache entry regardless of expiry.
    FallbackCache,
    /// Static fixture file.
    Fixture,
    /// Hardcoded emergency table.
    MinimalFallback,
    /// Same-currency conversion, no rate lookup performed.
    NoConversion,
}

impl RateSource {
    /// Returns the string representation of the source.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Api => "api",
            Self::FallbackCache => "fallback_cache",
            Self::Fixture => "fixture",
            Self::MinimalFallback => "minimal_fallback",
            Self::NoConversion => "no_conversion",
        }
    }

    /// Parses a source from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cache" => Some(Self::Cache),
            "api" => Some(Self::Api),
            "fallback_cache" => Some(Self::FallbackCache),
            "fixture" => Some(Self::Fixture),
            "minimal_fallback" => Some(Self::MinimalFallback),
            "no_conversion" => Some(Self::NoConversion),
            _ => None,
        }
    }

    /// Returns true for the degraded tiers of the fallback chain.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Self::FallbackCache | Self::Fixture | Self::MinimalFallback
        )
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a degraded tier was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Live fetch failed or returned nothing usable.
    ApiUnavailable,
    /// Per-currency request budget exhausted.
    RateLimited,
    /// Stub mode is configured.
    UsingStubs,
    /// Nothing but the emergency table covers the currency.
    NoOtherSourceAvailable,
}

impl FallbackReason {
    /// Returns the string representation of the reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiUnavailable => "api_unavailable",
            Self::RateLimited => "rate_limited",
            Self::UsingStubs => "using_stubs",
            Self::NoOtherSourceAvailable => "no_other_source_available",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved set of exchange rates with provenance metadata for audit display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSet {
    /// Base currency (uppercase).
    pub base: CurrencyCode,
    /// Date the rates are effective for.
    pub date: NaiveDate,
    /// Target currency rates.
    pub rates: RateTable,
    /// Which tier produced the rates.
    pub source: RateSource,
    /// True when a degraded tier produced the rates.
    pub is_fallback: bool,
    /// Upstream URL the rates were fetched from, if any.
    pub source_url: Option<String>,
    /// UTC time of the upstream fetch, if any.
    pub fetched_at: Option<DateTime<Utc>>,
    /// SHA-256 of the raw upstream body, if any.
    pub raw_hash: Option<String>,
    /// Why a degraded tier was used.
    pub fallback_reason: Option<FallbackReason>,
    /// Date of the cache entry a `fallback_cache` result was read from.
    pub original_fetch_date: Option<NaiveDate>,
    /// Human-readable caveat, set for emergency rates.
    pub warning: Option<String>,
}

impl RateSet {
    /// Creates a rate set with no provenance metadata.
    #[must_use]
    pub fn new(base: CurrencyCode, date: NaiveDate, rates: RateTable, source: RateSource) -> Self {
        Self {
            base,
            date,
            rates,
            source,
            is_fallback: source.is_fallback(),
            source_url: None,
            fetched_at: None,
            raw_hash: None,
            fallback_reason: None,
            original_fetch_date: None,
            warning: None,
        }
    }

    /// Returns the rate from the base to `target`, if present.
    #[must_use]
    pub fn rate_for(&self, target: &CurrencyCode) -> Option<Decimal> {
        self.rates.get(target).copied()
    }

    /// Re-tags the set as coming from a degraded tier.
    #[must_use]
    pub fn into_fallback(mut self, source: RateSource, reason: FallbackReason) -> Self {
        self.source = source;
        self.is_fallback = true;
        self.fallback_reason = Some(reason);
        self
    }
}
