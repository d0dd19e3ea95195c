//! Currency conversion backed by the fallback resolver.
//!
//! Converted amounts are kept at full precision; `Conversion::rounded`
//! applies banker's rounding for display and posting.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use expensa_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use serde::Serialize;

use super::conversion::{apply_rate, round_amount};
use super::error::CurrencyError;
use super::resolver::FallbackResolver;
use super::types::{FallbackReason, RateSet, RateSource};

/// Result of a conversion with the provenance needed for audit display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversion {
    /// Amount in the source currency.
    pub original_amount: Decimal,
    /// `original_amount × rate`, unrounded.
    pub converted_amount: Decimal,
    /// Units of `to` per unit of `from`.
    pub rate: Decimal,
    /// Source currency.
    pub from: CurrencyCode,
    /// Target currency.
    pub to: CurrencyCode,
    /// Date the rate is effective for.
    pub date: NaiveDate,
    /// Tier that produced the rate.
    pub source: RateSource,
    /// True when a degraded tier produced the rate.
    pub is_fallback: bool,
    /// Upstream URL, if the rate came from the live API or its cache.
    pub source_url: Option<String>,
    /// Upstream fetch time, if any.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Hash of the upstream body, if any.
    pub raw_hash: Option<String>,
    /// Why a degraded tier was used.
    pub fallback_reason: Option<FallbackReason>,
    /// Caveat attached to emergency rates.
    pub warning: Option<String>,
}

impl Conversion {
    /// Same-currency conversion: rate 1, amount unchanged.
    #[must_use]
    pub fn identity(amount: Decimal, currency: CurrencyCode, date: NaiveDate) -> Self {
        Self {
            original_amount: amount,
            converted_amount: amount,
            rate: Decimal::ONE,
            from: currency.clone(),
            to: currency,
            date,
            source: RateSource::NoConversion,
            is_fallback: false,
            source_url: None,
            fetched_at: None,
            raw_hash: None,
            fallback_reason: None,
            warning: None,
        }
    }

    fn from_rate_set(
        amount: Decimal,
        to: CurrencyCode,
        rate: Decimal,
        set: RateSet,
    ) -> Result<Self, CurrencyError> {
        Ok(Self {
            original_amount: amount,
            converted_amount: apply_rate(amount, rate)?,
            rate,
            from: set.base,
            to,
            date: set.date,
            source: set.source,
            is_fallback: set.is_fallback,
            source_url: set.source_url,
            fetched_at: set.fetched_at,
            raw_hash: set.raw_hash,
            fallback_reason: set.fallback_reason,
            warning: set.warning,
        })
    }

    /// Returns the converted amount rounded with banker's rounding.
    #[must_use]
    pub fn rounded(&self, decimal_places: u32) -> Decimal {
        round_amount(self.converted_amount, decimal_places)
    }
}

/// Converts amounts between currencies.
#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    resolver: Arc<FallbackResolver>,
}

impl CurrencyConverter {
    /// Creates a converter over `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<FallbackResolver>) -> Self {
        Self { resolver }
    }

    /// Returns the underlying resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<FallbackResolver> {
        &self.resolver
    }

    /// Converts `amount` from `from` to `to` using rates effective on `date`.
    ///
    /// # Arguments
    ///
    /// * `amount` - Amount in `from`
    /// * `from` - Source currency, used as the rate base
    /// * `to` - Target currency, must appear in the resolved rate table
    /// * `date` - Effective date; today when `None`
    ///
    /// # Errors
    ///
    /// * `RatesUnavailable` - no tier covers `from`
    /// * `RateNotAvailable` - rates for `from` do not include `to`
    /// * `AmountOverflow` - the converted amount is out of range
    pub async fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
        date: Option<NaiveDate>,
    ) -> Result<Conversion, CurrencyError> {
        if from == to {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            return Ok(Conversion::identity(amount, from.clone(), date));
        }

        let set = self.resolver.resolve(from, date, false).await?;
        let rate = set
            .rate_for(to)
            .ok_or_else(|| CurrencyError::RateNotAvailable {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        let conversion = Conversion::from_rate_set(amount, to.clone(), rate, set)?;
        tracing::debug!(
            from = %from,
            to = %to,
            rate = %conversion.rate,
            source = %conversion.source,
            "converted amount"
        );
        Ok(conversion)
    }
}
