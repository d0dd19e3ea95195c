//! Fallback chain for exchange rate lookup.
//!
//! Order, short-circuiting on the first tier that yields rates:
//!
//! 1. rate limit check (exhausted budget skips to step 4)
//! 2. fresh cache entry (skipped on forced refresh)
//! 3. live provider, persisted to the cache on success
//! 4. most recent cache entry regardless of expiry
//! 5. fixture file
//! 6. hardcoded emergency table
//!
//! Provider failures never reach the caller; they only move resolution down
//! the chain. The only error is `RatesUnavailable`, after step 6.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use expensa_shared::types::CurrencyCode;

use super::cache::RateCache;
use super::emergency::{EMERGENCY_WARNING, emergency_rates};
use super::error::{CurrencyError, FetchError};
use super::limiter::RateLimiter;
use super::types::{FallbackReason, RateSet, RateSource};
use crate::notify::AdminAlerter;

/// Alert class used for live fetch failures.
pub const RATE_API_ALERT_CLASS: &str = "exchange_rate_api";

/// Live source of exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetches the latest rates for `base`.
    ///
    /// Implementations retry transient failures themselves; an `Err` means
    /// the attempt is over.
    async fn fetch_latest(&self, base: &CurrencyCode) -> Result<RateSet, FetchError>;
}

/// Static rate data keyed by base currency.
pub trait FixtureSource: Send + Sync {
    /// Returns the fixture rates for `base`, if a usable fixture exists.
    fn load_rates(&self, base: &CurrencyCode) -> Option<RateSet>;
}

/// Fixture source with no data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFixtures;

impl FixtureSource for NoFixtures {
    fn load_rates(&self, _base: &CurrencyCode) -> Option<RateSet> {
        None
    }
}

/// Resolves rates through the fallback chain.
pub struct FallbackResolver {
    cache: Arc<RateCache>,
    provider: Arc<dyn RateProvider>,
    fixtures: Arc<dyn FixtureSource>,
    limiter: Arc<RateLimiter>,
    alerter: Option<Arc<AdminAlerter>>,
    use_stubs: bool,
}

impl std::fmt::Debug for FallbackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackResolver")
            .field("cache", &self.cache)
            .field("use_stubs", &self.use_stubs)
            .finish_non_exhaustive()
    }
}

impl FallbackResolver {
    /// Creates a resolver over the given components.
    #[must_use]
    pub fn new(
        cache: Arc<RateCache>,
        provider: Arc<dyn RateProvider>,
        fixtures: Arc<dyn FixtureSource>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            cache,
            provider,
            fixtures,
            limiter,
            alerter: None,
            use_stubs: false,
        }
    }

    /// Serves fixtures (then emergency rates) only, never touching cache or network.
    #[must_use]
    pub fn with_stubs(mut self, use_stubs: bool) -> Self {
        self.use_stubs = use_stubs;
        self
    }

    /// Raises an admin alert when the live provider fails.
    #[must_use]
    pub fn with_alerter(mut self, alerter: Arc<AdminAlerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    /// Returns the cache backing this resolver.
    #[must_use]
    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    /// Resolves rates for `base` effective on `date` (today when `None`).
    ///
    /// # Errors
    ///
    /// Returns `CurrencyError::RatesUnavailable` when no tier covers `base`.
    pub async fn resolve(
        &self,
        base: &CurrencyCode,
        date: Option<NaiveDate>,
        force_refresh: bool,
    ) -> Result<RateSet, CurrencyError> {
        if self.use_stubs {
            tracing::debug!(currency = %base, "stub mode, serving fixture rates");
            return self.fixture_or_emergency(base, FallbackReason::UsingStubs);
        }

        if !self.limiter.check(base) {
            tracing::warn!(currency = %base, "rate limited, using fallback rates");
            return self.fallback(base, FallbackReason::RateLimited);
        }

        let date = date.unwrap_or_else(|| Utc::now().date_naive());

        if !force_refresh {
            if let Some(entry) = self.cache.get(base, date) {
                tracing::debug!(currency = %base, rate_date = %entry.rate_date, "rate cache hit");
                return Ok(entry.to_rate_set(RateSource::Cache));
            }
        }

        match self.provider.fetch_latest(base).await {
            Ok(mut rates) => {
                self.cache.put(
                    base,
                    rates.rates.clone(),
                    rates.source_url.clone(),
                    rates.raw_hash.clone(),
                    false,
                );
                rates.source = RateSource::Api;
                rates.is_fallback = false;
                tracing::info!(
                    currency = %base,
                    count = rates.rates.len(),
                    source = %rates.source,
                    "fetched exchange rates"
                );
                Ok(rates)
            }
            Err(err) => {
                tracing::warn!(currency = %base, error = %err, "live rate fetch failed");
                if let Some(alerter) = &self.alerter {
                    alerter.alert(
                        RATE_API_ALERT_CLASS,
                        "Exchange Rate API Failure",
                        &format!("Fetching rates for {base} failed: {err}. Fallback rates are in use."),
                    );
                }
                self.fallback(base, FallbackReason::ApiUnavailable)
            }
        }
    }

    /// Re-fetches rates for `base`, bypassing fresh cache entries.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyError::RatesUnavailable` when no tier covers `base`.
    pub async fn refresh(&self, base: &CurrencyCode) -> Result<RateSet, CurrencyError> {
        self.resolve(base, None, true).await
    }

    fn fallback(&self, base: &CurrencyCode, reason: FallbackReason) -> Result<RateSet, CurrencyError> {
        if let Some(entry) = self.cache.most_recent(base) {
            tracing::warn!(
                currency = %base,
                rate_date = %entry.rate_date,
                reason = %reason,
                "using stale cached rates"
            );
            let mut set = entry
                .to_rate_set(RateSource::FallbackCache)
                .into_fallback(RateSource::FallbackCache, reason);
            set.original_fetch_date = Some(entry.rate_date);
            return Ok(set);
        }

        self.fixture_or_emergency(base, reason)
    }

    fn fixture_or_emergency(
        &self,
        base: &CurrencyCode,
        reason: FallbackReason,
    ) -> Result<RateSet, CurrencyError> {
        if let Some(set) = self.fixtures.load_rates(base) {
            tracing::warn!(currency = %base, reason = %reason, "using fixture rates");
            return Ok(set.into_fallback(RateSource::Fixture, reason));
        }

        if let Some(rates) = emergency_rates(base) {
            tracing::warn!(currency = %base, "using emergency rates");
            let mut set = RateSet::new(
                base.clone(),
                Utc::now().date_naive(),
                rates,
                RateSource::MinimalFallback,
            )
            .into_fallback(
                RateSource::MinimalFallback,
                FallbackReason::NoOtherSourceAvailable,
            );
            set.warning = Some(EMERGENCY_WARNING.to_string());
            return Ok(set);
        }

        tracing::error!(currency = %base, "no exchange rate source available");
        Err(CurrencyError::RatesUnavailable {
            currency: base.to_string(),
        })
    }
}
