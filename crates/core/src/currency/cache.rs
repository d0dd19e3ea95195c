//! Exchange rate cache keyed by (base currency, rate date).
//!
//! Entries carry their own fetch time and TTL so that expired entries stay
//! readable for the `fallback_cache` tier until a sweep removes them.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use expensa_shared::types::CurrencyCode;
use serde::{Deserialize, Serialize};

use super::error::CurrencyError;
use super::types::{RateSet, RateSource, RateTable};

/// One cached rate set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCacheEntry {
    /// Base currency.
    pub base: CurrencyCode,
    /// Date the entry was stored for.
    pub rate_date: NaiveDate,
    /// Target currency rates.
    pub rates: RateTable,
    /// Upstream URL the rates were fetched from.
    pub source_url: Option<String>,
    /// UTC time the rates were fetched.
    pub fetched_at: DateTime<Utc>,
    /// Time-to-live in hours.
    pub ttl_hours: u32,
    /// True when the rates came from a degraded tier.
    pub is_fallback: bool,
    /// SHA-256 of the raw upstream body.
    pub raw_hash: Option<String>,
}

impl RateCacheEntry {
    /// Returns the instant after which the entry is expired.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.fetched_at + Duration::hours(i64::from(self.ttl_hours))
    }

    /// Returns true if the entry is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Returns a label such as `USD - 2025-01-15`, suffixed with `(Fallback)` for degraded entries.
    #[must_use]
    pub fn display_name(&self) -> String {
        let suffix = if self.is_fallback { " (Fallback)" } else { "" };
        format!("{} - {}{}", self.base, self.rate_date, suffix)
    }

    /// Converts the entry into a rate set tagged with `source`.
    #[must_use]
    pub fn to_rate_set(&self, source: RateSource) -> RateSet {
        let mut set = RateSet::new(
            self.base.clone(),
            self.rate_date,
            self.rates.clone(),
            source,
        );
        set.is_fallback = self.is_fallback || source.is_fallback();
        set.source_url.clone_from(&self.source_url);
        set.fetched_at = Some(self.fetched_at);
        set.raw_hash.clone_from(&self.raw_hash);
        set
    }
}

/// Summary counts for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of stored entries.
    pub total: usize,
    /// Entries past their TTL.
    pub expired: usize,
    /// Entries within their TTL.
    pub active: usize,
    /// Entries that came from a degraded tier.
    pub fallback: usize,
    /// Distinct base currencies stored.
    pub currencies: usize,
}

/// Thread-safe rate cache.
///
/// The lock is held only for map operations, never across I/O. Uniqueness of
/// (base, date) is enforced by the map key, so `put` replaces atomically.
#[derive(Debug)]
pub struct RateCache {
    entries: RwLock<BTreeMap<(CurrencyCode, NaiveDate), RateCacheEntry>>,
    ttl_hours: u32,
}

impl RateCache {
    /// Creates an empty cache whose new entries live for `ttl_hours`.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyError::InvalidTtl` if `ttl_hours` is zero.
    pub fn new(ttl_hours: u32) -> Result<Self, CurrencyError> {
        if ttl_hours < 1 {
            return Err(CurrencyError::InvalidTtl(ttl_hours));
        }
        Ok(Self {
            entries: RwLock::new(BTreeMap::new()),
            ttl_hours,
        })
    }

    /// Returns the TTL applied to new entries.
    #[must_use]
    pub fn ttl_hours(&self) -> u32 {
        self.ttl_hours
    }

    /// Looks up a fresh entry for `base` effective on `date`.
    #[must_use]
    pub fn get(&self, base: &CurrencyCode, date: NaiveDate) -> Option<RateCacheEntry> {
        self.get_at(base, date, Utc::now())
    }

    /// Looks up a fresh entry as of `now`.
    ///
    /// Tries the exact date first, then the latest non-expired entry dated on
    /// or before `date`. Expired entries are never returned here.
    #[must_use]
    pub fn get_at(
        &self,
        base: &CurrencyCode,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<RateCacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get(&(base.clone(), date)) {
            if !entry.is_expired_at(now) {
                return Some(entry.clone());
            }
        }

        entries
            .range((base.clone(), NaiveDate::MIN)..=(base.clone(), date))
            .rev()
            .map(|(_, entry)| entry)
            .find(|entry| !entry.is_expired_at(now))
            .cloned()
    }

    /// Stores rates for `base` under today's UTC date, replacing any entry for that key.
    pub fn put(
        &self,
        base: &CurrencyCode,
        rates: RateTable,
        source_url: Option<String>,
        raw_hash: Option<String>,
        is_fallback: bool,
    ) -> RateCacheEntry {
        self.put_at(base, rates, source_url, raw_hash, is_fallback, Utc::now())
    }

    /// Stores rates as fetched at `now`.
    pub fn put_at(
        &self,
        base: &CurrencyCode,
        rates: RateTable,
        source_url: Option<String>,
        raw_hash: Option<String>,
        is_fallback: bool,
        now: DateTime<Utc>,
    ) -> RateCacheEntry {
        let entry = RateCacheEntry {
            base: base.clone(),
            rate_date: now.date_naive(),
            rates,
            source_url,
            fetched_at: now,
            ttl_hours: self.ttl_hours,
            is_fallback,
            raw_hash,
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert((base.clone(), entry.rate_date), entry.clone());

        tracing::debug!(
            base = %base,
            rate_date = %entry.rate_date,
            is_fallback,
            "cached exchange rates"
        );
        entry
    }

    /// Returns the newest entry for `base` by rate date, expired or not.
    #[must_use]
    pub fn most_recent(&self, base: &CurrencyCode) -> Option<RateCacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .range((base.clone(), NaiveDate::MIN)..=(base.clone(), NaiveDate::MAX))
            .next_back()
            .map(|(_, entry)| entry.clone())
    }

    /// Removes every expired entry, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    /// Removes entries expired at `now`.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::info!(removed, "swept expired exchange rate cache entries");
        }
        removed
    }

    /// Returns counts for monitoring.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats_at(Utc::now())
    }

    /// Returns counts as of `now`.
    #[must_use]
    pub fn stats_at(&self, now: DateTime<Utc>) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = CacheStats {
            total: entries.len(),
            ..CacheStats::default()
        };
        let mut last_base: Option<&CurrencyCode> = None;
        for ((base, _), entry) in entries.iter() {
            if entry.is_expired_at(now) {
                stats.expired += 1;
            }
            if entry.is_fallback {
                stats.fallback += 1;
            }
            // keys are sorted by base, so a change of base means a new currency
            if last_base != Some(base) {
                stats.currencies += 1;
                last_base = Some(base);
            }
        }
        stats.active = stats.total - stats.expired;
        stats
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
