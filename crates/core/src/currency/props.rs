//! Property-based tests for the currency pipeline.
//!
//! - Cache expiry bookkeeping and key uniqueness
//! - Same-currency conversion identity
//! - Sliding window rate limiting
//! - Banker's rounding bounds

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use expensa_shared::types::CurrencyCode;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::cache::RateCache;
use super::conversion::round_amount;
use super::converter::CurrencyConverter;
use super::error::FetchError;
use super::limiter::RateLimiter;
use super::resolver::{FallbackResolver, NoFixtures, RateProvider};
use super::types::{RateSet, RateSource, RateTable};

/// Strategy to generate positive decimal amounts (0.01 to 1,000,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate positive exchange rates (0.0001 to 10000.0000).
fn positive_rate() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

/// Strategy to generate 3-letter currency codes.
fn currency_code() -> impl Strategy<Value = CurrencyCode> {
    "[A-Z]{3}".prop_map(|s| CurrencyCode::parse(&s).unwrap())
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap()
}

struct NeverCalled;

#[async_trait::async_trait]
impl RateProvider for NeverCalled {
    async fn fetch_latest(&self, _base: &CurrencyCode) -> Result<RateSet, FetchError> {
        Err(FetchError::Client("unused".into()))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// expires_at is exactly fetched_at + ttl, and expiry flips strictly after it.
    #[test]
    fn prop_expiry_matches_ttl(
        ttl in 1u32..=720,
        offset_mins in 0i64..(60 * 24 * 60),
        rate in positive_rate(),
    ) {
        let cache = RateCache::new(ttl).unwrap();
        let fetched_at = base_time() + Duration::minutes(offset_mins);
        let rates: RateTable = [(CurrencyCode::parse("EUR").unwrap(), rate)].into_iter().collect();
        let entry = cache.put_at(&CurrencyCode::parse("USD").unwrap(), rates, None, None, false, fetched_at);

        prop_assert_eq!(entry.expires_at(), fetched_at + Duration::hours(i64::from(ttl)));
        prop_assert!(!entry.is_expired_at(entry.expires_at()));
        prop_assert!(entry.is_expired_at(entry.expires_at() + Duration::seconds(1)));
    }

    /// Storing several rate sets on the same day leaves one entry holding the last.
    #[test]
    fn prop_same_day_puts_keep_latest(
        rates in prop::collection::vec(positive_rate(), 1..10),
        base in currency_code(),
    ) {
        let cache = RateCache::new(24).unwrap();
        let target = CurrencyCode::parse("XAU").unwrap();
        for (i, rate) in rates.iter().enumerate() {
            let table: RateTable = [(target.clone(), *rate)].into_iter().collect();
            let at = base_time() + Duration::minutes(i64::try_from(i).unwrap());
            cache.put_at(&base, table, None, None, false, at);
        }

        prop_assert_eq!(cache.len(), 1);
        let entry = cache.most_recent(&base).unwrap();
        prop_assert_eq!(entry.rates.get(&target).copied(), rates.last().copied());
    }

    /// Converting to the same currency returns rate 1 and the amount unchanged.
    #[test]
    fn prop_same_currency_identity(amount in positive_amount(), currency in currency_code()) {
        let resolver = FallbackResolver::new(
            Arc::new(RateCache::new(24).unwrap()),
            Arc::new(NeverCalled),
            Arc::new(NoFixtures),
            Arc::new(RateLimiter::per_minute(30)),
        );
        let converter = CurrencyConverter::new(Arc::new(resolver));
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

        let result = runtime
            .block_on(converter.convert(amount, &currency, &currency, None))
            .unwrap();
        prop_assert_eq!(result.rate, Decimal::ONE);
        prop_assert_eq!(result.converted_amount, amount);
        prop_assert_eq!(result.source, RateSource::NoConversion);
    }

    /// At most `limit` requests pass inside any one window, and the budget returns after it.
    #[test]
    fn prop_limiter_caps_window(limit in 1usize..50, extra in 1usize..20) {
        let limiter = RateLimiter::per_minute(limit);
        let usd = CurrencyCode::parse("USD").unwrap();

        let allowed = (0..limit + extra)
            .filter(|_| limiter.check_at(&usd, base_time()))
            .count();
        prop_assert_eq!(allowed, limit);
        prop_assert!(limiter.check_at(&usd, base_time() + Duration::seconds(60)));
    }

    /// Rounding moves a value by at most half a unit in the last place.
    #[test]
    fn prop_rounding_error_bounded(amount in positive_amount(), rate in positive_rate(), dp in 0u32..=4) {
        let exact = amount * rate;
        let rounded = round_amount(exact, dp);
        let half_unit = Decimal::new(5, dp + 1);
        prop_assert!((rounded - exact).abs() <= half_unit);
        prop_assert!(rounded.scale() <= dp);
    }
}
