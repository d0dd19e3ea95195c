//! Exchange rates and currency conversion.
//!
//! Rates flow `CurrencyConverter` → `FallbackResolver` → `RateCache` /
//! `RateProvider` / `FixtureSource` / emergency table. The HTTP provider and
//! the on-disk fixture store live in `expensa-rates`.

pub mod cache;
pub mod conversion;
pub mod converter;
pub mod emergency;
pub mod error;
pub mod limiter;
pub mod resolver;
pub mod types;
pub mod validation;

#[cfg(test)]
mod props;

pub use cache::{CacheStats, RateCache, RateCacheEntry};
pub use conversion::{convert_amount, round_amount};
pub use converter::{Conversion, CurrencyConverter};
pub use emergency::{EMERGENCY_WARNING, emergency_rates};
pub use error::{CurrencyError, FetchError};
pub use limiter::RateLimiter;
pub use resolver::{FallbackResolver, FixtureSource, NoFixtures, RateProvider};
pub use types::{FallbackReason, RateSet, RateSource, RateTable};
pub use validation::{ValidatedRates, decimal_from_json, payload_hash, validate_rates_payload};
