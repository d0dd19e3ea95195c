//! Exchange-rate and country-data adapters for Expensa.
//!
//! - `fetcher` - HTTP `RateProvider` with retry and backoff
//! - `fixtures` - On-disk fixtures mirroring the live API schemas
//! - `countries` - Country to currency mappings with caching and fallbacks

pub mod countries;
pub mod fetcher;
pub mod fixtures;

pub use countries::{CountryMappings, CountryService, CurrencyInfo, MappingSource};
pub use fetcher::RateFetcher;
pub use fixtures::FixtureStore;
