//! Country to currency mappings.
//!
//! Mappings come from the country reference API, cached for
//! `country_ttl_days`. When the API fails the service falls back to the
//! country fixture, then to a small built-in table, and alerts the admin
//! once a day.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use expensa_core::currency::FetchError;
use expensa_core::notify::AdminAlerter;
use expensa_shared::config::CurrencyConfig;
use moka::sync::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fixtures::FixtureStore;

/// Alert class used for country API failures.
pub const COUNTRY_API_ALERT_CLASS: &str = "country_api";

/// Currency codes reported when no mapping yields any.
pub const FALLBACK_CURRENCIES: [&str; 7] = ["USD", "EUR", "GBP", "INR", "JPY", "CAD", "AUD"];

const CACHE_KEY: &str = "country_currency_mappings";

/// One currency used by a country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    /// ISO code as reported upstream.
    pub code: String,
    /// Currency name.
    pub name: String,
    /// Currency symbol.
    pub symbol: String,
}

impl CurrencyInfo {
    fn new(code: &str, name: &str, symbol: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

/// Common country name to the currencies it uses.
pub type CountryMappings = BTreeMap<String, Vec<CurrencyInfo>>;

/// Where a set of mappings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// TTL cache.
    Cache,
    /// Live API.
    Api,
    /// Country fixture file.
    Fixture,
    /// Built-in table.
    Minimal,
}

/// Country reference data with caching and fallbacks.
pub struct CountryService {
    client: Client,
    api_url: String,
    fixtures: FixtureStore,
    cache: Cache<&'static str, Arc<CountryMappings>>,
    use_stubs: bool,
    alerter: Option<Arc<AdminAlerter>>,
}

impl std::fmt::Debug for CountryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountryService")
            .field("api_url", &self.api_url)
            .field("fixtures", &self.fixtures)
            .field("use_stubs", &self.use_stubs)
            .finish_non_exhaustive()
    }
}

impl CountryService {
    /// Creates a service.
    ///
    /// # Arguments
    ///
    /// * `api_url` - Full country endpoint URL, including query string
    /// * `timeout` - Per-request timeout
    /// * `ttl` - How long fetched mappings stay cached
    /// * `fixtures` - Fallback fixture store
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        timeout: Duration,
        ttl: Duration,
        fixtures: FixtureStore,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Ok(Self {
            client,
            api_url: api_url.into(),
            fixtures,
            cache,
            use_stubs: false,
            alerter: None,
        })
    }

    /// Creates a service from the `currency` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the HTTP client cannot be built.
    pub fn from_config(config: &CurrencyConfig) -> Result<Self, FetchError> {
        let service = Self::new(
            config.countries_api_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(u64::from(config.country_ttl_days) * 86_400),
            FixtureStore::new(config.fixtures_dir.clone()),
        )?;
        Ok(service.with_stubs(config.use_stubs))
    }

    /// Serves fixture data only, never calling the API.
    #[must_use]
    pub fn with_stubs(mut self, use_stubs: bool) -> Self {
        self.use_stubs = use_stubs;
        self
    }

    /// Sends API failures to the admin.
    #[must_use]
    pub fn with_alerter(mut self, alerter: Arc<AdminAlerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    /// Returns the current mappings.
    pub async fn mappings(&self) -> (Arc<CountryMappings>, MappingSource) {
        self.load(false).await
    }

    /// Refetches the mappings, bypassing the cache.
    ///
    /// Returns how many countries are now mapped.
    pub async fn refresh(&self) -> usize {
        let (mappings, source) = self.load(true).await;
        tracing::info!(countries = mappings.len(), source = ?source, "refreshed country mappings");
        mappings.len()
    }

    /// Returns the first currency of the named country, matching case-insensitively.
    pub async fn get_country_currency(&self, country: &str) -> Option<CurrencyInfo> {
        let (mappings, _) = self.mappings().await;
        mappings
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(country.trim()))
            .and_then(|(_, currencies)| currencies.first().cloned())
    }

    /// Returns every currency code in use, sorted and deduplicated.
    pub async fn supported_currencies(&self) -> Vec<String> {
        let (mappings, _) = self.mappings().await;
        let codes: BTreeSet<String> = mappings
            .values()
            .flatten()
            .map(|currency| currency.code.clone())
            .collect();
        if codes.is_empty() {
            return FALLBACK_CURRENCIES.iter().map(|c| (*c).to_string()).collect();
        }
        codes.into_iter().collect()
    }

    async fn load(&self, force_refresh: bool) -> (Arc<CountryMappings>, MappingSource) {
        if self.use_stubs {
            tracing::info!("using fixture country mappings");
            return self.fixture_or_minimal();
        }

        if !force_refresh {
            if let Some(cached) = self.cache.get(CACHE_KEY) {
                tracing::debug!(countries = cached.len(), "country mappings cache hit");
                return (cached, MappingSource::Cache);
            }
        }

        match self.fetch().await {
            Ok(mappings) => {
                let mappings = Arc::new(mappings);
                self.cache.insert(CACHE_KEY, Arc::clone(&mappings));
                (mappings, MappingSource::Api)
            }
            Err(err) => {
                tracing::error!(error = %err, "country mappings fetch failed, using fallback");
                if let Some(alerter) = &self.alerter {
                    alerter.alert(COUNTRY_API_ALERT_CLASS, "Country API Error", &err.to_string());
                }
                self.fixture_or_minimal()
            }
        }
    }

    async fn fetch(&self) -> Result<CountryMappings, FetchError> {
        tracing::info!(url = %self.api_url, "fetching country mappings");
        let response = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| FetchError::Transient {
                attempts: 1,
                last: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let mappings = parse_countries(&payload);
        if mappings.is_empty() {
            return Err(FetchError::Validation(
                "no country with currencies in response".to_string(),
            ));
        }
        tracing::info!(countries = mappings.len(), "parsed country mappings");
        Ok(mappings)
    }

    fn fixture_or_minimal(&self) -> (Arc<CountryMappings>, MappingSource) {
        if let Some(payload) = self.fixtures.load_countries() {
            let mappings = parse_countries(&payload);
            if !mappings.is_empty() {
                tracing::info!(countries = mappings.len(), "loaded country mappings from fixture");
                return (Arc::new(mappings), MappingSource::Fixture);
            }
        }
        tracing::warn!("using built-in country mappings");
        (Arc::new(minimal_mappings()), MappingSource::Minimal)
    }
}

/// Parses a `[{name: {common}, currencies: {CODE: {name, symbol}}}]` array.
///
/// Entries without a common name or without currencies are skipped.
#[must_use]
pub fn parse_countries(payload: &Value) -> CountryMappings {
    let Some(countries) = payload.as_array() else {
        return CountryMappings::new();
    };

    let mut mappings = CountryMappings::new();
    for country in countries {
        let name = country
            .get("name")
            .and_then(|n| n.get("common"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(currencies) = country.get("currencies").and_then(Value::as_object) else {
            continue;
        };
        if name.is_empty() || currencies.is_empty() {
            continue;
        }

        let list = currencies
            .iter()
            .map(|(code, info)| {
                let field = |key: &str| info.get(key).and_then(Value::as_str).unwrap_or_default();
                CurrencyInfo::new(code, field("name"), field("symbol"))
            })
            .collect();
        mappings.insert(name.to_string(), list);
    }
    mappings
}

/// Returns the built-in table used when neither API nor fixture is usable.
#[must_use]
pub fn minimal_mappings() -> CountryMappings {
    [
        ("United States", "USD", "US Dollar", "$"),
        ("India", "INR", "Indian Rupee", "₹"),
        ("United Kingdom", "GBP", "British Pound", "£"),
        ("Germany", "EUR", "Euro", "€"),
        ("France", "EUR", "Euro", "€"),
        ("Japan", "JPY", "Japanese Yen", "¥"),
        ("Canada", "CAD", "Canadian Dollar", "C$"),
        ("Australia", "AUD", "Australian Dollar", "A$"),
    ]
    .into_iter()
    .map(|(country, code, name, symbol)| {
        (country.to_string(), vec![CurrencyInfo::new(code, name, symbol)])
    })
    .collect()
}
