//! Static fixture files.
//!
//! Fixtures use the live API schemas: `mock_rates_<CODE>.json` holds a
//! `{base, date, rates}` document and `mock_restcountries.json` a country
//! array. Unreadable or invalid files are treated as absent.

use std::path::{Path, PathBuf};

use chrono::Utc;
use expensa_core::currency::{
    FixtureSource, RateSet, RateSource, payload_hash, validate_rates_payload,
};
use expensa_shared::types::CurrencyCode;
use serde_json::Value;

/// File name of the country fixture.
pub const COUNTRIES_FIXTURE: &str = "mock_restcountries.json";

/// Fixture files under one directory.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    dir: PathBuf,
}

impl FixtureStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the fixture directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the rate fixture path for `base`.
    #[must_use]
    pub fn rates_path(&self, base: &CurrencyCode) -> PathBuf {
        self.dir.join(format!("mock_rates_{base}.json"))
    }

    /// Returns the country fixture path.
    #[must_use]
    pub fn countries_path(&self) -> PathBuf {
        self.dir.join(COUNTRIES_FIXTURE)
    }

    /// Reads the country fixture.
    #[must_use]
    pub fn load_countries(&self) -> Option<Value> {
        read_json(&self.countries_path()).map(|(value, _)| value)
    }
}

impl FixtureSource for FixtureStore {
    fn load_rates(&self, base: &CurrencyCode) -> Option<RateSet> {
        let path = self.rates_path(base);
        let (payload, body) = read_json(&path)?;

        let validated = match validate_rates_payload(&payload, base, Utc::now().date_naive()) {
            Ok(validated) => validated,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "invalid rate fixture");
                return None;
            }
        };

        tracing::info!(currency = %base, path = %path.display(), "loaded fixture rates");
        let mut rates = RateSet::new(
            validated.base,
            validated.date,
            validated.rates,
            RateSource::Fixture,
        );
        rates.source_url = Some(path.display().to_string());
        rates.raw_hash = Some(payload_hash(&body));
        Some(rates)
    }
}

fn read_json(path: &Path) -> Option<(Value, Vec<u8>)> {
    let body = match std::fs::read(path) {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "fixture file not readable");
            return None;
        }
    };
    match serde_json::from_slice(&body) {
        Ok(value) => Some((value, body)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "fixture file is not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn repo_fixtures() -> FixtureStore {
        FixtureStore::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures"))
    }

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::parse(s).unwrap()
    }

    #[test]
    fn test_loads_repo_fixture() {
        let rates = repo_fixtures().load_rates(&code("USD")).unwrap();
        assert_eq!(rates.base, code("USD"));
        assert_eq!(rates.source, RateSource::Fixture);
        assert!(rates.is_fallback);
        assert_eq!(rates.rate_for(&code("EUR")), Some(dec!(0.85)));
        assert!(rates.raw_hash.is_some());
    }

    #[test]
    fn test_missing_fixture_is_none() {
        assert!(repo_fixtures().load_rates(&code("XAU")).is_none());
        assert!(FixtureStore::new("/nonexistent").load_countries().is_none());
    }

    #[test]
    fn test_paths() {
        let store = FixtureStore::new("fixtures");
        assert_eq!(
            store.rates_path(&code("eur")),
            Path::new("fixtures/mock_rates_EUR.json")
        );
        assert_eq!(
            store.countries_path(),
            Path::new("fixtures/mock_restcountries.json")
        );
    }

    #[test]
    fn test_country_fixture_is_an_array() {
        let countries = repo_fixtures().load_countries().unwrap();
        assert!(countries.as_array().is_some_and(|a| !a.is_empty()));
    }
}
