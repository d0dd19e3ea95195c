//! Service wiring.

use std::sync::Arc;

use chrono::Duration;
use expensa_core::approval::{ApprovalService, InMemoryDirectory, OrgDirectory};
use expensa_core::currency::{CurrencyConverter, FallbackResolver, RateCache, RateLimiter};
use expensa_core::notify::{AdminAlerter, Notifier, TracingNotifier};
use expensa_rates::{CountryService, FixtureStore, RateFetcher};
use expensa_shared::AppConfig;

/// Everything the worker runs, built once at startup.
#[derive(Debug)]
pub struct Services {
    /// Rate cache shared by the resolver and the sweep.
    pub cache: Arc<RateCache>,
    /// Per-currency outbound request budget.
    pub limiter: Arc<RateLimiter>,
    /// Amount conversion over the fallback chain.
    pub converter: Arc<CurrencyConverter>,
    /// Country to currency reference data.
    pub countries: Arc<CountryService>,
    /// Claims under approval.
    pub approvals: Arc<ApprovalService>,
}

impl Services {
    /// Builds the services from configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded application configuration
    /// * `directory` - Source of employees and departments
    /// * `notifier` - Delivery channel for approver and admin notifications
    pub fn build(
        config: &AppConfig,
        directory: Arc<dyn OrgDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let currency = &config.currency;
        let alerter = Arc::new(AdminAlerter::new(
            config.notifications.admin_email.clone(),
            Arc::clone(&notifier),
        ));

        let cache = Arc::new(RateCache::new(currency.rates_ttl_hours)?);
        let limiter = Arc::new(RateLimiter::per_minute(currency.rate_limit_per_minute));
        let fetcher = RateFetcher::from_config(currency)?;
        let fixtures = FixtureStore::new(currency.fixtures_dir.clone());

        let resolver = FallbackResolver::new(
            Arc::clone(&cache),
            Arc::new(fetcher),
            Arc::new(fixtures),
            Arc::clone(&limiter),
        )
        .with_stubs(currency.use_stubs)
        .with_alerter(Arc::clone(&alerter));
        let converter = Arc::new(CurrencyConverter::new(Arc::new(resolver)));

        let countries = Arc::new(CountryService::from_config(currency)?.with_alerter(alerter));

        let approvals = Arc::new(
            ApprovalService::new(directory, notifier).with_reminder_after(Duration::hours(
                i64::from(config.approval.reminder_after_hours),
            )),
        );

        tracing::info!(
            use_stubs = currency.use_stubs,
            rates_ttl_hours = currency.rates_ttl_hours,
            exchange_api_url = %currency.exchange_api_url,
            "services configured"
        );

        Ok(Self {
            cache,
            limiter,
            converter,
            countries,
            approvals,
        })
    }

    /// Builds the services with an empty directory and log-only notifications.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::build(
            config,
            Arc::new(InMemoryDirectory::new()),
            Arc::new(TracingNotifier),
        )
    }
}
