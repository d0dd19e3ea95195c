//! Expensa background worker.
//!
//! Wires the currency and approval services from configuration and runs the
//! escalation, reminder and rate-cache sweeps until interrupted.

mod app;
mod jobs;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use expensa_shared::AppConfig;
use expensa_shared::types::CurrencyCode;

use crate::app::Services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expensa=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;

    let services = Services::from_config(&config)?;

    // Warm the country reference data; failures fall back and alert
    let countries = services.countries.refresh().await;
    let currencies = services.countries.supported_currencies().await;
    info!(
        countries,
        currencies = currencies.len(),
        "country reference data loaded"
    );

    warm_rates(&services, &config.currency.warm_currencies).await;

    info!(
        escalation_interval_secs = config.scheduler.escalation_interval_secs,
        reminder_interval_secs = config.scheduler.reminder_interval_secs,
        cache_sweep_interval_secs = config.scheduler.cache_sweep_interval_secs,
        "worker started"
    );

    jobs::run(&services, &config.scheduler, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for shutdown signal");
        }
    })
    .await;

    let stats = services.cache.stats();
    info!(
        cached_rates = stats.total,
        claims = services.approvals.len(),
        "worker stopped"
    );

    Ok(())
}

/// Refreshes rates for each configured base so the first conversions hit the cache.
async fn warm_rates(services: &Services, currencies: &[String]) {
    for code in currencies {
        let Ok(base) = CurrencyCode::parse(code) else {
            tracing::warn!(currency = %code, "skipping invalid warm-up currency");
            continue;
        };
        match services.converter.resolver().refresh(&base).await {
            Ok(rates) => info!(
                currency = %base,
                source = %rates.source,
                rates = rates.rates.len(),
                "exchange rates warmed"
            ),
            Err(err) => tracing::error!(currency = %base, error = %err, "exchange rate warm-up failed"),
        }
    }
}
