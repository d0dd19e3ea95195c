//! Expensa mock upstream.
//!
//! Stands in for the exchange-rate and country APIs during local
//! development, serving the fixture files.

mod routes;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use expensa_shared::AppConfig;

use crate::routes::{MockState, router};

/// File name of the country fixture.
const COUNTRIES_FIXTURE: &str = "mock_restcountries.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expensa_mock_rates=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    let fixtures_dir = config.currency.fixtures_dir.clone();
    info!(fixtures_dir = %fixtures_dir.display(), "serving fixtures");

    let app = router(MockState::new(fixtures_dir));

    let addr = format!("{}:{}", config.mock_server.host, config.mock_server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Mock upstream listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
