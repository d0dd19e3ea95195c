//! Mock upstream routes.
//!
//! Serves the fixture directory under the live API paths and answers 429
//! once a client exceeds its per-minute budget.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

/// Requests allowed per client within one window.
pub const RATE_LIMIT_PER_MINUTE: usize = 60;

const WINDOW: Duration = Duration::from_secs(60);

/// Shared state for the mock handlers.
#[derive(Clone)]
pub struct MockState {
    fixtures_dir: Arc<PathBuf>,
    limit: usize,
    hits: Arc<DashMap<IpAddr, VecDeque<Instant>>>,
}

impl MockState {
    /// Creates state serving `fixtures_dir` with the default budget.
    pub fn new(fixtures_dir: impl Into<PathBuf>) -> Self {
        Self::with_limit(fixtures_dir, RATE_LIMIT_PER_MINUTE)
    }

    /// Creates state with a custom per-minute budget.
    pub fn with_limit(fixtures_dir: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            fixtures_dir: Arc::new(fixtures_dir.into()),
            limit,
            hits: Arc::new(DashMap::new()),
        }
    }

    /// Records a request from `client`; false once the budget is spent.
    fn admit(&self, client: IpAddr, now: Instant) -> bool {
        let mut window = self.hits.entry(client).or_default();
        while window
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= WINDOW)
        {
            window.pop_front();
        }
        if window.len() >= self.limit {
            return false;
        }
        window.push_back(now);
        true
    }

    fn load(&self, file: &str) -> Option<Value> {
        load_fixture(&self.fixtures_dir, file)
    }
}

/// Query string of the country endpoint.
#[derive(Debug, Deserialize)]
pub struct CountryQuery {
    /// Comma-separated field list; must request `name,currencies`.
    #[serde(default)]
    pub fields: String,
}

/// Creates the mock router.
pub fn router(state: MockState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v4/latest/{currency}", get(latest_rates))
        .route("/v3.1/all", get(all_countries))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().timestamp(),
        "service": "mock-api-server",
    }))
}

/// GET `/v4/latest/{currency}` - fixture rates dated today.
async fn latest_rates(
    State(state): State<MockState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    UrlPath(currency): UrlPath<String>,
) -> Response {
    if !state.admit(client.ip(), Instant::now()) {
        return rate_limited();
    }

    let currency = currency.to_uppercase();
    let Some(mut rates) = state.load(&format!("mock_rates_{currency}.json")) else {
        tracing::warn!(currency = %currency, "no rate fixture for currency");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("Currency {currency} not supported") })),
        )
            .into_response();
    };

    if let Some(object) = rates.as_object_mut() {
        object.insert(
            "date".to_string(),
            Value::String(Utc::now().date_naive().to_string()),
        );
    }
    tracing::info!(currency = %currency, "served exchange rates");
    Json(rates).into_response()
}

/// GET `/v3.1/all?fields=name,currencies` - the country fixture.
async fn all_countries(
    State(state): State<MockState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    Query(query): Query<CountryQuery>,
) -> Response {
    if !state.admit(client.ip(), Instant::now()) {
        return rate_limited();
    }

    if !query.fields.contains("name,currencies") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid fields parameter" })),
        )
            .into_response();
    }

    match state.load(crate::COUNTRIES_FIXTURE) {
        Some(countries) => {
            tracing::info!(
                countries = countries.as_array().map_or(0, Vec::len),
                "served country data"
            );
            Json(countries).into_response()
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Fixture data not available" })),
        )
            .into_response(),
    }
}

fn rate_limited() -> Response {
    tracing::warn!("simulated rate limit hit");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "Rate limit exceeded" })),
    )
        .into_response()
}

fn load_fixture(dir: &Path, file: &str) -> Option<Value> {
    let path = dir.join(file);
    let body = match std::fs::read(&path) {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "fixture not readable");
            return None;
        }
    };
    serde_json::from_slice(&body)
        .inspect_err(|err| {
            tracing::error!(path = %path.display(), error = %err, "fixture is not valid JSON");
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn repo_fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
    }

    async fn spawn(state: MockState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_window_admits_up_to_limit() {
        let state = MockState::with_limit(repo_fixtures(), 2);
        let client: IpAddr = [127, 0, 0, 1].into();
        let start = Instant::now();

        assert!(state.admit(client, start));
        assert!(state.admit(client, start));
        assert!(!state.admit(client, start));
        assert!(state.admit([10, 0, 0, 1].into(), start));
        assert!(state.admit(client, start + WINDOW));
    }

    #[tokio::test]
    async fn test_serves_rates_dated_today() {
        let base = spawn(MockState::new(repo_fixtures())).await;

        let body: Value = reqwest::get(format!("{base}/v4/latest/usd"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["base"], "USD");
        assert_eq!(body["date"], Utc::now().date_naive().to_string());
        assert!(body["rates"]["EUR"].is_number());
    }

    #[tokio::test]
    async fn test_unknown_currency_is_bad_request() {
        let base = spawn(MockState::new(repo_fixtures())).await;

        let response = reqwest::get(format!("{base}/v4/latest/XAU")).await.unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Currency XAU not supported");
    }

    #[tokio::test]
    async fn test_countries_require_fields() {
        let base = spawn(MockState::new(repo_fixtures())).await;

        let response = reqwest::get(format!("{base}/v3.1/all")).await.unwrap();
        assert_eq!(response.status().as_u16(), 400);

        let response = reqwest::get(format!("{base}/v3.1/all?fields=name,currencies"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert!(body.as_array().is_some_and(|a| !a.is_empty()));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_429() {
        let base = spawn(MockState::with_limit(repo_fixtures(), 1)).await;

        let first = reqwest::get(format!("{base}/v4/latest/EUR")).await.unwrap();
        assert_eq!(first.status().as_u16(), 200);
        let second = reqwest::get(format!("{base}/v4/latest/EUR")).await.unwrap();
        assert_eq!(second.status().as_u16(), 429);
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn(MockState::new(repo_fixtures())).await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");
    }
}
