//! Live exchange-rate fetcher.
//!
//! Issues `GET {exchange_api_url}/{BASE}` and retries HTTP 429, 5xx and
//! transport errors with exponential backoff. A body cut off mid-read is a
//! transport error. Malformed or invalid payloads end the attempt
//! immediately. Worst-case latency is bounded by
//! `timeout × (max_retries + 1)` plus the backoff sum.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use expensa_core::currency::{
    FetchError, RateProvider, RateSet, RateSource, payload_hash, validate_rates_payload,
};
use expensa_shared::config::CurrencyConfig;
use expensa_shared::types::CurrencyCode;
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// HTTP `RateProvider` backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct RateFetcher {
    client: Client,
    base_url: String,
    max_retries: u32,
    backoff_base: Duration,
}

impl RateFetcher {
    /// Creates a fetcher.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Endpoint prefix; the base currency is appended as a path segment
    /// * `timeout` - Per-request timeout
    /// * `max_retries` - Retries after the first attempt
    /// * `backoff_base` - Wait before the first retry; doubles on each retry
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
        backoff_base: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            max_retries,
            backoff_base,
        })
    }

    /// Creates a fetcher from the `currency` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the HTTP client cannot be built.
    pub fn from_config(config: &CurrencyConfig) -> Result<Self, FetchError> {
        Self::new(
            config.exchange_api_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
            config.max_retries,
            Duration::from_millis(config.backoff_base_ms),
        )
    }

    /// Returns the URL queried for `base`.
    #[must_use]
    pub fn endpoint(&self, base: &CurrencyCode) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), base)
    }

    /// Returns the wait before retry number `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    fn parse(&self, base: &CurrencyCode, url: &str, body: &[u8]) -> Result<RateSet, FetchError> {
        let payload: Value =
            serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        let now = Utc::now();
        let validated = validate_rates_payload(&payload, base, now.date_naive())
            .map_err(|e| FetchError::Validation(e.to_string()))?;

        let mut rates = RateSet::new(
            validated.base,
            validated.date,
            validated.rates,
            RateSource::Api,
        );
        rates.source_url = Some(url.to_string());
        rates.fetched_at = Some(now);
        rates.raw_hash = Some(payload_hash(body));
        Ok(rates)
    }
}

#[async_trait]
impl RateProvider for RateFetcher {
    async fn fetch_latest(&self, base: &CurrencyCode) -> Result<RateSet, FetchError> {
        let url = self.endpoint(base);
        let mut last = String::new();

        for attempt in 0..=self.max_retries {
            tracing::debug!(currency = %base, attempt = attempt + 1, "fetching exchange rates");

            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last = format!("status {}", status.as_u16());
                    } else if !status.is_success() {
                        tracing::error!(
                            currency = %base,
                            status = status.as_u16(),
                            "exchange rate request refused"
                        );
                        return Err(FetchError::Status(status.as_u16()));
                    } else {
                        match response.bytes().await {
                            Ok(body) => {
                                let rates = self.parse(base, &url, &body)?;
                                tracing::info!(
                                    currency = %base,
                                    rates = rates.rates.len(),
                                    "fetched exchange rates"
                                );
                                return Ok(rates);
                            }
                            Err(err) => last = format!("body read failed: {err}"),
                        }
                    }
                }
                Err(err) => last = err.to_string(),
            }

            if attempt < self.max_retries {
                let wait = self.backoff(attempt);
                tracing::warn!(
                    currency = %base,
                    attempt = attempt + 1,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    reason = %last,
                    "exchange rate fetch failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }

        tracing::error!(
            currency = %base,
            attempts = self.max_retries + 1,
            reason = %last,
            "exchange rate retries exhausted"
        );
        Err(FetchError::Transient {
            attempts: self.max_retries + 1,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::State;
    use axum::http::header;
    use axum::routing::get;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Script {
        responses: Mutex<VecDeque<(StatusCode, String)>>,
        hits: AtomicUsize,
    }

    type Reply = (StatusCode, [(header::HeaderName, &'static str); 1], String);

    async fn scripted(State(script): State<Arc<Script>>) -> Reply {
        script.hits.fetch_add(1, Ordering::SeqCst);
        let (status, body) = script
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, String::new()));
        (status, [(header::CONTENT_TYPE, "application/json")], body)
    }

    async fn serve(responses: Vec<(StatusCode, &str)>) -> (String, Arc<Script>) {
        let script = Arc::new(Script {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(s, b)| (s, b.to_string()))
                    .collect(),
            ),
            hits: AtomicUsize::new(0),
        });
        let router = Router::new()
            .route("/v4/latest/{currency}", get(scripted))
            .with_state(script.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}/v4/latest"), script)
    }

    fn fetcher(url: &str, max_retries: u32) -> RateFetcher {
        RateFetcher::new(url, Duration::from_secs(5), max_retries, Duration::from_millis(1)).unwrap()
    }

    fn usd() -> CurrencyCode {
        CurrencyCode::parse("USD").unwrap()
    }

    const OK_BODY: &str = r#"{"base":"USD","date":"2025-01-15","rates":{"EUR":0.85,"GBP":0.73,"bad":1,"JPY":-3}}"#;

    #[test]
    fn test_backoff_doubles() {
        let fetcher =
            RateFetcher::new("http://x", Duration::from_secs(1), 3, Duration::from_secs(1))
                .unwrap();
        assert_eq!(fetcher.backoff(0), Duration::from_secs(1));
        assert_eq!(fetcher.backoff(1), Duration::from_secs(2));
        assert_eq!(fetcher.backoff(2), Duration::from_secs(4));
        assert_eq!(fetcher.endpoint(&usd()), "http://x/USD");
    }

    #[tokio::test]
    async fn test_success_validates_and_hashes() {
        let (url, script) = serve(vec![(StatusCode::OK, OK_BODY)]).await;
        let rates = fetcher(&url, 3).fetch_latest(&usd()).await.unwrap();

        assert_eq!(rates.source, RateSource::Api);
        assert!(!rates.is_fallback);
        assert_eq!(rates.rates.len(), 2);
        assert_eq!(rates.rate_for(&CurrencyCode::parse("EUR").unwrap()), Some(dec!(0.85)));
        assert_eq!(rates.source_url.as_deref(), Some(format!("{url}/USD").as_str()));
        assert_eq!(rates.raw_hash, Some(payload_hash(OK_BODY.as_bytes())));
        assert!(rates.fetched_at.is_some());
        assert_eq!(script.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_429_and_5xx_then_succeeds() {
        let (url, script) = serve(vec![
            (StatusCode::TOO_MANY_REQUESTS, ""),
            (StatusCode::SERVICE_UNAVAILABLE, ""),
            (StatusCode::OK, OK_BODY),
        ])
        .await;
        let rates = fetcher(&url, 3).fetch_latest(&usd()).await.unwrap();
        assert_eq!(rates.rates.len(), 2);
        assert_eq!(script.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_transient() {
        let (url, script) = serve(vec![(StatusCode::TOO_MANY_REQUESTS, ""); 4]).await;
        let err = fetcher(&url, 3).fetch_latest(&usd()).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Transient {
                attempts: 4,
                last: "status 429".to_string()
            }
        );
        assert_eq!(script.hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, script) = serve(vec![(StatusCode::BAD_REQUEST, r#"{"error":"nope"}"#)]).await;
        let err = fetcher(&url, 3).fetch_latest(&usd()).await.unwrap_err();
        assert_eq!(err, FetchError::Status(400));
        assert_eq!(script.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_json_is_terminal() {
        let (url, script) = serve(vec![(StatusCode::OK, "not json")]).await;
        let err = fetcher(&url, 3).fetch_latest(&usd()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        assert_eq!(script.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_rates_fail_validation() {
        let (url, _) = serve(vec![(StatusCode::OK, r#"{"base":"USD","rates":{"EUR":0}}"#)]).await;
        let err = fetcher(&url, 3).fetch_latest(&usd()).await.unwrap_err();
        assert!(matches!(err, FetchError::Validation(_)));
    }

    /// Serves one response whose body stops short of its declared length,
    /// then well-formed responses.
    async fn serve_truncated_once() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let reply = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        OK_BODY.len() + 64,
                        &OK_BODY[..10]
                    )
                } else {
                    format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        OK_BODY.len(),
                        OK_BODY
                    )
                };
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}/v4/latest"), hits)
    }

    #[tokio::test]
    async fn test_truncated_body_is_retried() {
        let (url, hits) = serve_truncated_once().await;
        let rates = fetcher(&url, 2).fetch_latest(&usd()).await.unwrap();
        assert_eq!(rates.rates.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let (url, hits) = serve_truncated_once().await;
        let err = fetcher(&url, 0).fetch_latest(&usd()).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transient { attempts: 1, ref last } if last.starts_with("body read failed")
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_retried() {
        // nothing listens on this port once the listener is dropped
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher(&format!("http://{addr}"), 1)
            .fetch_latest(&usd())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient { attempts: 2, .. }));
    }
}
