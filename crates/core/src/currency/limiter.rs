//! Sliding-window request limiter for outbound rate fetches.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use expensa_shared::types::CurrencyCode;

/// Default window length.
const DEFAULT_WINDOW_SECS: i64 = 60;

/// Per-currency sliding window limiter.
///
/// Each base currency keeps its own queue of request timestamps. Timestamps
/// at or beyond the window edge are pruned before every check.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: DashMap<CurrencyCode, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_per_minute` requests per currency per minute.
    #[must_use]
    pub fn per_minute(max_per_minute: usize) -> Self {
        Self::with_window(max_per_minute, Duration::seconds(DEFAULT_WINDOW_SECS))
    }

    /// Creates a limiter with a custom window.
    #[must_use]
    pub fn with_window(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: DashMap::new(),
        }
    }

    /// Records a request for `currency` if the budget allows it.
    ///
    /// Returns false without recording when the budget is exhausted.
    pub fn check(&self, currency: &CurrencyCode) -> bool {
        self.check_at(currency, Utc::now())
    }

    /// Records a request as of `now`.
    pub fn check_at(&self, currency: &CurrencyCode, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut queue = self.requests.entry(currency.clone()).or_default();

        while queue.front().is_some_and(|ts| *ts <= cutoff) {
            queue.pop_front();
        }

        if queue.len() >= self.max_requests {
            tracing::warn!(
                currency = %currency,
                limit = self.max_requests,
                "exchange rate request budget exhausted"
            );
            return false;
        }

        queue.push_back(now);
        true
    }

    /// Returns how many requests are still allowed for `currency` at `now`.
    #[must_use]
    pub fn remaining_at(&self, currency: &CurrencyCode, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let used = self
            .requests
            .get(currency)
            .map_or(0, |queue| queue.iter().filter(|ts| **ts > cutoff).count());
        self.max_requests.saturating_sub(used)
    }

    /// Drops currencies with no requests inside the window.
    pub fn prune_idle_at(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.requests.retain(|_, queue| {
            queue.retain(|ts| *ts > cutoff);
            !queue.is_empty()
        });
    }
}
