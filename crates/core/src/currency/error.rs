//! Currency error types.
//!
//! `FetchError` never leaves the rate-resolution layer: the resolver turns it
//! into the next fallback tier. `CurrencyError` is what converter callers see.

use expensa_shared::AppError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by rate resolution and conversion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CurrencyError {
    /// Input is not a 3-letter ISO currency code.
    #[error("Invalid currency code: {0}")]
    InvalidCurrencyCode(String),

    /// Every rate source is exhausted for this base currency.
    #[error("Unable to get exchange rates for {currency}. Please try again later or contact administrator.")]
    RatesUnavailable {
        /// The base currency that could not be resolved.
        currency: String,
    },

    /// Rates were found for the base, but not for the target currency.
    #[error("Exchange rate not available for {from} to {to} conversion.")]
    RateNotAvailable {
        /// Source currency.
        from: String,
        /// Target currency.
        to: String,
    },

    /// A rate payload (API response or fixture) failed validation.
    #[error("Invalid rates payload: {0}")]
    InvalidRates(String),

    /// The converted amount does not fit in a `Decimal`.
    #[error("Converting {amount} at rate {rate} exceeds the supported amount range")]
    AmountOverflow {
        /// Amount being converted.
        amount: Decimal,
        /// Rate it was multiplied by.
        rate: Decimal,
    },

    /// Cache TTL must be at least one hour.
    #[error("Cache TTL must be at least 1 hour, got {0}")]
    InvalidTtl(u32),
}

impl CurrencyError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCurrencyCode(_) | Self::InvalidTtl(_) => 400,
            Self::RateNotAvailable { .. } | Self::AmountOverflow { .. } => 422,
            Self::InvalidRates(_) => 502,
            Self::RatesUnavailable { .. } => 503,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCurrencyCode(_) => "INVALID_CURRENCY_CODE",
            Self::RatesUnavailable { .. } => "RATES_UNAVAILABLE",
            Self::RateNotAvailable { .. } => "RATE_NOT_AVAILABLE",
            Self::InvalidRates(_) => "INVALID_RATES",
            Self::AmountOverflow { .. } => "AMOUNT_OUT_OF_RANGE",
            Self::InvalidTtl(_) => "INVALID_TTL",
        }
    }

    /// Returns true when the failure should leave the claim's conversion pending
    /// rather than reject the claim outright.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RatesUnavailable { .. } | Self::InvalidRates(_))
    }
}

impl From<expensa_shared::types::InvalidCurrencyCode> for CurrencyError {
    fn from(err: expensa_shared::types::InvalidCurrencyCode) -> Self {
        Self::InvalidCurrencyCode(err.0)
    }
}

impl From<CurrencyError> for AppError {
    fn from(err: CurrencyError) -> Self {
        match err {
            CurrencyError::RatesUnavailable { .. } => Self::ConversionUnavailable(err.to_string()),
            CurrencyError::RateNotAvailable { .. } => Self::BusinessRule(err.to_string()),
            CurrencyError::InvalidRates(_) => Self::ExternalService(err.to_string()),
            CurrencyError::InvalidCurrencyCode(_)
            | CurrencyError::InvalidTtl(_)
            | CurrencyError::AmountOverflow { .. } => Self::Validation(err.to_string()),
        }
    }
}

/// Failure of a single live rate fetch.
///
/// Transient failures have already been retried by the fetcher when this is
/// returned; validation failures are terminal for the attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Retry budget exhausted on 429, 5xx, or transport errors.
    #[error("transient failure after {attempts} attempts: {last}")]
    Transient {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// Description of the last failure.
        last: String,
    },

    /// Non-retryable HTTP status (4xx other than 429).
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Response body was not valid JSON.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Response JSON did not carry a usable rate table.
    #[error("response failed validation: {0}")]
    Validation(String),

    /// HTTP client could not be constructed or the URL is invalid.
    #[error("http client error: {0}")]
    Client(String),
}

impl FetchError {
    /// Returns true for failures that were (or would be) retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
