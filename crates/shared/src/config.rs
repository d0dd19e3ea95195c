//! Application configuration management.

use std::path::PathBuf;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Exchange-rate and country reference data configuration.
    #[serde(default)]
    pub currency: CurrencyConfig,
    /// Approval workflow configuration.
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Admin notification configuration.
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Background sweep intervals.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Local mock upstream server.
    #[serde(default)]
    pub mock_server: MockServerConfig,
}

/// Exchange-rate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    /// Base URL of the exchange-rate endpoint; the base currency is appended as a path segment.
    #[serde(default = "default_exchange_api_url")]
    pub exchange_api_url: String,
    /// Country/currency reference endpoint.
    #[serde(default = "default_countries_api_url")]
    pub countries_api_url: String,
    /// Time-to-live of cached rate sets, in hours.
    #[serde(default = "default_rates_ttl_hours")]
    pub rates_ttl_hours: u32,
    /// Time-to-live of the country mapping cache, in days.
    #[serde(default = "default_country_ttl_days")]
    pub country_ttl_days: u32,
    /// Serve fixtures only, never touching the network.
    #[serde(default)]
    pub use_stubs: bool,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries after the first attempt on 429, 5xx and transport errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds; doubles on each retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Sliding one-minute request budget per base currency.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: usize,
    /// Directory holding `mock_rates_<CODE>.json` and `mock_restcountries.json`.
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,
    /// Base currencies whose rates the worker refreshes at startup.
    #[serde(default = "default_warm_currencies")]
    pub warm_currencies: Vec<String>,
}

fn default_exchange_api_url() -> String {
    "https://api.exchangerate-api.com/v4/latest".to_string()
}

fn default_countries_api_url() -> String {
    "https://restcountries.com/v3.1/all?fields=name,currencies".to_string()
}

fn default_rates_ttl_hours() -> u32 {
    24
}

fn default_country_ttl_days() -> u32 {
    7
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_rate_limit_per_minute() -> usize {
    30
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from("fixtures")
}

fn default_warm_currencies() -> Vec<String> {
    vec!["USD".to_string()]
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            exchange_api_url: default_exchange_api_url(),
            countries_api_url: default_countries_api_url(),
            rates_ttl_hours: default_rates_ttl_hours(),
            country_ttl_days: default_country_ttl_days(),
            use_stubs: false,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            fixtures_dir: default_fixtures_dir(),
            warm_currencies: default_warm_currencies(),
        }
    }
}

/// Approval workflow configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalConfig {
    /// Pending requests older than this get a reminder.
    #[serde(default = "default_reminder_after_hours")]
    pub reminder_after_hours: u32,
}

fn default_reminder_after_hours() -> u32 {
    24
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            reminder_after_hours: default_reminder_after_hours(),
        }
    }
}

/// Admin notification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// Recipient of operational alerts; alerts are disabled when unset.
    #[serde(default)]
    pub admin_email: Option<String>,
}

/// Background sweep intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often overdue approval requests are escalated.
    #[serde(default = "default_escalation_interval_secs")]
    pub escalation_interval_secs: u64,
    /// How often pending-approval reminders are sent.
    #[serde(default = "default_reminder_interval_secs")]
    pub reminder_interval_secs: u64,
    /// How often expired rate-cache entries are removed.
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,
}

fn default_escalation_interval_secs() -> u64 {
    900 // 15 minutes
}

fn default_reminder_interval_secs() -> u64 {
    86400 // 1 day
}

fn default_cache_sweep_interval_secs() -> u64 {
    3600 // 1 hour
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            escalation_interval_secs: default_escalation_interval_secs(),
            reminder_interval_secs: default_reminder_interval_secs(),
            cache_sweep_interval_secs: default_cache_sweep_interval_secs(),
        }
    }
}

/// Mock upstream server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MockServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or fails validation.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("EXPENSA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: Self = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Checks cross-field constraints that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` describing the first violated constraint.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.currency.rates_ttl_hours < 1 {
            return Err(config::ConfigError::Message(
                "currency.rates_ttl_hours must be at least 1".to_string(),
            ));
        }
        if self.currency.max_retries > 10 {
            return Err(config::ConfigError::Message(
                "currency.max_retries must not exceed 10".to_string(),
            ));
        }
        if self.currency.rate_limit_per_minute == 0 {
            return Err(config::ConfigError::Message(
                "currency.rate_limit_per_minute must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.currency.rates_ttl_hours, 24);
        assert_eq!(config.currency.country_ttl_days, 7);
        assert_eq!(config.currency.request_timeout_secs, 10);
        assert_eq!(config.currency.max_retries, 3);
        assert_eq!(config.currency.rate_limit_per_minute, 30);
        assert!(!config.currency.use_stubs);
        assert_eq!(config.currency.warm_currencies, vec!["USD"]);
        assert!(config.notifications.admin_email.is_none());
        assert_eq!(config.approval.reminder_after_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("EXPENSA__CURRENCY__USE_STUBS", Some("true")),
                ("EXPENSA__CURRENCY__RATES_TTL_HOURS", Some("6")),
                ("EXPENSA__NOTIFICATIONS__ADMIN_EMAIL", Some("ops@example.com")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert!(config.currency.use_stubs);
                assert_eq!(config.currency.rates_ttl_hours, 6);
                assert_eq!(
                    config.notifications.admin_email.as_deref(),
                    Some("ops@example.com")
                );
            },
        );
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = AppConfig::default();
        config.currency.rates_ttl_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_rate_limit() {
        let mut config = AppConfig::default();
        config.currency.rate_limit_per_minute = 0;
        assert!(config.validate().is_err());
    }
}
