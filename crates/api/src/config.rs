//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{HttpGatewayConfig, SagaSettings};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `PAYMENT_GRACE_HOURS`: time to pay after acceptance (default: `24`)
/// - `GATEWAY_TIMEOUT_SECS`: bound on one provider call (default: `30`)
/// - `SWEEP_INTERVAL_SECS`: expiry sweep period (default: `3600`)
/// - `SWEEP_CONCURRENCY`: bookings compensated in parallel (default: `4`)
/// - `MAX_PAYMENT_ATTEMPTS`: payment rows per booking (default: `3`)
/// - `WEBHOOK_HMAC_SECRET`: provider webhook signing secret
/// - `PAYMENT_PROVIDER_URL`, `PAYMENT_PROVIDER_API_KEY`: card/wallet provider
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub payment_grace_hours: i64,
    pub gateway_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_concurrency: usize,
    pub max_payment_attempts: u32,
    pub webhook_secret: String,
    pub payment_provider_url: String,
    pub payment_provider_api_key: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            payment_grace_hours: parsed("PAYMENT_GRACE_HOURS")
                .unwrap_or(defaults.payment_grace_hours),
            gateway_timeout_secs: parsed("GATEWAY_TIMEOUT_SECS")
                .unwrap_or(defaults.gateway_timeout_secs),
            sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.sweep_interval_secs),
            sweep_concurrency: parsed("SWEEP_CONCURRENCY").unwrap_or(defaults.sweep_concurrency),
            max_payment_attempts: parsed("MAX_PAYMENT_ATTEMPTS")
                .unwrap_or(defaults.max_payment_attempts),
            webhook_secret: std::env::var("WEBHOOK_HMAC_SECRET").unwrap_or_default(),
            payment_provider_url: std::env::var("PAYMENT_PROVIDER_URL")
                .unwrap_or(defaults.payment_provider_url),
            payment_provider_api_key: std::env::var("PAYMENT_PROVIDER_API_KEY")
                .unwrap_or_default(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn saga_settings(&self) -> SagaSettings {
        SagaSettings {
            payment_grace: chrono::Duration::hours(self.payment_grace_hours),
            gateway_timeout: Duration::from_secs(self.gateway_timeout_secs),
            max_payment_attempts: self.max_payment_attempts,
            sweep_concurrency: self.sweep_concurrency,
            ..SagaSettings::default()
        }
    }

    pub fn gateway_config(&self) -> HttpGatewayConfig {
        HttpGatewayConfig {
            base_url: self.payment_provider_url.clone(),
            api_key: self.payment_provider_api_key.clone(),
            timeout: Duration::from_secs(self.gateway_timeout_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            payment_grace_hours: 24,
            gateway_timeout_secs: 30,
            sweep_interval_secs: 3600,
            sweep_concurrency: 4,
            max_payment_attempts: 3,
            webhook_secret: String::new(),
            payment_provider_url: HttpGatewayConfig::default().base_url,
            payment_provider_api_key: String::new(),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_saga_settings_follow_config() {
        let config = Config {
            payment_grace_hours: 2,
            gateway_timeout_secs: 5,
            max_payment_attempts: 5,
            sweep_concurrency: 8,
            ..Config::default()
        };
        let settings = config.saga_settings();
        assert_eq!(settings.payment_grace, chrono::Duration::hours(2));
        assert_eq!(settings.gateway_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_payment_attempts, 5);
        assert_eq!(settings.sweep_concurrency, 8);
        assert_eq!(config.gateway_config().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Text);
    }
}
