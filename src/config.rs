//! Runtime settings sourced from the environment.
//!
//! A `.env` file in the working directory is honoured via `dotenv`. Every value
//! has a default so backtests run without any configuration; only live order
//! placement needs `BINANCE_API_KEY` and `BINANCE_API_SECRET`.

use std::env;
use tracing::debug;

/// Production REST endpoint.
pub const BINANCE_REST: &str = "https://api.binance.com";
/// Spot testnet REST endpoint.
pub const BINANCE_TESTNET: &str = "https://testnet.binance.vision";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub api_key: String,
    pub api_secret: String,
    pub rest_url: String,
    pub testnet_url: String,
}

impl Settings {
    /// Loads `.env` (if present) and reads the settings from the process environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let settings = Self {
            api_key: env::var("BINANCE_API_KEY").unwrap_or_default(),
            api_secret: env::var("BINANCE_API_SECRET").unwrap_or_default(),
            rest_url: env::var("BINANCE_REST_URL").unwrap_or_else(|_| BINANCE_REST.to_string()),
            testnet_url: env::var("BINANCE_TESTNET_URL")
                .unwrap_or_else(|_| BINANCE_TESTNET.to_string()),
        };
        debug!(
            rest_url = %settings.rest_url,
            testnet_url = %settings.testnet_url,
            has_credentials = settings.has_credentials(),
            "Loaded settings"
        );
        settings
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Base URL used for trading: the testnet unless explicitly disabled.
    pub fn trading_url(&self, testnet: bool) -> &str {
        if testnet {
            &self.testnet_url
        } else {
            &self.rest_url
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for key in [
            "BINANCE_API_KEY",
            "BINANCE_API_SECRET",
            "BINANCE_REST_URL",
            "BINANCE_TESTNET_URL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_without_environment() {
        clear();
        let settings = Settings::from_env();
        assert_eq!(settings.rest_url, BINANCE_REST);
        assert_eq!(settings.testnet_url, BINANCE_TESTNET);
        assert!(!settings.has_credentials());
    }

    #[test]
    #[serial]
    fn reads_credentials_and_overrides() {
        clear();
        env::set_var("BINANCE_API_KEY", "key");
        env::set_var("BINANCE_API_SECRET", "secret");
        env::set_var("BINANCE_TESTNET_URL", "http://127.0.0.1:9999");
        let settings = Settings::from_env();
        assert!(settings.has_credentials());
        assert_eq!(settings.trading_url(true), "http://127.0.0.1:9999");
        assert_eq!(settings.trading_url(false), BINANCE_REST);
        clear();
    }
}
