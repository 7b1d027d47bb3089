use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

use crate::domain::PaymentGateway;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Static gateway endpoints and webhook guards. Credentials are not here:
/// they live in `app_settings` and are read through `SettingsSnapshot`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PaymentConfig {
    pub default_gateway: PaymentGateway,
    pub settings_refresh_secs: u64,
    pub ccbill_flexform_url: String,
    pub ccbill_datalink_url: String,
    pub moonlight_transact_url: String,
    /// Inclusive IPv4 ranges written as `first-last`.
    pub moonlight_allowed_ips: Vec<String>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            default_gateway: PaymentGateway::Ccbill,
            settings_refresh_secs: 300,
            ccbill_flexform_url: "https://api.ccbill.com/wap-frontflex/flexforms".to_string(),
            ccbill_datalink_url: "https://datalink.ccbill.com/utils/subscriptionManagement.cgi"
                .to_string(),
            moonlight_transact_url: "https://allyypay.transactiongateway.com/api/transact.php"
                .to_string(),
            moonlight_allowed_ips: vec![
                "104.192.32.81-104.192.32.87".to_string(),
                "104.192.36.81-104.192.36.87".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MessagingConfig {
    pub chat_service_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("payment.default_gateway", "ccbill")?
            .set_default("payment.settings_refresh_secs", 300)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with FANLEDGER__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("FANLEDGER").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://fanledger.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            payment: PaymentConfig::default(),
            messaging: MessagingConfig::default(),
        }
    }
}
