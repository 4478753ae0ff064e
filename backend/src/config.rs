//! Configuration management for the Retail Ledger server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with RL_ prefix (`RL__DATABASE__URL`)

use std::collections::{HashMap, HashSet};

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{is_valid_prefix, ReceiptKind, VoucherType, DEFAULT_NUMBER_WIDTH};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Stock posting rules
    pub inventory: InventoryConfig,

    /// Document numbering
    pub numbering: NumberingConfig,

    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Run embedded migrations at startup
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,

    /// Refresh token expiration in seconds
    pub refresh_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InventoryConfig {
    /// Accept vouchers that drive a product or batch balance below zero
    pub allow_negative_stock: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NumberingConfig {
    /// Zero-pad width of the numeric part
    pub width: usize,

    /// Prefix overrides keyed by voucher type or receipt kind name
    #[serde(default)]
    pub prefixes: HashMap<String, String>,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_NUMBER_WIDTH,
            prefixes: HashMap::new(),
        }
    }
}

impl NumberingConfig {
    pub fn voucher_prefix(&self, voucher_type: VoucherType) -> &str {
        self.prefixes
            .get(voucher_type.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| voucher_type.default_prefix())
    }

    pub fn receipt_prefix(&self, kind: ReceiptKind) -> &str {
        self.prefixes
            .get(kind.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_prefix())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.width > 12 {
            return Err(ConfigError::Message("numbering.width must be 1-12".into()));
        }
        for (key, prefix) in &self.prefixes {
            if VoucherType::from_str(key).is_none() && ReceiptKind::from_str(key).is_none() {
                return Err(ConfigError::Message(format!("unknown numbering prefix key '{}'", key)));
            }
            if !is_valid_prefix(prefix) {
                return Err(ConfigError::Message(format!("invalid numbering prefix '{}'", prefix)));
            }
        }

        // Each document series needs its own sequence row
        let effective = VoucherType::ALL
            .into_iter()
            .map(|t| (t.as_str(), self.voucher_prefix(t)))
            .chain([ReceiptKind::Receipt, ReceiptKind::Payment].map(|k| (k.as_str(), self.receipt_prefix(k))));
        let mut seen = HashSet::new();
        for (key, prefix) in effective {
            if !seen.insert(prefix) {
                return Err(ConfigError::Message(format!(
                    "numbering prefix '{}' of '{}' is already used by another document type",
                    prefix, key
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("RL_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.run_migrations", environment == "development")?
            .set_default("jwt.access_token_expiry", 3600)?
            .set_default("jwt.refresh_token_expiry", 604800)?
            .set_default("inventory.allow_negative_stock", false)?
            .set_default("numbering.width", DEFAULT_NUMBER_WIDTH as i64)?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (RL prefix)
            .add_source(
                Environment::with_prefix("RL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.numbering.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for unit tests; the database URL is never dialled by a lazy pool
    pub(crate) fn for_tests() -> Self {
        Self {
            environment: "test".into(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/retail_ledger_test".into(),
                max_connections: 1,
                min_connections: 0,
                run_migrations: false,
            },
            jwt: JwtConfig {
                secret: "test-secret".into(),
                access_token_expiry: 60,
                refresh_token_expiry: 120,
            },
            inventory: InventoryConfig::default(),
            numbering: NumberingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefixes() {
        let numbering = NumberingConfig::default();
        assert_eq!(numbering.voucher_prefix(VoucherType::Sales), "INV");
        assert_eq!(numbering.voucher_prefix(VoucherType::Purchase), "PINV");
        assert_eq!(numbering.receipt_prefix(ReceiptKind::Receipt), "REC");
    }

    #[test]
    fn test_prefix_override() {
        let mut numbering = NumberingConfig::default();
        numbering.prefixes.insert("sales".into(), "BILL".into());
        assert_eq!(numbering.voucher_prefix(VoucherType::Sales), "BILL");
        assert!(numbering.validate().is_ok());
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let mut numbering = NumberingConfig::default();
        numbering.prefixes.insert("sales".into(), "bill".into());
        assert!(numbering.validate().is_err());

        let mut numbering = NumberingConfig::default();
        numbering.prefixes.insert("quotation".into(), "QT".into());
        assert!(numbering.validate().is_err());
    }

    #[test]
    fn test_shared_prefix_rejected() {
        // Sales would collide with the default purchase prefix
        let mut numbering = NumberingConfig::default();
        numbering.prefixes.insert("sales".into(), "PINV".into());
        assert!(numbering.validate().is_err());

        let mut numbering = NumberingConfig::default();
        numbering.prefixes.insert("receipt".into(), "DOC".into());
        numbering.prefixes.insert("payment".into(), "DOC".into());
        assert!(numbering.validate().is_err());

        // Swapping two prefixes keeps them distinct
        let mut numbering = NumberingConfig::default();
        numbering.prefixes.insert("receipt".into(), "PAY".into());
        numbering.prefixes.insert("payment".into(), "REC".into());
        assert!(numbering.validate().is_ok());
    }
}
