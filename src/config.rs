//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::token_cache::TokenPolicy;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` when running with `SKIP_EXTERNALS=true` (in-memory stores)
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub processor: ProcessorConfig,
    pub gateway: GatewayConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Address merchants reach this service on, used in integration guides
    pub public_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Outbound processor settings, injected into `ProcessorClient`
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub base_url: String,
    pub checkout_base_url: String,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
    pub business_type: String,
    pub default_timeout_express: String,
    pub language: String,
}

/// Gateway behaviour toggles
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token_policy: TokenPolicy,
    pub verify_webhook_signatures: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let skip_externals = env::var("SKIP_EXTERNALS")
            .unwrap_or_else(|_| "false".to_string())
            .eq_ignore_ascii_case("true");

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: if skip_externals {
                None
            } else {
                Some(DatabaseConfig::from_env()?)
            },
            logging: LoggingConfig::from_env()?,
            processor: ProcessorConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.processor.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8001".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?;

        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| format!("http://127.0.0.1:{}", port)),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        if !self.public_base_url.starts_with("http://")
            && !self.public_base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationFailed(
                "PUBLIC_BASE_URL must be an http(s) URL".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://processor.example.com/apiaccess/payment/gateway".to_string(),
            checkout_base_url: "https://checkout.example.com".to_string(),
            timeout_secs: 30,
            accept_invalid_certs: false,
            business_type: "OnlineMerchant".to_string(),
            default_timeout_express: "120m".to_string(),
            language: "en".to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(ProcessorConfig {
            base_url: env::var("PROCESSOR_BASE_URL")
                .map_err(|_| ConfigError::MissingVariable("PROCESSOR_BASE_URL".to_string()))?,
            checkout_base_url: env::var("PROCESSOR_CHECKOUT_BASE_URL").map_err(|_| {
                ConfigError::MissingVariable("PROCESSOR_CHECKOUT_BASE_URL".to_string())
            })?,
            timeout_secs: env::var("PROCESSOR_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.timeout_secs.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PROCESSOR_TIMEOUT_SECS".to_string()))?,
            accept_invalid_certs: env::var("PROCESSOR_ACCEPT_INVALID_CERTS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("PROCESSOR_ACCEPT_INVALID_CERTS".to_string())
                })?,
            business_type: env::var("PROCESSOR_BUSINESS_TYPE")
                .unwrap_or(defaults.business_type),
            default_timeout_express: defaults.default_timeout_express,
            language: defaults.language,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("PROCESSOR_BASE_URL", &self.base_url),
            ("PROCESSOR_CHECKOUT_BASE_URL", &self.checkout_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be a valid URL",
                    name
                )));
            }
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PROCESSOR_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let skew_secs: u64 = env::var("TOKEN_EXPIRY_SKEW_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("TOKEN_EXPIRY_SKEW_SECS".to_string()))?;

        let token_policy = match env::var("TOKEN_CACHE_POLICY")
            .unwrap_or_else(|_| "always_refresh".to_string())
            .as_str()
        {
            "always_refresh" => TokenPolicy::AlwaysRefresh,
            "reuse_until_expiry" => TokenPolicy::ReuseUntilExpiry {
                skew: chrono::Duration::seconds(skew_secs as i64),
            },
            other => {
                return Err(ConfigError::ValidationFailed(format!(
                    "TOKEN_CACHE_POLICY must be always_refresh or reuse_until_expiry, got {}",
                    other
                )))
            }
        };

        Ok(GatewayConfig {
            token_policy,
            verify_webhook_signatures: env::var("WEBHOOK_VERIFY_SIGNATURES")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("WEBHOOK_VERIFY_SIGNATURES".to_string()))?,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
