//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::CheckoutConfig;
use flash_sale::FlashSaleConfig;
use thiserror::Error;

/// A variable was set to a value that can't be used.
#[derive(Debug, Error)]
#[error("invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Server configuration with documented defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `REDIS_URL`: Redis URL; unset runs on the in-memory cache
/// - `CHECKOUT_LOCK_TIMEOUT_MS`: row lock wait bound (default: `5000`)
/// - `CHECKOUT_MAX_ATTEMPTS`: attempts per order on transient failure (default: `3`)
/// - `FLASH_SALE_GRACE_SECS`: stock/limit TTL past activity end (default: `86400`)
/// - `FLASH_SALE_FALLBACK_TTL_SECS`: TTL for ended activities (default: `3600`)
/// - `FLASH_SALE_LISTING_TTL_SECS`: list/detail cache TTL (default: `300`)
/// - `AUDIT_BUFFER_SIZE`: queued audit records before new ones are dropped (default: `1024`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub checkout: CheckoutConfig,
    pub flash_sale: FlashSaleConfig,
    pub audit_buffer_size: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparsable or out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let lock_timeout_ms: u64 = parse(&var, "CHECKOUT_LOCK_TIMEOUT_MS", 5000)?;
        let max_attempts: u32 = parse(&var, "CHECKOUT_MAX_ATTEMPTS", 3)?;
        let fallback_secs: u64 = parse(&var, "FLASH_SALE_FALLBACK_TTL_SECS", 3600)?;
        let listing_secs: u64 = parse(&var, "FLASH_SALE_LISTING_TTL_SECS", 300)?;
        let max_connections: u32 = parse(&var, "DATABASE_MAX_CONNECTIONS", 10)?;
        let audit_buffer_size: usize = parse(&var, "AUDIT_BUFFER_SIZE", 1024)?;

        at_least_one("CHECKOUT_LOCK_TIMEOUT_MS", lock_timeout_ms)?;
        at_least_one("CHECKOUT_MAX_ATTEMPTS", u64::from(max_attempts))?;
        at_least_one("FLASH_SALE_FALLBACK_TTL_SECS", fallback_secs)?;
        at_least_one("FLASH_SALE_LISTING_TTL_SECS", listing_secs)?;
        at_least_one("DATABASE_MAX_CONNECTIONS", u64::from(max_connections))?;
        at_least_one("AUDIT_BUFFER_SIZE", audit_buffer_size as u64)?;

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(&var, "PORT", defaults.port)?,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(&var, "LOG_FORMAT", defaults.log_format)?,
            database_url: var("DATABASE_URL"),
            database_max_connections: max_connections,
            redis_url: var("REDIS_URL"),
            checkout: CheckoutConfig {
                lock_timeout: Duration::from_millis(lock_timeout_ms),
                max_attempts,
            },
            flash_sale: FlashSaleConfig {
                grace: Duration::from_secs(parse(&var, "FLASH_SALE_GRACE_SECS", 86_400)?),
                fallback_ttl: Duration::from_secs(fallback_secs),
                listing_ttl: Duration::from_secs(listing_secs),
            },
            audit_buffer_size,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            checkout: CheckoutConfig::default(),
            flash_sale: FlashSaleConfig::default(),
            audit_buffer_size: 1024,
        }
    }
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            var: name,
            reason: e.to_string(),
            value,
        }),
    }
}

fn at_least_one(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError {
            var: name,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}
