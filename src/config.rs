//! Service configuration.
//!
//! Configuration is loaded from environment variables (after `.env` has been
//! applied by `dotenv`) with fallback to defaults. Only `DATABASE_URL` is
//! required.

use chrono::{FixedOffset, Offset, Utc};
use std::str::FromStr;
use std::time::Duration;

/// What cancelling an order does to the coupon usage it consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CouponReleasePolicy {
    /// The usage stays counted forever
    #[default]
    Consume,
    /// The usage row is voided and its slot returns to the pool
    Void,
}

impl FromStr for CouponReleasePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "consume" => Ok(CouponReleasePolicy::Consume),
            "void" => Ok(CouponReleasePolicy::Void),
            other => Err(format!("unknown coupon release policy: {other}")),
        }
    }
}

/// What checkout does when the coupon's limits are exhausted at lock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CouponExhaustedPolicy {
    /// Abort the checkout with the limit rejection
    #[default]
    Reject,
    /// Place the order at full price without a usage row
    DropCoupon,
}

impl FromStr for CouponExhaustedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(CouponExhaustedPolicy::Reject),
            "drop_coupon" => Ok(CouponExhaustedPolicy::DropCoupon),
            other => Err(format!("unknown coupon exhausted policy: {other}")),
        }
    }
}

/// Knobs of the checkout transaction
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Upper bound for one checkout attempt, locks and commit included
    pub attempt_timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// First backoff delay; doubled on every retry
    pub retry_base: Duration,
    /// Postgres `lock_timeout` for checkout transactions
    pub lock_timeout: Duration,
    /// Offset of the store's wall clock from UTC
    pub store_offset: FixedOffset,
    /// Flat delivery fee in minor units; pickup and free-ship orders pay nothing
    pub shipping_fee: i64,
    pub release_on_cancel: CouponReleasePolicy,
    pub exhausted_policy: CouponExhaustedPolicy,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(5000),
            max_retries: 3,
            retry_base: Duration::from_millis(50),
            lock_timeout: Duration::from_millis(2000),
            store_offset: Utc.fix(),
            shipping_fee: 30000,
            release_on_cancel: CouponReleasePolicy::Consume,
            exhausted_policy: CouponExhaustedPolicy::Reject,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub checkout: CheckoutSettings,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("DATABASE_URL".to_string()))?;

        let defaults = CheckoutSettings::default();

        let offset_minutes: i32 = parse_or(&lookup, "STORE_UTC_OFFSET_MINUTES", 0)?;
        let store_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue("STORE_UTC_OFFSET_MINUTES".to_string()))?;

        let shipping_fee: i64 = parse_or(&lookup, "SHIPPING_FEE", defaults.shipping_fee)?;
        if shipping_fee < 0 {
            return Err(ConfigError::InvalidValue("SHIPPING_FEE".to_string()));
        }

        let checkout = CheckoutSettings {
            attempt_timeout: Duration::from_millis(parse_or(&lookup, "CHECKOUT_TIMEOUT_MS", 5000)?),
            max_retries: parse_or(&lookup, "CHECKOUT_MAX_RETRIES", defaults.max_retries)?,
            retry_base: Duration::from_millis(parse_or(&lookup, "CHECKOUT_RETRY_BASE_MS", 50)?),
            lock_timeout: Duration::from_millis(parse_or(&lookup, "LOCK_TIMEOUT_MS", 2000)?),
            store_offset,
            shipping_fee,
            release_on_cancel: parse_or(&lookup, "COUPON_RELEASE_ON_CANCEL", defaults.release_on_cancel)?,
            exhausted_policy: parse_or(&lookup, "COUPON_EXHAUSTED_POLICY", defaults.exhausted_policy)?,
        };

        if checkout.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("CHECKOUT_TIMEOUT_MS".to_string()));
        }
        // Postgres reads a zero lock_timeout as "wait forever"
        if checkout.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("LOCK_TIMEOUT_MS".to_string()));
        }

        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?;
        if db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(AppConfig {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            db_max_connections,
            db_acquire_timeout: Duration::from_secs(parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 3)?),
            checkout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        _ => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
