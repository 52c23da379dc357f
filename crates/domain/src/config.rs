//! Checkout tuning.

use std::time::Duration;

/// Tuning for the order placement transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// How long a transaction waits for a row lock before failing.
    pub lock_timeout: Duration,
    /// Total attempts for one request when the transaction fails transiently.
    pub max_attempts: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(5000),
            max_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CheckoutConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.max_attempts, 3);
    }
}
