//! Flash-sale tuning.

use std::time::Duration;

/// Cache lifetimes for flash-sale data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSaleConfig {
    /// How long stock and limit entries outlive the end of their activity.
    pub grace: Duration,
    /// TTL used when the activity window gives no positive TTL.
    pub fallback_ttl: Duration,
    /// TTL for the cached activity list and detail entries.
    pub listing_ttl: Duration,
}

impl Default for FlashSaleConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(86_400),
            fallback_ttl: Duration::from_secs(3_600),
            listing_ttl: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = FlashSaleConfig::default();
        assert_eq!(config.grace, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.fallback_ttl, Duration::from_secs(60 * 60));
        assert_eq!(config.listing_ttl, Duration::from_secs(5 * 60));
    }
}
