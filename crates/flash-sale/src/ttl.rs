use std::time::Duration;

use chrono::{DateTime, Utc};

const MIN_TTL: Duration = Duration::from_secs(1);

/// TTL for warmed entries: time left in the activity plus `grace`.
///
/// Falls back to `fallback` when that is under one second, so the result is
/// always strictly positive even for activities that ended long ago.
pub fn compute_ttl(
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
    fallback: Duration,
) -> Duration {
    let grace_secs = i64::try_from(grace.as_secs()).unwrap_or(i64::MAX);
    let secs = (end_time - now).num_seconds().saturating_add(grace_secs);

    match u64::try_from(secs) {
        Ok(secs) if secs >= MIN_TTL.as_secs() => Duration::from_secs(secs),
        _ => fallback.max(MIN_TTL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);
    const HOUR: Duration = Duration::from_secs(3_600);

    #[test]
    fn upcoming_activity_gets_window_plus_grace() {
        let now = Utc::now();
        let ttl = compute_ttl(now + chrono::Duration::hours(2), now, DAY, HOUR);
        assert_eq!(ttl, Duration::from_secs(26 * 3_600));
    }

    #[test]
    fn long_ended_activity_gets_fallback() {
        let now = Utc::now();
        let ttl = compute_ttl(now - chrono::Duration::days(3), now, DAY, HOUR);
        assert_eq!(ttl, HOUR);
    }

    #[test]
    fn recently_ended_activity_keeps_remaining_grace() {
        let now = Utc::now();
        let ttl = compute_ttl(now - chrono::Duration::hours(1), now, DAY, HOUR);
        assert_eq!(ttl, Duration::from_secs(23 * 3_600));
    }

    #[test]
    fn exact_expiry_uses_fallback() {
        let now = Utc::now();
        let ttl = compute_ttl(now - chrono::Duration::days(1), now, DAY, HOUR);
        assert_eq!(ttl, HOUR);
    }

    #[test]
    fn zero_fallback_is_still_positive() {
        let now = Utc::now();
        let ttl = compute_ttl(now - chrono::Duration::days(3), now, DAY, Duration::ZERO);
        assert_eq!(ttl, Duration::from_secs(1));
    }
}
