use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a human-readable order number.
///
/// Format is the UTC timestamp `YYYYMMDDHHMMSSmmm` followed by a random
/// six-digit suffix. Uniqueness is enforced by the store; a collision
/// surfaces as a retryable unique violation.
pub fn generate_order_no(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().as_u128() % 1_000_000;
    format!("{}{suffix:06}", now.format("%Y%m%d%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_prefix_and_numeric_suffix() {
        let now = Utc
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(42))
            .unwrap();

        let order_no = generate_order_no(now);

        assert_eq!(order_no.len(), 23);
        assert!(order_no.starts_with("20240309070501042"));
        assert!(order_no.chars().all(|c| c.is_ascii_digit()));
    }
}
