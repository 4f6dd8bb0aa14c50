use chrono::{DateTime, Utc};

use cinder_types::models::{ExpirationSelector, Paste};

/// Expiry timestamp for a paste created at `now`; `None` never expires.
pub fn compute_expiry(selector: ExpirationSelector, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    selector.lifetime().map(|lifetime| now + lifetime)
}

/// A paste is expired strictly after its expiry instant. Since `expires_at`
/// never changes after creation this is monotonic in `now`.
pub fn is_expired(paste: &Paste, now: DateTime<Utc>) -> bool {
    paste.expires_at.is_some_and(|at| at < now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::test_support::blank_paste;

    fn paste_expiring(expires_at: Option<DateTime<Utc>>) -> Paste {
        Paste {
            expiration: ExpirationSelector::TenMinutes,
            expires_at,
            ..blank_paste("exp")
        }
    }

    #[test]
    fn selectors_map_to_fixed_offsets() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(compute_expiry(ExpirationSelector::Never, t), None);
        assert_eq!(compute_expiry(ExpirationSelector::TenMinutes, t), Some(t + Duration::minutes(10)));
        assert_eq!(compute_expiry(ExpirationSelector::OneHour, t), Some(t + Duration::hours(1)));
        assert_eq!(compute_expiry(ExpirationSelector::OneDay, t), Some(t + Duration::days(1)));
        assert_eq!(compute_expiry(ExpirationSelector::OneWeek, t), Some(t + Duration::days(7)));
        assert_eq!(compute_expiry(ExpirationSelector::OneMonth, t), Some(t + Duration::days(30)));
    }

    #[test]
    fn ten_minute_boundary() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let paste = paste_expiring(compute_expiry(ExpirationSelector::TenMinutes, t));

        assert!(!is_expired(&paste, t + Duration::minutes(9) + Duration::seconds(59)));
        assert!(!is_expired(&paste, t + Duration::minutes(10)));
        assert!(is_expired(&paste, t + Duration::minutes(10) + Duration::seconds(1)));
    }

    #[test]
    fn expiry_is_monotonic() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let paste = paste_expiring(Some(t));

        let mut seen_expired = false;
        for step in 0..120 {
            let expired = is_expired(&paste, t - Duration::seconds(60) + Duration::seconds(step));
            assert!(!(seen_expired && !expired), "expiry reverted at step {step}");
            seen_expired |= expired;
        }
        assert!(seen_expired);
        assert!(!is_expired(&paste_expiring(None), t + Duration::days(10_000)));
    }
}
