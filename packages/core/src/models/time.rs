//! Time Provider Abstraction
//!
//! Provides a trait-based abstraction for time operations so pipeline
//! timestamps are deterministic in tests, plus the millisecond truncation
//! every timestamp goes through before persisting (not all storage backends
//! keep sub-millisecond precision, and FIFO ordering must survive a
//! round-trip through any of them).

use chrono::{DateTime, Timelike, Utc};

/// Drop sub-millisecond precision from a timestamp.
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = dt.nanosecond() / 1_000_000 * 1_000_000;
    dt.with_nanosecond(nanos).unwrap_or(dt)
}

/// Trait for providing current time.
pub trait TimeProvider: Send + Sync {
    /// Current UTC time, truncated to millisecond precision.
    fn now(&self) -> DateTime<Utc>;
}

/// System time provider using the actual system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_to_millisecond_precision() {
        let dt = DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let truncated = truncate_to_millis(dt);
        assert_eq!(truncated.timestamp_subsec_millis(), 123);
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn system_provider_is_pre_truncated() {
        let now = SystemTimeProvider.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
