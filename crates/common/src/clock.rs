use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current time.
///
/// Expiry checks, discount windows and history timestamps all read the
/// clock through this trait so they can be pinned in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date of `now()` in UTC.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(RwLock::new(instant)),
        }
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        match self.instant.write() {
            Ok(mut guard) => *guard = instant,
            Err(poisoned) => *poisoned.into_inner() = instant,
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let next = self.now() + delta;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn fixed_clock_holds_its_instant() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn clones_share_advances() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        let other = clock.clone();

        clock.advance(chrono::Duration::hours(2));

        assert_eq!(other.today(), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    #[test]
    fn system_clock_is_close_to_now() {
        let drift = Utc::now() - SystemClock.now();
        assert!(drift.num_seconds().abs() < 5);
    }
}
