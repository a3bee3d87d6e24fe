//! Controllable time source

use chrono::{DateTime, Duration, TimeZone, Utc};
use ha_runtime::Clock;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct MockClock {
    current: Arc<RwLock<DateTime<Utc>>>,
}

impl MockClock {
    /// Start at a fixed, whole-second instant
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap())
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(RwLock::new(time)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.write().unwrap();
        *current = *current + duration;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }

    pub fn advance_hours(&self, hours: i64) {
        self.advance(Duration::hours(hours));
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read().unwrap()
    }
}
