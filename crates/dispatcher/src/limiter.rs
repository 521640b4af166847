//! Per-device publish-rate limiter
//!
//! Decides whether a measurement may pass given the last accepted
//! measurement of the same device. Time is taken from the measurement
//! itself, so the decision is deterministic for a given input sequence.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{DeviceId, Measurement};

/// Minimum-interval limiter keyed by device
///
/// Owned by exactly one sink worker; never shared.
#[derive(Debug, Default)]
pub struct Limiter {
    minimum_interval: Option<Duration>,
    last_accepted: HashMap<DeviceId, DateTime<Utc>>,
}

impl Limiter {
    /// Create a limiter; `None` or a zero interval accepts everything
    pub fn new(minimum_interval: Option<Duration>) -> Self {
        Self {
            minimum_interval: minimum_interval.filter(|d| !d.is_zero()),
            last_accepted: HashMap::new(),
        }
    }

    /// Configured interval, if limiting is active
    pub fn minimum_interval(&self) -> Option<Duration> {
        self.minimum_interval
    }

    /// Accept or reject a measurement
    ///
    /// Accepts when the device has no prior accepted measurement or when at
    /// least the minimum interval separates this timestamp from the last
    /// accepted one. Only accepted measurements update the device's record.
    pub fn check(&mut self, measurement: &Measurement) -> bool {
        let Some(interval) = self.minimum_interval else {
            return true;
        };

        let ts = measurement.timestamp;
        let accept = match self.last_accepted.get(&measurement.mac) {
            None => true,
            Some(last) => ts
                .signed_duration_since(*last)
                .to_std()
                .map(|elapsed| elapsed >= interval)
                .unwrap_or(false),
        };

        if accept {
            self.last_accepted.insert(measurement.mac.clone(), ts);
        }
        accept
    }

    /// Timestamp of the last accepted measurement of a device
    pub fn last_accepted(&self, mac: &str) -> Option<DateTime<Utc>> {
        self.last_accepted.get(mac).copied()
    }

    /// Number of devices seen so far
    pub fn tracked_devices(&self) -> usize {
        self.last_accepted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(mac: &str, millis: i64) -> Measurement {
        Measurement::new(mac, Utc.timestamp_millis_opt(millis).unwrap())
    }

    #[test]
    fn test_unlimited_accepts_everything() {
        let mut limiter = Limiter::new(None);
        for _ in 0..3 {
            assert!(limiter.check(&at("aa:bb:cc:dd:ee:01", 1_000)));
        }
        assert_eq!(limiter.tracked_devices(), 0);

        let mut zero = Limiter::new(Some(Duration::ZERO));
        assert!(zero.check(&at("aa:bb:cc:dd:ee:01", 1_000)));
        assert!(zero.check(&at("aa:bb:cc:dd:ee:01", 1_000)));
    }

    #[test]
    fn test_first_measurement_always_accepted() {
        let mut limiter = Limiter::new(Some(Duration::from_secs(60)));
        assert!(limiter.check(&at("aa:bb:cc:dd:ee:01", 0)));
        assert!(limiter.check(&at("aa:bb:cc:dd:ee:02", 0)));
    }

    #[test]
    fn test_interval_sequence() {
        // Interval 10s; measurements at 0, 5, 10, 12, 21 s
        let mut limiter = Limiter::new(Some(Duration::from_secs(10)));
        let mac = "aa:bb:cc:dd:ee:01";
        let results: Vec<bool> = [0, 5_000, 10_000, 12_000, 21_000]
            .into_iter()
            .map(|ms| limiter.check(&at(mac, ms)))
            .collect();

        assert_eq!(results, vec![true, false, true, false, true]);
        assert_eq!(
            limiter.last_accepted(mac),
            Some(Utc.timestamp_millis_opt(21_000).unwrap())
        );
    }

    #[test]
    fn test_rejection_does_not_reset_the_window() {
        let mut limiter = Limiter::new(Some(Duration::from_secs(10)));
        let mac = "aa:bb:cc:dd:ee:01";

        assert!(limiter.check(&at(mac, 0)));
        assert!(!limiter.check(&at(mac, 9_000)));
        // Measured from the accepted one at 0, not the rejected one at 9
        assert!(limiter.check(&at(mac, 10_000)));
    }

    #[test]
    fn test_devices_are_independent() {
        let mut limiter = Limiter::new(Some(Duration::from_secs(10)));

        assert!(limiter.check(&at("aa:bb:cc:dd:ee:01", 0)));
        assert!(limiter.check(&at("aa:bb:cc:dd:ee:02", 1_000)));
        assert!(!limiter.check(&at("aa:bb:cc:dd:ee:01", 2_000)));
        assert!(!limiter.check(&at("aa:bb:cc:dd:ee:02", 3_000)));
        assert_eq!(limiter.tracked_devices(), 2);
    }

    #[test]
    fn test_older_timestamp_is_rejected() {
        let mut limiter = Limiter::new(Some(Duration::from_secs(1)));
        let mac = "aa:bb:cc:dd:ee:01";

        assert!(limiter.check(&at(mac, 50_000)));
        assert!(!limiter.check(&at(mac, 10_000)));
    }

    #[test]
    fn test_sub_second_interval() {
        let mut limiter = Limiter::new(Some(Duration::from_millis(500)));
        let mac = "aa:bb:cc:dd:ee:01";

        assert!(limiter.check(&at(mac, 0)));
        assert!(!limiter.check(&at(mac, 499)));
        assert!(limiter.check(&at(mac, 500)));
    }
}
