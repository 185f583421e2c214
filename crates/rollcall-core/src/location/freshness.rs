use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, RandomSource, SystemClock, ThreadRandom};

/// Centre of the reuse window, in minutes.
const BASE_EXPIRATION_MINUTES: f64 = 10.0;

/// Half-width of the reuse window: thresholds fall in `[5, 15)` minutes.
const EXPIRATION_JITTER_MINUTES: f64 = 5.0;

const MS_PER_MINUTE: f64 = 60_000.0;

/// A geolocation reading and when it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Acquisition time in ms since the epoch.
    pub acquired_at: i64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, acquired_at: i64) -> Self {
        Self {
            latitude,
            longitude,
            acquired_at,
        }
    }

    pub fn age_minutes(&self, now_ms: i64) -> f64 {
        (now_ms - self.acquired_at) as f64 / MS_PER_MINUTE
    }
}

/// Decides whether a fix can be reused.
///
/// The threshold is resampled on every call, so many sessions holding fixes of
/// the same age do not all re-acquire at the same moment. Two calls in a row
/// may disagree for a fix between 5 and 15 minutes old.
pub struct FreshnessPolicy {
    clock: Arc<dyn Clock>,
    random: Box<dyn RandomSource>,
}

impl FreshnessPolicy {
    pub fn new(clock: Arc<dyn Clock>, random: Box<dyn RandomSource>) -> Self {
        Self { clock, random }
    }

    /// Sample this evaluation's threshold, in minutes.
    fn expiration_minutes(&mut self) -> f64 {
        let jitter = self.random.next_unit() * (2.0 * EXPIRATION_JITTER_MINUTES) - EXPIRATION_JITTER_MINUTES;
        BASE_EXPIRATION_MINUTES + jitter
    }

    pub fn is_stale(&mut self, fix: Option<&LocationFix>) -> bool {
        let Some(fix) = fix else {
            return true;
        };

        let age_minutes = fix.age_minutes(self.clock.now_ms());
        let expiration_minutes = self.expiration_minutes();
        debug!(
            age_minutes = format!("{:.1}", age_minutes),
            expiration_minutes = format!("{:.1}", expiration_minutes),
            "Checked location freshness"
        );
        age_minutes > expiration_minutes
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Box::new(ThreadRandom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SeededRandom, SequenceRandom};

    const NOW: i64 = 1_700_000_000_000;

    fn fix_aged(minutes: f64) -> LocationFix {
        LocationFix::new(55.75, 37.61, NOW - (minutes * MS_PER_MINUTE) as i64)
    }

    fn policy(random: Box<dyn RandomSource>) -> FreshnessPolicy {
        FreshnessPolicy::new(Arc::new(ManualClock::new(NOW)), random)
    }

    #[test]
    fn test_missing_fix_is_stale() {
        let mut policy = policy(Box::new(SeededRandom::new(1)));
        assert!(policy.is_stale(None));
    }

    #[test]
    fn test_young_fix_is_always_fresh() {
        let mut policy = policy(Box::new(SeededRandom::new(2)));
        let fix = fix_aged(4.0);
        for _ in 0..1_000 {
            assert!(!policy.is_stale(Some(&fix)));
        }
        // Even at the lowest possible threshold
        let mut lowest = self::policy(Box::new(SequenceRandom::new(vec![0.0])));
        assert!(!lowest.is_stale(Some(&fix)));
    }

    #[test]
    fn test_old_fix_is_always_stale() {
        let mut policy = policy(Box::new(SeededRandom::new(3)));
        let fix = fix_aged(16.0);
        for _ in 0..1_000 {
            assert!(policy.is_stale(Some(&fix)));
        }
        let mut highest = self::policy(Box::new(SequenceRandom::new(vec![0.999_999])));
        assert!(highest.is_stale(Some(&fix)));
    }

    #[test]
    fn test_mid_age_verdict_varies() {
        let mut policy = policy(Box::new(SeededRandom::new(4)));
        let fix = fix_aged(10.0);
        let stale = (0..1_000).filter(|_| policy.is_stale(Some(&fix))).count();
        assert!(stale > 0, "expected some stale verdicts");
        assert!(stale < 1_000, "expected some fresh verdicts");
    }

    #[test]
    fn test_threshold_resampled_per_call() {
        // 0.2 -> 7 minutes, 0.8 -> 13 minutes
        let mut policy = policy(Box::new(SequenceRandom::new(vec![0.2, 0.8])));
        let fix = fix_aged(10.0);
        assert!(policy.is_stale(Some(&fix)));
        assert!(!policy.is_stale(Some(&fix)));
    }

    #[test]
    fn test_age_minutes() {
        let fix = LocationFix::new(0.0, 0.0, NOW - 90_000);
        assert!((fix.age_minutes(NOW) - 1.5).abs() < f64::EPSILON);
    }
}
