//! Time-based status rules.
//!
//! Everything here is a pure function of "now" and stored timestamps. The
//! 24-hour rules are applied lazily by whoever reads a session next (or by the
//! optional sweeper), so no state lives in this module.

use chrono::{DateTime, Duration, Utc};
use gamekeeper_types::models::{ResultStatus, SessionStatus};

pub const DEFAULT_THRESHOLD_HOURS: u32 = 24;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Absorbs binary rounding so that e.g. 2.3 hours floors to 2.3, not 2.2.
const EPSILON: f64 = 1e-9;

/// Hours from `since` to `now` as a real number. Negative if `since` is in the future.
pub fn hours_elapsed(now: DateTime<Utc>, since: DateTime<Utc>) -> f64 {
    (now - since).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// Single threshold behind both auto-approval and auto-void.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElapsedPolicy {
    threshold: Duration,
}

impl Default for ElapsedPolicy {
    fn default() -> Self {
        Self::from_hours(DEFAULT_THRESHOLD_HOURS)
    }
}

/// What a status derivation needs to know about a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionFacts {
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub voided: bool,
}

/// What a status derivation needs to know about a result.
#[derive(Debug, Clone, Copy)]
pub struct ResultFacts {
    pub status: ResultStatus,
    pub created_at: DateTime<Utc>,
}

impl ElapsedPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn from_hours(hours: u32) -> Self {
        Self::new(Duration::hours(i64::from(hours)))
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    fn expired(&self, now: DateTime<Utc>, since: DateTime<Utc>) -> bool {
        now - since >= self.threshold
    }

    /// A PENDING result created at `result_created_at` is due for approval.
    pub fn should_auto_approve(&self, now: DateTime<Utc>, result_created_at: DateTime<Utc>) -> bool {
        self.expired(now, result_created_at)
    }

    /// A session without any result, created at `session_created_at`, is due to be voided.
    pub fn should_auto_void(&self, now: DateTime<Utc>, session_created_at: DateTime<Utc>) -> bool {
        self.expired(now, session_created_at)
    }

    /// Effective status without writing anything. List views use this; the
    /// single-session read path applies the transitions first and then agrees
    /// with it.
    pub fn derive_status(
        &self,
        now: DateTime<Utc>,
        session: SessionFacts,
        result: Option<ResultFacts>,
    ) -> SessionStatus {
        match result {
            Some(r) if r.status == ResultStatus::Pending && self.should_auto_approve(now, r.created_at) => {
                SessionStatus::Approved
            }
            Some(r) => r.status.into(),
            None if session.voided => SessionStatus::Void,
            None if session.is_active && self.should_auto_void(now, session.created_at) => {
                SessionStatus::Void
            }
            None if session.is_active => SessionStatus::Active,
            None => SessionStatus::Inactive,
        }
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Renders elapsed hours for humans: minutes below an hour, hours to one
/// decimal below a day, then days and whole hours.
pub fn format_time_elapsed(hours: f64) -> String {
    let hours = hours.max(0.0);

    if hours < 1.0 {
        let minutes = (hours * 60.0 + EPSILON).floor() as u64;
        return plural(minutes, "minute");
    }

    if hours < 24.0 {
        let rounded = (hours * 10.0 + EPSILON).floor() / 10.0;
        return if rounded == 1.0 {
            "1 hour".to_string()
        } else {
            format!("{rounded} hours")
        };
    }

    let days = (hours / 24.0 + EPSILON).floor() as u64;
    let remaining = (hours % 24.0 + EPSILON).floor() as u64 % 24;
    if remaining == 0 {
        plural(days, "day")
    } else {
        format!("{}, {}", plural(days, "day"), plural(remaining, "hour"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn formats_match_the_documented_examples() {
        assert_eq!(format_time_elapsed(0.5), "30 minutes");
        assert_eq!(format_time_elapsed(2.3), "2.3 hours");
        assert_eq!(format_time_elapsed(26.0), "1 day, 2 hours");
        assert_eq!(format_time_elapsed(48.0), "2 days");
    }

    #[test]
    fn singular_units() {
        assert_eq!(format_time_elapsed(1.0 / 60.0), "1 minute");
        assert_eq!(format_time_elapsed(1.0), "1 hour");
        assert_eq!(format_time_elapsed(1.05), "1 hour");
        assert_eq!(format_time_elapsed(25.0), "1 day, 1 hour");
        assert_eq!(format_time_elapsed(0.0), "0 minutes");
        assert_eq!(format_time_elapsed(-3.0), "0 minutes");
    }

    #[test]
    fn whole_hours_drop_the_decimal() {
        assert_eq!(format_time_elapsed(5.0), "5 hours");
        assert_eq!(format_time_elapsed(23.99), "23.9 hours");
    }

    #[test]
    fn threshold_is_inclusive() {
        let policy = ElapsedPolicy::default();
        let almost = t0() + Duration::hours(23) + Duration::minutes(59);
        let exactly = t0() + Duration::hours(24);

        assert!(!policy.should_auto_void(almost, t0()));
        assert!(policy.should_auto_void(exactly, t0()));
        assert!(!policy.should_auto_approve(almost, t0()));
        assert!(policy.should_auto_approve(exactly, t0()));
    }

    #[test]
    fn one_threshold_drives_both_rules() {
        let policy = ElapsedPolicy::from_hours(2);
        let later = t0() + Duration::hours(2);
        assert!(policy.should_auto_void(later, t0()));
        assert!(policy.should_auto_approve(later, t0()));
    }

    #[test]
    fn derived_status_without_result() {
        let policy = ElapsedPolicy::default();
        let session = SessionFacts {
            created_at: t0(),
            is_active: true,
            voided: false,
        };

        let early = t0() + Duration::hours(1);
        let late = t0() + Duration::hours(30);
        assert_eq!(policy.derive_status(early, session, None), SessionStatus::Active);
        assert_eq!(policy.derive_status(late, session, None), SessionStatus::Void);

        let ended = SessionFacts { is_active: false, ..session };
        assert_eq!(policy.derive_status(late, ended, None), SessionStatus::Inactive);

        let voided = SessionFacts { is_active: false, voided: true, ..session };
        assert_eq!(policy.derive_status(early, voided, None), SessionStatus::Void);
    }

    #[test]
    fn derived_status_with_result() {
        let policy = ElapsedPolicy::default();
        let session = SessionFacts {
            created_at: t0(),
            is_active: true,
            voided: false,
        };
        let pending = ResultFacts {
            status: ResultStatus::Pending,
            created_at: t0() + Duration::hours(1),
        };

        let before = t0() + Duration::hours(24);
        let after = t0() + Duration::hours(25);
        assert_eq!(policy.derive_status(before, session, Some(pending)), SessionStatus::Pending);
        assert_eq!(policy.derive_status(after, session, Some(pending)), SessionStatus::Approved);

        let rejected = ResultFacts { status: ResultStatus::Rejected, ..pending };
        assert_eq!(policy.derive_status(after, session, Some(rejected)), SessionStatus::Rejected);
    }
}
