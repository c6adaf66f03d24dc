//! Sliding-window limiter for report submissions.
//!
//! The limiter owns no state: the caller fetches the reporter's recent
//! report timestamps from the database and passes them in, so the math is
//! recomputed from raw history on every call.

use chrono::{DateTime, Duration, Utc};

/// At most this many reports per reporter per window.
pub const REPORT_RATE_LIMIT_MAX: usize = 2;

/// Length of the sliding window, in minutes.
pub const REPORT_RATE_LIMIT_WINDOW_MINUTES: i64 = 20;

/// Outcome of a rate limit check. Denial is a normal answer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitVerdict {
    pub allowed: bool,
    /// Seconds until the next report would be allowed. Zero when allowed.
    pub retry_after_seconds: i64,
    /// How many more reports fit into the current window.
    pub remaining_quota: usize,
}

/// Evaluate a reporter's history against the sliding window.
///
/// Only timestamps within the last [`REPORT_RATE_LIMIT_WINDOW_MINUTES`]
/// count. When the window is full, the retry delay is counted from the
/// moment the oldest in-window report falls out of it.
#[must_use]
pub fn evaluate(history: &[DateTime<Utc>], now: DateTime<Utc>) -> RateLimitVerdict {
    let window = Duration::minutes(REPORT_RATE_LIMIT_WINDOW_MINUTES);
    let window_start = now - window;

    let mut in_window: Vec<DateTime<Utc>> = history
        .iter()
        .copied()
        .filter(|ts| *ts >= window_start)
        .collect();

    if in_window.len() < REPORT_RATE_LIMIT_MAX {
        return RateLimitVerdict {
            allowed: true,
            retry_after_seconds: 0,
            remaining_quota: REPORT_RATE_LIMIT_MAX - in_window.len(),
        };
    }

    // Window is full. The M-th most recent report has to age out first.
    in_window.sort_unstable_by(|a, b| b.cmp(a));
    let blocking = in_window[REPORT_RATE_LIMIT_MAX - 1];
    let retry_after = (blocking + window - now).num_seconds().max(0);

    RateLimitVerdict {
        allowed: false,
        retry_after_seconds: retry_after,
        remaining_quota: 0,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn minutes_ago(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
        now - Duration::minutes(minutes)
    }

    #[test]
    fn empty_history_is_allowed() {
        let now = Utc::now();
        let verdict = evaluate(&[], now);
        assert!(verdict.allowed);
        assert_eq!(verdict.remaining_quota, REPORT_RATE_LIMIT_MAX);
        assert_eq!(verdict.retry_after_seconds, 0);
    }

    #[test]
    fn full_window_is_denied_with_retry_after() {
        let now = Utc::now();
        let history = [minutes_ago(now, 1), minutes_ago(now, 5)];
        let verdict = evaluate(&history, now);
        assert!(!verdict.allowed);
        assert_eq!(verdict.remaining_quota, 0);
        // The 5-minutes-old report leaves the 20-minute window in 15 minutes.
        assert_eq!(verdict.retry_after_seconds, 15 * 60);
    }

    #[test]
    fn old_reports_fall_out_of_the_window() {
        let now = Utc::now();
        let history = [minutes_ago(now, 25)];
        let verdict = evaluate(&history, now);
        assert!(verdict.allowed);
        assert_eq!(verdict.remaining_quota, 1);
    }

    #[test]
    fn third_report_in_window_is_denied() {
        let now = Utc::now();
        let mut history = Vec::new();

        let first = evaluate(&history, minutes_ago(now, 10));
        assert!(first.allowed);
        history.push(minutes_ago(now, 10));

        let second = evaluate(&history, minutes_ago(now, 4));
        assert!(second.allowed);
        assert_eq!(second.remaining_quota, 1);
        history.push(minutes_ago(now, 4));

        let third = evaluate(&history, now);
        assert!(!third.allowed);
        assert!(third.retry_after_seconds > 0);
    }

    #[test]
    fn retry_after_never_goes_negative() {
        let now = Utc::now();
        // Degenerate case: more history than the max, all at the window edge.
        let edge = minutes_ago(now, REPORT_RATE_LIMIT_WINDOW_MINUTES);
        let history = [edge, edge, edge];
        let verdict = evaluate(&history, now);
        assert!(!verdict.allowed);
        assert_eq!(verdict.retry_after_seconds, 0);
    }

    #[test]
    fn order_of_history_does_not_matter() {
        let now = Utc::now();
        let a = [minutes_ago(now, 1), minutes_ago(now, 19)];
        let b = [minutes_ago(now, 19), minutes_ago(now, 1)];
        assert_eq!(evaluate(&a, now), evaluate(&b, now));
    }
}
