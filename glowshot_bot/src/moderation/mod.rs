//! Report aggregation and the moderation decision engine.
//!
//! Everything in this module is plain business logic: the database layer
//! supplies counts and timestamps, handlers turn the answers into Telegram
//! messages. Nothing here talks to the network.

pub mod orchestrator;
pub mod rate_limit;

/// How many unresolved reports pull a photo from circulation.
///
/// Configured to 1: a single pending report is enough pending human review.
pub const REPORT_THRESHOLD: u32 = 1;

/// Report counts for one photo, freshly queried from persisted reports.
///
/// `total_pending` only counts reports awaiting moderator action, so
/// re-reporting previously cleared photos does not over-count forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportStats {
    pub photo_id: i64,
    pub total_pending: u32,
    pub total_all: u32,
}

/// What to do with a photo after a new report landed.
///
/// Both fields currently mirror the same threshold check; they are kept
/// separate so a higher permanent-removal threshold can diverge from the
/// temporary-review one later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationDecision {
    pub should_mark_under_review: bool,
    pub reached_threshold: bool,
}

/// Decide whether a photo has to be pulled from the public rating queue.
///
/// Must be re-evaluated against fresh counts after every recorded report;
/// two viewers reporting near-simultaneously both get a monotonically
/// non-decreasing count that way.
#[must_use]
pub fn decide_after_new_report(stats: ReportStats) -> ModerationDecision {
    let reached = stats.total_pending >= REPORT_THRESHOLD;
    ModerationDecision {
        should_mark_under_review: reached,
        reached_threshold: reached,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn stats(pending: u32, all: u32) -> ReportStats {
        ReportStats {
            photo_id: 7,
            total_pending: pending,
            total_all: all,
        }
    }

    #[test]
    fn threshold_is_monotonic() {
        assert!(!decide_after_new_report(stats(0, 0)).should_mark_under_review);
        for pending in REPORT_THRESHOLD..REPORT_THRESHOLD + 20 {
            let decision = decide_after_new_report(stats(pending, pending));
            assert!(decision.should_mark_under_review);
            assert!(decision.reached_threshold);
        }
        for pending in 0..REPORT_THRESHOLD {
            let decision = decide_after_new_report(stats(pending, pending));
            assert!(!decision.should_mark_under_review);
            assert!(!decision.reached_threshold);
        }
    }

    #[test]
    fn single_report_pulls_the_photo() {
        // One pending report against the photo, one ever filed.
        let decision = decide_after_new_report(stats(1, 1));
        assert!(decision.should_mark_under_review);
    }

    #[test]
    fn resolved_reports_do_not_count() {
        // Three historical reports, all already resolved by a moderator.
        let decision = decide_after_new_report(stats(0, 3));
        assert!(!decision.should_mark_under_review);
    }
}
