//! crates/studycircle_core/src/ledger.rs
//!
//! The session ledger: records and removes completed study sessions against a
//! `StudyProfile`, maintaining the cached time aggregates and the
//! consecutive-day streak. Pure functions of (state, input, now) — no I/O.

use crate::achievements;
use crate::domain::{AchievementKind, SessionDraft, SessionRecord, StudyProfile};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use tracing::warn;
use uuid::Uuid;

/// Subject used when the caller supplies none.
pub const DEFAULT_SUBJECT: &str = "General Study";

/// Shortest recordable session: anything of a second or less is noise.
pub const MIN_SESSION_MS: i64 = 1_000;
/// Longest recordable session: 24 hours.
pub const MAX_SESSION_MS: i64 = 86_400_000;

/// Errors the ledger reports to its caller.
///
/// Internal failures inside the streak or achievement sub-steps are *not*
/// represented here: those are logged and swallowed so a session stop never
/// fails once validation has passed.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The input session was malformed. Nothing was mutated.
    #[error("Invalid session: {0}")]
    Validation(String),

    /// The referenced session does not exist in the profile's history.
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
}

/// A convenience alias for ledger results.
pub type LedgerResult<T> = Result<T, LedgerError>;

//=========================================================================================
// Recording
//=========================================================================================

/// Records a completed session against the profile and returns the
/// achievement kinds newly unlocked by it, in fixed rule order.
///
/// Validation fails fast before any mutation. After the session has been
/// appended, streak and achievement failures are logged and skipped rather
/// than propagated, so the caller can always persist the session itself.
///
/// The weekly/monthly windows are evaluated against `now`, not against the
/// session's own start time: a session backdated outside the current week
/// still counts toward the total but not toward the weekly figure.
pub fn record_session(
    profile: &mut StudyProfile,
    draft: SessionDraft,
    now: DateTime<Utc>,
) -> LedgerResult<Vec<AchievementKind>> {
    let session = validate_draft(draft)?;
    let session_day = session.start_time.date_naive();
    let duration = session.duration_ms;

    // 1. Append to history and bump the running total.
    profile.sessions.push(session);
    profile.total_study_ms += duration;

    // 2. Window aggregates, anchored at `now`.
    if session_day >= week_start(now) {
        profile.weekly_study_ms += duration;
    }
    if session_day >= month_start(now) {
        profile.monthly_study_ms += duration;
    }

    // 3. Streak. A failure here leaves the streak untouched but never aborts
    //    the overall operation.
    if let Err(e) = update_streak(profile, session_day, now.date_naive()) {
        warn!(user_id = %profile.user_id, error = %e, "streak update failed; leaving streak unchanged");
    }

    // 4. Achievements, evaluated over the now-updated state.
    let unlocked = achievements::evaluate(profile, now);
    for kind in &unlocked {
        profile.achievements.push(crate::domain::Achievement {
            kind: *kind,
            unlocked_at: now,
        });
    }
    Ok(unlocked)
}

fn validate_draft(draft: SessionDraft) -> LedgerResult<SessionRecord> {
    if draft.duration_ms <= 0 {
        return Err(LedgerError::Validation(
            "duration must be positive".to_string(),
        ));
    }
    if draft.start_time > draft.end_time {
        return Err(LedgerError::Validation(
            "start time must not be after end time".to_string(),
        ));
    }
    let wall_clock_ms = (draft.end_time - draft.start_time).num_milliseconds();
    if draft.duration_ms != wall_clock_ms {
        return Err(LedgerError::Validation(format!(
            "duration {}ms does not match the {}ms between start and end",
            draft.duration_ms, wall_clock_ms
        )));
    }
    if draft.duration_ms <= MIN_SESSION_MS {
        return Err(LedgerError::Validation(format!(
            "session must be longer than {}ms",
            MIN_SESSION_MS
        )));
    }
    if draft.duration_ms > MAX_SESSION_MS {
        return Err(LedgerError::Validation(format!(
            "session must be at most {}ms",
            MAX_SESSION_MS
        )));
    }
    let subject = match draft.subject {
        Some(s) if !s.trim().is_empty() => s,
        _ => DEFAULT_SUBJECT.to_string(),
    };
    Ok(SessionRecord {
        id: Uuid::new_v4(),
        start_time: draft.start_time,
        end_time: draft.end_time,
        duration_ms: draft.duration_ms,
        subject,
        notes: draft.notes,
    })
}

//=========================================================================================
// Removal
//=========================================================================================

/// Removes a session from the history, reversing its contribution to the
/// time aggregates (clamped at zero; the windows are evaluated against `now`
/// at call time, not at original record time).
///
/// Deliberately does NOT recompute the streak or revoke achievements: both
/// are one-way, and deletion never walks them back.
pub fn remove_session(
    profile: &mut StudyProfile,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> LedgerResult<SessionRecord> {
    let idx = profile
        .sessions
        .iter()
        .position(|s| s.id == session_id)
        .ok_or(LedgerError::SessionNotFound(session_id))?;
    let session = profile.sessions.remove(idx);
    let session_day = session.start_time.date_naive();
    let duration = session.duration_ms;

    profile.total_study_ms = (profile.total_study_ms - duration).max(0);
    if session_day >= week_start(now) {
        profile.weekly_study_ms = (profile.weekly_study_ms - duration).max(0);
    }
    if session_day >= month_start(now) {
        profile.monthly_study_ms = (profile.monthly_study_ms - duration).max(0);
    }
    Ok(session)
}

//=========================================================================================
// Streak
//=========================================================================================

#[derive(Debug, thiserror::Error)]
#[error("streak computation failed: {0}")]
struct StreakError(String);

/// Applies the consecutive-day streak rules for a session dated `session_day`.
///
/// Only sessions dated "today" can move the streak; a backdated session
/// leaves it alone entirely. Two sessions on the same day count once.
fn update_streak(
    profile: &mut StudyProfile,
    session_day: NaiveDate,
    today: NaiveDate,
) -> Result<(), StreakError> {
    let yesterday = today
        .pred_opt()
        .ok_or_else(|| StreakError("no previous day exists".to_string()))?;

    match profile.last_study_date {
        None => {
            profile.current_streak = 1;
            profile.last_study_date = Some(session_day);
        }
        Some(last) if session_day == today => {
            if last == yesterday {
                profile.current_streak += 1;
            } else if last == today {
                // Already counted today.
            } else {
                // A gap day broke the streak.
                profile.current_streak = 1;
            }
            profile.last_study_date = Some(session_day);
        }
        Some(_) => {
            // Session not dated today: the streak is left untouched.
        }
    }
    Ok(())
}

//=========================================================================================
// Calendar windows (UTC)
//=========================================================================================

/// The most recent Sunday at UTC midnight relative to `now`.
pub fn week_start(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    let back = today.weekday().num_days_from_sunday() as u64;
    today
        .checked_sub_days(Days::new(back))
        .unwrap_or(today)
}

/// The first day of the calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.with_day(1).unwrap_or(today)
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn draft(start: DateTime<Utc>, minutes: i64) -> SessionDraft {
        SessionDraft {
            start_time: start,
            end_time: start + Duration::minutes(minutes),
            duration_ms: minutes * 60_000,
            subject: None,
            notes: None,
        }
    }

    fn fresh() -> StudyProfile {
        StudyProfile::new(Uuid::new_v4())
    }

    #[test]
    fn first_session_sets_totals_streak_and_achievement() {
        // Scenario: fresh user records a 30-minute session.
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        let unlocked = record_session(&mut profile, draft(now, 30), now).unwrap();

        assert_eq!(profile.total_study_ms, 1_800_000);
        assert_eq!(profile.weekly_study_ms, 1_800_000);
        assert_eq!(profile.monthly_study_ms, 1_800_000);
        assert_eq!(profile.current_streak, 1);
        assert_eq!(profile.last_study_date, Some(now.date_naive()));
        assert_eq!(unlocked, vec![AchievementKind::FirstSession]);
    }

    #[test]
    fn fifth_session_unlocks_five_sessions_only() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        for _ in 0..4 {
            record_session(&mut profile, draft(now, 10), now).unwrap();
        }
        let unlocked = record_session(&mut profile, draft(now, 10), now).unwrap();

        assert!(unlocked.contains(&AchievementKind::FiveSessions));
        assert!(!unlocked.contains(&AchievementKind::FirstSession));
    }

    #[test]
    fn streak_increments_from_yesterday_and_caps_per_day() {
        let mut profile = fresh();
        profile.current_streak = 1;
        profile.last_study_date = Some(at(2024, 3, 12, 0).date_naive());

        let now = at(2024, 3, 13, 9);
        record_session(&mut profile, draft(now, 20), now).unwrap();
        assert_eq!(profile.current_streak, 2);

        // A second session the same day leaves the streak unchanged.
        let later = at(2024, 3, 13, 20);
        record_session(&mut profile, draft(later, 20), later).unwrap();
        assert_eq!(profile.current_streak, 2);
    }

    #[test]
    fn gap_resets_streak_to_one() {
        let mut profile = fresh();
        profile.current_streak = 2;
        profile.last_study_date = Some(at(2024, 3, 10, 0).date_naive());

        let now = at(2024, 3, 13, 9);
        record_session(&mut profile, draft(now, 20), now).unwrap();
        assert_eq!(profile.current_streak, 1);
    }

    #[test]
    fn backdated_session_never_moves_the_streak() {
        let mut profile = fresh();
        profile.current_streak = 4;
        profile.last_study_date = Some(at(2024, 3, 12, 0).date_naive());

        let now = at(2024, 3, 13, 9);
        let last_week = at(2024, 3, 6, 9);
        record_session(&mut profile, draft(last_week, 60), now).unwrap();
        assert_eq!(profile.current_streak, 4);
        assert_eq!(profile.last_study_date, Some(at(2024, 3, 12, 0).date_naive()));
    }

    #[test]
    fn backdated_session_counts_toward_total_but_not_weekly() {
        // 2024-03-13 is a Wednesday; the week window opens Sunday 2024-03-10.
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        let before_window = at(2024, 3, 8, 12);
        record_session(&mut profile, draft(before_window, 30), now).unwrap();

        assert_eq!(profile.total_study_ms, 1_800_000);
        assert_eq!(profile.weekly_study_ms, 0);
        // Still inside the calendar month.
        assert_eq!(profile.monthly_study_ms, 1_800_000);
    }

    #[test]
    fn validation_failure_leaves_profile_untouched() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        let mut bad = draft(now, 30);
        bad.duration_ms = 0;

        let err = record_session(&mut profile, bad, now).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(profile.sessions.is_empty());
        assert_eq!(profile.total_study_ms, 0);
        assert_eq!(profile.current_streak, 0);
    }

    #[test]
    fn reversed_timestamps_are_rejected() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        let bad = SessionDraft {
            start_time: now,
            end_time: now - Duration::minutes(5),
            duration_ms: 300_000,
            subject: None,
            notes: None,
        };
        assert!(matches!(
            record_session(&mut profile, bad, now),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn duration_must_match_the_wall_clock_interval() {
        // A one-minute interval claiming ~31 years of study must not land.
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        let mut bad = draft(now, 1);
        bad.duration_ms = 999_999_999_999;

        let err = record_session(&mut profile, bad, now).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(profile.sessions.is_empty());
        assert_eq!(profile.total_study_ms, 0);
    }

    #[test]
    fn duration_outside_bounds_is_rejected() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);

        // Exactly one second is still too short.
        let short = SessionDraft {
            start_time: now,
            end_time: now + Duration::seconds(1),
            duration_ms: 1_000,
            subject: None,
            notes: None,
        };
        assert!(matches!(
            record_session(&mut profile, short, now),
            Err(LedgerError::Validation(_))
        ));

        // More than 24 hours is too long.
        let long = SessionDraft {
            start_time: now,
            end_time: now + Duration::hours(25),
            duration_ms: 25 * 3_600_000,
            subject: None,
            notes: None,
        };
        assert!(matches!(
            record_session(&mut profile, long, now),
            Err(LedgerError::Validation(_))
        ));

        // Exactly 24 hours sits on the inclusive upper bound.
        let full_day = SessionDraft {
            start_time: now,
            end_time: now + Duration::hours(24),
            duration_ms: MAX_SESSION_MS,
            subject: None,
            notes: None,
        };
        record_session(&mut profile, full_day, now).unwrap();
        assert_eq!(profile.total_study_ms, MAX_SESSION_MS);
    }

    #[test]
    fn empty_subject_falls_back_to_default() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        let mut d = draft(now, 10);
        d.subject = Some("   ".to_string());
        record_session(&mut profile, d, now).unwrap();
        assert_eq!(profile.sessions[0].subject, DEFAULT_SUBJECT);
    }

    #[test]
    fn total_always_matches_sum_of_current_sessions() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        for minutes in [10, 25, 40] {
            record_session(&mut profile, draft(now, minutes), now).unwrap();
        }
        let victim = profile.sessions[1].id;
        remove_session(&mut profile, victim, now).unwrap();

        let expected: i64 = profile.sessions.iter().map(|s| s.duration_ms).sum();
        assert_eq!(profile.total_study_ms, expected);
    }

    #[test]
    fn removal_clamps_at_zero_and_rejects_double_delete() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        record_session(&mut profile, draft(now, 60), now).unwrap();
        let id = profile.sessions[0].id;

        // Simulate an aggregate that drifted low before the delete.
        profile.total_study_ms = 1_000_000;
        remove_session(&mut profile, id, now).unwrap();
        assert_eq!(profile.total_study_ms, 0);
        assert_eq!(profile.weekly_study_ms, 0);

        assert!(matches!(
            remove_session(&mut profile, id, now),
            Err(LedgerError::SessionNotFound(_))
        ));
        assert_eq!(profile.total_study_ms, 0);
    }

    #[test]
    fn removal_never_walks_back_streak_or_achievements() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        record_session(&mut profile, draft(now, 60), now).unwrap();
        assert_eq!(profile.current_streak, 1);
        assert!(profile.has_achievement(AchievementKind::FirstSession));

        let id = profile.sessions[0].id;
        remove_session(&mut profile, id, now).unwrap();
        assert_eq!(profile.current_streak, 1);
        assert!(profile.has_achievement(AchievementKind::FirstSession));
    }

    #[test]
    fn duplicate_session_content_still_appends() {
        // Sessions are not deduplicated; identical drafts both land.
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        record_session(&mut profile, draft(now, 30), now).unwrap();
        record_session(&mut profile, draft(now, 30), now).unwrap();
        assert_eq!(profile.sessions.len(), 2);
        assert_eq!(profile.total_study_ms, 3_600_000);
    }

    #[test]
    fn achievement_kinds_stay_unique_across_a_sequence() {
        let mut profile = fresh();
        let now = at(2024, 3, 13, 12);
        for _ in 0..6 {
            record_session(&mut profile, draft(now, 15), now).unwrap();
        }
        let mut kinds: Vec<_> = profile.achievements.iter().map(|a| a.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds.dedup();
        assert_eq!(kinds.len(), profile.achievements.len());
    }

    #[test]
    fn week_starts_on_most_recent_sunday() {
        // Wednesday 2024-03-13 -> Sunday 2024-03-10.
        assert_eq!(
            week_start(at(2024, 3, 13, 12)),
            at(2024, 3, 10, 0).date_naive()
        );
        // A Sunday is its own week start.
        assert_eq!(
            week_start(at(2024, 3, 10, 5)),
            at(2024, 3, 10, 0).date_naive()
        );
    }
}
