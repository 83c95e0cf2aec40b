//! crates/studycircle_core/src/achievements.rs
//!
//! The achievement rule table. Each rule is an independent evaluator run in a
//! fixed order; a failing rule is logged and skipped so it can never mask the
//! remaining rules.

use crate::domain::{AchievementKind, StudyProfile};
use chrono::{DateTime, Days, Utc};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct RuleError(String);

type RuleFn = fn(&StudyProfile, DateTime<Utc>) -> Result<bool, RuleError>;

/// One entry in the rule table.
struct Rule {
    kind: AchievementKind,
    check: RuleFn,
}

const RULES: [Rule; 7] = [
    Rule {
        kind: AchievementKind::FirstSession,
        check: |p, _| Ok(p.sessions.len() == 1),
    },
    Rule {
        kind: AchievementKind::FiveSessions,
        check: |p, _| Ok(p.sessions.len() >= 5),
    },
    Rule {
        kind: AchievementKind::TwentyFiveSessions,
        check: |p, _| Ok(p.sessions.len() >= 25),
    },
    Rule {
        kind: AchievementKind::Streak3,
        check: |p, _| Ok(p.current_streak >= 3),
    },
    Rule {
        kind: AchievementKind::Streak7,
        check: |p, _| Ok(p.current_streak >= 7),
    },
    Rule {
        kind: AchievementKind::Streak30,
        check: |p, _| Ok(p.current_streak >= 30),
    },
    Rule {
        kind: AchievementKind::GoalAchiever,
        check: goal_achiever,
    },
];

/// Evaluates every not-yet-unlocked rule against the profile and returns the
/// kinds whose conditions are newly true, in table order.
///
/// The caller appends the returned kinds to the profile; this function never
/// mutates. A rule evaluator failing is a logged no-op for that rule only.
pub fn evaluate(profile: &StudyProfile, now: DateTime<Utc>) -> Vec<AchievementKind> {
    let mut unlocked = Vec::new();
    for rule in &RULES {
        if profile.has_achievement(rule.kind) {
            continue;
        }
        match (rule.check)(profile, now) {
            Ok(true) => unlocked.push(rule.kind),
            Ok(false) => {}
            Err(e) => {
                warn!(rule = rule.kind.as_str(), error = %e, "achievement rule failed; skipping");
            }
        }
    }
    unlocked
}

/// True when each of the trailing 7 calendar days (UTC, ending today) has a
/// summed session duration of at least the profile's daily goal.
fn goal_achiever(profile: &StudyProfile, now: DateTime<Utc>) -> Result<bool, RuleError> {
    let today = now.date_naive();
    let mut qualifying_days = 0u32;
    for offset in 0..7u64 {
        let day = today
            .checked_sub_days(Days::new(offset))
            .ok_or_else(|| RuleError(format!("no calendar day {} days before {}", offset, today)))?;
        let studied: i64 = profile
            .sessions
            .iter()
            .filter(|s| s.start_time.date_naive() == day)
            .map(|s| s.duration_ms)
            .sum();
        if studied >= profile.daily_goal_ms {
            qualifying_days += 1;
        }
    }
    Ok(qualifying_days >= 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Achievement, SessionRecord};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn session(start: DateTime<Utc>, ms: i64) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            start_time: start,
            end_time: start + Duration::milliseconds(ms),
            duration_ms: ms,
            subject: "General Study".to_string(),
            notes: None,
        }
    }

    #[test]
    fn already_unlocked_kinds_are_skipped() {
        let mut profile = StudyProfile::new(Uuid::new_v4());
        profile.sessions.push(session(at(13, 9), 600_000));
        profile.achievements.push(Achievement {
            kind: AchievementKind::FirstSession,
            unlocked_at: at(13, 9),
        });
        assert!(evaluate(&profile, at(13, 10)).is_empty());
    }

    #[test]
    fn multiple_rules_fire_in_table_order() {
        let mut profile = StudyProfile::new(Uuid::new_v4());
        for _ in 0..5 {
            profile.sessions.push(session(at(13, 9), 600_000));
        }
        profile.current_streak = 3;

        let unlocked = evaluate(&profile, at(13, 10));
        assert_eq!(
            unlocked,
            vec![AchievementKind::FiveSessions, AchievementKind::Streak3]
        );
    }

    #[test]
    fn session_count_and_streak_thresholds_fire_at_their_bounds() {
        let mut profile = StudyProfile::new(Uuid::new_v4());
        for _ in 0..24 {
            profile.sessions.push(session(at(13, 9), 600_000));
        }
        profile.current_streak = 7;

        let unlocked = evaluate(&profile, at(13, 10));
        assert!(!unlocked.contains(&AchievementKind::TwentyFiveSessions));
        assert!(unlocked.contains(&AchievementKind::Streak7));
        assert!(!unlocked.contains(&AchievementKind::Streak30));

        profile.sessions.push(session(at(13, 11), 600_000));
        profile.current_streak = 30;
        let unlocked = evaluate(&profile, at(13, 12));
        assert!(unlocked.contains(&AchievementKind::TwentyFiveSessions));
        assert!(unlocked.contains(&AchievementKind::Streak30));
    }

    #[test]
    fn goal_achiever_requires_all_seven_days() {
        let mut profile = StudyProfile::new(Uuid::new_v4());
        profile.daily_goal_ms = 3_600_000;
        // Days 7..=13 each get two 30-minute sessions, except day 10.
        for d in 7..=13u32 {
            if d == 10 {
                continue;
            }
            profile.sessions.push(session(at(d, 9), 1_800_000));
            profile.sessions.push(session(at(d, 20), 1_800_000));
        }
        assert!(!evaluate(&profile, at(13, 22)).contains(&AchievementKind::GoalAchiever));

        // Fill the missing day; now the trailing week qualifies.
        profile.sessions.push(session(at(10, 12), 3_600_000));
        assert!(evaluate(&profile, at(13, 22)).contains(&AchievementKind::GoalAchiever));
    }

    #[test]
    fn goal_achiever_sums_within_a_day_not_across_days() {
        let mut profile = StudyProfile::new(Uuid::new_v4());
        profile.daily_goal_ms = 3_600_000;
        // One huge session on a single day does not cover the other six.
        profile.sessions.push(session(at(13, 9), 40_000_000));
        assert!(!evaluate(&profile, at(13, 22)).contains(&AchievementKind::GoalAchiever));
    }
}
