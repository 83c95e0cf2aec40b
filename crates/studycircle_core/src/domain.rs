//! crates/studycircle_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Default daily study goal: 2 hours.
pub const DEFAULT_DAILY_GOAL_MS: i64 = 7_200_000;
/// Smallest accepted daily goal: 15 minutes.
pub const MIN_DAILY_GOAL_MS: i64 = 900_000;
/// Largest accepted daily goal: 12 hours.
pub const MAX_DAILY_GOAL_MS: i64 = 43_200_000;

/// A single completed, timed interval of study.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub subject: String,
    pub notes: Option<String>,
}

/// The unvalidated input shape for recording a session. The ledger turns this
/// into a `SessionRecord` only after validation passes.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub subject: Option<String>,
    pub notes: Option<String>,
}

/// The closed vocabulary of unlockable milestones. The core only ever emits
/// these identifiers; mapping them to presentation text happens elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AchievementKind {
    FirstSession,
    FiveSessions,
    TwentyFiveSessions,
    Streak3,
    Streak7,
    Streak30,
    GoalAchiever,
}

impl AchievementKind {
    /// Every kind, in the fixed order rules are evaluated in.
    pub const ALL: [AchievementKind; 7] = [
        AchievementKind::FirstSession,
        AchievementKind::FiveSessions,
        AchievementKind::TwentyFiveSessions,
        AchievementKind::Streak3,
        AchievementKind::Streak7,
        AchievementKind::Streak30,
        AchievementKind::GoalAchiever,
    ];

    /// The stable wire identifier for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementKind::FirstSession => "first_session",
            AchievementKind::FiveSessions => "five_sessions",
            AchievementKind::TwentyFiveSessions => "twenty_five_sessions",
            AchievementKind::Streak3 => "streak_3",
            AchievementKind::Streak7 => "streak_7",
            AchievementKind::Streak30 => "streak_30",
            AchievementKind::GoalAchiever => "goal_achiever",
        }
    }

    /// Parses a stored identifier back into a kind.
    pub fn from_str(s: &str) -> Option<AchievementKind> {
        AchievementKind::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

/// A milestone a user has unlocked. Append-only; never mutated or removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Achievement {
    pub kind: AchievementKind,
    pub unlocked_at: DateTime<Utc>,
}

/// The study-tracking aggregate for one user: session history, cached time
/// totals, the consecutive-day streak, and unlocked achievements.
///
/// The time totals are incrementally maintained, not recomputed on read, and
/// are clamped at zero when sessions are removed.
#[derive(Debug, Clone)]
pub struct StudyProfile {
    pub user_id: Uuid,
    pub sessions: Vec<SessionRecord>,
    pub total_study_ms: i64,
    pub weekly_study_ms: i64,
    pub monthly_study_ms: i64,
    pub current_streak: u32,
    /// Day (UTC) of the most recent session that contributed to the streak.
    pub last_study_date: Option<NaiveDate>,
    pub daily_goal_ms: i64,
    pub achievements: Vec<Achievement>,
}

impl StudyProfile {
    /// Creates an empty profile with the default daily goal.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            sessions: Vec::new(),
            total_study_ms: 0,
            weekly_study_ms: 0,
            monthly_study_ms: 0,
            current_streak: 0,
            last_study_date: None,
            daily_goal_ms: DEFAULT_DAILY_GOAL_MS,
            achievements: Vec::new(),
        }
    }

    /// True if the given achievement kind has already been unlocked.
    pub fn has_achievement(&self, kind: AchievementKind) -> bool {
        self.achievements.iter().any(|a| a.kind == kind)
    }
}

// Represents a user account - used throughout the app.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
}

// Only used internally for login/signup - contains sensitive data.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub hashed_password: String,
}