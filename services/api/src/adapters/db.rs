//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `DatabaseService` port from the core crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use studycircle_core::domain::{
    Achievement, AchievementKind, SessionRecord, StudyProfile, User, UserCredentials,
};
use studycircle_core::ports::{DatabaseService, PortError, PortResult};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    total_study_ms: i64,
    weekly_study_ms: i64,
    monthly_study_ms: i64,
    current_streak: i32,
    last_study_date: Option<NaiveDate>,
    daily_goal_ms: i64,
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    username: String,
    password_hash: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            username: self.username,
            hashed_password: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct StudySessionRecord {
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_ms: i64,
    subject: String,
    notes: Option<String>,
}
impl StudySessionRecord {
    fn to_domain(self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: self.duration_ms,
            subject: self.subject,
            notes: self.notes,
        }
    }
}

#[derive(FromRow)]
struct AchievementRecord {
    kind: String,
    unlocked_at: DateTime<Utc>,
}

//=========================================================================================
// DatabaseService Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(username)
        .bind(hashed_password)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(User {
            user_id: id,
            username: username.to_string(),
        })
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("user '{}'", username)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        row.map(|(user_id,)| user_id).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn load_profile(&self, user_id: Uuid) -> PortResult<StudyProfile> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, total_study_ms, weekly_study_ms, monthly_study_ms, \
             current_streak, last_study_date, daily_goal_ms FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;

        let sessions = sqlx::query_as::<_, StudySessionRecord>(
            "SELECT id, start_time, end_time, duration_ms, subject, notes \
             FROM study_sessions WHERE user_id = $1 ORDER BY start_time, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let achievement_rows = sqlx::query_as::<_, AchievementRecord>(
            "SELECT kind, unlocked_at FROM achievements WHERE user_id = $1 ORDER BY unlocked_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        let mut achievements = Vec::with_capacity(achievement_rows.len());
        for row in achievement_rows {
            match AchievementKind::from_str(&row.kind) {
                Some(kind) => achievements.push(Achievement {
                    kind,
                    unlocked_at: row.unlocked_at,
                }),
                None => warn!(kind = %row.kind, %user_id, "unknown achievement kind in storage"),
            }
        }

        Ok(StudyProfile {
            user_id: user.id,
            sessions: sessions.into_iter().map(|s| s.to_domain()).collect(),
            total_study_ms: user.total_study_ms,
            weekly_study_ms: user.weekly_study_ms,
            monthly_study_ms: user.monthly_study_ms,
            current_streak: user.current_streak.max(0) as u32,
            last_study_date: user.last_study_date,
            daily_goal_ms: user.daily_goal_ms,
            achievements,
        })
    }

    async fn save_aggregates(&self, profile: &StudyProfile) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET total_study_ms = $2, weekly_study_ms = $3, \
             monthly_study_ms = $4, current_streak = $5, last_study_date = $6 WHERE id = $1",
        )
        .bind(profile.user_id)
        .bind(profile.total_study_ms)
        .bind(profile.weekly_study_ms)
        .bind(profile.monthly_study_ms)
        .bind(profile.current_streak as i32)
        .bind(profile.last_study_date)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("user {}", profile.user_id)));
        }
        Ok(())
    }

    async fn insert_session(&self, user_id: Uuid, session: &SessionRecord) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO study_sessions (id, user_id, start_time, end_time, duration_ms, subject, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(session.id)
        .bind(user_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.duration_ms)
        .bind(&session.subject)
        .bind(&session.notes)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM study_sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    async fn insert_achievements(
        &self,
        user_id: Uuid,
        achievements: &[Achievement],
    ) -> PortResult<()> {
        for achievement in achievements {
            // ON CONFLICT backstops the at-most-one-per-kind invariant.
            sqlx::query(
                "INSERT INTO achievements (user_id, kind, unlocked_at) VALUES ($1, $2, $3) \
                 ON CONFLICT (user_id, kind) DO NOTHING",
            )
            .bind(user_id)
            .bind(achievement.kind.as_str())
            .bind(achievement.unlocked_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        }
        Ok(())
    }

    async fn update_daily_goal(&self, user_id: Uuid, daily_goal_ms: i64) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET daily_goal_ms = $2 WHERE id = $1")
            .bind(user_id)
            .bind(daily_goal_ms)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    async fn friend_ids(&self, user_id: Uuid) -> PortResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT friend_id FROM friendships WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
