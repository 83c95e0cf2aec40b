//! crates/studycircle_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like databases.

use crate::domain::{Achievement, SessionRecord, StudyProfile, User, UserCredentials};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Account Management ---
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Study Profile ---
    /// Loads the full study aggregate for a user: history, cached totals,
    /// streak, goal, and unlocked achievements.
    async fn load_profile(&self, user_id: Uuid) -> PortResult<StudyProfile>;

    /// Persists the cached aggregate fields (totals, streak, last study date)
    /// after the ledger has mutated them.
    async fn save_aggregates(&self, profile: &StudyProfile) -> PortResult<()>;

    async fn insert_session(&self, user_id: Uuid, session: &SessionRecord) -> PortResult<()>;

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> PortResult<()>;

    async fn insert_achievements(
        &self,
        user_id: Uuid,
        achievements: &[Achievement],
    ) -> PortResult<()>;

    async fn update_daily_goal(&self, user_id: Uuid, daily_goal_ms: i64) -> PortResult<()>;

    // --- Friends ---
    /// The user's declared friend set. Symmetry of the relation is maintained
    /// by the friend-management flow; this is a plain read.
    async fn friend_ids(&self, user_id: Uuid) -> PortResult<Vec<Uuid>>;
}
