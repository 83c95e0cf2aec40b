//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use studycircle_core::{
    domain::{MAX_DAILY_GOAL_MS, MIN_DAILY_GOAL_MS},
    ledger, LedgerError, PortError, SessionDraft, StudyProfile,
};
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        stop_session_handler,
        delete_session_handler,
        stats_handler,
        update_goal_handler,
        online_friends_handler,
    ),
    components(
        schemas(
            StopSessionRequest,
            StopSessionResponse,
            StatsResponse,
            AchievementView,
            UpdateGoalRequest,
            OnlineFriendsResponse,
        )
    ),
    tags(
        (name = "StudyCircle API", description = "API endpoints for the social study tracker.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The body of a stop-session request: the completed interval to record.
#[derive(Deserialize, ToSchema)]
pub struct StopSessionRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub subject: Option<String>,
    pub notes: Option<String>,
}

/// The response sent after a session was recorded.
#[derive(Serialize, ToSchema)]
pub struct StopSessionResponse {
    pub session_id: Uuid,
    pub total_study_ms: i64,
    pub weekly_study_ms: i64,
    pub monthly_study_ms: i64,
    pub current_streak: u32,
    /// Identifiers of achievements newly unlocked by this session, in the
    /// order the rules are defined.
    pub new_achievements: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AchievementView {
    #[serde(rename = "type")]
    pub kind: String,
    pub unlocked_at: DateTime<Utc>,
}

/// The user's current aggregates, streak, and unlocked achievements.
#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pub total_study_ms: i64,
    pub weekly_study_ms: i64,
    pub monthly_study_ms: i64,
    pub current_streak: u32,
    pub last_study_date: Option<NaiveDate>,
    pub daily_goal_ms: i64,
    pub session_count: usize,
    pub achievements: Vec<AchievementView>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateGoalRequest {
    pub daily_goal_ms: i64,
}

#[derive(Serialize, ToSchema)]
pub struct OnlineFriendsResponse {
    pub user_ids: Vec<Uuid>,
}

fn stats_view(profile: &StudyProfile) -> StatsResponse {
    StatsResponse {
        total_study_ms: profile.total_study_ms,
        weekly_study_ms: profile.weekly_study_ms,
        monthly_study_ms: profile.monthly_study_ms,
        current_streak: profile.current_streak,
        last_study_date: profile.last_study_date,
        daily_goal_ms: profile.daily_goal_ms,
        session_count: profile.sessions.len(),
        achievements: profile
            .achievements
            .iter()
            .map(|a| AchievementView {
                kind: a.kind.as_str().to_string(),
                unlocked_at: a.unlocked_at,
            })
            .collect(),
    }
}

fn internal(context: &str, e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("{context}: {e}");
    (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Record a completed study session.
///
/// Applies the ledger to the user's profile, persists the session together
/// with the updated aggregates and any newly unlocked achievements, and
/// returns the new state. Same-user calls serialize on a per-user lock.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = StopSessionRequest,
    responses(
        (status = 201, description = "Session recorded", body = StopSessionResponse),
        (status = 400, description = "Malformed session input"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn stop_session_handler(
    State(app_state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<StopSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lock = app_state.user_locks.for_user(user_id).await;
    let _guard = lock.lock().await;

    let mut profile = app_state
        .db
        .load_profile(user_id)
        .await
        .map_err(|e| internal("Failed to load profile", e))?;

    let draft = SessionDraft {
        start_time: req.start_time,
        end_time: req.end_time,
        duration_ms: req.duration_ms,
        subject: req.subject,
        notes: req.notes,
    };
    let unlocked = ledger::record_session(&mut profile, draft, Utc::now()).map_err(|e| match e {
        LedgerError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        other => internal("Failed to record session", other),
    })?;

    // The ledger appended the record last; persist it plus the new aggregates.
    let session = profile
        .sessions
        .last()
        .ok_or_else(|| internal("Failed to record session", "ledger left no record"))?;
    app_state
        .db
        .insert_session(user_id, session)
        .await
        .map_err(|e| internal("Failed to persist session", e))?;
    app_state
        .db
        .save_aggregates(&profile)
        .await
        .map_err(|e| internal("Failed to persist aggregates", e))?;
    let new_achievements: Vec<_> = profile
        .achievements
        .iter()
        .filter(|a| unlocked.contains(&a.kind))
        .cloned()
        .collect();
    if !new_achievements.is_empty() {
        app_state
            .db
            .insert_achievements(user_id, &new_achievements)
            .await
            .map_err(|e| internal("Failed to persist achievements", e))?;
    }

    Ok((
        StatusCode::CREATED,
        Json(StopSessionResponse {
            session_id: session.id,
            total_study_ms: profile.total_study_ms,
            weekly_study_ms: profile.weekly_study_ms,
            monthly_study_ms: profile.monthly_study_ms,
            current_streak: profile.current_streak,
            new_achievements: unlocked.iter().map(|k| k.as_str().to_string()).collect(),
        }),
    ))
}

/// Delete a previously recorded session.
///
/// Reverses the session's contribution to the time aggregates (clamped at
/// zero). The streak and achievements are deliberately left untouched.
#[utoipa::path(
    delete,
    path = "/sessions/{session_id}",
    responses(
        (status = 200, description = "Session deleted; updated stats returned", body = StatsResponse),
        (status = 404, description = "No such session"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("session_id" = Uuid, Path, description = "The session to delete.")
    )
)]
pub async fn delete_session_handler(
    State(app_state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lock = app_state.user_locks.for_user(user_id).await;
    let _guard = lock.lock().await;

    let mut profile = app_state
        .db
        .load_profile(user_id)
        .await
        .map_err(|e| internal("Failed to load profile", e))?;

    ledger::remove_session(&mut profile, session_id, Utc::now()).map_err(|e| match e {
        LedgerError::SessionNotFound(id) => {
            (StatusCode::NOT_FOUND, format!("No session with id {id}"))
        }
        other => internal("Failed to remove session", other),
    })?;

    app_state
        .db
        .delete_session(user_id, session_id)
        .await
        .map_err(|e| internal("Failed to delete session", e))?;
    app_state
        .db
        .save_aggregates(&profile)
        .await
        .map_err(|e| internal("Failed to persist aggregates", e))?;

    Ok(Json(stats_view(&profile)))
}

/// Fetch the caller's study statistics and achievements.
#[utoipa::path(
    get,
    path = "/me/stats",
    responses(
        (status = 200, description = "Current statistics", body = StatsResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn stats_handler(
    State(app_state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profile = app_state
        .db
        .load_profile(user_id)
        .await
        .map_err(|e| internal("Failed to load profile", e))?;
    Ok(Json(stats_view(&profile)))
}

/// Update the caller's daily study goal.
#[utoipa::path(
    put,
    path = "/me/goal",
    request_body = UpdateGoalRequest,
    responses(
        (status = 204, description = "Goal updated"),
        (status = 400, description = "Goal outside the accepted bounds"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_goal_handler(
    State(app_state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<UpdateGoalRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !(MIN_DAILY_GOAL_MS..=MAX_DAILY_GOAL_MS).contains(&req.daily_goal_ms) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "daily_goal_ms must be between {} and {}",
                MIN_DAILY_GOAL_MS, MAX_DAILY_GOAL_MS
            ),
        ));
    }
    app_state
        .db
        .update_daily_goal(user_id, req.daily_goal_ms)
        .await
        .map_err(|e| match e {
            PortError::NotFound(what) => (StatusCode::NOT_FOUND, what),
            other => internal("Failed to update goal", other),
        })?;
    Ok(StatusCode::NO_CONTENT)
}

/// List which of the caller's friends are currently online.
#[utoipa::path(
    get,
    path = "/friends/online",
    responses(
        (status = 200, description = "Connected subset of the friend list", body = OnlineFriendsResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn online_friends_handler(
    State(app_state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let friend_ids = app_state
        .db
        .friend_ids(user_id)
        .await
        .map_err(|e| internal("Failed to load friend list", e))?;
    let user_ids = app_state.presence.online_friends(&friend_ids).await;
    Ok(Json(OnlineFriendsResponse { user_ids }))
}
