//! HTTP routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use labquest_domain::{
    Archetype, Badge, BadgeId, Chest, ChestDrop, ChestId, InventoryItem, ProgressionSnapshot,
    Quest, QuestId, QuestView, StoryArc, StoryArcView, UserBadge, UserId, UserProfile, UserRole,
};

use crate::app::App;
use crate::infrastructure::ports::RepoError;
use crate::use_cases::{
    AdvancedArc, AwardResult, BadgeSweep, EngineError, ObservedProgress, OpenedChest, QuestClaim,
    TaskCompletion, UserBadgeGrants, WorkSessionCompletion,
};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        // Users and progression
        .route("/api/users/{id}", put(upsert_user))
        .route("/api/users/{id}/progression", get(get_progression))
        // Activity from the collaborator system
        .route("/api/events/task-completed", post(task_completed))
        .route("/api/events/work-session-completed", post(work_session_completed))
        // Badges
        .route("/api/badges", get(list_badges).put(save_badge))
        .route("/api/badges/evaluate", post(evaluate_all_badges))
        .route("/api/badges/{id}/award", post(award_badge))
        .route("/api/users/{id}/badges/evaluate", post(evaluate_user_badges))
        // Quests
        .route("/api/quests", put(save_quest))
        .route("/api/users/{id}/quests", get(list_quests))
        .route("/api/users/{id}/quests/{quest_id}/claim", post(claim_quest))
        .route(
            "/api/users/{id}/quests/{quest_id}/progress",
            post(observe_quest_progress),
        )
        // Chests
        .route("/api/chests", put(save_chest))
        .route("/api/users/{id}/chests/{chest_id}/open", post(open_chest))
        .route("/api/users/{id}/inventory", get(list_inventory))
        // Story arcs
        .route("/api/story-arcs", put(save_story_arc))
        .route("/api/users/{id}/story-arcs", get(list_story_arcs))
        .route(
            "/api/users/{id}/story-arcs/{code}/advance",
            post(advance_story_arc),
        )
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertUserRequest {
    display_name: String,
    role: UserRole,
    #[serde(default)]
    archetype: Option<Archetype>,
    #[serde(default)]
    points: i64,
    #[serde(default)]
    coins: i64,
    #[serde(default)]
    trophies: i64,
}

async fn upsert_user(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
    Json(body): Json<UpsertUserRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = UserProfile {
        id: UserId::new(id),
        display_name: body.display_name,
        role: body.role,
        archetype: body.archetype,
        points: body.points,
        coins: body.coins,
        trophies: body.trophies,
    };
    Ok(Json(app.use_cases.users.upsert(&profile).await?))
}

async fn get_progression(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<ProgressionSnapshot>, ApiError> {
    Ok(Json(app.use_cases.users.get(UserId::new(id)).await?))
}

// =============================================================================
// Activity
// =============================================================================

async fn task_completed(
    State(app): State<Arc<App>>,
    Json(body): Json<TaskCompletion>,
) -> Result<Json<AwardResult>, ApiError> {
    Ok(Json(app.use_cases.awards.from_task_completion(&body).await?))
}

async fn work_session_completed(
    State(app): State<Arc<App>>,
    Json(body): Json<WorkSessionCompletion>,
) -> Result<Json<AwardResult>, ApiError> {
    Ok(Json(app.use_cases.awards.from_work_session(&body).await?))
}

// =============================================================================
// Badges
// =============================================================================

async fn list_badges(State(app): State<Arc<App>>) -> Result<Json<Vec<Badge>>, ApiError> {
    Ok(Json(app.use_cases.badges.list().await?))
}

async fn save_badge(
    State(app): State<Arc<App>>,
    Json(badge): Json<Badge>,
) -> Result<StatusCode, ApiError> {
    app.use_cases.badges.save(&badge).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwardBadgeRequest {
    user_id: UserId,
    #[serde(default)]
    awarded_by: Option<UserId>,
}

async fn award_badge(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
    Json(body): Json<AwardBadgeRequest>,
) -> Result<Json<UserBadge>, ApiError> {
    let grant = app
        .use_cases
        .badges
        .award(body.user_id, BadgeId::new(id), body.awarded_by)
        .await?;
    Ok(Json(grant))
}

async fn evaluate_user_badges(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<UserBadgeGrants>, ApiError> {
    Ok(Json(app.use_cases.badges.evaluate_user(UserId::new(id)).await?))
}

async fn evaluate_all_badges(State(app): State<Arc<App>>) -> Result<Json<BadgeSweep>, ApiError> {
    Ok(Json(app.use_cases.badges.evaluate_all().await?))
}

// =============================================================================
// Quests
// =============================================================================

async fn save_quest(
    State(app): State<Arc<App>>,
    Json(quest): Json<Quest>,
) -> Result<StatusCode, ApiError> {
    app.use_cases.quests.save(&quest).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_quests(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<QuestView>>, ApiError> {
    Ok(Json(app.use_cases.quests.list_for_user(UserId::new(id)).await?))
}

async fn claim_quest(
    State(app): State<Arc<App>>,
    Path((id, quest_id)): Path<(i64, i64)>,
) -> Result<Json<QuestClaim>, ApiError> {
    let claim = app
        .use_cases
        .quests
        .claim(UserId::new(id), QuestId::new(quest_id))
        .await?;
    Ok(Json(claim))
}

#[derive(Debug, Deserialize)]
struct ObserveProgressRequest {
    value: f64,
}

async fn observe_quest_progress(
    State(app): State<Arc<App>>,
    Path((id, quest_id)): Path<(i64, i64)>,
    Json(body): Json<ObserveProgressRequest>,
) -> Result<Json<ObservedProgress>, ApiError> {
    let observed = app
        .use_cases
        .quests
        .observe(UserId::new(id), QuestId::new(quest_id), body.value)
        .await?;
    Ok(Json(observed))
}

// =============================================================================
// Chests
// =============================================================================

#[derive(Debug, Deserialize)]
struct SaveChestRequest {
    chest: Chest,
    drops: Vec<ChestDrop>,
}

async fn save_chest(
    State(app): State<Arc<App>>,
    Json(body): Json<SaveChestRequest>,
) -> Result<StatusCode, ApiError> {
    app.use_cases.chests.save(&body.chest, &body.drops).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct OpenChestRequest {
    #[serde(default = "one")]
    quantity: u32,
}

fn one() -> u32 {
    1
}

async fn open_chest(
    State(app): State<Arc<App>>,
    Path((id, chest_id)): Path<(i64, i64)>,
    Json(body): Json<OpenChestRequest>,
) -> Result<Json<OpenedChest>, ApiError> {
    let opened = app
        .use_cases
        .chests
        .open(UserId::new(id), ChestId::new(chest_id), body.quantity)
        .await?;
    Ok(Json(opened))
}

async fn list_inventory(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<InventoryItem>>, ApiError> {
    Ok(Json(app.use_cases.chests.inventory(UserId::new(id)).await?))
}

// =============================================================================
// Story arcs
// =============================================================================

async fn save_story_arc(
    State(app): State<Arc<App>>,
    Json(arc): Json<StoryArc>,
) -> Result<StatusCode, ApiError> {
    app.use_cases.story_arcs.save(&arc).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_story_arcs(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StoryArcView>>, ApiError> {
    Ok(Json(
        app.use_cases
            .story_arcs
            .resolve_for_user(UserId::new(id))
            .await?,
    ))
}

async fn advance_story_arc(
    State(app): State<Arc<App>>,
    Path((id, code)): Path<(i64, String)>,
) -> Result<Json<AdvancedArc>, ApiError> {
    Ok(Json(
        app.use_cases
            .story_arcs
            .advance(UserId::new(id), &code)
            .await?,
    ))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    PaymentRequired(String),
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            EngineError::InvalidState(msg) => ApiError::Conflict(msg),
            EngineError::InsufficientFunds { .. } => ApiError::PaymentRequired(e.to_string()),
            EngineError::Configuration(msg) => ApiError::Unprocessable(msg),
            EngineError::Validation(msg) => ApiError::BadRequest(msg),
            EngineError::Repo(repo) => repo.into(),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            RepoError::ConstraintViolation(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::not_found("User", 7), StatusCode::NOT_FOUND),
            (
                EngineError::invalid_state("quest is IN_PROGRESS"),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::InsufficientFunds {
                    required: 100,
                    available: 40,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                EngineError::Configuration("no drops".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (EngineError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                EngineError::Repo(RepoError::database("award_once", "disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                EngineError::Repo(RepoError::not_found("Chest", 3)),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
