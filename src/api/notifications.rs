//! Notifications and subscription plans of the current user

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ListParams, Notification, PagedResult, PlanInfo};
use crate::services::subscription::{ChangePlanInput, CurrentPlan};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedCount {
    pub marked: u64,
}

/// Routes nested under `/notifications`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/{id}/read", post(mark_read))
}

/// Routes nested under `/subscriptions`
pub fn subscriptions_router() -> Router<AppState> {
    Router::new()
        .route("/plans", get(plans))
        .route("/me", get(current_plan).put(change_plan).delete(cancel))
}

/// GET /api/v1/notifications?unread_only=
async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<Notification>>, ApiError> {
    Ok(Json(
        state
            .notification_service
            .list(user.id, query.unread_only, &params)
            .await?,
    ))
}

/// GET /api/v1/notifications/unread-count
async fn unread_count(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<UnreadCount>, ApiError> {
    let unread = state.notification_service.unread_count(user.id).await?;
    Ok(Json(UnreadCount { unread }))
}

/// POST /api/v1/notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.notification_service.mark_read(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<MarkedCount>, ApiError> {
    let marked = state.notification_service.mark_all_read(user.id).await?;
    Ok(Json(MarkedCount { marked }))
}

/// GET /api/v1/subscriptions/plans
async fn plans(State(state): State<AppState>) -> Json<Vec<PlanInfo>> {
    Json(state.subscription_service.plans())
}

/// GET /api/v1/subscriptions/me
async fn current_plan(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<CurrentPlan>, ApiError> {
    Ok(Json(state.subscription_service.current(user.id).await?))
}

/// PUT /api/v1/subscriptions/me - start a new 30 day period on `plan`
async fn change_plan(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<ChangePlanInput>,
) -> Result<Json<CurrentPlan>, ApiError> {
    Ok(Json(state.subscription_service.change_plan(&user, body.plan).await?))
}

/// DELETE /api/v1/subscriptions/me - cancel at period end
async fn cancel(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<CurrentPlan>, ApiError> {
    Ok(Json(state.subscription_service.cancel(&user).await?))
}
