//! Admin API endpoints
//!
//! Everything under `/admin` is wrapped in `require_admin`, except the report
//! queue under `/admin/reports` which moderators may work too.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CreateActivityInput, CreateReportTypeInput, FeatureFlag, ListParams, PagedResult, Report,
    ReportStatus, UpsertFeatureFlagInput, User, UserRole, UserStatus,
};
use crate::services::admin::{DashboardStats, SystemStats};

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
}

/// Admin-only routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/stats", get(get_system_stats))
        // User management
        .route("/users", get(list_users))
        .route("/users/{id}/status", put(set_status))
        .route("/users/{id}/role", put(set_role))
        // Feature flags
        .route("/flags", get(list_flags))
        .route("/flags/{key}", put(upsert_flag).delete(delete_flag))
        // Taxonomies
        .route("/activities", post(create_activity))
        .route("/report-types", post(create_report_type))
}

/// Report queue, open to moderators
pub fn reports_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reports))
        .route("/{id}/resolve", post(resolve_report))
        .route("/{id}/dismiss", post(dismiss_report))
}

/// GET /api/v1/admin/dashboard - platform-wide counts, cached briefly
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.admin_service.dashboard().await?))
}

/// GET /api/v1/admin/stats - process memory, uptime and request statistics
async fn get_system_stats(State(state): State<AppState>) -> Json<SystemStats> {
    Json(state.admin_service.system())
}

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<User>>, ApiError> {
    Ok(Json(state.user_service.list_users(&params).await?))
}

/// PUT /api/v1/admin/users/{id}/status - ban, suspend or reactivate
async fn set_status(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.set_status(&admin, id, body.status).await?))
}

/// PUT /api/v1/admin/users/{id}/role
async fn set_role(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.set_role(&admin, id, body.role).await?))
}

/// GET /api/v1/admin/flags
async fn list_flags(State(state): State<AppState>) -> Result<Json<Vec<FeatureFlag>>, ApiError> {
    Ok(Json(state.feature_flag_service.list().await?))
}

/// PUT /api/v1/admin/flags/{key}
async fn upsert_flag(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(key): Path<String>,
    Json(body): Json<UpsertFeatureFlagInput>,
) -> Result<Json<FeatureFlag>, ApiError> {
    Ok(Json(state.feature_flag_service.upsert(&admin, &key, body).await?))
}

/// DELETE /api/v1/admin/flags/{key}
async fn delete_flag(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.feature_flag_service.delete(&admin, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/activities
async fn create_activity(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Json(body): Json<CreateActivityInput>,
) -> Result<impl IntoResponse, ApiError> {
    let activity = state.moderation_service.create_activity(&admin, body).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

/// POST /api/v1/admin/report-types
async fn create_report_type(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Json(body): Json<CreateReportTypeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let report_type = state.moderation_service.create_report_type(&admin, body).await?;
    Ok((StatusCode::CREATED, Json(report_type)))
}

/// GET /api/v1/admin/reports?status=
async fn list_reports(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<ReportQuery>,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<Report>>, ApiError> {
    Ok(Json(
        state
            .moderation_service
            .list_reports(&user, query.status, &params)
            .await?,
    ))
}

/// POST /api/v1/admin/reports/{id}/resolve
async fn resolve_report(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Report>, ApiError> {
    Ok(Json(state.moderation_service.resolve(&user, id).await?))
}

/// POST /api/v1/admin/reports/{id}/dismiss
async fn dismiss_report(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Report>, ApiError> {
    Ok(Json(state.moderation_service.dismiss(&user, id).await?))
}
