//! Global search, activity and report-type taxonomies, report filing and
//! feature flag checks

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{ActivityNode, CreateReportInput, ListParams, ReportTypeNode};
use crate::services::search::{SearchKind, SearchResults};

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub kind: SearchKind,
}

#[derive(Debug, Serialize)]
pub struct FlagState {
    pub key: String,
    pub enabled: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search))
        .route("/activities", get(activities))
        .route("/report-types", get(report_types))
        .route("/reports", post(file_report))
        .route("/flags/{key}", get(flag))
}

/// GET /api/v1/search?q=&kind=
async fn search(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<SearchQuery>,
    Query(params): Query<ListParams>,
) -> Result<Json<SearchResults>, ApiError> {
    Ok(Json(
        state
            .search_service
            .search(viewer.user(), &query.q, query.kind, &params)
            .await?,
    ))
}

/// GET /api/v1/activities
async fn activities(State(state): State<AppState>) -> Result<Json<Vec<ActivityNode>>, ApiError> {
    Ok(Json(state.moderation_service.activity_tree().await?))
}

/// GET /api/v1/report-types
async fn report_types(State(state): State<AppState>) -> Result<Json<Vec<ReportTypeNode>>, ApiError> {
    Ok(Json(state.moderation_service.report_type_tree().await?))
}

/// POST /api/v1/reports
async fn file_report(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateReportInput>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.moderation_service.file_report(&user, body).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/v1/flags/{key} - evaluated for the caller when signed in
async fn flag(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(key): Path<String>,
) -> Result<Json<FlagState>, ApiError> {
    let user_id = viewer.user().map(|u| u.id);
    let enabled = state.feature_flag_service.is_enabled(&key, user_id).await?;
    Ok(Json(FlagState { key, enabled }))
}
