//! Groups: REST CRUD plus membership and group posts

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::rest::{rest_router, Groups};
use crate::models::{ListParams, PagedResult, Post};
use crate::services::group::GroupMemberView;

/// Routes nested under `/groups`
pub fn router() -> Router<AppState> {
    rest_router::<Groups>()
        .route("/{id}/members", get(members))
        .route("/{id}/membership", post(join).delete(leave))
        .route("/{id}/posts", get(group_posts))
}

/// GET /api/v1/groups/{id}/members
async fn members(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<GroupMemberView>>, ApiError> {
    Ok(Json(state.group_service.members(id, &params).await?))
}

/// POST /api/v1/groups/{id}/membership - join
async fn join(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state.group_service.join(&user, id).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// DELETE /api/v1/groups/{id}/membership - leave
async fn leave(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.group_service.leave(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/groups/{id}/posts
async fn group_posts(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<Post>>, ApiError> {
    Ok(Json(state.post_service.group_posts(viewer.user(), id, &params).await?))
}
