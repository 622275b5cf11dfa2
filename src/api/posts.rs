//! Memories (posts), comments and likes
//!
//! CRUD for posts comes from the generic REST controller; this module adds
//! the feed, threaded comments and polymorphic likes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::rest::{rest_router, Posts};
use crate::models::{
    CommentNode, CreateCommentInput, LikeTarget, LikeToggle, ListParams, PagedResult, Post,
};

/// Routes nested under `/posts`
pub fn router() -> Router<AppState> {
    rest_router::<Posts>().route("/{id}/comments", get(list_comments).post(create_comment))
}

/// Routes at the API root
pub fn root_router() -> Router<AppState> {
    Router::new()
        .route("/feed", get(feed))
        .route("/comments/{id}", delete(delete_comment))
        .route("/likes/{target}/{id}", post(toggle_like).get(like_status))
}

/// GET /api/v1/feed - own, friends' and public memories, newest first
async fn feed(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<Post>>, ApiError> {
    Ok(Json(state.post_service.feed(&user, &params).await?))
}

/// GET /api/v1/posts/{id}/comments - threaded
async fn list_comments(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Vec<CommentNode>>, ApiError> {
    Ok(Json(state.comment_service.list(viewer.user(), post_id).await?))
}

/// POST /api/v1/posts/{id}/comments
async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(post_id): Path<i64>,
    Json(body): Json<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state.comment_service.create(&user, post_id, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// DELETE /api/v1/comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/likes/{post|comment|event}/{id} - like or unlike
async fn toggle_like(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((target, id)): Path<(LikeTarget, i64)>,
) -> Result<Json<LikeToggle>, ApiError> {
    Ok(Json(state.like_service.toggle(&user, target, id).await?))
}

/// GET /api/v1/likes/{post|comment|event}/{id}
async fn like_status(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path((target, id)): Path<(LikeTarget, i64)>,
) -> Result<Json<LikeToggle>, ApiError> {
    Ok(Json(state.like_service.status(viewer.user(), target, id).await?))
}
