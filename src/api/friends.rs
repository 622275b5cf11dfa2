//! Friend requests and friend lists

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Friendship, ListParams, PagedResult, PublicProfile};
use crate::services::friend::PendingRequests;

#[derive(Debug, Deserialize)]
pub struct FriendRequestBody {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct FriendshipCheck {
    pub are_friends: bool,
}

/// Routes nested under `/friends`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(my_friends))
        .route("/requests", get(pending).post(send_request))
        .route("/requests/{id}/accept", post(accept))
        .route("/requests/{id}/reject", post(reject))
        .route("/users/{user_id}", get(friends_of))
        .route("/check/{user_id}", get(check))
        .route("/{user_id}", delete(unfriend))
}

/// GET /api/v1/friends
async fn my_friends(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<PublicProfile>>, ApiError> {
    Ok(Json(state.friend_service.list_friends(user.id, &params).await?))
}

/// GET /api/v1/friends/users/{user_id}
async fn friends_of(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<PublicProfile>>, ApiError> {
    state.user_service.get_profile(user_id).await?;
    Ok(Json(state.friend_service.list_friends(user_id, &params).await?))
}

/// GET /api/v1/friends/requests - incoming and outgoing pending requests
async fn pending(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<PendingRequests>, ApiError> {
    Ok(Json(state.friend_service.list_pending(user.id).await?))
}

/// POST /api/v1/friends/requests
async fn send_request(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<FriendRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let friendship = state.friend_service.send_request(&user, body.user_id).await?;
    Ok((StatusCode::CREATED, Json(friendship)))
}

/// POST /api/v1/friends/requests/{id}/accept
async fn accept(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Friendship>, ApiError> {
    Ok(Json(state.friend_service.accept(&user, id).await?))
}

/// POST /api/v1/friends/requests/{id}/reject
async fn reject(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Friendship>, ApiError> {
    Ok(Json(state.friend_service.reject(&user, id).await?))
}

/// DELETE /api/v1/friends/{user_id}
async fn unfriend(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.friend_service.unfriend(&user, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/friends/check/{user_id}
async fn check(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> Result<Json<FriendshipCheck>, ApiError> {
    let are_friends = state.friend_service.are_friends(user.id, user_id).await?;
    Ok(Json(FriendshipCheck { are_friends }))
}
