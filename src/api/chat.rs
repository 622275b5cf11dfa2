//! Chat rooms and messages

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ChatMessageView, ChatRoomSummary, CreateRoomInput};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: i64,
}

/// `?before_id=&limit=` paging backwards through history
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub before_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Routes nested under `/chat`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{id}/messages", get(list_messages).post(send_message))
        .route("/rooms/{id}/read", post(mark_read))
        .route("/rooms/{id}/members", post(add_member))
        .route("/rooms/{id}/membership", delete(leave_room))
        .route("/messages/{id}", delete(delete_message))
}

/// GET /api/v1/chat/rooms - with last message and unread count
async fn list_rooms(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<ChatRoomSummary>>, ApiError> {
    Ok(Json(state.chat_service.list_rooms(&user).await?))
}

/// POST /api/v1/chat/rooms - direct rooms between the same pair are reused
async fn create_room(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateRoomInput>,
) -> Result<impl IntoResponse, ApiError> {
    let room = state.chat_service.create_room(&user, body).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /api/v1/chat/rooms/{id}/messages - newest first
async fn list_messages(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessageView>>, ApiError> {
    Ok(Json(
        state
            .chat_service
            .list_messages(&user, room_id, query.before_id, query.limit)
            .await?,
    ))
}

/// POST /api/v1/chat/rooms/{id}/messages
async fn send_message(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.chat_service.send_message(&user, room_id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/v1/chat/rooms/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.chat_service.mark_read(&user, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/chat/rooms/{id}/members
async fn add_member(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<i64>,
    Json(body): Json<AddMemberRequest>,
) -> Result<StatusCode, ApiError> {
    state.chat_service.add_member(&user, room_id, body.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/chat/rooms/{id}/membership
async fn leave_room(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.chat_service.leave_room(&user, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/chat/messages/{id}
async fn delete_message(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.chat_service.delete_message(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
