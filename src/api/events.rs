//! Events: REST CRUD plus RSVPs

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::rest::{rest_router, Events};
use crate::models::{EventParticipant, EventRsvp, RsvpStatus};

#[derive(Debug, Deserialize)]
pub struct RsvpRequest {
    pub status: RsvpStatus,
}

/// Routes nested under `/events`
pub fn router() -> Router<AppState> {
    rest_router::<Events>()
        .route("/{id}/rsvp", post(rsvp))
        .route("/{id}/participants", get(participants))
}

/// POST /api/v1/events/{id}/rsvp - going, interested or not_going
async fn rsvp(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RsvpRequest>,
) -> Result<Json<EventRsvp>, ApiError> {
    Ok(Json(state.event_service.rsvp(&user, id, body.status).await?))
}

/// GET /api/v1/events/{id}/participants
async fn participants(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<EventParticipant>>, ApiError> {
    Ok(Json(state.event_service.participants(id).await?))
}
