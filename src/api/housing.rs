//! Housing listings and stay requests

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::rest::{rest_router, HousingListings};
use crate::models::{HousingListing, HousingRequest, HousingRequestInput};

/// Routes nested under `/housing`
///
/// The fixed `/mine` and `/requests/...` segments take precedence over the
/// `/{id}` capture from the REST router.
pub fn router() -> Router<AppState> {
    rest_router::<HousingListings>()
        .route("/mine", get(my_listings))
        .route("/{id}/requests", get(listing_requests).post(request_stay))
        .route("/requests/mine", get(my_requests))
        .route("/requests/{id}/accept", post(accept))
        .route("/requests/{id}/reject", post(reject))
        .route("/requests/{id}/cancel", post(cancel))
}

/// GET /api/v1/housing/mine
async fn my_listings(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<HousingListing>>, ApiError> {
    Ok(Json(state.housing_service.my_listings(&user).await?))
}

/// POST /api/v1/housing/{id}/requests
async fn request_stay(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(listing_id): Path<i64>,
    Json(body): Json<HousingRequestInput>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.housing_service.request_stay(&user, listing_id, body).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/v1/housing/{id}/requests - host only
async fn listing_requests(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(listing_id): Path<i64>,
) -> Result<Json<Vec<HousingRequest>>, ApiError> {
    Ok(Json(state.housing_service.listing_requests(&user, listing_id).await?))
}

/// GET /api/v1/housing/requests/mine
async fn my_requests(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<HousingRequest>>, ApiError> {
    Ok(Json(state.housing_service.my_requests(&user).await?))
}

/// POST /api/v1/housing/requests/{id}/accept
async fn accept(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<HousingRequest>, ApiError> {
    Ok(Json(state.housing_service.accept(&user, id).await?))
}

/// POST /api/v1/housing/requests/{id}/reject
async fn reject(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<HousingRequest>, ApiError> {
    Ok(Json(state.housing_service.reject(&user, id).await?))
}

/// POST /api/v1/housing/requests/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<HousingRequest>, ApiError> {
    Ok(Json(state.housing_service.cancel(&user, id).await?))
}
