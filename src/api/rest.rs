//! Generic REST controller
//!
//! A resource implements [`RestResource`] once and [`rest_router`] mounts
//! the five CRUD routes for it:
//!
//! | Method   | Path    | Operation |
//! |----------|---------|-----------|
//! | `GET`    | `/`     | list      |
//! | `POST`   | `/`     | store     |
//! | `GET`    | `/{id}` | show      |
//! | `PUT`    | `/{id}` | update    |
//! | `DELETE` | `/{id}` | destroy   |
//!
//! Reads see the optional viewer, writes need an authenticated user.
//! The `before_*` hooks may reject a write; the `after_*` hooks observe it.

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::db::repositories::PostFilter;
use crate::models::{
    CreateEventInput, CreateGroupInput, CreateHousingInput, CreatePostInput, Event, EventFilter,
    Group, HousingFilter, HousingListing, ListParams, PagedResult, Post, UpdateEventInput,
    UpdateGroupInput, UpdateHousingInput, UpdatePostInput, User,
};
use crate::services::ServiceResult;

#[async_trait]
pub trait RestResource: Send + Sync + 'static {
    /// Singular name used in logs
    const NAME: &'static str;

    type Item: Serialize + Send + Sync + 'static;
    type Create: DeserializeOwned + Send + Sync + 'static;
    type Update: DeserializeOwned + Send + Sync + 'static;
    /// Extra query-string filters accepted by `list`
    type Filter: DeserializeOwned + Send + Sync + 'static;

    async fn list(
        state: &AppState,
        viewer: Option<&User>,
        filter: Self::Filter,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Self::Item>>;

    async fn show(state: &AppState, viewer: Option<&User>, id: i64) -> ServiceResult<Self::Item>;

    async fn store(state: &AppState, user: &User, input: Self::Create) -> ServiceResult<Self::Item>;

    async fn update(state: &AppState, user: &User, id: i64, input: Self::Update) -> ServiceResult<Self::Item>;

    /// Soft delete
    async fn destroy(state: &AppState, user: &User, id: i64) -> ServiceResult<()>;

    async fn before_store(_state: &AppState, _user: &User, _input: &Self::Create) -> ServiceResult<()> {
        Ok(())
    }

    async fn after_store(_state: &AppState, _user: &User, _item: &Self::Item) {}

    async fn before_update(_state: &AppState, _user: &User, _id: i64, _input: &Self::Update) -> ServiceResult<()> {
        Ok(())
    }

    async fn after_update(_state: &AppState, _user: &User, _item: &Self::Item) {}

    async fn before_destroy(_state: &AppState, _user: &User, _id: i64) -> ServiceResult<()> {
        Ok(())
    }

    async fn after_destroy(_state: &AppState, _user: &User, _id: i64) {}
}

/// Mount the CRUD routes of `R`
pub fn rest_router<R: RestResource>() -> Router<AppState> {
    Router::new()
        .route("/", get(list::<R>).post(store::<R>))
        .route("/{id}", get(show::<R>).put(update::<R>).delete(destroy::<R>))
}

async fn list<R: RestResource>(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(params): Query<ListParams>,
    Query(filter): Query<R::Filter>,
) -> Result<Json<PagedResult<R::Item>>, ApiError> {
    Ok(Json(R::list(&state, viewer.user(), filter, &params).await?))
}

async fn show<R: RestResource>(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<R::Item>, ApiError> {
    Ok(Json(R::show(&state, viewer.user(), id).await?))
}

async fn store<R: RestResource>(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<R::Create>,
) -> Result<impl IntoResponse, ApiError> {
    R::before_store(&state, &user, &input).await?;
    let item = R::store(&state, &user, input).await?;
    R::after_store(&state, &user, &item).await;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update<R: RestResource>(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<R::Update>,
) -> Result<Json<R::Item>, ApiError> {
    R::before_update(&state, &user, id, &input).await?;
    let item = R::update(&state, &user, id, input).await?;
    R::after_update(&state, &user, &item).await;
    Ok(Json(item))
}

async fn destroy<R: RestResource>(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    R::before_destroy(&state, &user, id).await?;
    R::destroy(&state, &user, id).await?;
    R::after_destroy(&state, &user, id).await;
    tracing::debug!(resource = R::NAME, id, by = user.id, "Resource deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Filter for resources whose listing takes no extra parameters
#[derive(Debug, Default, Deserialize)]
pub struct NoFilter {}

// ============================================================================
// Resources
// ============================================================================

pub struct Posts;

#[async_trait]
impl RestResource for Posts {
    const NAME: &'static str = "post";
    type Item = Post;
    type Create = CreatePostInput;
    type Update = UpdatePostInput;
    type Filter = PostFilter;

    async fn list(state: &AppState, viewer: Option<&User>, filter: PostFilter, params: &ListParams) -> ServiceResult<PagedResult<Post>> {
        state.post_service.list(viewer, filter, params).await
    }

    async fn show(state: &AppState, viewer: Option<&User>, id: i64) -> ServiceResult<Post> {
        state.post_service.get_visible(viewer, id).await
    }

    async fn store(state: &AppState, user: &User, input: CreatePostInput) -> ServiceResult<Post> {
        state.post_service.create(user, input).await
    }

    async fn update(state: &AppState, user: &User, id: i64, input: UpdatePostInput) -> ServiceResult<Post> {
        state.post_service.update(user, id, input).await
    }

    async fn destroy(state: &AppState, user: &User, id: i64) -> ServiceResult<()> {
        state.post_service.delete(user, id).await
    }
}

pub struct Events;

#[async_trait]
impl RestResource for Events {
    const NAME: &'static str = "event";
    type Item = Event;
    type Create = CreateEventInput;
    type Update = UpdateEventInput;
    type Filter = EventFilter;

    async fn list(state: &AppState, _viewer: Option<&User>, filter: EventFilter, params: &ListParams) -> ServiceResult<PagedResult<Event>> {
        state.event_service.list(&filter, params).await
    }

    async fn show(state: &AppState, _viewer: Option<&User>, id: i64) -> ServiceResult<Event> {
        state.event_service.get(id).await
    }

    async fn store(state: &AppState, user: &User, input: CreateEventInput) -> ServiceResult<Event> {
        state.event_service.create(user, input).await
    }

    async fn update(state: &AppState, user: &User, id: i64, input: UpdateEventInput) -> ServiceResult<Event> {
        state.event_service.update(user, id, input).await
    }

    async fn destroy(state: &AppState, user: &User, id: i64) -> ServiceResult<()> {
        state.event_service.delete(user, id).await
    }
}

pub struct Groups;

#[async_trait]
impl RestResource for Groups {
    const NAME: &'static str = "group";
    type Item = Group;
    type Create = CreateGroupInput;
    type Update = UpdateGroupInput;
    type Filter = NoFilter;

    async fn list(state: &AppState, _viewer: Option<&User>, _filter: NoFilter, params: &ListParams) -> ServiceResult<PagedResult<Group>> {
        state.group_service.list(params).await
    }

    async fn show(state: &AppState, _viewer: Option<&User>, id: i64) -> ServiceResult<Group> {
        state.group_service.get(id).await
    }

    async fn store(state: &AppState, user: &User, input: CreateGroupInput) -> ServiceResult<Group> {
        state.group_service.create(user, input).await
    }

    async fn update(state: &AppState, user: &User, id: i64, input: UpdateGroupInput) -> ServiceResult<Group> {
        state.group_service.update(user, id, input).await
    }

    async fn destroy(state: &AppState, user: &User, id: i64) -> ServiceResult<()> {
        state.group_service.delete(user, id).await
    }
}

pub struct HousingListings;

#[async_trait]
impl RestResource for HousingListings {
    const NAME: &'static str = "housing listing";
    type Item = HousingListing;
    type Create = CreateHousingInput;
    type Update = UpdateHousingInput;
    type Filter = HousingFilter;

    async fn list(
        state: &AppState,
        _viewer: Option<&User>,
        filter: HousingFilter,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<HousingListing>> {
        state.housing_service.search(&filter, params).await
    }

    async fn show(state: &AppState, _viewer: Option<&User>, id: i64) -> ServiceResult<HousingListing> {
        state.housing_service.get_listing(id).await
    }

    async fn store(state: &AppState, user: &User, input: CreateHousingInput) -> ServiceResult<HousingListing> {
        state.housing_service.create_listing(user, input).await
    }

    async fn update(state: &AppState, user: &User, id: i64, input: UpdateHousingInput) -> ServiceResult<HousingListing> {
        state.housing_service.update_listing(user, id, input).await
    }

    async fn destroy(state: &AppState, user: &User, id: i64) -> ServiceResult<()> {
        state.housing_service.delete_listing(user, id).await
    }

    async fn after_store(_state: &AppState, user: &User, item: &HousingListing) {
        tracing::info!(listing_id = item.id, host_id = user.id, city = %item.city, "Housing listing published");
    }
}
