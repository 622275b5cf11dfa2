//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and its mapping from service errors
//! - Session authentication (Bearer header or `session` cookie)
//! - Role checks and request statistics

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    CommentRepositoryImpl, SqlxActivityRepository, SqlxAttachmentRepository, SqlxChatRepository,
    SqlxEventRepository, SqlxFeatureFlagRepository, SqlxFriendshipRepository, SqlxGroupRepository,
    SqlxHousingRepository, SqlxLikeRepository, SqlxNotificationRepository, SqlxPostRepository,
    SqlxReportRepository, SqlxReportTypeRepository, SqlxSessionRepository,
    SqlxSubscriptionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::metrics::RequestStats;
use crate::models::User;
use crate::services::{
    admin::AdminService, chat::ChatService, comment::CommentService, delivery::Delivery,
    event::EventService, feature_flag::FeatureFlagService, friend::FriendService,
    group::GroupService, housing::HousingService, like::LikeService,
    moderation::ModerationService, notification::NotificationService, post::PostService,
    search::SearchService, subscription::SubscriptionService, upload::UploadService,
    user::UserService, LoginRateLimiter, ServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub notification_service: Arc<NotificationService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub friend_service: Arc<FriendService>,
    pub post_service: Arc<PostService>,
    pub comment_service: Arc<CommentService>,
    pub like_service: Arc<LikeService>,
    pub event_service: Arc<EventService>,
    pub group_service: Arc<GroupService>,
    pub chat_service: Arc<ChatService>,
    pub housing_service: Arc<HousingService>,
    pub moderation_service: Arc<ModerationService>,
    pub upload_service: Arc<UploadService>,
    pub feature_flag_service: Arc<FeatureFlagService>,
    pub search_service: Arc<SearchService>,
    pub admin_service: Arc<AdminService>,
    pub request_stats: Arc<RequestStats>,
    /// Whether proxy headers identify the client for login limiting
    pub trust_proxy_headers: bool,
}

impl AppState {
    /// Wire every repository and service on top of one pool and cache
    pub fn build(
        config: &Config,
        pool: DynDatabasePool,
        cache: Arc<Cache>,
        delivery: Arc<Delivery>,
        rate_limiter: Arc<LoginRateLimiter>,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let comment_repo = CommentRepositoryImpl::boxed(pool.clone());
        let like_repo = SqlxLikeRepository::boxed(pool.clone());
        let event_repo = SqlxEventRepository::boxed(pool.clone());
        let group_repo = SqlxGroupRepository::boxed(pool.clone());
        let housing_repo = SqlxHousingRepository::boxed(pool.clone());
        let report_repo = SqlxReportRepository::boxed(pool.clone());
        let activity_repo = SqlxActivityRepository::boxed(pool.clone());
        let request_stats = Arc::new(RequestStats::new());

        let user_service = Arc::new(UserService::new(
            user_repo.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            cache.clone(),
            rate_limiter,
            config.auth.session_days,
        ));
        let notification_service = Arc::new(NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            user_repo.clone(),
            delivery,
        ));
        let subscription_service = Arc::new(SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            group_repo.clone(),
        ));
        let friend_service = Arc::new(FriendService::new(
            SqlxFriendshipRepository::boxed(pool.clone()),
            user_repo.clone(),
            notification_service.clone(),
        ));
        let post_service = Arc::new(PostService::new(
            post_repo.clone(),
            group_repo.clone(),
            event_repo.clone(),
            activity_repo.clone(),
            friend_service.clone(),
        ));
        let comment_service = Arc::new(CommentService::new(
            comment_repo.clone(),
            post_repo.clone(),
            user_repo.clone(),
            like_repo.clone(),
            post_service.clone(),
            notification_service.clone(),
        ));
        let like_service = Arc::new(LikeService::new(
            like_repo,
            post_repo.clone(),
            comment_repo,
            event_repo.clone(),
            post_service.clone(),
            notification_service.clone(),
        ));
        let event_service = Arc::new(EventService::new(
            event_repo.clone(),
            group_repo.clone(),
            user_repo.clone(),
            notification_service.clone(),
        ));
        let group_service = Arc::new(GroupService::new(
            group_repo.clone(),
            user_repo.clone(),
            subscription_service.clone(),
        ));
        let chat_service = Arc::new(ChatService::new(
            SqlxChatRepository::boxed(pool.clone()),
            user_repo.clone(),
            notification_service.clone(),
        ));
        let housing_service = Arc::new(HousingService::new(
            housing_repo.clone(),
            subscription_service.clone(),
            notification_service.clone(),
        ));
        let moderation_service = Arc::new(ModerationService::new(
            activity_repo,
            SqlxReportTypeRepository::boxed(pool.clone()),
            report_repo.clone(),
        ));
        let upload_service = Arc::new(UploadService::new(
            SqlxAttachmentRepository::boxed(pool.clone()),
            config.upload.clone(),
        ));
        let feature_flag_service = Arc::new(FeatureFlagService::new(
            SqlxFeatureFlagRepository::boxed(pool.clone()),
            cache.clone(),
        ));
        let search_service = Arc::new(SearchService::new(
            user_service.clone(),
            post_service.clone(),
            event_service.clone(),
            group_service.clone(),
            housing_service.clone(),
        ));
        let admin_service = Arc::new(AdminService::new(
            user_repo,
            post_repo,
            event_repo,
            group_repo,
            report_repo,
            housing_repo,
            subscription_service.clone(),
            cache,
            request_stats.clone(),
        ));

        Self {
            user_service,
            notification_service,
            subscription_service,
            friend_service,
            post_service,
            comment_service,
            like_service,
            event_service,
            group_service,
            chat_service,
            housing_service,
            moderation_service,
            upload_service,
            feature_flag_service,
            search_service,
            admin_service,
            request_stats,
            trust_proxy_headers: config.server.trust_proxy_headers,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The viewer of a public route, if a valid session came with the request
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "USER_BANNED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            "UNPROCESSABLE_UPLOAD" => StatusCode::UNPROCESSABLE_ENTITY,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::validation_error(msg),
            ServiceError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            ServiceError::Forbidden(msg) => Self::forbidden(msg),
            ServiceError::Conflict(msg) => Self::new("CONFLICT", msg),
            ServiceError::Authentication(msg) if msg == "banned" => {
                Self::new("USER_BANNED", "This account has been banned")
            }
            ServiceError::Authentication(msg) => Self::unauthorized(msg),
            ServiceError::RateLimited(msg) => Self::new("RATE_LIMIT", msg),
            ServiceError::PayloadTooLarge(msg) => Self::new("PAYLOAD_TOO_LARGE", msg),
            ServiceError::InvalidUpload(msg) => Self::new("UNPROCESSABLE_UPLOAD", msg),
            ServiceError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Extract session token from request headers
pub fn extract_session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Optional authentication middleware
///
/// Applied to the whole API. Handlers that need a user take the
/// [`AuthenticatedUser`] extractor, which rejects with 401 when this
/// middleware found no valid session.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Moderator (or admin) authorization middleware
pub async fn require_staff(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_staff() {
        return Err(ApiError::forbidden("Moderator privileges required"));
    }

    Ok(next.run(request).await)
}

/// Request statistics middleware
///
/// Records status class and response time of every request.
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;

    let duration_us = start.elapsed().as_micros() as u64;
    state.request_stats.record(response.status().as_u16(), duration_us);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&h), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let h = headers(&[(header::COOKIE, "theme=dark; session=test-token-456")]);
        assert_eq!(extract_session_token(&h), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let h = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&h), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let basic = headers(&[(header::AUTHORIZATION, "Basic invalid")]);
        assert!(extract_session_token(&basic).is_none());
    }

    #[test]
    fn test_service_error_status_mapping() {
        let cases = [
            (ServiceError::validation("x"), StatusCode::BAD_REQUEST),
            (ServiceError::Authentication("Invalid credentials".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::Authentication("banned".into()), StatusCode::FORBIDDEN),
            (ServiceError::forbidden("x"), StatusCode::FORBIDDEN),
            (ServiceError::not_found("Post"), StatusCode::NOT_FOUND),
            (ServiceError::conflict("x"), StatusCode::CONFLICT),
            (ServiceError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (ServiceError::InvalidUpload("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::RateLimited("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (ServiceError::Internal(anyhow::anyhow!("db down")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(ServiceError::Internal(anyhow::anyhow!("secret dsn")));
        assert!(!err.error.message.contains("secret"));
    }

    #[test]
    fn test_not_found_message() {
        let err = ApiError::from(ServiceError::not_found("Event"));
        assert_eq!(err.error.code, "NOT_FOUND");
        assert_eq!(err.error.message, "Event not found");
    }

    #[test]
    fn test_api_error_with_details() {
        let details = serde_json::json!({"field": "username"});
        let error = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(error.error.details, Some(details));
    }
}
