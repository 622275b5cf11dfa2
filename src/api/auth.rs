//! Authentication and user API endpoints
//!
//! - POST /api/v1/auth/register - Register (first account becomes admin)
//! - POST /api/v1/auth/login - Login with username or email
//! - POST /api/v1/auth/logout - End the current session
//! - GET /api/v1/auth/me - Current user
//! - PUT /api/v1/auth/password - Change password (ends other sessions)
//! - DELETE /api/v1/auth/me - Delete own account
//! - GET /api/v1/users?q= - Search dancers
//! - GET /api/v1/users/{id} - Public profile
//! - PUT /api/v1/users/me - Update own profile

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::{ListParams, PagedResult, PublicProfile, RegisterInput, Session, UpdateProfileInput, User};
use crate::services::user::{ChangePasswordInput, LoginInput};

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    #[serde(default)]
    pub q: String,
}

pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(get_current_user).delete(delete_account))
        .route("/password", put(change_password))
}

pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/", get(search_users))
        .route("/me", put(update_profile))
        .route("/{id}", get(get_profile))
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state.user_service.register(body).await?;
    Ok((
        StatusCode::CREATED,
        session_cookie(&session, state.user_service.session_days())?,
        Json(auth_response(user, session)),
    ))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state.user_service.login(body, ip).await?;
    Ok((
        session_cookie(&session, state.user_service.session_days())?,
        Json(auth_response(user, session)),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me
async fn get_current_user(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}

/// PUT /api/v1/auth/password
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordInput>,
) -> Result<StatusCode, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.change_password(&user, &token, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/auth/me
async fn delete_account(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<DeleteAccountRequest>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_account(&user, &body.password).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/users?q=&page=&per_page=
async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
    Query(params): Query<ListParams>,
) -> Result<Json<PagedResult<PublicProfile>>, ApiError> {
    Ok(Json(state.user_service.search_users(&query.q, &params).await?))
}

/// GET /api/v1/users/{id}
async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublicProfile>, ApiError> {
    Ok(Json(state.user_service.get_profile(id).await?))
}

/// PUT /api/v1/users/me
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.update_profile(&user, body).await?))
}

fn auth_response(user: User, session: Session) -> AuthResponse {
    AuthResponse {
        user,
        expires_at: session.expires_at.to_rfc3339(),
        token: session.id,
    }
}

/// `Set-Cookie` header carrying the session token (httpOnly)
fn session_cookie(session: &Session, days: i64) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        days * 24 * 60 * 60
    );
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::internal_error(format!("Invalid session cookie: {}", e)))?;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

/// Address of the client for per-IP login limiting
///
/// The socket peer, unless `trust_proxy_headers` is set and the proxy
/// supplied one. `None` when neither is known.
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(client_ip(&parts.headers, peer, state.trust_proxy_headers)))
    }
}

fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy_headers: bool) -> Option<IpAddr> {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(headers) {
            return Some(ip);
        }
    }
    peer
}

/// Client IP as reported by the proxy in front of us. The last
/// `X-Forwarded-For` hop is the one that proxy appended itself.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.rsplit(',').next() {
            return ip.trim().parse().ok();
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}
