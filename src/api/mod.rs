//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/api/v1` except the operational `/health` and
//! `/metrics` endpoints and the static `/uploads` directory. Errors use the
//! `{ "error": { "code", "message", "details"? } }` envelope.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod events;
pub mod friends;
pub mod groups;
pub mod housing;
pub mod middleware;
pub mod notifications;
pub mod ops;
pub mod posts;
pub mod rest;
pub mod search;
pub mod upload;

use std::path::Path;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

pub use middleware::{ApiError, AppState};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = admin::router().route_layer(axum_middleware::from_fn(middleware::require_admin));

    // Report queue (moderators too)
    let report_routes =
        admin::reports_router().route_layer(axum_middleware::from_fn(middleware::require_staff));

    Router::new()
        .nest("/auth", auth::auth_router())
        .nest("/users", auth::users_router())
        .nest("/posts", posts::router())
        .nest("/events", events::router())
        .nest("/groups", groups::router())
        .nest("/friends", friends::router())
        .nest("/chat", chat::router())
        .nest("/notifications", notifications::router())
        .nest("/subscriptions", notifications::subscriptions_router())
        .nest("/housing", housing::router())
        .nest("/admin/reports", report_routes)
        .nest("/admin", admin_routes)
        .route("/docs/openapi.json", get(ops::openapi))
        .merge(posts::root_router())
        .merge(search::router())
        .merge(upload::router(&state))
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(state, middleware::optional_auth))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = %cors_origin, "Invalid CORS origin, cross-origin requests disabled");
            cors
        }
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str, upload_path: &Path) -> Router {
    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .route("/health", get(ops::health))
        .route("/metrics", get(ops::metrics))
        .nest_service("/uploads", ServeDir::new(upload_path))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_cache;
    use crate::config::Config;
    use crate::db::migrated_test_pool;
    use crate::services::delivery::Delivery;
    use crate::services::LoginRateLimiter;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: AppState,
        pool: crate::db::DynDatabasePool,
        _dir: TempDir,
    }

    async fn test_app() -> TestApp {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.upload.path = dir.path().join("uploads");
        config.upload.chunk_path = dir.path().join("chunks");

        let pool = migrated_test_pool().await;
        let state = AppState::build(
            &config,
            pool.clone(),
            test_cache(),
            Arc::new(Delivery::disabled()),
            Arc::new(LoginRateLimiter::from_config(&config.auth)),
        );
        let router = build_router(state.clone(), "http://localhost:3000", &config.upload.path);
        TestApp {
            router,
            state,
            pool,
            _dir: dir,
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Response {
        app.router.clone().oneshot(request).await.unwrap()
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(app: &TestApp, username: &str) -> String {
        let response = send(
            app,
            json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "milonga-2024",
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let app = test_app().await;
        let token = register(&app, "carlos").await;

        let response = send(&app, get_request("/api/v1/auth/me", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["username"], "carlos");
        assert!(me.get("password_hash").is_none());

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                json!({ "login": "carlos@example.com", "password": "milonga-2024" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
    }

    #[tokio::test]
    async fn test_protected_route_requires_session() {
        let app = test_app().await;

        let response = send(&app, get_request("/api/v1/auth/me", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let response = send(&app, get_request("/api/v1/feed", Some("not-a-session"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_post_crud_flow() {
        let app = test_app().await;
        let token = register(&app, "lucia").await;

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/v1/posts",
                Some(&token),
                json!({ "content": "First milonga in Buenos Aires", "visibility": "public" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let post = body_json(response).await;
        let id = post["id"].as_i64().unwrap();

        let response = send(&app, get_request(&format!("/api/v1/posts/{}", id), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["content"], "First milonga in Buenos Aires");

        let response = send(
            &app,
            json_request(
                "PUT",
                &format!("/api/v1/posts/{}", id),
                Some(&token),
                json!({ "content": "Edited" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["content"], "Edited");

        let response = send(&app, get_request("/api/v1/posts", None)).await;
        let list = body_json(response).await;
        assert_eq!(list["total"], 1);
        assert_eq!(list["page"], 1);

        let response = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/posts/{}", id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, get_request(&format!("/api/v1/posts/{}", id), None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_route_uses_error_envelope() {
        let app = test_app().await;
        let response = send(&app, get_request("/api/v1/nope", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_admin_routes_check_role() {
        let app = test_app().await;
        // The first registered account becomes admin
        let admin_token = register(&app, "admin").await;
        let user_token = register(&app, "dancer").await;

        let response = send(&app, get_request("/api/v1/admin/dashboard", Some(&user_token))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, get_request("/api/v1/admin/dashboard", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&app, get_request("/api/v1/admin/dashboard", Some(&admin_token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let stats = body_json(response).await;
        assert_eq!(stats["users"]["total"], 2);
    }

    #[tokio::test]
    async fn test_reports_queue_open_to_moderators() {
        let app = test_app().await;
        register(&app, "owner").await;
        let token = register(&app, "mod").await;
        let response = send(&app, get_request("/api/v1/admin/reports", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        sqlx::query("UPDATE users SET role = 'moderator' WHERE username = 'mod'")
            .execute(app.pool.as_sqlite().unwrap())
            .await
            .unwrap();
        let response = send(&app, get_request("/api/v1/admin/reports", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Moderators still cannot reach admin-only routes
        let response = send(&app, get_request("/api/v1/admin/users", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    fn login_from(peer: &str, forwarded_for: Option<&str>, login: &str) -> Request<Body> {
        use axum::extract::ConnectInfo;
        use std::net::SocketAddr;

        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        if let Some(forwarded) = forwarded_for {
            builder = builder.header("x-forwarded-for", forwarded);
        }
        let body = json!({ "login": login, "password": "wrong-password" });
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_login_limit_keys_on_peer_address() {
        let app = test_app().await;

        // Distinct names so only the per-IP window can trip
        for i in 0..20 {
            let response = send(&app, login_from("198.51.100.9:40000", None, &format!("nadie{}", i))).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = send(&app, login_from("198.51.100.9:40001", None, "nadie20")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // A forged header does not reset the window without a trusted proxy
        let response = send(
            &app,
            login_from("198.51.100.9:40002", Some("203.0.113.50"), "nadie21"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = send(&app, login_from("198.51.100.10:40000", None, "nadie22")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    const BOUNDARY: &str = "mundotango-test-boundary";

    /// Multipart body with the text fields first and the file part last
    fn multipart_body(fields: &[(&str, &str)], file_name: &str, mime: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn multipart_request(uri: &str, token: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    fn chunk_request(token: &str, upload_id: &str, index: u32, total: u32, data: &[u8]) -> Request<Body> {
        let index = index.to_string();
        let total = total.to_string();
        let body = multipart_body(
            &[
                ("upload_id", upload_id),
                ("chunk_index", &index),
                ("total_chunks", &total),
                ("file_name", "tanda.mp4"),
            ],
            "tanda.mp4",
            "video/mp4",
            data,
        );
        multipart_request("/api/v1/uploads/chunks", token, body)
    }

    #[tokio::test]
    async fn test_chunked_upload_over_http() {
        use data_encoding::HEXLOWER;
        use sha2::{Digest, Sha256};

        let app = test_app().await;
        let token = register(&app, "valeria").await;
        let upload_id = uuid::Uuid::new_v4().to_string();
        let first = b"first half of the tanda, ";
        let second = b"second half";

        let response = send(&app, chunk_request(&token, &upload_id, 1, 2, second)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["received"], json!([1]));
        assert_eq!(status["complete"], false);

        // Assembling before every part arrived is refused
        let complete_uri = format!("/api/v1/uploads/chunks/{}/complete", upload_id);
        let response = send(&app, json_request("POST", &complete_uri, Some(&token), json!({}))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = send(&app, chunk_request(&token, &upload_id, 0, 2, first)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            get_request(&format!("/api/v1/uploads/chunks/{}", upload_id), Some(&token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["received"], json!([0, 1]));
        assert_eq!(status["total_chunks"], 2);
        assert_eq!(status["complete"], true);

        // Someone else cannot see the upload
        let other = register(&app, "intruso").await;
        let response = send(
            &app,
            get_request(&format!("/api/v1/uploads/chunks/{}", upload_id), Some(&other)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, json_request("POST", &complete_uri, Some(&token), json!({}))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let attachment = body_json(response).await;

        let whole: Vec<u8> = [&first[..], &second[..]].concat();
        assert_eq!(attachment["size"], whole.len());
        assert_eq!(attachment["mime_type"], "video/mp4");
        assert_eq!(attachment["file_name"], "tanda.mp4");
        assert_eq!(attachment["checksum"], HEXLOWER.encode(&Sha256::digest(&whole)));

        let url = attachment["url"].as_str().unwrap();
        let response = send(&app, get_request(url, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &whole[..]);
    }

    #[tokio::test]
    async fn test_chunk_without_metadata_is_rejected() {
        let app = test_app().await;
        let token = register(&app, "valeria").await;

        let body = multipart_body(&[("upload_id", "not-used")], "tanda.mp4", "video/mp4", b"data");
        let response = send(&app, multipart_request("/api/v1/uploads/chunks", &token, body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_health_metrics_and_docs() {
        let app = test_app().await;

        let response = send(&app, get_request("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = send(&app, get_request("/api/v1/docs/openapi.json", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["openapi"], "3.0.3");

        let response = send(&app, get_request("/metrics", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; version=0.0.4"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("mundotango_http_requests_total{status=\"2xx\"} 2"));
        assert_eq!(app.state.request_stats.total_requests(), 3);
    }
}
