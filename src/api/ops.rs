//! Operational endpoints: health probe, Prometheus metrics and the OpenAPI
//! document

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::api::middleware::AppState;
use crate::services::admin::APP_VERSION;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: APP_VERSION,
        uptime_seconds: state.request_stats.uptime_seconds(),
    })
}

/// GET /metrics - Prometheus text exposition format
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.request_stats.render_prometheus(),
    )
}

/// GET /api/v1/docs/openapi.json
pub async fn openapi() -> Json<Value> {
    Json(openapi_document())
}

/// Who may call a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    User,
    Staff,
    Admin,
}

/// One documented route, path relative to `/api/v1`
pub struct RouteDoc {
    pub method: &'static str,
    pub path: &'static str,
    pub tag: &'static str,
    pub summary: &'static str,
    pub access: Access,
}

const fn route(
    method: &'static str,
    path: &'static str,
    tag: &'static str,
    summary: &'static str,
    access: Access,
) -> RouteDoc {
    RouteDoc {
        method,
        path,
        tag,
        summary,
        access,
    }
}

use Access::{Admin, Public, Staff, User};

pub const ROUTES: &[RouteDoc] = &[
    // Auth and users
    route("post", "/auth/register", "auth", "Register and start a session", Public),
    route("post", "/auth/login", "auth", "Log in with username or email", Public),
    route("post", "/auth/logout", "auth", "End the current session", User),
    route("get", "/auth/me", "auth", "Current user", User),
    route("delete", "/auth/me", "auth", "Delete own account", User),
    route("put", "/auth/password", "auth", "Change password", User),
    route("get", "/users", "users", "Search users", Public),
    route("put", "/users/me", "users", "Update own profile", User),
    route("get", "/users/{id}", "users", "Public profile", Public),
    // Memories
    route("get", "/posts", "posts", "List visible posts", Public),
    route("post", "/posts", "posts", "Create a post", User),
    route("get", "/posts/{id}", "posts", "Show a post", Public),
    route("put", "/posts/{id}", "posts", "Update own post", User),
    route("delete", "/posts/{id}", "posts", "Delete a post", User),
    route("get", "/posts/{id}/comments", "posts", "Comment tree", Public),
    route("post", "/posts/{id}/comments", "posts", "Add a comment", User),
    route("delete", "/comments/{id}", "posts", "Delete a comment", User),
    route("get", "/feed", "posts", "Personal feed", User),
    route("post", "/likes/{target}/{id}", "posts", "Toggle a like", User),
    route("get", "/likes/{target}/{id}", "posts", "Like status", Public),
    // Events
    route("get", "/events", "events", "List events", Public),
    route("post", "/events", "events", "Create an event", User),
    route("get", "/events/{id}", "events", "Show an event", Public),
    route("put", "/events/{id}", "events", "Update own event", User),
    route("delete", "/events/{id}", "events", "Delete an event", User),
    route("post", "/events/{id}/rsvp", "events", "RSVP", User),
    route("get", "/events/{id}/participants", "events", "Participants", Public),
    // Groups
    route("get", "/groups", "groups", "List groups", Public),
    route("post", "/groups", "groups", "Create a group", User),
    route("get", "/groups/{id}", "groups", "Show a group", Public),
    route("put", "/groups/{id}", "groups", "Update a group", User),
    route("delete", "/groups/{id}", "groups", "Delete a group", User),
    route("get", "/groups/{id}/members", "groups", "Members", Public),
    route("post", "/groups/{id}/membership", "groups", "Join", User),
    route("delete", "/groups/{id}/membership", "groups", "Leave", User),
    route("get", "/groups/{id}/posts", "groups", "Group posts", Public),
    // Friends
    route("get", "/friends", "friends", "Own friends", User),
    route("get", "/friends/users/{user_id}", "friends", "Friends of a user", Public),
    route("get", "/friends/requests", "friends", "Pending requests", User),
    route("post", "/friends/requests", "friends", "Send a request", User),
    route("post", "/friends/requests/{id}/accept", "friends", "Accept", User),
    route("post", "/friends/requests/{id}/reject", "friends", "Reject", User),
    route("get", "/friends/check/{user_id}", "friends", "Friendship check", User),
    route("delete", "/friends/{user_id}", "friends", "Unfriend", User),
    // Chat
    route("get", "/chat/rooms", "chat", "Own rooms", User),
    route("post", "/chat/rooms", "chat", "Create a room", User),
    route("get", "/chat/rooms/{id}/messages", "chat", "Message history", User),
    route("post", "/chat/rooms/{id}/messages", "chat", "Send a message", User),
    route("post", "/chat/rooms/{id}/read", "chat", "Mark room read", User),
    route("post", "/chat/rooms/{id}/members", "chat", "Add a member", User),
    route("delete", "/chat/rooms/{id}/membership", "chat", "Leave a room", User),
    route("delete", "/chat/messages/{id}", "chat", "Delete own message", User),
    // Notifications and plans
    route("get", "/notifications", "notifications", "List notifications", User),
    route("get", "/notifications/unread-count", "notifications", "Unread count", User),
    route("post", "/notifications/read-all", "notifications", "Mark all read", User),
    route("post", "/notifications/{id}/read", "notifications", "Mark read", User),
    route("get", "/subscriptions/plans", "subscriptions", "Plan catalogue", Public),
    route("get", "/subscriptions/me", "subscriptions", "Current plan", User),
    route("put", "/subscriptions/me", "subscriptions", "Change plan", User),
    route("delete", "/subscriptions/me", "subscriptions", "Cancel", User),
    // Housing
    route("get", "/housing", "housing", "Search listings", Public),
    route("post", "/housing", "housing", "Create a listing", User),
    route("get", "/housing/{id}", "housing", "Show a listing", Public),
    route("put", "/housing/{id}", "housing", "Update own listing", User),
    route("delete", "/housing/{id}", "housing", "Delete own listing", User),
    route("get", "/housing/mine", "housing", "Own listings", User),
    route("get", "/housing/{id}/requests", "housing", "Requests for a listing", User),
    route("post", "/housing/{id}/requests", "housing", "Request a stay", User),
    route("get", "/housing/requests/mine", "housing", "Own requests", User),
    route("post", "/housing/requests/{id}/accept", "housing", "Accept a request", User),
    route("post", "/housing/requests/{id}/reject", "housing", "Reject a request", User),
    route("post", "/housing/requests/{id}/cancel", "housing", "Cancel a request", User),
    // Uploads
    route("post", "/uploads", "uploads", "Upload a file", User),
    route("post", "/uploads/chunks", "uploads", "Upload a chunk", User),
    route("get", "/uploads/chunks/{upload_id}", "uploads", "Chunk status", User),
    route("post", "/uploads/chunks/{upload_id}/complete", "uploads", "Assemble chunks", User),
    route("get", "/attachments", "uploads", "Attachments of a target", Public),
    route("put", "/attachments/{id}/target", "uploads", "Attach to a target", User),
    route("delete", "/attachments/{id}", "uploads", "Delete an attachment", User),
    // Discovery and moderation
    route("get", "/search", "search", "Global search", Public),
    route("get", "/activities", "moderation", "Activity taxonomy", Public),
    route("get", "/report-types", "moderation", "Report type taxonomy", Public),
    route("post", "/reports", "moderation", "File a report", User),
    route("get", "/flags/{key}", "flags", "Evaluate a feature flag", Public),
    route("get", "/docs/openapi.json", "docs", "This document", Public),
    // Administration
    route("get", "/admin/dashboard", "admin", "Platform counts", Admin),
    route("get", "/admin/stats", "admin", "System statistics", Admin),
    route("get", "/admin/users", "admin", "List users", Admin),
    route("put", "/admin/users/{id}/status", "admin", "Set user status", Admin),
    route("put", "/admin/users/{id}/role", "admin", "Set user role", Admin),
    route("get", "/admin/flags", "admin", "List feature flags", Admin),
    route("put", "/admin/flags/{key}", "admin", "Create or update a flag", Admin),
    route("delete", "/admin/flags/{key}", "admin", "Delete a flag", Admin),
    route("post", "/admin/activities", "admin", "Create an activity", Admin),
    route("post", "/admin/report-types", "admin", "Create a report type", Admin),
    route("get", "/admin/reports", "moderation", "Report queue", Staff),
    route("post", "/admin/reports/{id}/resolve", "moderation", "Resolve a report", Staff),
    route("post", "/admin/reports/{id}/dismiss", "moderation", "Dismiss a report", Staff),
];

fn path_parameters(path: &str) -> Vec<Value> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| {
            let schema = match name {
                "key" | "upload_id" | "target" => json!({ "type": "string" }),
                _ => json!({ "type": "integer", "format": "int64" }),
            };
            json!({ "name": name, "in": "path", "required": true, "schema": schema })
        })
        .collect()
}

fn operation(doc: &RouteDoc) -> Value {
    let mut op = json!({
        "tags": [doc.tag],
        "summary": doc.summary,
        "responses": {
            "200": { "description": "Success" },
            "default": {
                "description": "Error envelope",
                "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } }
            }
        }
    });
    let params = path_parameters(doc.path);
    if !params.is_empty() {
        op["parameters"] = Value::Array(params);
    }
    if doc.access != Public {
        op["security"] = json!([{ "bearerAuth": [] }, { "sessionCookie": [] }]);
    }
    match doc.access {
        Staff => op["description"] = json!("Requires the moderator or admin role"),
        Admin => op["description"] = json!("Requires the admin role"),
        _ => {}
    }
    op
}

/// Build the OpenAPI 3 document from [`ROUTES`]
pub fn openapi_document() -> Value {
    let mut paths = Map::new();
    for doc in ROUTES {
        let entry = paths
            .entry(format!("/api/v1{}", doc.path))
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(methods) = entry {
            methods.insert(doc.method.to_string(), operation(doc));
        }
    }

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Mundo Tango API",
            "version": APP_VERSION,
        },
        "paths": paths,
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" },
                "sessionCookie": { "type": "apiKey", "in": "cookie", "name": "session" }
            },
            "schemas": {
                "Error": {
                    "type": "object",
                    "properties": {
                        "error": {
                            "type": "object",
                            "required": ["code", "message"],
                            "properties": {
                                "code": { "type": "string" },
                                "message": { "type": "string" },
                                "details": {}
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_path_parameters() {
        let params = path_parameters("/likes/{target}/{id}");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0]["name"], "target");
        assert_eq!(params[0]["schema"]["type"], "string");
        assert_eq!(params[1]["schema"]["type"], "integer");
        assert!(path_parameters("/feed").is_empty());
    }

    #[test]
    fn test_catalogue_has_no_duplicates() {
        let mut seen = HashSet::new();
        for doc in ROUTES {
            assert!(seen.insert((doc.method, doc.path)), "{} {} listed twice", doc.method, doc.path);
        }
    }

    #[test]
    fn test_document_shape() {
        let doc = openapi_document();
        assert_eq!(doc["openapi"], "3.0.3");

        let register = &doc["paths"]["/api/v1/auth/register"]["post"];
        assert_eq!(register["tags"][0], "auth");
        assert!(register.get("security").is_none());

        let dashboard = &doc["paths"]["/api/v1/admin/dashboard"]["get"];
        assert_eq!(dashboard["description"], "Requires the admin role");
        assert!(dashboard["security"].is_array());

        let post = &doc["paths"]["/api/v1/posts/{id}"];
        assert!(post.get("get").is_some());
        assert!(post.get("put").is_some());
        assert!(post.get("delete").is_some());
    }
}
