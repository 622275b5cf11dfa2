//! Fixtures shared by service tests

use std::sync::Arc;

use crate::db::repositories::{SqlxNotificationRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};
use crate::services::delivery::Delivery;
use crate::services::notification::NotificationService;

/// Insert an active user row and return the matching model
pub async fn insert_user(pool: &DynDatabasePool, name: &str) -> User {
    insert_user_with_role(pool, name, UserRole::User).await
}

pub async fn insert_user_with_role(pool: &DynDatabasePool, name: &str, role: UserRole) -> User {
    let email = format!("{}@example.com", name);
    let id = sqlx::query("INSERT INTO users (username, email, password_hash, role) VALUES (?, ?, 'h', ?)")
        .bind(name)
        .bind(&email)
        .bind(role.as_str())
        .execute(pool.as_sqlite().expect("sqlite test pool"))
        .await
        .expect("insert user")
        .last_insert_rowid();
    let mut user = User::new(name.to_string(), email, "h".to_string(), role);
    user.id = id;
    user
}

/// Notification service that stores but never delivers
pub fn notification_service(pool: &DynDatabasePool) -> Arc<NotificationService> {
    Arc::new(NotificationService::new(
        SqlxNotificationRepository::boxed(pool.clone()),
        SqlxUserRepository::boxed(pool.clone()),
        Arc::new(Delivery::disabled()),
    ))
}
