//! User service
//!
//! Registration, login/logout, sessions and profiles. The first account
//! ever registered becomes the site admin. Sessions are opaque UUID tokens
//! stored in the database; expired ones are removed on sight and by a
//! periodic sweep.

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{
    ListParams, PagedResult, PublicProfile, RegisterInput, Session, UpdateProfileInput, User,
    UserRole, UserStatus,
};
use crate::services::error::{found, ServiceError, ServiceResult};
use crate::services::password::{hash_password, verify_password};
use crate::services::rate_limiter::LoginRateLimiter;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.]{3,30}$").expect("valid username regex"));

const MIN_PASSWORD_LEN: usize = 8;

const PROFILE_TTL: std::time::Duration = std::time::Duration::from_secs(300);

/// Login request; `login` is a username or an email address
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub login: String,
    pub password: String,
}

/// Password change request
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    cache: Arc<Cache>,
    rate_limiter: Arc<LoginRateLimiter>,
    session_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        cache: Arc<Cache>,
        rate_limiter: Arc<LoginRateLimiter>,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            cache,
            rate_limiter,
            session_days: session_days.max(1),
        }
    }

    /// Session lifetime, also used for the cookie `Max-Age`
    pub fn session_days(&self) -> i64 {
        self.session_days
    }

    /// Register a new account and log it in
    pub async fn register(&self, input: RegisterInput) -> ServiceResult<(User, Session)> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        validate_username(&username)?;
        validate_email(&email)?;
        validate_password(&input.password)?;

        if self.user_repo.get_by_username(&username).await?.is_some() {
            return Err(ServiceError::conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }
        if self.user_repo.get_by_email(&email).await?.is_some() {
            return Err(ServiceError::conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let role = if self.user_repo.count(true).await? == 0 {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let password_hash = hash_password(&input.password)?;
        let mut user = User::new(username, email, password_hash, role);
        user.name = input.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        // Deleted accounts keep their username and email reserved
        let user = match self.user_repo.create(&user).await {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                return Err(ServiceError::conflict("Username or email is already taken"))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = user.id, role = %user.role, "User registered");
        let session = self.create_session(user.id).await?;
        Ok((user, session))
    }

    /// Verify credentials and open a session.
    ///
    /// Failed attempts count against the username; every attempt counts
    /// against the client IP when one is known.
    pub async fn login(&self, input: LoginInput, ip: Option<IpAddr>) -> ServiceResult<(User, Session)> {
        let login = input.login.trim();
        if let Some(ip) = ip {
            if self.rate_limiter.is_ip_limited(ip).await {
                return Err(ServiceError::RateLimited("Too many login requests".into()));
            }
            self.rate_limiter.record_ip_request(ip).await;
        }
        if self.rate_limiter.is_username_limited(login).await {
            return Err(ServiceError::RateLimited(
                "Too many failed login attempts, try again later".into(),
            ));
        }

        let user = if login.contains('@') {
            self.user_repo.get_by_email(&login.to_lowercase()).await?
        } else {
            self.user_repo.get_by_username(login).await?
        };

        let user = match user {
            Some(user) if verify_password(&input.password, &user.password_hash)? => user,
            _ => {
                self.rate_limiter.record_failed_attempt(login).await;
                return Err(ServiceError::Authentication("Invalid credentials".into()));
            }
        };

        if user.is_banned() {
            return Err(ServiceError::Authentication("banned".into()));
        }

        self.rate_limiter.clear_username_attempts(login).await;
        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        self.session_repo.delete(token).await?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Expired sessions are deleted; banned or deleted users resolve to `None`.
    pub async fn validate_session(&self, token: &str) -> ServiceResult<Option<User>> {
        let session = match self.session_repo.get_by_id(token).await? {
            Some(session) => session,
            None => return Ok(None),
        };
        if session.is_expired() {
            self.session_repo.delete(token).await?;
            return Ok(None);
        }
        let user = self.user_repo.get_by_id(session.user_id).await?;
        Ok(user.filter(|u| !u.is_banned()))
    }

    /// Change the password and end every other session of the user
    pub async fn change_password(
        &self,
        user: &User,
        current_token: &str,
        input: ChangePasswordInput,
    ) -> ServiceResult<()> {
        if !verify_password(&input.old_password, &user.password_hash)? {
            return Err(ServiceError::Authentication("Current password is incorrect".into()));
        }
        validate_password(&input.new_password)?;

        let hash = hash_password(&input.new_password)?;
        self.user_repo.update_password(user.id, &hash).await?;
        let ended = self
            .session_repo
            .delete_by_user(user.id, Some(current_token))
            .await?;
        tracing::info!(user_id = user.id, ended, "Password changed");
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> ServiceResult<User> {
        found(self.user_repo.get_by_id(id).await?, "User")
    }

    /// Public profile, served from cache when possible
    pub async fn get_profile(&self, id: i64) -> ServiceResult<PublicProfile> {
        let key = keys::profile(id);
        match self.cache.get::<PublicProfile>(&key).await {
            Ok(Some(profile)) => return Ok(profile),
            Ok(None) => {}
            Err(e) => tracing::warn!("Profile cache read failed: {}", e),
        }

        let profile = self.get_by_id(id).await?.public_profile();
        if let Err(e) = self.cache.set(&key, &profile, PROFILE_TTL).await {
            tracing::warn!("Profile cache write failed: {}", e);
        }
        Ok(profile)
    }

    /// Profiles for a batch of ids, in no particular order
    pub async fn profiles(&self, ids: &[i64]) -> ServiceResult<Vec<PublicProfile>> {
        let users = self.user_repo.get_many(ids).await?;
        Ok(users.iter().map(User::public_profile).collect())
    }

    pub async fn update_profile(&self, user: &User, input: UpdateProfileInput) -> ServiceResult<User> {
        let mut updated = user.clone();
        if let Some(name) = input.name {
            updated.name = non_empty(name, "Name", 100)?;
        }
        if let Some(bio) = input.bio {
            updated.bio = non_empty(bio, "Bio", 2000)?;
        }
        if let Some(city) = input.city {
            updated.city = non_empty(city, "City", 100)?;
        }
        if let Some(country) = input.country {
            updated.country = non_empty(country, "Country", 100)?;
        }
        if let Some(role) = input.tango_role {
            updated.tango_role = role;
        }
        if let Some(years) = input.years_dancing {
            if !(0..=100).contains(&years) {
                return Err(ServiceError::validation("Years dancing must be between 0 and 100"));
            }
            updated.years_dancing = Some(years);
        }
        if let Some(image) = input.profile_image {
            updated.profile_image = non_empty(image, "Profile image", 500)?;
        }

        let saved = self.user_repo.update_profile(&updated).await?;
        self.invalidate_profile(user.id).await;
        Ok(saved)
    }

    pub async fn search_users(&self, query: &str, params: &ListParams) -> ServiceResult<PagedResult<PublicProfile>> {
        let (users, total) = self.user_repo.search(query.trim(), params).await?;
        Ok(PagedResult::new(users, total, params).map(|u| u.public_profile()))
    }

    /// Soft delete the caller's own account after re-checking the password
    pub async fn delete_account(&self, user: &User, password: &str) -> ServiceResult<()> {
        if !verify_password(password, &user.password_hash)? {
            return Err(ServiceError::Authentication("Password is incorrect".into()));
        }
        self.user_repo.soft_delete(user.id).await?;
        self.session_repo.delete_by_user(user.id, None).await?;
        self.invalidate_profile(user.id).await;
        tracing::info!(user_id = user.id, "Account deleted");
        Ok(())
    }

    pub async fn list_users(&self, params: &ListParams) -> ServiceResult<PagedResult<User>> {
        let (users, total) = self.user_repo.list(params).await?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Ban or unban. Banning ends every session of the target.
    pub async fn set_status(&self, admin: &User, target_id: i64, status: UserStatus) -> ServiceResult<User> {
        if admin.id == target_id && status == UserStatus::Banned {
            return Err(ServiceError::forbidden("Admins cannot ban themselves"));
        }
        self.get_by_id(target_id).await?;
        self.user_repo.set_status(target_id, status).await?;
        if status == UserStatus::Banned {
            let ended = self.session_repo.delete_by_user(target_id, None).await?;
            tracing::info!(user_id = target_id, by = admin.id, ended, "User banned");
        }
        self.invalidate_profile(target_id).await;
        self.get_by_id(target_id).await
    }

    pub async fn set_role(&self, admin: &User, target_id: i64, role: UserRole) -> ServiceResult<User> {
        if admin.id == target_id && role != UserRole::Admin {
            return Err(ServiceError::forbidden("Admins cannot demote themselves"));
        }
        self.get_by_id(target_id).await?;
        self.user_repo.set_role(target_id, role).await?;
        self.invalidate_profile(target_id).await;
        tracing::info!(user_id = target_id, by = admin.id, %role, "User role changed");
        self.get_by_id(target_id).await
    }

    /// Remove expired sessions; returns how many were deleted
    pub async fn cleanup_expired_sessions(&self) -> ServiceResult<u64> {
        Ok(self.session_repo.delete_expired().await?)
    }

    async fn create_session(&self, user_id: i64) -> ServiceResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };
        Ok(self.session_repo.create(&session).await?)
    }

    async fn invalidate_profile(&self, user_id: i64) {
        if let Err(e) = self.cache.delete(&keys::profile(user_id)).await {
            tracing::warn!("Failed to invalidate profile cache: {}", e);
        }
    }
}

pub fn validate_username(username: &str) -> ServiceResult<()> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(ServiceError::validation(
            "Username must be 3-30 characters of letters, digits, '_' or '.'",
        ))
    }
}

fn validate_email(email: &str) -> ServiceResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && email.len() <= 255 => Ok(()),
        _ => Err(ServiceError::validation("Invalid email address")),
    }
}

fn validate_password(password: &str) -> ServiceResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Blank clears the field
fn non_empty(value: String, field: &str, max: usize) -> ServiceResult<Option<String>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max {
        return Err(ServiceError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::test_cache;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{migrated_test_pool, DynDatabasePool};
    use crate::models::TangoRole;
    use proptest::prelude::*;

    pub(crate) fn user_service(pool: &DynDatabasePool) -> UserService {
        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            test_cache(),
            Arc::new(LoginRateLimiter::new(3, Duration::minutes(15))),
            30,
        )
    }

    pub(crate) fn register_input(username: &str) -> RegisterInput {
        RegisterInput {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "password123".to_string(),
            name: None,
        }
    }

    async fn setup() -> UserService {
        user_service(&migrated_test_pool().await)
    }

    fn login(login: &str, password: &str) -> LoginInput {
        LoginInput {
            login: login.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let service = setup().await;
        let (first, _) = service.register(register_input("carlos")).await.unwrap();
        let (second, _) = service.register(register_input("lucia")).await.unwrap();
        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = setup().await;
        for bad in ["ab", "has space", "way_too_long_username_for_this_site"] {
            let result = service.register(register_input(bad)).await;
            assert!(matches!(result, Err(ServiceError::Validation(_))), "{}", bad);
        }

        let mut input = register_input("valid.name");
        input.password = "short".into();
        assert!(matches!(service.register(input).await, Err(ServiceError::Validation(_))));

        let mut input = register_input("valid.name");
        input.email = "not-an-email".into();
        assert!(matches!(service.register(input).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicates_conflict() {
        let service = setup().await;
        service.register(register_input("carlos")).await.unwrap();

        let result = service.register(register_input("carlos")).await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));

        let mut input = register_input("other");
        input.email = "CARLOS@example.com".into();
        assert!(matches!(service.register(input).await, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_deleted_account_keeps_name_reserved() {
        let service = setup().await;
        let (ana, _) = service.register(register_input("ana")).await.unwrap();
        service.delete_account(&ana, "password123").await.unwrap();

        let result = service.register(register_input("ana")).await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))), "{:?}", result);

        let mut input = register_input("ana_again");
        input.email = "ana@example.com".into();
        assert!(matches!(service.register(input).await, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_login_by_username_or_email() {
        let service = setup().await;
        service.register(register_input("carlos")).await.unwrap();

        let (user, session) = service.login(login("carlos", "password123"), None).await.unwrap();
        assert_eq!(user.username, "carlos");
        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        assert!(service.login(login("Carlos@Example.com", "password123"), None).await.is_ok());
        let result = service.login(login("carlos", "wrong-password"), None).await;
        assert!(matches!(result, Err(ServiceError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_login_rate_limited_after_failures() {
        let service = setup().await;
        service.register(register_input("carlos")).await.unwrap();
        for _ in 0..3 {
            let _ = service.login(login("carlos", "bad-password"), None).await;
        }
        let result = service.login(login("carlos", "password123"), None).await;
        assert!(matches!(result, Err(ServiceError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_banned_user_cannot_login() {
        let service = setup().await;
        let (admin, _) = service.register(register_input("admin")).await.unwrap();
        let (user, session) = service.register(register_input("carlos")).await.unwrap();

        service.set_status(&admin, user.id, UserStatus::Banned).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());

        let err = service.login(login("carlos", "password123"), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Authentication(ref m) if m == "banned"));

        let result = service.set_status(&admin, admin.id, UserStatus::Banned).await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_logout_and_expired_session() {
        let pool = migrated_test_pool().await;
        let service = user_service(&pool);
        let (user, session) = service.register(register_input("carlos")).await.unwrap();

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());

        let expired = Session {
            id: "expired-token".into(),
            user_id: user.id,
            expires_at: Utc::now() - Duration::hours(1),
            created_at: Utc::now() - Duration::days(2),
        };
        SqlxSessionRepository::new(pool.clone()).create(&expired).await.unwrap();
        assert!(service.validate_session("expired-token").await.unwrap().is_none());
        assert!(SqlxSessionRepository::new(pool).get_by_id("expired-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_password_ends_other_sessions() {
        let service = setup().await;
        let (user, current) = service.register(register_input("carlos")).await.unwrap();
        let (_, other) = service.login(login("carlos", "password123"), None).await.unwrap();

        let input = ChangePasswordInput {
            old_password: "password123".into(),
            new_password: "newpassword456".into(),
        };
        service.change_password(&user, &current.id, input).await.unwrap();

        assert!(service.validate_session(&current.id).await.unwrap().is_some());
        assert!(service.validate_session(&other.id).await.unwrap().is_none());
        assert!(service.login(login("carlos", "newpassword456"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_profile_update_invalidates_cache() {
        let service = setup().await;
        let (user, _) = service.register(register_input("carlos")).await.unwrap();

        let before = service.get_profile(user.id).await.unwrap();
        assert!(before.city.is_none());

        let input = UpdateProfileInput {
            city: Some("Buenos Aires".into()),
            tango_role: Some(TangoRole::Leader),
            ..Default::default()
        };
        service.update_profile(&user, input).await.unwrap();

        let after = service.get_profile(user.id).await.unwrap();
        assert_eq!(after.city.as_deref(), Some("Buenos Aires"));
        assert_eq!(after.tango_role, TangoRole::Leader);
    }

    #[tokio::test]
    async fn test_delete_account() {
        let service = setup().await;
        let (user, session) = service.register(register_input("carlos")).await.unwrap();

        let result = service.delete_account(&user, "wrong").await;
        assert!(matches!(result, Err(ServiceError::Authentication(_))));

        service.delete_account(&user, "password123").await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(matches!(service.get_profile(user.id).await, Err(ServiceError::NotFound(_))));
    }

    proptest! {
        #[test]
        fn valid_usernames_accepted(name in "[A-Za-z0-9_.]{3,30}") {
            prop_assert!(validate_username(&name).is_ok());
        }

        #[test]
        fn usernames_with_other_chars_rejected(prefix in "[a-z]{2,10}", bad in "[ @#!/-]") {
            let name = format!("{}{}", prefix, bad);
            prop_assert!(validate_username(&name).is_err());
        }
    }
}
